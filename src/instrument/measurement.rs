//! Measurement control: abort, initiate, fetch and read.
//!
//! `initiate` + `fetch` split a measurement into arm and collect; `read` does
//! both in one instrument-side step. Results are plain numbers. While
//! simulating no command is sent and readings are `0.0`.

use super::Agilent34410A;
use crate::adapters::Transport;
use crate::error::{DmmError, DmmResult};
use std::time::Duration;
use tracing::debug;

/// Reading returned while simulating.
pub const SIMULATED_READING: f64 = 0.0;

impl<T: Transport> Agilent34410A<T> {
    /// Abort a measurement in progress. Safe to call when idle.
    ///
    /// Replies still owed to timed-out reads are dropped rather than awaited.
    pub async fn abort(&mut self) -> DmmResult<()> {
        if !self.options.simulate {
            self.discard_pending_replies().await?;
            self.write(":abort").await?;
        }
        Ok(())
    }

    /// Arm the trigger system. Returns without waiting for a reading.
    pub async fn initiate(&mut self) -> DmmResult<()> {
        if !self.options.simulate {
            self.write(":initiate").await?;
        }
        Ok(())
    }

    /// Collect the reading of a previously initiated measurement.
    ///
    /// Waits at most `max_time`. Fetching without a prior `initiate` is
    /// reported by the instrument, not checked here.
    pub async fn fetch(&mut self, max_time: Duration) -> DmmResult<f64> {
        self.numeric_query(":fetch?", max_time).await
    }

    /// Initiate and fetch in one step, waiting at most `max_time`.
    pub async fn read(&mut self, max_time: Duration) -> DmmResult<f64> {
        self.numeric_query(":read?", max_time).await
    }

    /// `read` bounded by the configured default timeout.
    pub async fn read_default(&mut self) -> DmmResult<f64> {
        let max_time = self.options.timeout;
        self.read(max_time).await
    }

    /// True when `value` is an over- or under-range reading.
    pub fn is_out_of_range(&self, value: f64) -> bool {
        self.is_over_range(value) || self.is_under_range(value)
    }

    /// Overload sentinels are not modeled; always false.
    pub fn is_over_range(&self, _value: f64) -> bool {
        false
    }

    /// Underload sentinels are not modeled; always false.
    pub fn is_under_range(&self, _value: f64) -> bool {
        false
    }

    async fn numeric_query(&mut self, command: &str, max_time: Duration) -> DmmResult<f64> {
        if self.options.simulate {
            return Ok(SIMULATED_READING);
        }

        let response = self.ask_with_timeout(command, max_time).await?;
        let value = response
            .trim()
            .parse::<f64>()
            .map_err(|e| DmmError::device_response(command, &response, e.to_string()))?;
        debug!("[{}] Reading: {}", self.id, value);
        Ok(value)
    }
}
