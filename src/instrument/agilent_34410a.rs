//! Agilent 34410A/11A digital multimeter driver
//!
//! The driver owns one [`Transport`] and an [`AttributeCache`]. All
//! attribute access goes through [`Agilent34410A::get`] and
//! [`Agilent34410A::set`], which apply the cache-validity rules uniformly;
//! the typed accessors below are thin wrappers around them.
//!
//! ## Example
//!
//! ```no_run
//! use scpi_dmm::adapters::TcpTransport;
//! use scpi_dmm::instrument::{Agilent34410A, DriverOptions, MeasurementFunction};
//! use std::time::Duration;
//!
//! # async fn example() -> scpi_dmm::DmmResult<()> {
//! let transport = TcpTransport::connect("192.168.1.50:5025", Duration::from_secs(5)).await?;
//! let options = DriverOptions {
//!     id_query: true,
//!     ..DriverOptions::default()
//! };
//! let mut dmm = Agilent34410A::initialize("bench_dmm", transport, options).await?;
//!
//! dmm.configure_measurement(MeasurementFunction::DcVolts, 10.0, 1.0e-5).await?;
//! let volts = dmm.read(Duration::from_secs(2)).await?;
//! println!("{} V", volts);
//! # Ok(())
//! # }
//! ```
//!
//! Callers must serialize access to one driver instance; nothing here locks.
//!
//! A query that times out may still be answered later. The driver counts
//! such replies and, before the next exchange, reads and discards them (each
//! bounded by [`DriverOptions::timeout`]) and then clears the transport, so
//! the next answer belongs to the next query.

use super::attribute::{
    Attribute, AttributeCache, AutoRangeAttr, CommandContext, FunctionAttr, RangeAttr,
    ResolutionAttr, TriggerDelayAttr, TriggerDelayAutoAttr, TriggerSourceAttr,
};
use super::mapping::{AutoRange, MeasurementFunction};
use super::DriverOptions;
use crate::adapters::{Transport, TransportError};
use crate::error::DmmResult;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Driver for one Agilent 34410A/11A session.
pub struct Agilent34410A<T: Transport> {
    /// Instrument identifier used in log messages
    pub(crate) id: String,
    pub(crate) transport: T,
    pub(crate) options: DriverOptions,
    pub(crate) cache: AttributeCache,
    /// Replies owed to queries that timed out
    pub(crate) stale_replies: usize,
}

impl<T: Transport> Agilent34410A<T> {
    /// Create a driver without touching the instrument.
    ///
    /// Use [`Agilent34410A::initialize`] to also clear the interface, check
    /// the identity and optionally reset.
    pub fn new(id: impl Into<String>, transport: T, options: DriverOptions) -> Self {
        Self {
            id: id.into(),
            transport,
            options,
            cache: AttributeCache::default(),
            stale_replies: 0,
        }
    }

    /// Identifier used in log messages.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Options this session was created with.
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// True when no I/O is performed.
    pub fn is_simulating(&self) -> bool {
        self.options.simulate
    }

    /// Read-only view of the attribute cache.
    pub fn cache(&self) -> &AttributeCache {
        &self.cache
    }

    /// Mark every cached attribute invalid without touching the instrument.
    pub fn invalidate_all_attributes(&mut self) {
        debug!("[{}] Invalidating all cached attributes", self.id);
        self.cache.invalidate_all();
    }

    /// Release the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    // ------------------------------------------------------------------------
    // Transport access
    // ------------------------------------------------------------------------

    pub(crate) async fn write(&mut self, command: &str) -> DmmResult<()> {
        self.resynchronize().await?;
        debug!("[{}] SCPI write: {}", self.id, command);
        self.transport.write(command).await?;
        Ok(())
    }

    pub(crate) async fn ask(&mut self, command: &str) -> DmmResult<String> {
        self.resynchronize().await?;
        debug!("[{}] SCPI query: {}", self.id, command);
        let result = self.transport.ask(command).await;
        self.finish_query(command, result)
    }

    /// Query bounded by `max_time` instead of the link's own read timeout.
    pub(crate) async fn ask_with_timeout(
        &mut self,
        command: &str,
        max_time: Duration,
    ) -> DmmResult<String> {
        self.resynchronize().await?;
        debug!("[{}] SCPI query: {} (max {:?})", self.id, command, max_time);
        let result = self.transport.ask_timeout(command, max_time).await;
        self.finish_query(command, result)
    }

    fn finish_query(
        &mut self,
        command: &str,
        result: Result<String, TransportError>,
    ) -> DmmResult<String> {
        match result {
            Ok(response) => {
                debug!("[{}] SCPI query '{}' -> '{}'", self.id, command, response);
                Ok(response)
            }
            Err(TransportError::Timeout(waited)) => {
                warn!(
                    "[{}] No reply to '{}' within {:?}; a late reply will be discarded",
                    self.id, command, waited
                );
                self.stale_replies += 1;
                Err(TransportError::Timeout(waited).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of late replies still to be discarded.
    pub fn stale_replies(&self) -> usize {
        self.stale_replies
    }

    /// Drain replies owed to timed-out queries, then clear the transport.
    async fn resynchronize(&mut self) -> DmmResult<()> {
        if self.stale_replies == 0 {
            return Ok(());
        }

        let wait = self.options.timeout;
        while self.stale_replies > 0 {
            match self.transport.read_line_timeout(wait).await {
                Ok(line) => {
                    debug!("[{}] Discarded late reply: {}", self.id, line);
                    self.stale_replies -= 1;
                }
                Err(TransportError::Timeout(_)) => {
                    warn!(
                        "[{}] Gave up waiting for {} late replies",
                        self.id, self.stale_replies
                    );
                    break;
                }
                Err(e) => {
                    self.stale_replies = 0;
                    return Err(e.into());
                }
            }
        }

        self.stale_replies = 0;
        self.transport.clear().await?;
        Ok(())
    }

    /// Forget owed replies and clear the transport without waiting.
    pub(crate) async fn discard_pending_replies(&mut self) -> DmmResult<()> {
        if self.stale_replies > 0 {
            debug!(
                "[{}] Dropping {} late replies without waiting",
                self.id, self.stale_replies
            );
            self.stale_replies = 0;
            self.transport.clear().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Generic attribute protocol
    // ------------------------------------------------------------------------

    /// Read attribute `A`.
    ///
    /// Served from cache while simulating or while the cached value is valid.
    /// Otherwise the instrument is queried and the parsed answer cached. A
    /// parse failure leaves the attribute invalid.
    pub async fn get<A: Attribute>(&mut self) -> DmmResult<A::Value> {
        if self.options.simulate || self.cache.is_valid::<A>() {
            trace!("[{}] {} served from cache", self.id, A::NAME);
            return Ok(self.cache.peek::<A>().clone());
        }

        let command = A::query_command(&CommandContext::from_cache(&self.cache)?);
        let response = self.ask(&command).await?;
        let value = A::parse(&command, &response)?;
        self.cache.store::<A>(value.clone());
        Ok(value)
    }

    /// Write attribute `A`.
    ///
    /// The value is validated first; a rejected value touches neither the
    /// instrument nor the cache. Otherwise exactly one command is written
    /// (none while simulating) and the value is cached as valid.
    pub async fn set<A: Attribute>(&mut self, value: A::Value) -> DmmResult<()> {
        let command = A::write_command(&CommandContext::from_cache(&self.cache)?, &value)?;
        if !self.options.simulate {
            self.write(&command).await?;
        }
        self.cache.store::<A>(value);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------------

    /// Active measurement function.
    pub async fn measurement_function(&mut self) -> DmmResult<MeasurementFunction> {
        self.get::<FunctionAttr>().await
    }

    /// Select the measurement function.
    ///
    /// A different function invalidates the cached range, auto-range and
    /// resolution.
    pub async fn set_measurement_function(&mut self, value: MeasurementFunction) -> DmmResult<()> {
        self.set::<FunctionAttr>(value).await
    }

    /// Range of the active function.
    pub async fn range(&mut self) -> DmmResult<f64> {
        self.get::<RangeAttr>().await
    }

    /// Set the range of the active function.
    pub async fn set_range(&mut self, value: f64) -> DmmResult<()> {
        self.set::<RangeAttr>(value).await
    }

    /// Auto-range mode of the active function.
    pub async fn auto_range(&mut self) -> DmmResult<AutoRange> {
        self.get::<AutoRangeAttr>().await
    }

    /// Set the auto-range mode of the active function.
    pub async fn set_auto_range(&mut self, value: AutoRange) -> DmmResult<()> {
        self.set::<AutoRangeAttr>(value).await
    }

    /// Resolution of the active function.
    pub async fn resolution(&mut self) -> DmmResult<f64> {
        self.get::<ResolutionAttr>().await
    }

    /// Set the resolution of the active function.
    pub async fn set_resolution(&mut self, value: f64) -> DmmResult<()> {
        self.set::<ResolutionAttr>(value).await
    }

    /// Trigger delay in seconds.
    pub async fn trigger_delay(&mut self) -> DmmResult<f64> {
        self.get::<TriggerDelayAttr>().await
    }

    /// Set the trigger delay in seconds.
    pub async fn set_trigger_delay(&mut self, seconds: f64) -> DmmResult<()> {
        self.set::<TriggerDelayAttr>(seconds).await
    }

    /// Whether the instrument picks the trigger delay.
    pub async fn trigger_delay_auto(&mut self) -> DmmResult<bool> {
        self.get::<TriggerDelayAutoAttr>().await
    }

    /// Let the instrument pick the trigger delay, or not.
    pub async fn set_trigger_delay_auto(&mut self, value: bool) -> DmmResult<()> {
        self.set::<TriggerDelayAutoAttr>(value).await
    }

    /// Trigger source token, lower-cased.
    pub async fn trigger_source(&mut self) -> DmmResult<String> {
        self.get::<TriggerSourceAttr>().await
    }

    /// Set the trigger source; the token is sent as given.
    pub async fn set_trigger_source(&mut self, value: impl Into<String>) -> DmmResult<()> {
        self.set::<TriggerSourceAttr>(value.into()).await
    }

    /// Set function, range and resolution, in that order.
    pub async fn configure_measurement(
        &mut self,
        function: MeasurementFunction,
        range: f64,
        resolution: f64,
    ) -> DmmResult<()> {
        self.set_measurement_function(function).await?;
        self.set_range(range).await?;
        self.set_resolution(resolution).await
    }

    /// Set trigger source and delay.
    pub async fn configure_trigger(
        &mut self,
        source: impl Into<String>,
        delay_seconds: f64,
    ) -> DmmResult<()> {
        self.set_trigger_source(source).await?;
        self.set_trigger_delay(delay_seconds).await
    }
}
