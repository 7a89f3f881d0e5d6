//! Instrument-side configuration memory.
//!
//! Slots are numbered `1..=MEMORY_SIZE`. Every operation checks the index
//! before anything is sent; slot contents are opaque to the driver and never
//! touch the attribute cache.

use super::{Agilent34410A, MEMORY_SIZE};
use crate::adapters::Transport;
use crate::error::{DmmError, DmmResult};

fn check_slot(index: usize) -> DmmResult<usize> {
    if (1..=MEMORY_SIZE).contains(&index) {
        Ok(index)
    } else {
        Err(DmmError::IndexOutOfRange {
            index,
            max: MEMORY_SIZE,
        })
    }
}

/// Render `name` as a SCPI string literal, doubling embedded quotes.
fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Inverse of [`quote`], tolerant of surrounding whitespace.
fn unquote(response: &str) -> String {
    let trimmed = response.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .replace("\"\"", "\"")
}

impl<T: Transport> Agilent34410A<T> {
    /// Number of memory slots.
    pub fn memory_size(&self) -> usize {
        MEMORY_SIZE
    }

    /// Store the current instrument state in slot `index`.
    pub async fn memory_save(&mut self, index: usize) -> DmmResult<()> {
        let index = check_slot(index)?;
        if !self.options.simulate {
            self.write(&format!("*sav {}", index)).await?;
        }
        Ok(())
    }

    /// Restore the instrument state from slot `index`.
    pub async fn memory_recall(&mut self, index: usize) -> DmmResult<()> {
        let index = check_slot(index)?;
        if !self.options.simulate {
            self.write(&format!("*rcl {}", index)).await?;
        }
        Ok(())
    }

    /// Name of slot `index`. Empty while simulating.
    pub async fn memory_name(&mut self, index: usize) -> DmmResult<String> {
        let index = check_slot(index)?;
        if self.options.simulate {
            return Ok(String::new());
        }
        let response = self.ask(&format!("memory:state:name? {}", index)).await?;
        Ok(unquote(&response))
    }

    /// Rename slot `index`.
    ///
    /// The name is not checked against the instrument's naming rules.
    pub async fn set_memory_name(&mut self, index: usize, name: &str) -> DmmResult<()> {
        let index = check_slot(index)?;
        if !self.options.simulate {
            self.write(&format!("memory:state:name {}, {}", index, quote(name)))
                .await?;
        }
        Ok(())
    }
}
