//! Custom error types for the driver.
//!
//! This module defines the primary error type, `DmmError`, for the whole crate.
//! Using the `thiserror` crate, it provides one consistent way to report the
//! failures a multimeter session can run into, from rejected attribute values
//! to malformed instrument responses.
//!
//! ## Error Hierarchy
//!
//! - **`ValueNotSupported`**: an attribute value outside its domain. Raised before any
//!   command is sent to the instrument.
//! - **`IndexOutOfRange`**: a memory slot index outside `[1, memory_size]`. Also raised
//!   before any command is sent.
//! - **`Transport`**: wraps [`TransportError`] from the I/O layer. The driver never
//!   retries these; they surface exactly as the transport reported them.
//! - **`DeviceResponse`**: the instrument answered, but the answer could not be parsed
//!   (non-numeric reading, wrong field count, ...).
//! - **`ProtocolMismatch`**: the instrument reported an enumeration token that has no
//!   entry in the command tables. This is a device-response failure as well, see
//!   [`DmmError::is_device_response`].
//! - **`IdentityMismatch`**: `*IDN?` during initialization named a different instrument.
//! - **`Config`**: configuration loading or validation failed.

use crate::adapters::TransportError;
use crate::config::ConfigError;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type DmmResult<T> = std::result::Result<T, DmmError>;

/// Every failure a driver operation can report.
#[derive(Error, Debug)]
pub enum DmmError {
    /// Attribute value outside its domain
    #[error("Value '{value}' is not supported for attribute '{attribute}'")]
    ValueNotSupported {
        /// Attribute name
        attribute: &'static str,
        /// Rejected value as text
        value: String,
    },

    /// Memory slot index outside `1..=max`
    #[error("Memory slot index {index} out of range (valid: 1..={max})")]
    IndexOutOfRange {
        /// Requested slot
        index: usize,
        /// Highest valid slot
        max: usize,
    },

    /// I/O failure from the transport, unchanged
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Instrument answer that could not be parsed
    #[error("Unexpected response to '{command}': {response:?} ({reason})")]
    DeviceResponse {
        /// Command that was answered
        command: String,
        /// Raw answer
        response: String,
        /// Why parsing failed
        reason: String,
    },

    /// Instrument token with no entry in the command tables
    #[error("Instrument reported unknown token '{token}'")]
    ProtocolMismatch {
        /// Token as received
        token: String,
    },

    /// `*IDN?` named an instrument this session does not accept
    #[error("Instrument ID mismatch, expecting {expected}, got {actual}")]
    IdentityMismatch {
        /// Accepted `manufacturer,model` prefixes
        expected: String,
        /// Reported `manufacturer,model`
        actual: String,
    },

    /// Configuration loading or validation failed
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DmmError {
    pub(crate) fn device_response(
        command: impl Into<String>,
        response: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DeviceResponse {
            command: command.into(),
            response: response.into(),
            reason: reason.into(),
        }
    }

    /// True for every failure caused by what the instrument sent back.
    pub fn is_device_response(&self) -> bool {
        matches!(
            self,
            Self::DeviceResponse { .. } | Self::ProtocolMismatch { .. }
        )
    }

    /// True for failures raised by local validation, before any I/O happened.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValueNotSupported { .. } | Self::IndexOutOfRange { .. }
        )
    }
}
