//! Tracing subscriber setup for binaries and tests.

use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::EnvFilter;

/// Error returned by [`init_tracing`].
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Level or directive did not parse
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    /// Another subscriber got there first
    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Build the filter: `RUST_LOG` when set, otherwise `scpi_dmm={level}`.
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => {
            let directive: Directive = format!("scpi_dmm={}", level).parse()?;
            Ok(EnvFilter::new("warn").add_directive(directive))
        }
    }
}

/// Install a global `fmt` subscriber.
///
/// Fails instead of panicking when a subscriber is already installed, so
/// tests and embedding applications can call it freely.
pub fn init_tracing(level: &str) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level)?)
        .with_target(true)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
