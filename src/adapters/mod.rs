//! Transport adapter implementations
//!
//! This module contains implementations of the [`Transport`] trait, the
//! line-level I/O abstraction the driver sends SCPI commands through.
//!
//! - [`TcpTransport`]: raw SCPI socket (LAN instruments, port 5025)
//! - [`VisaTransport`]: VISA sessions (GPIB, USB, LXI) behind `instrument_visa`
//! - [`MockTransport`]: scripted responses and a call log for tests
//! - [`NullTransport`]: no-op stand-in used while simulating

pub mod mock;
pub mod tcp_adapter;
pub mod visa_adapter;

pub use mock::{MockCall, MockTransport};
pub use tcp_adapter::TcpTransport;
pub use visa_adapter::VisaTransport;

use crate::config::TransportSettings;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised at the transport boundary.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket or device I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete answer within the given bound
    #[error("Timed out after {0:?} waiting for the instrument")]
    Timeout(Duration),

    /// No link to send on
    #[error("Transport not connected")]
    NotConnected,

    /// Peer closed the link, or nothing is left to read
    #[error("Connection closed by instrument")]
    Closed,

    /// VISA library error
    #[error("VISA error: {0}")]
    Visa(String),

    /// Transport compiled out
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(&'static str),

    /// Failure scripted by [`MockTransport`]
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Line-oriented command channel to one instrument.
///
/// Commands are passed without terminator; implementations append whatever
/// the physical link needs. Responses are returned trimmed.
#[async_trait]
pub trait Transport: Send {
    /// Send a command that produces no response.
    async fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Read one response line.
    async fn read_line(&mut self) -> Result<String, TransportError>;

    /// Send a query and read back its single-line response.
    async fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        self.write(command).await?;
        self.read_line().await
    }

    /// Read one response line, waiting at most `timeout`.
    ///
    /// `timeout` replaces the link's default read timeout for this call.
    async fn read_line_timeout(&mut self, timeout: Duration) -> Result<String, TransportError> {
        match tokio::time::timeout(timeout, self.read_line()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    /// Send a query and wait at most `timeout` for its response.
    async fn ask_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.write(command).await?;
        self.read_line_timeout(timeout).await
    }

    /// Device clear: drop unread input and, where the link supports it, reset
    /// the instrument's I/O. Links without either treat this as a no-op.
    async fn clear(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Human-readable description used in log messages.
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command).await
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        (**self).read_line().await
    }

    async fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).ask(command).await
    }

    async fn read_line_timeout(&mut self, timeout: Duration) -> Result<String, TransportError> {
        (**self).read_line_timeout(timeout).await
    }

    async fn ask_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        (**self).ask_timeout(command, timeout).await
    }

    async fn clear(&mut self) -> Result<(), TransportError> {
        (**self).clear().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Transport that talks to nothing.
///
/// Writes are accepted and dropped; reads fail with `NotConnected`. A driver
/// in simulation mode never reaches either.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn write(&mut self, _command: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        Err(TransportError::NotConnected)
    }

    fn describe(&self) -> String {
        "NullTransport".to_string()
    }
}

/// Open the transport described by `settings`.
pub async fn connect(settings: &TransportSettings) -> Result<Box<dyn Transport>, TransportError> {
    let transport: Box<dyn Transport> = match settings {
        TransportSettings::Tcp {
            address,
            terminator,
            timeout_ms,
        } => Box::new(
            TcpTransport::connect(address, Duration::from_millis(*timeout_ms))
                .await?
                .with_terminator(terminator.clone()),
        ),
        TransportSettings::Visa {
            resource,
            timeout_ms,
        } => Box::new(VisaTransport::open(resource, Duration::from_millis(*timeout_ms)).await?),
        TransportSettings::Null => Box::new(NullTransport),
    };

    debug!("Opened transport {}", transport.describe());
    Ok(transport)
}
