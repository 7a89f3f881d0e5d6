//! VISA transport for GPIB/USB/Ethernet instruments
//!
//! Wraps the visa-rs crate. VISA calls block, so every operation runs on
//! Tokio's blocking executor. The session's VISA timeout is set to the same
//! bound before each call, so a timed-out read does not keep the session busy.
//!
//! Supports resource strings like:
//! - "GPIB0::22::INSTR" (GPIB interface)
//! - "USB0::0x0957::0x0607::MY47000000::INSTR" (USB)
//! - "TCPIP0::192.168.1.50::inst0::INSTR" (Ethernet/LXI)

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "instrument_visa")]
use tracing::debug;
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

/// VISA transport for instrument communication
pub struct VisaTransport {
    /// VISA resource string (e.g., "GPIB0::22::INSTR")
    pub(crate) resource_string: String,

    /// Default bound on each blocking VISA operation
    pub(crate) timeout: Duration,

    /// Line terminator for commands (typically "\n" for SCPI)
    pub(crate) line_terminator: String,

    #[cfg(feature = "instrument_visa")]
    instrument: Arc<Mutex<Instrument>>,
}

impl VisaTransport {
    /// Open the VISA resource `resource`.
    #[cfg(feature = "instrument_visa")]
    pub async fn open(resource: &str, timeout: Duration) -> Result<Self, TransportError> {
        use std::ffi::CString;

        let resource_str = resource.to_string();
        let instrument = tokio::task::spawn_blocking(move || {
            let rm = DefaultRM::new().map_err(|e| TransportError::Visa(e.to_string()))?;
            let c_string =
                CString::new(resource_str).map_err(|e| TransportError::Visa(e.to_string()))?;
            let visa_string = visa_rs::VisaString::from(c_string);
            rm.open(&visa_string, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
                .map_err(|e| TransportError::Visa(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::Visa(format!("VISA open task panicked: {}", e)))??;

        debug!("VISA resource '{}' opened", resource);

        Ok(Self {
            resource_string: resource.to_string(),
            timeout,
            line_terminator: "\n".to_string(),
            instrument: Arc::new(Mutex::new(instrument)),
        })
    }

    /// Always fails: VISA support is compiled out.
    #[cfg(not(feature = "instrument_visa"))]
    pub async fn open(_resource: &str, _timeout: Duration) -> Result<Self, TransportError> {
        Err(TransportError::FeatureNotEnabled("instrument_visa"))
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    #[cfg(feature = "instrument_visa")]
    async fn blocking<R, F>(&self, timeout: Duration, op: F) -> Result<R, TransportError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Instrument) -> Result<R, TransportError> + Send + 'static,
    {
        let instrument = self.instrument.clone();
        let visa_timeout = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = instrument
                .lock()
                .map_err(|_| TransportError::Visa("VISA session lock poisoned".to_string()))?;
            guard
                .set_timeout(visa_timeout)
                .map_err(|e| TransportError::Visa(format!("failed to set VISA timeout: {}", e)))?;
            op(&mut guard)
        });

        tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|e| TransportError::Visa(format!("VISA I/O task panicked: {}", e)))?
    }
}

#[cfg(feature = "instrument_visa")]
#[async_trait]
impl Transport for VisaTransport {
    async fn write(&mut self, command: &str) -> Result<(), TransportError> {
        use std::io::Write;

        let line = format!("{}{}", command, self.line_terminator);
        self.blocking(self.timeout, move |instr| {
            instr.write_all(line.as_bytes())?;
            Ok(())
        })
        .await?;
        debug!("VISA write sent: {}", command);
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        self.read_line_timeout(self.timeout).await
    }

    async fn read_line_timeout(&mut self, timeout: Duration) -> Result<String, TransportError> {
        use std::io::Read;

        let response = self
            .blocking(timeout, |instr| {
                let mut line = Vec::new();
                let mut buf = [0u8; 256];
                loop {
                    let n = instr.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    line.extend_from_slice(&buf[..n]);
                    if buf[..n].contains(&b'\n') {
                        break;
                    }
                }
                Ok(String::from_utf8_lossy(&line).trim().to_string())
            })
            .await?;
        debug!("VISA read: {}", response);
        Ok(response)
    }

    async fn clear(&mut self) -> Result<(), TransportError> {
        self.blocking(self.timeout, |instr| {
            instr.clear().map_err(|e| TransportError::Visa(e.to_string()))
        })
        .await?;
        debug!("VISA device clear on '{}'", self.resource_string);
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "VisaTransport({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }
}

#[cfg(not(feature = "instrument_visa"))]
#[async_trait]
impl Transport for VisaTransport {
    async fn write(&mut self, _command: &str) -> Result<(), TransportError> {
        Err(TransportError::FeatureNotEnabled("instrument_visa"))
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        Err(TransportError::FeatureNotEnabled("instrument_visa"))
    }

    fn describe(&self) -> String {
        format!(
            "VisaTransport({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }
}
