//! Identity, reset, self-test and initialization.

use super::{supported_ids, Agilent34410A, DriverOptions, SIMULATION_IDENTITY};
use crate::adapters::Transport;
use crate::error::{DmmError, DmmResult};
use std::fmt;
use tracing::{info, warn};

const IDN_QUERY: &str = "*IDN?";

/// Outcome of `*TST?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestResult {
    /// Instrument result code, `0` on success
    pub code: i32,
    /// Human-readable outcome
    pub message: String,
}

impl SelfTestResult {
    fn from_code(code: i32) -> Self {
        let message = if code == 0 {
            "Self test passed"
        } else {
            "Self test failed"
        };
        Self {
            code,
            message: message.to_string(),
        }
    }

    /// True for result code `0`.
    pub fn passed(&self) -> bool {
        self.code == 0
    }
}

/// One entry popped from the instrument error queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorQueueEntry {
    /// SCPI error number, `0` when the queue is empty
    pub code: i32,
    /// Error text without the surrounding quotes
    pub message: String,
}

impl ErrorQueueEntry {
    /// The entry reported by an empty queue.
    pub fn no_error() -> Self {
        Self {
            code: 0,
            message: "No error".to_string(),
        }
    }

    /// True for any entry other than "no error".
    pub fn is_error(&self) -> bool {
        self.code != 0
    }

    fn parse(command: &str, response: &str) -> DmmResult<Self> {
        let (code, message) = response
            .split_once(',')
            .ok_or_else(|| DmmError::device_response(command, response, "expected code,message"))?;
        let code = code
            .trim()
            .parse::<i32>()
            .map_err(|e| DmmError::device_response(command, response, e.to_string()))?;
        Ok(Self {
            code,
            message: message.trim().trim_matches('"').to_string(),
        })
    }
}

impl fmt::Display for ErrorQueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},\"{}\"", self.code, self.message)
    }
}

impl<T: Transport> Agilent34410A<T> {
    /// Open a session on `transport`.
    ///
    /// Outside simulation this clears the interface, checks the instrument
    /// identity when `options.id_query` is set and resets when
    /// `options.reset` is set.
    pub async fn initialize(
        id: impl Into<String>,
        transport: T,
        options: DriverOptions,
    ) -> DmmResult<Self> {
        let mut dmm = Self::new(id, transport, options);
        info!(
            "[{}] Initializing over {} (simulate: {})",
            dmm.id,
            dmm.transport.describe(),
            dmm.options.simulate
        );

        if !dmm.options.simulate {
            dmm.transport.clear().await?;
            if dmm.options.id_query {
                dmm.check_identity().await?;
            }
        }
        if dmm.options.reset {
            dmm.reset().await?;
        }

        info!("[{}] Initialized", dmm.id);
        Ok(dmm)
    }

    async fn check_identity(&mut self) -> DmmResult<()> {
        self.load_identity().await?;
        let actual = format!(
            "{},{}",
            self.cache.manufacturer.value(),
            self.cache.model.value()
        );
        let accepted = match &self.options.expected_id {
            Some(prefix) => vec![prefix.clone()],
            None => supported_ids(),
        };

        let upper = actual.to_ascii_uppercase();
        if !accepted
            .iter()
            .any(|id| upper.starts_with(&id.to_ascii_uppercase()))
        {
            let expected = accepted.join(" or ");
            warn!(
                "[{}] Instrument ID mismatch, expecting {}, got {}",
                self.id, expected, actual
            );
            return Err(DmmError::IdentityMismatch { expected, actual });
        }
        Ok(())
    }

    /// Refresh manufacturer, model and firmware revision from `*IDN?`.
    ///
    /// While simulating the three are set to a fixed sentinel and left
    /// unconfirmed.
    pub async fn load_identity(&mut self) -> DmmResult<()> {
        if self.options.simulate {
            for slot in [
                &mut self.cache.manufacturer,
                &mut self.cache.model,
                &mut self.cache.firmware_revision,
            ] {
                slot.store_unconfirmed(SIMULATION_IDENTITY.to_string());
            }
            return Ok(());
        }

        let response = self.ask(IDN_QUERY).await?;
        let fields: Vec<&str> = response.trim().splitn(4, ',').map(str::trim).collect();
        let [manufacturer, model, _serial, firmware] = fields.as_slice() else {
            return Err(DmmError::device_response(
                IDN_QUERY,
                &response,
                format!("expected 4 fields, got {}", fields.len()),
            ));
        };

        self.cache.manufacturer.store(manufacturer.to_string());
        self.cache.model.store(model.to_string());
        self.cache.firmware_revision.store(firmware.to_string());
        info!(
            "[{}] Identified {} {} (firmware {})",
            self.id, manufacturer, model, firmware
        );
        Ok(())
    }

    /// Manufacturer field of `*IDN?`, loaded on first use.
    pub async fn instrument_manufacturer(&mut self) -> DmmResult<String> {
        self.identity_field(|dmm| dmm.cache.manufacturer.value().clone()).await
    }

    /// Model field of `*IDN?`, loaded on first use.
    pub async fn instrument_model(&mut self) -> DmmResult<String> {
        self.identity_field(|dmm| dmm.cache.model.value().clone()).await
    }

    /// Firmware revision field of `*IDN?`, loaded on first use.
    pub async fn instrument_firmware_revision(&mut self) -> DmmResult<String> {
        self.identity_field(|dmm| dmm.cache.firmware_revision.value().clone()).await
    }

    async fn identity_field(&mut self, field: impl Fn(&Self) -> String) -> DmmResult<String> {
        let loaded = self.cache.manufacturer.is_valid()
            && self.cache.model.is_valid()
            && self.cache.firmware_revision.is_valid();
        if self.options.simulate || !loaded {
            self.load_identity().await?;
        }
        Ok(field(&*self))
    }

    /// Send `*RST` and invalidate every cached attribute.
    ///
    /// Nothing is re-queried here; each attribute refreshes on its next read.
    /// A no-op while simulating.
    pub async fn reset(&mut self) -> DmmResult<()> {
        if self.options.simulate {
            return Ok(());
        }
        self.write("*RST").await?;
        self.cache.invalidate_all();
        info!("[{}] Reset, attribute cache invalidated", self.id);
        Ok(())
    }

    /// Same as [`Agilent34410A::reset`]; the instrument has no separate
    /// default-setup step.
    pub async fn reset_with_defaults(&mut self) -> DmmResult<()> {
        self.reset().await
    }

    /// Run the instrument self-test.
    ///
    /// Blocks for the configured settle time (40 s on this family) before
    /// reading the result code. The wait cannot be cut short. Passes
    /// immediately while simulating.
    pub async fn self_test(&mut self) -> DmmResult<SelfTestResult> {
        if self.options.simulate {
            return Ok(SelfTestResult::from_code(0));
        }

        info!(
            "[{}] Running self test, settling for {:?}",
            self.id, self.options.self_test_settle
        );
        self.write("*TST?").await?;
        tokio::time::sleep(self.options.self_test_settle).await;
        let response = self.transport.read_line().await?;
        let code = response
            .trim()
            .parse::<i32>()
            .map_err(|e| DmmError::device_response("*TST?", &response, e.to_string()))?;

        let result = SelfTestResult::from_code(code);
        if result.passed() {
            info!("[{}] {}", self.id, result.message);
        } else {
            warn!("[{}] {} (code {})", self.id, result.message, code);
        }
        Ok(result)
    }

    /// Pop the oldest entry of the instrument error queue.
    pub async fn error_query(&mut self) -> DmmResult<ErrorQueueEntry> {
        if self.options.simulate {
            return Ok(ErrorQueueEntry::no_error());
        }
        let command = ":system:error?";
        let response = self.ask(command).await?;
        ErrorQueueEntry::parse(command, &response)
    }
}
