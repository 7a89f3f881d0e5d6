//! Driver configuration using Figment
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `SCPI_DMM_` (nested keys split on `__`)
//! 2. TOML configuration file (default: `config/dmm.toml`)
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [instrument]
//! id = "bench_dmm"
//! simulate = false
//! id_query = true
//! reset = false
//! timeout_ms = 5000
//! self_test_settle_ms = 40000
//!
//! [transport]
//! kind = "tcp"
//! address = "192.168.1.50:5025"
//! ```
//!
//! ```text
//! SCPI_DMM_INSTRUMENT__SIMULATE=true
//! SCPI_DMM_APPLICATION__LOG_LEVEL=debug
//! ```

use crate::instrument::DriverOptions;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/dmm.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SCPI_DMM_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong shape
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// Values loaded but are unusable
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
    /// TOML rendering failed
    #[error("Configuration serialization error: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::LoadError(Box::new(err))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationSettings,
    /// Driver behaviour
    #[serde(default)]
    pub instrument: InstrumentSettings,
    /// How to reach the instrument
    #[serde(default)]
    pub transport: TransportSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationSettings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Driver settings for one multimeter session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSettings {
    /// Instrument identifier used in log messages
    #[serde(default = "default_instrument_id")]
    pub id: String,
    /// Skip all I/O and serve placeholder values
    #[serde(default)]
    pub simulate: bool,
    /// Verify `*IDN?` during initialization
    #[serde(default = "default_true")]
    pub id_query: bool,
    /// Reset the instrument during initialization
    #[serde(default)]
    pub reset: bool,
    /// Expected `manufacturer,model` prefix of the identification string.
    /// Unset accepts any supported model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_id: Option<String>,
    /// Default timeout for measurement reads in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Settling time the self test needs before its result can be read
    #[serde(default = "default_self_test_settle_ms")]
    pub self_test_settle_ms: u64,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            id: default_instrument_id(),
            simulate: false,
            id_query: true,
            reset: false,
            expected_id: None,
            timeout_ms: default_timeout_ms(),
            self_test_settle_ms: default_self_test_settle_ms(),
        }
    }
}

/// Transport selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportSettings {
    /// Raw SCPI socket
    Tcp {
        /// `host:port`, usually port 5025
        address: String,
        /// Command terminator
        #[serde(default = "default_terminator")]
        terminator: String,
        /// Connect and per-line read timeout in milliseconds
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    /// VISA resource (requires the `instrument_visa` feature)
    Visa {
        /// VISA resource string, e.g. "GPIB0::22::INSTR"
        resource: String,
        /// Per-operation timeout in milliseconds
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    /// No instrument; only meaningful together with `simulate = true`
    Null,
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings::Null
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_instrument_id() -> String {
    "dmm".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_self_test_settle_ms() -> u64 {
    40_000
}

fn default_terminator() -> String {
    "\n".to_string()
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load configuration from `config/dmm.toml` and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply. The result is validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(path))
    }

    /// Defaults, then the TOML file at `path`, then environment overrides.
    ///
    /// Callers can merge further providers before [`Settings::from_figment`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Parse configuration from TOML text, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml)),
        )
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Self = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.instrument.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "instrument.timeout_ms must be greater than zero".to_string(),
            ));
        }

        match &self.transport {
            TransportSettings::Tcp {
                address,
                timeout_ms,
                ..
            } => {
                if address.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "TCP transport: 'address' cannot be empty".to_string(),
                    ));
                }
                if *timeout_ms == 0 {
                    return Err(ConfigError::ValidationError(
                        "TCP transport: 'timeout_ms' must be greater than zero".to_string(),
                    ));
                }
            }
            TransportSettings::Visa { resource, .. } => {
                if resource.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "VISA transport: 'resource' cannot be empty".to_string(),
                    ));
                }
            }
            TransportSettings::Null => {
                if !self.instrument.simulate {
                    return Err(ConfigError::ValidationError(
                        "Null transport requires instrument.simulate = true".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Runtime options for the driver built from this configuration.
    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            simulate: self.instrument.simulate,
            id_query: self.instrument.id_query,
            reset: self.instrument.reset,
            expected_id: self.instrument.expected_id.clone(),
            timeout: Duration::from_millis(self.instrument.timeout_ms),
            self_test_settle: Duration::from_millis(self.instrument.self_test_settle_ms),
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
