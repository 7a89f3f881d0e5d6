//! Agilent 34410A/11A driver
//!
//! Layered bottom-up:
//! - `mapping`: enumeration <-> SCPI token tables
//! - `attribute`: cached attributes and the `Attribute` trait
//! - `agilent_34410a`: the driver and its generic get/set protocol
//! - `measurement`, `memory`, `identity`: operations on the driver

pub mod agilent_34410a;
pub mod attribute;
pub mod identity;
pub mod mapping;
pub mod measurement;
pub mod memory;

pub use agilent_34410a::Agilent34410A;
pub use attribute::{
    Attribute, AttributeCache, AutoRangeAttr, Cached, CommandContext, FunctionAttr, RangeAttr,
    ResolutionAttr, TriggerDelayAttr, TriggerDelayAutoAttr, TriggerSourceAttr,
};
pub use identity::{ErrorQueueEntry, SelfTestResult};
pub use mapping::{
    AutoRange, CommandTable, MeasurementFunction, AUTO_RANGE_COMMANDS, FUNCTION_COMMANDS,
};
pub use measurement::SIMULATED_READING;

use std::time::Duration;

/// Manufacturer field of `*IDN?` on this family.
pub const INSTRUMENT_MANUFACTURER: &str = "AGILENT TECHNOLOGIES";

/// Number of state memory slots (`*sav`/`*rcl` 1..=5).
pub const MEMORY_SIZE: usize = 5;

/// Identity strings reported while simulating.
pub const SIMULATION_IDENTITY: &str = "Not available while simulating";

/// Static description of this driver.
pub const DRIVER_DESCRIPTION: &str = "Agilent 34410A/11A IVI DMM driver";
/// Driver vendor.
pub const DRIVER_VENDOR: &str = "Agilent Technologies";
/// Instrument models this driver accepts.
pub const SUPPORTED_MODELS: &[&str] = &["34410A", "34411A"];
/// IVI-4.2 DMM class specification version implemented, as (major, minor).
pub const SPECIFICATION_VERSION: (u32, u32) = (4, 1);

/// `"{manufacturer},{model}"` for every supported model.
pub fn supported_ids() -> Vec<String> {
    SUPPORTED_MODELS
        .iter()
        .map(|model| format!("{},{}", INSTRUMENT_MANUFACTURER, model))
        .collect()
}

/// Per-session driver behaviour.
///
/// Injected at construction so sessions with different modes can coexist.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    /// Skip all instrument I/O and serve placeholders
    pub simulate: bool,
    /// Check `*IDN?` against `expected_id` during initialize
    pub id_query: bool,
    /// Send `*RST` during initialize
    pub reset: bool,
    /// Case-insensitive prefix `*IDN?` must start with. `None` accepts any
    /// of [`supported_ids`].
    pub expected_id: Option<String>,
    /// Default bound for measurement reads
    pub timeout: Duration,
    /// Time the instrument needs to finish `*TST?`
    pub self_test_settle: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            simulate: false,
            id_query: false,
            reset: false,
            expected_id: None,
            timeout: Duration::from_secs(5),
            self_test_settle: Duration::from_secs(40),
        }
    }
}

impl DriverOptions {
    /// Defaults with simulation on.
    pub fn simulated() -> Self {
        Self {
            simulate: true,
            ..Self::default()
        }
    }
}
