//! Enumeration <-> SCPI token tables
//!
//! Each table is a single bidirectional mapping. Tokens are unique within a
//! table; this is checked when the table is built, so a duplicate is a
//! compile error for the `static` tables below.

use crate::error::{DmmError, DmmResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Measurement functions of the DMM instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementFunction {
    /// DC voltage
    DcVolts,
    /// AC voltage
    AcVolts,
    /// DC current
    DcCurrent,
    /// AC current
    AcCurrent,
    /// 2-wire resistance
    TwoWireResistance,
    /// 4-wire resistance
    FourWireResistance,
    /// Class-defined, but not measurable on this family.
    AcPlusDcVolts,
    /// Class-defined, but not measurable on this family.
    AcPlusDcCurrent,
    /// Frequency
    Frequency,
    /// Period
    Period,
    /// Temperature
    Temperature,
    /// Capacitance
    Capacitance,
    /// Continuity test
    Continuity,
    /// Diode test
    Diode,
}

impl MeasurementFunction {
    /// Every class-defined function, supported or not.
    pub const ALL: [MeasurementFunction; 14] = [
        MeasurementFunction::DcVolts,
        MeasurementFunction::AcVolts,
        MeasurementFunction::DcCurrent,
        MeasurementFunction::AcCurrent,
        MeasurementFunction::TwoWireResistance,
        MeasurementFunction::FourWireResistance,
        MeasurementFunction::AcPlusDcVolts,
        MeasurementFunction::AcPlusDcCurrent,
        MeasurementFunction::Frequency,
        MeasurementFunction::Period,
        MeasurementFunction::Temperature,
        MeasurementFunction::Capacitance,
        MeasurementFunction::Continuity,
        MeasurementFunction::Diode,
    ];

    /// Class name, e.g. `"dc_volts"`.
    pub fn name(self) -> &'static str {
        match self {
            MeasurementFunction::DcVolts => "dc_volts",
            MeasurementFunction::AcVolts => "ac_volts",
            MeasurementFunction::DcCurrent => "dc_current",
            MeasurementFunction::AcCurrent => "ac_current",
            MeasurementFunction::TwoWireResistance => "two_wire_resistance",
            MeasurementFunction::FourWireResistance => "four_wire_resistance",
            MeasurementFunction::AcPlusDcVolts => "ac_plus_dc_volts",
            MeasurementFunction::AcPlusDcCurrent => "ac_plus_dc_current",
            MeasurementFunction::Frequency => "frequency",
            MeasurementFunction::Period => "period",
            MeasurementFunction::Temperature => "temperature",
            MeasurementFunction::Capacitance => "capacitance",
            MeasurementFunction::Continuity => "continuity",
            MeasurementFunction::Diode => "diode",
        }
    }

    /// SCPI token for this function on this instrument family.
    pub fn to_command(self) -> DmmResult<&'static str> {
        FUNCTION_COMMANDS.to_command(self)
    }

    /// Function for an instrument-reported token.
    pub fn from_command(token: &str) -> DmmResult<Self> {
        FUNCTION_COMMANDS.from_command(token)
    }
}

impl fmt::Display for MeasurementFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MeasurementFunction {
    type Err = DmmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MeasurementFunction::ALL
            .into_iter()
            .find(|function| function.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DmmError::ValueNotSupported {
                attribute: FUNCTION_COMMANDS.attribute,
                value: s.to_string(),
            })
    }
}

/// Auto-range modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRange {
    /// Fixed range
    Off,
    /// Range follows the signal
    On,
    /// Pick a range once, then hold it.
    Once,
}

impl AutoRange {
    /// SCPI token.
    pub fn to_command(self) -> DmmResult<&'static str> {
        AUTO_RANGE_COMMANDS.to_command(self)
    }

    /// Parse a range-auto query response.
    ///
    /// The instrument answers `0`/`1`; `ONCE` is a one-shot action and reads
    /// back as off.
    pub fn from_response(response: &str) -> DmmResult<Self> {
        match response.trim() {
            "0" => Ok(AutoRange::Off),
            "1" => Ok(AutoRange::On),
            other => AUTO_RANGE_COMMANDS.from_command(other),
        }
    }
}

impl fmt::Display for AutoRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AutoRange::Off => "off",
            AutoRange::On => "on",
            AutoRange::Once => "once",
        };
        f.write_str(name)
    }
}

impl FromStr for AutoRange {
    type Err = DmmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AUTO_RANGE_COMMANDS
            .from_command(s)
            .map_err(|_| DmmError::ValueNotSupported {
                attribute: AUTO_RANGE_COMMANDS.attribute,
                value: s.to_string(),
            })
    }
}

/// Bidirectional value/token table.
#[derive(Debug)]
pub struct CommandTable<T: 'static> {
    attribute: &'static str,
    entries: &'static [(T, &'static str)],
}

impl<T: Copy + PartialEq + fmt::Display + 'static> CommandTable<T> {
    /// Build a table.
    ///
    /// # Panics
    ///
    /// If two entries share a token. In a `static` this fails compilation.
    pub const fn new(attribute: &'static str, entries: &'static [(T, &'static str)]) -> Self {
        assert!(
            !has_duplicate_tokens(entries),
            "command table contains a duplicate token"
        );
        Self { attribute, entries }
    }

    /// Attribute this table belongs to.
    pub fn attribute(&self) -> &'static str {
        self.attribute
    }

    /// Token for `value`, or `ValueNotSupported` if the table has none.
    pub fn to_command(&self, value: T) -> DmmResult<&'static str> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == value)
            .map(|(_, token)| *token)
            .ok_or_else(|| DmmError::ValueNotSupported {
                attribute: self.attribute,
                value: value.to_string(),
            })
    }

    /// Value for an instrument token.
    ///
    /// Matching ignores case, surrounding whitespace and double quotes.
    /// Unknown tokens are a `ProtocolMismatch`.
    pub fn from_command(&self, token: &str) -> DmmResult<T> {
        let normalized = token.trim().trim_matches('"').trim();
        self.entries
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(normalized))
            .map(|(value, _)| *value)
            .ok_or_else(|| DmmError::ProtocolMismatch {
                token: token.to_string(),
            })
    }

    /// Values that have a token.
    pub fn values(&self) -> impl Iterator<Item = T> + '_ {
        self.entries.iter().map(|(value, _)| *value)
    }
}

const fn tokens_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i].to_ascii_lowercase() != b[i].to_ascii_lowercase() {
            return false;
        }
        i += 1;
    }
    true
}

const fn has_duplicate_tokens<T>(entries: &[(T, &str)]) -> bool {
    let mut i = 0;
    while i < entries.len() {
        let mut j = i + 1;
        while j < entries.len() {
            if tokens_equal(entries[i].1.as_bytes(), entries[j].1.as_bytes()) {
                return true;
            }
            j += 1;
        }
        i += 1;
    }
    false
}

/// `:sense:function` tokens.
pub static FUNCTION_COMMANDS: CommandTable<MeasurementFunction> = CommandTable::new(
    "measurement_function",
    &[
        (MeasurementFunction::DcVolts, "volt"),
        (MeasurementFunction::AcVolts, "volt:ac"),
        (MeasurementFunction::DcCurrent, "curr"),
        (MeasurementFunction::AcCurrent, "curr:ac"),
        (MeasurementFunction::TwoWireResistance, "res"),
        (MeasurementFunction::FourWireResistance, "fres"),
        (MeasurementFunction::Frequency, "freq"),
        (MeasurementFunction::Period, "per"),
        (MeasurementFunction::Temperature, "temp"),
        (MeasurementFunction::Capacitance, "cap"),
        (MeasurementFunction::Continuity, "cont"),
        (MeasurementFunction::Diode, "diod"),
    ],
);

/// `:range:auto` tokens.
pub static AUTO_RANGE_COMMANDS: CommandTable<AutoRange> = CommandTable::new(
    "auto_range",
    &[
        (AutoRange::Off, "off"),
        (AutoRange::On, "on"),
        (AutoRange::Once, "once"),
    ],
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_function_round_trip() {
        for function in FUNCTION_COMMANDS.values() {
            let token = function.to_command().unwrap();
            assert_eq!(MeasurementFunction::from_command(token).unwrap(), function);
        }
    }

    #[test]
    fn test_each_value_listed_once() {
        let values: Vec<_> = FUNCTION_COMMANDS.values().collect();
        let unique: HashSet<_> = values.iter().copied().collect();
        assert_eq!(values.len(), unique.len());
        assert_eq!(values.len(), 12);
    }

    #[test]
    fn test_dc_volts_token() {
        assert_eq!(MeasurementFunction::DcVolts.to_command().unwrap(), "volt");
        assert_eq!(
            MeasurementFunction::FourWireResistance.to_command().unwrap(),
            "fres"
        );
    }

    #[test]
    fn test_unsupported_function_rejected() {
        let err = MeasurementFunction::AcPlusDcVolts.to_command().unwrap_err();
        assert!(matches!(
            err,
            DmmError::ValueNotSupported {
                attribute: "measurement_function",
                ..
            }
        ));
        assert!(MeasurementFunction::AcPlusDcCurrent.to_command().is_err());
    }

    #[test]
    fn test_instrument_style_tokens() {
        assert_eq!(
            MeasurementFunction::from_command("\"VOLT:AC\"\n").unwrap(),
            MeasurementFunction::AcVolts
        );
        assert_eq!(
            MeasurementFunction::from_command("FRES").unwrap(),
            MeasurementFunction::FourWireResistance
        );
    }

    #[test]
    fn test_unknown_token_is_protocol_mismatch() {
        let err = MeasurementFunction::from_command("\"VOLT:ACDC\"").unwrap_err();
        assert!(matches!(err, DmmError::ProtocolMismatch { .. }));
        assert!(err.is_device_response());
    }

    #[test]
    fn test_function_names_parse() {
        for function in MeasurementFunction::ALL {
            assert_eq!(
                function.name().parse::<MeasurementFunction>().unwrap(),
                function
            );
        }
        assert!(matches!(
            "dc_voltz".parse::<MeasurementFunction>(),
            Err(DmmError::ValueNotSupported { .. })
        ));
    }

    #[test]
    fn test_auto_range_responses() {
        assert_eq!(AutoRange::from_response("0").unwrap(), AutoRange::Off);
        assert_eq!(AutoRange::from_response("1\n").unwrap(), AutoRange::On);
        assert_eq!(AutoRange::from_response("ONCE").unwrap(), AutoRange::Once);
        assert!(AutoRange::from_response("2").is_err());
        assert!(matches!(
            "sometimes".parse::<AutoRange>(),
            Err(DmmError::ValueNotSupported { .. })
        ));
    }

    #[test]
    fn test_duplicate_detection() {
        assert!(has_duplicate_tokens(&[(1, "volt"), (2, "VOLT")]));
        assert!(!has_duplicate_tokens(&[(1, "volt"), (2, "volt:ac")]));
    }
}
