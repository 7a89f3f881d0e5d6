//! Cached instrument attributes
//!
//! Every instrument-controlled setting is mirrored in an [`AttributeCache`]
//! slot holding the last known value and a validity flag. An [`Attribute`]
//! describes one setting: its query command, its write command (which also
//! validates the value) and how to parse the instrument's answer.
//!
//! ```text
//! get:  simulate or valid ──▶ cached value
//!       invalid ──▶ query ──▶ parse ──▶ store (valid = true)
//! set:  validate ──▶ write (unless simulating) ──▶ store (valid = true)
//! reset: every slot ──▶ valid = false
//! ```
//!
//! Range, auto-range and resolution belong to the measurement function, so
//! storing a different function invalidates them.

use super::mapping::{AutoRange, MeasurementFunction};
use crate::error::{DmmError, DmmResult};
use std::fmt::Debug;

/// Locally held value plus a flag saying whether it matches the instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    value: T,
    valid: bool,
}

impl<T> Cached<T> {
    /// Optimistic local default, treated as valid until the next reset.
    pub fn new(value: T) -> Self {
        Self { value, valid: true }
    }

    /// Placeholder that must be fetched before it can be trusted.
    pub fn unknown(value: T) -> Self {
        Self {
            value,
            valid: false,
        }
    }

    /// Last known value, valid or not.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// True when the value is known to match the instrument.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Store a confirmed value.
    pub fn store(&mut self, value: T) {
        self.value = value;
        self.valid = true;
    }

    /// Replace the value without vouching for it.
    pub fn store_unconfirmed(&mut self, value: T) {
        self.value = value;
    }

    /// Keep the value but stop trusting it.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Values SCPI commands are scoped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    /// `:sense` subsystem token of the cached measurement function
    pub function_token: &'static str,
}

impl CommandContext {
    /// Context for the function currently held in `cache`.
    ///
    /// Uses the cached function whether or not it is still valid.
    pub fn from_cache(cache: &AttributeCache) -> DmmResult<Self> {
        Ok(Self {
            function_token: cache.measurement_function.value().to_command()?,
        })
    }
}

/// One instrument-mirrored setting.
pub trait Attribute {
    /// Rust type of the setting
    type Value: Clone + Debug + PartialEq + Send;

    /// Class attribute name, used in errors and logs
    const NAME: &'static str;

    /// Query that reads the setting back.
    fn query_command(ctx: &CommandContext) -> String;

    /// Command that applies `value`.
    ///
    /// Fails with `ValueNotSupported` when `value` is outside the domain.
    fn write_command(ctx: &CommandContext, value: &Self::Value) -> DmmResult<String>;

    /// Parse the instrument's answer to `command`.
    fn parse(command: &str, response: &str) -> DmmResult<Self::Value>;

    /// Cache slot holding this attribute.
    fn slot(cache: &AttributeCache) -> &Cached<Self::Value>;

    /// Mutable cache slot holding this attribute.
    fn slot_mut(cache: &mut AttributeCache) -> &mut Cached<Self::Value>;

    /// Invalidate whatever depends on this attribute once its value changed.
    fn on_change(_cache: &mut AttributeCache) {}
}

/// Every cached attribute of one driver instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeCache {
    pub(crate) measurement_function: Cached<MeasurementFunction>,
    pub(crate) range: Cached<f64>,
    pub(crate) auto_range: Cached<AutoRange>,
    pub(crate) resolution: Cached<f64>,
    pub(crate) trigger_delay: Cached<f64>,
    pub(crate) trigger_delay_auto: Cached<bool>,
    pub(crate) trigger_source: Cached<String>,
    pub(crate) manufacturer: Cached<String>,
    pub(crate) model: Cached<String>,
    pub(crate) firmware_revision: Cached<String>,
}

impl Default for AttributeCache {
    fn default() -> Self {
        Self {
            measurement_function: Cached::new(MeasurementFunction::DcVolts),
            range: Cached::new(10.0),
            auto_range: Cached::new(AutoRange::On),
            resolution: Cached::new(1.0e-5),
            trigger_delay: Cached::new(0.0),
            trigger_delay_auto: Cached::new(true),
            trigger_source: Cached::new("imm".to_string()),
            manufacturer: Cached::unknown(String::new()),
            model: Cached::unknown(String::new()),
            firmware_revision: Cached::unknown(String::new()),
        }
    }
}

impl AttributeCache {
    /// Mark every attribute invalid so the next read goes to the instrument.
    pub fn invalidate_all(&mut self) {
        self.measurement_function.invalidate();
        self.range.invalidate();
        self.auto_range.invalidate();
        self.resolution.invalidate();
        self.trigger_delay.invalidate();
        self.trigger_delay_auto.invalidate();
        self.trigger_source.invalidate();
        self.manufacturer.invalidate();
        self.model.invalidate();
        self.firmware_revision.invalidate();
    }

    /// Store a confirmed value for `A`, running its change hook when the
    /// value differs from the last known one.
    pub fn store<A: Attribute>(&mut self, value: A::Value) {
        let changed = *A::slot(self).value() != value;
        A::slot_mut(self).store(value);
        if changed {
            A::on_change(self);
        }
    }

    /// Validity of attribute `A`.
    pub fn is_valid<A: Attribute>(&self) -> bool {
        A::slot(self).is_valid()
    }

    /// Last known value of attribute `A`.
    pub fn peek<A: Attribute>(&self) -> &A::Value {
        A::slot(self).value()
    }

    /// Number of attributes currently trusted.
    pub fn valid_count(&self) -> usize {
        [
            self.measurement_function.is_valid(),
            self.range.is_valid(),
            self.auto_range.is_valid(),
            self.resolution.is_valid(),
            self.trigger_delay.is_valid(),
            self.trigger_delay_auto.is_valid(),
            self.trigger_source.is_valid(),
            self.manufacturer.is_valid(),
            self.model.is_valid(),
            self.firmware_revision.is_valid(),
        ]
        .into_iter()
        .filter(|valid| *valid)
        .count()
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn parse_float(command: &str, response: &str) -> DmmResult<f64> {
    let trimmed = response.trim();
    trimmed
        .parse::<f64>()
        .map_err(|e| DmmError::device_response(command, response, e.to_string()))
}

fn parse_bool(command: &str, response: &str) -> DmmResult<bool> {
    match response.trim().to_ascii_lowercase().as_str() {
        "1" | "on" => Ok(true),
        "0" | "off" => Ok(false),
        _ => Err(DmmError::device_response(
            command,
            response,
            "expected 0/1 or OFF/ON",
        )),
    }
}

fn check_finite(attribute: &'static str, value: f64) -> DmmResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DmmError::ValueNotSupported {
            attribute,
            value: value.to_string(),
        })
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// `measurement_function`
#[derive(Debug, Clone, Copy)]
pub struct FunctionAttr;

impl Attribute for FunctionAttr {
    type Value = MeasurementFunction;
    const NAME: &'static str = "measurement_function";

    fn query_command(_ctx: &CommandContext) -> String {
        ":sense:function?".to_string()
    }

    fn write_command(_ctx: &CommandContext, value: &Self::Value) -> DmmResult<String> {
        Ok(format!(":sense:function {}", value.to_command()?))
    }

    fn parse(_command: &str, response: &str) -> DmmResult<Self::Value> {
        MeasurementFunction::from_command(response)
    }

    fn slot(cache: &AttributeCache) -> &Cached<Self::Value> {
        &cache.measurement_function
    }

    fn slot_mut(cache: &mut AttributeCache) -> &mut Cached<Self::Value> {
        &mut cache.measurement_function
    }

    fn on_change(cache: &mut AttributeCache) {
        cache.range.invalidate();
        cache.auto_range.invalidate();
        cache.resolution.invalidate();
    }
}

/// `range`: no local bounds, the instrument decides what it accepts.
#[derive(Debug, Clone, Copy)]
pub struct RangeAttr;

impl Attribute for RangeAttr {
    type Value = f64;
    const NAME: &'static str = "range";

    fn query_command(ctx: &CommandContext) -> String {
        format!(":sense:{}:range?", ctx.function_token)
    }

    fn write_command(ctx: &CommandContext, value: &Self::Value) -> DmmResult<String> {
        let value = check_finite(Self::NAME, *value)?;
        Ok(format!(":sense:{}:range {}", ctx.function_token, value))
    }

    fn parse(command: &str, response: &str) -> DmmResult<Self::Value> {
        parse_float(command, response)
    }

    fn slot(cache: &AttributeCache) -> &Cached<Self::Value> {
        &cache.range
    }

    fn slot_mut(cache: &mut AttributeCache) -> &mut Cached<Self::Value> {
        &mut cache.range
    }
}

/// `auto_range`
#[derive(Debug, Clone, Copy)]
pub struct AutoRangeAttr;

impl Attribute for AutoRangeAttr {
    type Value = AutoRange;
    const NAME: &'static str = "auto_range";

    fn query_command(ctx: &CommandContext) -> String {
        format!(":sense:{}:range:auto?", ctx.function_token)
    }

    fn write_command(ctx: &CommandContext, value: &Self::Value) -> DmmResult<String> {
        Ok(format!(
            ":sense:{}:range:auto {}",
            ctx.function_token,
            value.to_command()?
        ))
    }

    fn parse(_command: &str, response: &str) -> DmmResult<Self::Value> {
        AutoRange::from_response(response)
    }

    fn slot(cache: &AttributeCache) -> &Cached<Self::Value> {
        &cache.auto_range
    }

    fn slot_mut(cache: &mut AttributeCache) -> &mut Cached<Self::Value> {
        &mut cache.auto_range
    }
}

/// `resolution`
#[derive(Debug, Clone, Copy)]
pub struct ResolutionAttr;

impl Attribute for ResolutionAttr {
    type Value = f64;
    const NAME: &'static str = "resolution";

    fn query_command(ctx: &CommandContext) -> String {
        format!(":sense:{}:resolution?", ctx.function_token)
    }

    fn write_command(ctx: &CommandContext, value: &Self::Value) -> DmmResult<String> {
        let value = check_finite(Self::NAME, *value)?;
        Ok(format!(":sense:{}:resolution {}", ctx.function_token, value))
    }

    fn parse(command: &str, response: &str) -> DmmResult<Self::Value> {
        parse_float(command, response)
    }

    fn slot(cache: &AttributeCache) -> &Cached<Self::Value> {
        &cache.resolution
    }

    fn slot_mut(cache: &mut AttributeCache) -> &mut Cached<Self::Value> {
        &mut cache.resolution
    }
}

/// `trigger_delay`, seconds
#[derive(Debug, Clone, Copy)]
pub struct TriggerDelayAttr;

impl Attribute for TriggerDelayAttr {
    type Value = f64;
    const NAME: &'static str = "trigger_delay";

    fn query_command(_ctx: &CommandContext) -> String {
        ":trigger:delay?".to_string()
    }

    fn write_command(_ctx: &CommandContext, value: &Self::Value) -> DmmResult<String> {
        let value = check_finite(Self::NAME, *value)?;
        Ok(format!(":trigger:delay {}", value))
    }

    fn parse(command: &str, response: &str) -> DmmResult<Self::Value> {
        parse_float(command, response)
    }

    fn slot(cache: &AttributeCache) -> &Cached<Self::Value> {
        &cache.trigger_delay
    }

    fn slot_mut(cache: &mut AttributeCache) -> &mut Cached<Self::Value> {
        &mut cache.trigger_delay
    }
}

/// `trigger_delay_auto`
#[derive(Debug, Clone, Copy)]
pub struct TriggerDelayAutoAttr;

impl Attribute for TriggerDelayAutoAttr {
    type Value = bool;
    const NAME: &'static str = "trigger_delay_auto";

    fn query_command(_ctx: &CommandContext) -> String {
        ":trigger:delay:auto?".to_string()
    }

    fn write_command(_ctx: &CommandContext, value: &Self::Value) -> DmmResult<String> {
        Ok(format!(":trigger:delay:auto {}", on_off(*value)))
    }

    fn parse(command: &str, response: &str) -> DmmResult<Self::Value> {
        parse_bool(command, response)
    }

    fn slot(cache: &AttributeCache) -> &Cached<Self::Value> {
        &cache.trigger_delay_auto
    }

    fn slot_mut(cache: &mut AttributeCache) -> &mut Cached<Self::Value> {
        &mut cache.trigger_delay_auto
    }
}

/// `trigger_source`: forwarded verbatim, not checked against a list.
#[derive(Debug, Clone, Copy)]
pub struct TriggerSourceAttr;

impl Attribute for TriggerSourceAttr {
    type Value = String;
    const NAME: &'static str = "trigger_source";

    fn query_command(_ctx: &CommandContext) -> String {
        ":trigger:source?".to_string()
    }

    fn write_command(_ctx: &CommandContext, value: &Self::Value) -> DmmResult<String> {
        Ok(format!(":trigger:source {}", value))
    }

    fn parse(_command: &str, response: &str) -> DmmResult<Self::Value> {
        Ok(response.trim().to_ascii_lowercase())
    }

    fn slot(cache: &AttributeCache) -> &Cached<Self::Value> {
        &cache.trigger_source
    }

    fn slot_mut(cache: &mut AttributeCache) -> &mut Cached<Self::Value> {
        &mut cache.trigger_source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CommandContext {
        CommandContext::from_cache(&AttributeCache::default()).unwrap()
    }

    #[test]
    fn test_defaults_are_optimistic() {
        let cache = AttributeCache::default();
        assert!(cache.is_valid::<FunctionAttr>());
        assert!(cache.is_valid::<TriggerSourceAttr>());
        assert_eq!(*cache.peek::<FunctionAttr>(), MeasurementFunction::DcVolts);
        // identity is never assumed
        assert!(!cache.manufacturer.is_valid());
        assert_eq!(cache.valid_count(), 7);
    }

    #[test]
    fn test_invalidate_all() {
        let mut cache = AttributeCache::default();
        cache.manufacturer.store("Agilent Technologies".to_string());
        cache.invalidate_all();
        assert_eq!(cache.valid_count(), 0);
        // values survive invalidation
        assert_eq!(*cache.peek::<RangeAttr>(), 10.0);
    }

    #[test]
    fn test_cached_transitions() {
        let mut slot = Cached::unknown(0.0);
        assert!(!slot.is_valid());
        slot.store(1.5);
        assert!(slot.is_valid());
        slot.invalidate();
        slot.store_unconfirmed(2.5);
        assert!(!slot.is_valid());
        assert_eq!(*slot.value(), 2.5);
    }

    #[test]
    fn test_function_change_invalidates_scoped_attributes() {
        let mut cache = AttributeCache::default();
        cache.store::<FunctionAttr>(MeasurementFunction::DcVolts);
        assert_eq!(cache.valid_count(), 7);

        cache.store::<FunctionAttr>(MeasurementFunction::Capacitance);
        assert!(cache.is_valid::<FunctionAttr>());
        assert!(!cache.is_valid::<RangeAttr>());
        assert!(!cache.is_valid::<AutoRangeAttr>());
        assert!(!cache.is_valid::<ResolutionAttr>());
        assert!(cache.is_valid::<TriggerDelayAttr>());
        assert_eq!(cache.valid_count(), 4);
    }

    #[test]
    fn test_function_scoped_commands() {
        let mut cache = AttributeCache::default();
        cache
            .measurement_function
            .store(MeasurementFunction::AcCurrent);
        let ctx = CommandContext::from_cache(&cache).unwrap();

        assert_eq!(RangeAttr::query_command(&ctx), ":sense:curr:ac:range?");
        assert_eq!(
            RangeAttr::write_command(&ctx, &1.0).unwrap(),
            ":sense:curr:ac:range 1"
        );
        assert_eq!(
            AutoRangeAttr::write_command(&ctx, &AutoRange::Once).unwrap(),
            ":sense:curr:ac:range:auto once"
        );
        assert_eq!(
            ResolutionAttr::write_command(&ctx, &0.0001).unwrap(),
            ":sense:curr:ac:resolution 0.0001"
        );
    }

    #[test]
    fn test_function_write_command() {
        assert_eq!(
            FunctionAttr::write_command(&ctx(), &MeasurementFunction::DcVolts).unwrap(),
            ":sense:function volt"
        );
        assert!(
            FunctionAttr::write_command(&ctx(), &MeasurementFunction::AcPlusDcVolts).is_err()
        );
    }

    #[test]
    fn test_non_finite_values_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = TriggerDelayAttr::write_command(&ctx(), &value).unwrap_err();
            assert!(err.is_validation());
        }
        // no local bounds on range
        assert!(RangeAttr::write_command(&ctx(), &-1.0e9).is_ok());
    }

    #[test]
    fn test_parse_responses() {
        assert_eq!(
            RangeAttr::parse(":sense:volt:range?", "+1.00000000E+01\n").unwrap(),
            10.0
        );
        assert!(RangeAttr::parse(":sense:volt:range?", "ten")
            .unwrap_err()
            .is_device_response());
        assert!(TriggerDelayAutoAttr::parse(":trigger:delay:auto?", "1").unwrap());
        assert!(!TriggerDelayAutoAttr::parse(":trigger:delay:auto?", "OFF").unwrap());
        assert!(TriggerDelayAutoAttr::parse(":trigger:delay:auto?", "maybe").is_err());
        assert_eq!(
            TriggerSourceAttr::parse(":trigger:source?", "BUS\n").unwrap(),
            "bus"
        );
    }

    #[test]
    fn test_trigger_source_forwarded_verbatim() {
        assert_eq!(
            TriggerSourceAttr::write_command(&ctx(), &"EXTernal".to_string()).unwrap(),
            ":trigger:source EXTernal"
        );
    }
}
