//! Typed view over a link's string-keyed properties.
//!
//! Every reader is fail-open: a malformed value is logged and replaced with
//! the permissive default, except the active gates, which close on a value
//! that is present but not a boolean.

use std::collections::HashMap;
use std::time::Duration;

use ripple_core::{as_bool, as_int, PropagationConfig, Value};
use tracing::warn;

pub const ACTIVE: &str = "active";
pub const ACTIVE_EVENT: &str = "active-event";
pub const ACTIVE_PROPERTY: &str = "active-property";
pub const DEADBAND_VALUE: &str = "deadband-value";
pub const DEADBAND_TYPE: &str = "deadband-type";
pub const DELAY: &str = "delay";
pub const PRIORITY: &str = "priority";
pub const TARGET_PROPERTY: &str = "target-property";

const MONITOR_SEPARATOR: char = ',';
const MONITOR_WILDCARD: &str = "*";

/// Read an active gate. Absent (or null) is active; a boolean or boolean
/// string is taken as is; anything else closes the gate.
pub fn read_gate(properties: &HashMap<String, Value>, key: &str) -> bool {
    match properties.get(key) {
        None | Some(Value::Null) => true,
        Some(value) => match as_bool(value) {
            Some(active) => active,
            None => {
                warn!(key, value = %value, "unparseable gate value, link treated as inactive");
                false
            }
        },
    }
}

/// Whether `label` passes a comma-separated allow-list. `*` matches any
/// label. A missing or non-string list, an empty label, or a label that
/// contains the separator always passes.
pub fn monitor_filter_passes(allow_list: Option<&Value>, label: &str) -> bool {
    if label.is_empty() || label.contains(MONITOR_SEPARATOR) {
        return true;
    }
    let Some(Value::String(list)) = allow_list else {
        return true;
    };
    if list.trim().is_empty() {
        return true;
    }
    list.split(MONITOR_SEPARATOR)
        .map(str::trim)
        .any(|token| token == MONITOR_WILDCARD || token == label)
}

/// Priority from the first property whose key is `priority` in any case.
pub fn parse_priority(properties: &HashMap<String, Value>, default: i32) -> i32 {
    let Some((key, value)) = properties
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(PRIORITY))
    else {
        return default;
    };
    match as_int(value).and_then(|p| i32::try_from(p).ok()) {
        Some(priority) => priority,
        None => {
            warn!(key = %key, value = %value, default, "unparseable link priority, using default");
            default
        }
    }
}

fn parse_delay(properties: &HashMap<String, Value>) -> Option<Duration> {
    let value = properties.get(DELAY)?;
    match as_int(value) {
        Some(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
        Some(_) => None,
        None => {
            if !value.is_null() {
                warn!(value = %value, "unparseable link delay, forwarding inline");
            }
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadbandKind {
    Absolute,
    /// Threshold is a percentage of `|last|`.
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deadband {
    pub kind: DeadbandKind,
    pub value: f64,
}

impl Deadband {
    /// Needs a numeric `deadband-value` and a string `deadband-type` of
    /// `absolute` or `percentage`. Anything else means no deadband.
    pub fn from_properties(properties: &HashMap<String, Value>) -> Option<Self> {
        let value = properties.get(DEADBAND_VALUE)?.as_f64()?;
        let kind = match properties.get(DEADBAND_TYPE)? {
            Value::String(kind) if kind.eq_ignore_ascii_case("absolute") => DeadbandKind::Absolute,
            Value::String(kind) if kind.eq_ignore_ascii_case("percentage") => DeadbandKind::Percentage,
            Value::String(kind) => {
                warn!(kind = %kind, "unknown deadband type, deadband ignored");
                return None;
            }
            _ => return None,
        };
        Some(Self { kind, value })
    }

    pub fn threshold(&self, last: f64) -> f64 {
        match self.kind {
            DeadbandKind::Absolute => self.value,
            DeadbandKind::Percentage => last.abs() * self.value / 100.0,
        }
    }

    /// Whether a change from `last` to `new` clears the deadband. Non-numeric
    /// values, or no last value, always pass.
    pub fn passes(&self, new: &Value, last: Option<&Value>) -> bool {
        let (Some(new), Some(last)) = (new.as_f64(), last.and_then(Value::as_f64)) else {
            return true;
        };
        (new - last).abs() > self.threshold(last)
    }
}

/// Resolved link configuration for one notification.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub active: bool,
    pub active_event: bool,
    pub active_property: bool,
    pub deadband: Option<Deadband>,
    pub delay: Option<Duration>,
    pub priority: i32,
    /// Rename target for direct links.
    pub target_property: Option<String>,
    /// Monitored-property allow-list, when a monitor key is configured.
    pub monitored: Option<Value>,
}

impl LinkSettings {
    pub fn resolve(properties: &HashMap<String, Value>, config: &PropagationConfig) -> Self {
        Self {
            active: read_gate(properties, ACTIVE),
            active_event: read_gate(properties, ACTIVE_EVENT),
            active_property: read_gate(properties, ACTIVE_PROPERTY),
            deadband: Deadband::from_properties(properties),
            delay: parse_delay(properties),
            priority: parse_priority(properties, config.default_priority),
            target_property: properties
                .get(TARGET_PROPERTY)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            monitored: config
                .monitor_key
                .as_deref()
                .and_then(|key| properties.get(key))
                .cloned(),
        }
    }

    pub fn event_gate_open(&self) -> bool {
        self.active && self.active_event
    }

    pub fn property_gate_open(&self) -> bool {
        self.active && self.active_property
    }

    pub fn monitors(&self, label: &str) -> bool {
        monitor_filter_passes(self.monitored.as_ref(), label)
    }

    pub fn deadband_passes(&self, new: &Value, last: Option<&Value>) -> bool {
        self.deadband.map_or(true, |deadband| deadband.passes(new, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    // -- gates -------------------------------------------------------------

    #[test]
    fn absent_gate_is_active() {
        assert!(read_gate(&HashMap::new(), ACTIVE));
        assert!(read_gate(&props(&[(ACTIVE, Value::Null)]), ACTIVE));
    }

    #[test]
    fn boolean_and_string_gates() {
        assert!(!read_gate(&props(&[(ACTIVE, json!(false))]), ACTIVE));
        assert!(read_gate(&props(&[(ACTIVE, json!("true"))]), ACTIVE));
        assert!(!read_gate(&props(&[(ACTIVE, json!("FALSE"))]), ACTIVE));
    }

    #[test]
    fn unparseable_gate_is_inactive() {
        assert!(!read_gate(&props(&[(ACTIVE, json!(1))]), ACTIVE));
        assert!(!read_gate(&props(&[(ACTIVE, json!("maybe"))]), ACTIVE));
    }

    #[test]
    fn type_specific_gates() {
        let config = PropagationConfig::default();
        let s = LinkSettings::resolve(&props(&[(ACTIVE_EVENT, json!(false))]), &config);
        assert!(!s.event_gate_open());
        assert!(s.property_gate_open());

        let s = LinkSettings::resolve(&props(&[(ACTIVE, json!(false))]), &config);
        assert!(!s.event_gate_open());
        assert!(!s.property_gate_open());
    }

    // -- monitored-property filter -----------------------------------------

    #[test]
    fn monitor_filter_rules() {
        let list = json!("speed, level");
        assert!(monitor_filter_passes(Some(&list), "speed"));
        assert!(monitor_filter_passes(Some(&list), "level"));
        assert!(!monitor_filter_passes(Some(&list), "temp"));
        assert!(monitor_filter_passes(Some(&json!("*")), "anything"));
        assert!(monitor_filter_passes(None, "temp"));
        assert!(monitor_filter_passes(Some(&list), ""));
        assert!(monitor_filter_passes(Some(&list), "a,b"));
        assert!(monitor_filter_passes(Some(&json!(42)), "temp"));
    }

    #[test]
    fn unset_monitor_key_monitors_everything() {
        let p = props(&[("monitored", json!("speed"))]);
        let s = LinkSettings::resolve(&p, &PropagationConfig::default());
        assert!(s.monitored.is_none());
        assert!(s.monitors("temp"));

        let config = PropagationConfig {
            monitor_key: Some("monitored".into()),
            ..PropagationConfig::default()
        };
        let s = LinkSettings::resolve(&p, &config);
        assert!(s.monitors("speed"));
        assert!(!s.monitors("temp"));
    }

    // -- deadband ----------------------------------------------------------

    #[test]
    fn absolute_deadband_scenario() {
        let p = props(&[(DEADBAND_TYPE, json!("absolute")), (DEADBAND_VALUE, json!(5))]);
        let deadband = Deadband::from_properties(&p).unwrap();
        let last = json!(100);
        assert!(!deadband.passes(&json!(103), Some(&last)));
        assert!(!deadband.passes(&json!(105), Some(&last)));
        assert!(deadband.passes(&json!(106), Some(&last)));
        assert!(deadband.passes(&json!(94), Some(&last)));
    }

    #[test]
    fn percentage_deadband_uses_last_magnitude() {
        let p = props(&[(DEADBAND_TYPE, json!("percentage")), (DEADBAND_VALUE, json!(10))]);
        let deadband = Deadband::from_properties(&p).unwrap();
        let last = json!(-200.0);
        assert!(!deadband.passes(&json!(-185.0), Some(&last)));
        assert!(deadband.passes(&json!(-179.0), Some(&last)));
    }

    #[test]
    fn incomplete_deadband_config_is_none() {
        assert!(Deadband::from_properties(&props(&[(DEADBAND_VALUE, json!(5))])).is_none());
        assert!(Deadband::from_properties(&props(&[
            (DEADBAND_VALUE, json!("5")),
            (DEADBAND_TYPE, json!("absolute")),
        ]))
        .is_none());
        assert!(Deadband::from_properties(&props(&[
            (DEADBAND_VALUE, json!(5)),
            (DEADBAND_TYPE, json!("relative")),
        ]))
        .is_none());
    }

    #[test]
    fn non_numeric_values_always_pass() {
        let deadband = Deadband { kind: DeadbandKind::Absolute, value: 5.0 };
        assert!(deadband.passes(&json!("hot"), Some(&json!(100))));
        assert!(deadband.passes(&json!(101), Some(&json!("cold"))));
        assert!(deadband.passes(&json!(101), None));

        let s = LinkSettings::resolve(&HashMap::new(), &PropagationConfig::default());
        assert!(s.deadband_passes(&json!(100), Some(&json!(100))));
    }

    // -- priority, delay, rename -------------------------------------------

    #[test]
    fn priority_key_is_case_insensitive() {
        assert_eq!(parse_priority(&props(&[("Priority", json!(9))]), 5), 9);
        assert_eq!(parse_priority(&props(&[("PRIORITY", json!("-2"))]), 5), -2);
        assert_eq!(parse_priority(&props(&[("priority", json!("high"))]), 5), 5);
        assert_eq!(parse_priority(&HashMap::new(), 5), 5);
    }

    #[test]
    fn delay_only_when_positive() {
        let config = PropagationConfig::default();
        let s = LinkSettings::resolve(&props(&[(DELAY, json!(250))]), &config);
        assert_eq!(s.delay, Some(Duration::from_millis(250)));
        assert_eq!(LinkSettings::resolve(&props(&[(DELAY, json!(0))]), &config).delay, None);
        assert_eq!(LinkSettings::resolve(&props(&[(DELAY, json!("soon"))]), &config).delay, None);
    }

    #[test]
    fn target_property_rename() {
        let config = PropagationConfig::default();
        let s = LinkSettings::resolve(&props(&[(TARGET_PROPERTY, json!("setpoint"))]), &config);
        assert_eq!(s.target_property.as_deref(), Some("setpoint"));
        let s = LinkSettings::resolve(&props(&[(TARGET_PROPERTY, json!(""))]), &config);
        assert!(s.target_property.is_none());
    }
}
