//! Property values and the well-known property names shared across crates.

pub use serde_json::Value;

/// Depth of a fireable node's pending-action queue.
pub const QUEUE_SIZE: &str = "queue-size";
pub const THREAD_POOL_SIZE: &str = "thread-pool-size";
pub const EXECUTION_TIMEOUT_MS: &str = "execution-timeout-ms";
pub const PRIORITY_FACTOR: &str = "priority-factor";
pub const CONDITION: &str = "condition";
pub const ACTION: &str = "action";
pub const DEBUG_LEVEL: &str = "debug-level";
pub const FACT_COUNT: &str = "fact-count";
pub const IN_FLIGHT: &str = "in-flight";

/// Read a value as a number. Numeric strings are accepted.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read a value as an integer. Numeric strings are accepted.
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Read a value as a boolean: real booleans and `"true"`/`"false"` strings.
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}
