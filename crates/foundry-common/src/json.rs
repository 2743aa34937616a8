//! Helpers for inspecting loosely-shaped JSON from the agent and the widget.

use serde_json::Value;

/// Returns `true` when a value counts as present.
///
/// `null`, `false`, zero and the empty string are absent; every array and
/// object, even an empty one, is present.
///
/// ```
/// use foundry_common::json::is_truthy;
/// use serde_json::json;
///
/// assert!(!is_truthy(&json!(null)));
/// assert!(!is_truthy(&json!("")));
/// assert!(!is_truthy(&json!(0)));
/// assert!(is_truthy(&json!([])));
/// assert!(is_truthy(&json!("x")));
/// ```
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Looks up `key` on an object and returns it only if it is truthy.
#[must_use]
pub fn truthy_field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| is_truthy(v))
}
