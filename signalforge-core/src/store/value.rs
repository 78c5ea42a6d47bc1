//! Dynamically typed signal values.

use serde::{Deserialize, Serialize};

/// A value held by a [`SignalStore`](super::SignalStore) signal.
///
/// Mirrors the value space of a dynamically typed host: scalars are kept
/// apart so equality and version bumps stay cheap, anything structured is an
/// `Object` holding JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SignalValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(serde_json::Value),
}

impl SignalValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, SignalValue::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SignalValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SignalValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering. `Undefined` has no JSON form and becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SignalValue::Undefined | SignalValue::Null => serde_json::Value::Null,
            SignalValue::Boolean(b) => serde_json::Value::Bool(*b),
            SignalValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SignalValue::String(s) => serde_json::Value::String(s.clone()),
            SignalValue::Object(v) => v.clone(),
        }
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        SignalValue::Boolean(value)
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        SignalValue::Number(value)
    }
}

impl From<i32> for SignalValue {
    fn from(value: i32) -> Self {
        SignalValue::Number(f64::from(value))
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::String(value.to_owned())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        SignalValue::String(value)
    }
}

/// Scalars map onto their own variants; arrays and objects become `Object`.
impl From<serde_json::Value> for SignalValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SignalValue::Null,
            serde_json::Value::Bool(b) => SignalValue::Boolean(b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(SignalValue::Number)
                .unwrap_or(SignalValue::Object(serde_json::Value::Number(n))),
            serde_json::Value::String(s) => SignalValue::String(s),
            other => SignalValue::Object(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversions() {
        assert_eq!(SignalValue::from(true).as_bool(), Some(true));
        assert_eq!(SignalValue::from(2.5).as_f64(), Some(2.5));
        assert_eq!(SignalValue::from(3).as_f64(), Some(3.0));
        assert_eq!(SignalValue::from("hi").as_str(), Some("hi"));
        assert!(SignalValue::default().is_undefined());
    }

    #[test]
    fn json_scalars_are_normalized() {
        assert_eq!(SignalValue::from(json!(null)), SignalValue::Null);
        assert_eq!(SignalValue::from(json!(false)), SignalValue::Boolean(false));
        assert_eq!(SignalValue::from(json!(7)), SignalValue::Number(7.0));
        assert_eq!(SignalValue::from(json!("x")), SignalValue::String("x".into()));

        let object = json!({ "name": "Ada", "tags": [1, 2] });
        assert_eq!(SignalValue::from(object.clone()), SignalValue::Object(object.clone()));
        assert_eq!(SignalValue::Object(object.clone()).to_json(), object);
    }

    #[test]
    fn undefined_renders_as_null() {
        assert_eq!(SignalValue::Undefined.to_json(), json!(null));
        assert_eq!(SignalValue::Number(f64::INFINITY).to_json(), json!(null));
    }

    #[test]
    fn serialized_form_is_tagged() {
        let encoded = serde_json::to_value(SignalValue::Number(1.5)).unwrap();
        assert_eq!(encoded, json!({ "type": "number", "value": 1.5 }));

        let decoded: SignalValue = serde_json::from_value(json!({ "type": "undefined" })).unwrap();
        assert_eq!(decoded, SignalValue::Undefined);
    }
}
