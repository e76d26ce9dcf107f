//! Tagged argument values.
//!
//! Every argument of a deferred call is stored as `{"kind": ..., "value": ...}`
//! so that it decodes back to the same variant it was published with. Type
//! markers carry only the registered type key; the relayer resolves them
//! against the [`HandlerRegistry`](crate::HandlerRegistry) before invoking.

use crate::{OutboxError, OutboxResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single call argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Arbitrary JSON document.
    Json(serde_json::Value),
    /// Reference to a registered type, by key.
    Type(String),
}

impl Value {
    /// Reference a registered type by its `module.Name` key.
    pub fn type_marker(key: impl Into<String>) -> Self {
        Value::Type(key.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Reject values that would not survive storage unchanged.
    pub(crate) fn check_storable(&self) -> OutboxResult<()> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(OutboxError::Serialization(format!(
                "non-finite float {f} has no JSON representation"
            ))),
            Value::Type(key) if key.trim().is_empty() => Err(OutboxError::Serialization(
                "type marker with empty key".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Positional and keyword arguments of a deferred call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// The event carried by this call: the first positional argument, or an
    /// empty JSON object when there is none.
    pub fn event_payload(&self) -> Value {
        self.args
            .first()
            .cloned()
            .unwrap_or_else(|| Value::Json(serde_json::Value::Object(Default::default())))
    }

    /// Every value, positional first.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.args.iter().chain(self.kwargs.values())
    }

    /// Keys of every type marker in the call.
    pub fn type_markers(&self) -> impl Iterator<Item = &str> {
        self.values().filter_map(|value| match value {
            Value::Type(key) => Some(key.as_str()),
            _ => None,
        })
    }

    pub(crate) fn check_storable(&self) -> OutboxResult<()> {
        self.values().try_for_each(Value::check_storable)
    }

    /// Encode as `(message, kwargs)` columns. Empty kwargs are stored as NULL.
    pub(crate) fn encode(&self) -> OutboxResult<(String, Option<String>)> {
        self.check_storable()?;
        let message = serde_json::to_string(&self.args)?;
        let kwargs = if self.kwargs.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&self.kwargs)?)
        };
        Ok((message, kwargs))
    }

    pub(crate) fn decode(message: &str, kwargs: Option<&str>) -> serde_json::Result<Self> {
        let args = serde_json::from_str(message)?;
        let kwargs = match kwargs {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
            _ => BTreeMap::new(),
        };
        Ok(Self { args, kwargs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_representation() {
        let encoded = serde_json::to_value(vec![
            Value::Int(7),
            Value::from("x"),
            Value::type_marker("billing.Invoice"),
            Value::Null,
        ])
        .unwrap();

        assert_eq!(
            encoded,
            json!([
                {"kind": "int", "value": 7},
                {"kind": "str", "value": "x"},
                {"kind": "type", "value": "billing.Invoice"},
                {"kind": "null"},
            ])
        );
    }

    #[test]
    fn test_int_and_float_stay_distinct() {
        let args = CallArgs::new().arg(1i64).arg(1.0f64);
        let (message, kwargs) = args.encode().unwrap();
        assert!(kwargs.is_none());

        let decoded = CallArgs::decode(&message, None).unwrap();
        assert_eq!(decoded.args, vec![Value::Int(1), Value::Float(1.0)]);
    }

    #[test]
    fn test_kwargs_survive_encoding() {
        let args = CallArgs::new()
            .arg(json!({"order": 42}))
            .kwarg("retry", true)
            .kwarg("note", Option::<String>::None);
        let (message, kwargs) = args.encode().unwrap();

        let decoded = CallArgs::decode(&message, kwargs.as_deref()).unwrap();
        assert_eq!(decoded, args);
        assert_eq!(decoded.keyword("note"), Some(&Value::Null));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let args = CallArgs::new().kwarg("ratio", f64::NAN);
        assert!(matches!(args.encode(), Err(OutboxError::Serialization(_))));
    }

    #[test]
    fn test_event_payload_defaults_to_empty_object() {
        assert_eq!(CallArgs::new().event_payload(), Value::Json(json!({})));
        assert_eq!(
            CallArgs::new().arg("first").arg("second").event_payload(),
            Value::from("first")
        );
    }

    #[test]
    fn test_type_markers_collected_from_both_positions() {
        let args = CallArgs::new()
            .arg(Value::type_marker("a.One"))
            .kwarg("kind", Value::type_marker("b.Two"));
        let keys: Vec<_> = args.type_markers().collect();
        assert_eq!(keys, vec!["a.One", "b.Two"]);
    }
}
