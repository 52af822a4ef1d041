//! Event Values
//!
//! The payload handed to every listener. A value is built on the worker
//! thread, queued, and materialized for listeners on the dispatch task, so it
//! must be `Send`. Every listener of one emission borrows the same value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Payload delivered to event listeners
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventValue {
    /// No value
    #[default]
    Undefined,
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// Double precision number
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Error object carrying a message
    TypeError(String),
    /// Ordered key/value pairs
    Object(Vec<(String, EventValue)>),
    /// Ordered list of values
    Array(Vec<EventValue>),
}

impl EventValue {
    /// Build a string value
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Build an error value
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    /// Build an object from key/value pairs, keeping their order
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, EventValue)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build an array value
    pub fn array(values: impl IntoIterator<Item = EventValue>) -> Self {
        Self::Array(values.into_iter().collect())
    }

    /// Borrow the string payload, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is a string value
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Look up a key in an object value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&EventValue> {
        match self {
            Self::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// The script-facing type name of this value
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Double(_) => "number",
            Self::String(_) => "string",
            Self::TypeError(_) => "error",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }

    /// Convert to a plain JSON value
    ///
    /// Object key order is preserved. `Undefined` and non-finite doubles
    /// become `null`; errors become `{"error": message}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Undefined | Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Double(d) => serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::TypeError(msg) => {
                let mut map = serde_json::Map::new();
                map.insert("error".to_string(), Value::String(msg.clone()));
                Value::Object(map)
            }
            Self::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Array(values) => Value::Array(values.iter().map(Self::to_json).collect()),
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Undefined => f.write_str("undefined"),
            Self::TypeError(msg) => write!(f, "TypeError: {msg}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for EventValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for EventValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for EventValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl<T: Into<EventValue>> From<Option<T>> for EventValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
