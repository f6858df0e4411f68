//! Backend values and parameter maps.
//!
//! Integers from the backend are 64-bit. When written to JSON, an integer inside the
//! exact-integer range of an IEEE double (`±(2^53 - 1)`) is emitted as a number; anything
//! larger is emitted as a string of its exact decimal digits so no precision is lost.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Largest integer magnitude a JSON consumer can represent exactly.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Named query parameters
pub type Params = BTreeMap<String, Value>;

/// A graph node as returned by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub identity: i64,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, Value>,
}

/// A graph relationship as returned by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub identity: i64,
    pub start: i64,
    pub end: i64,
    pub rel_type: String,
    pub properties: BTreeMap<String, Value>,
}

/// A value flowing between the backend and callers
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(Node),
    Relationship(Relationship),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Build a value from JSON. Numbers that fit `i64` become integers.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON using the integer interchange rule.
    pub fn to_json(&self) -> serde_json::Value {
        // Serializing into serde_json::Value cannot fail for this type.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Serialize an integer as a number when exact, otherwise as its decimal digits.
pub fn serialize_integer<S: Serializer>(value: i64, serializer: S) -> Result<S::Ok, S::Error> {
    if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
        serializer.serialize_i64(value)
    } else {
        serializer.serialize_str(&value.to_string())
    }
}

struct Properties<'a>(&'a BTreeMap<String, Value>);

impl Serialize for Properties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct Integer(i64);

impl Serialize for Integer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_integer(self.0, serializer)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serialize_integer(*i, serializer),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => Properties(entries).serialize(serializer),
            Value::Node(node) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("identity", &Integer(node.identity))?;
                map.serialize_entry("labels", &node.labels)?;
                map.serialize_entry("properties", &Properties(&node.properties))?;
                map.end()
            }
            Value::Relationship(rel) => {
                let mut map = serializer.serialize_map(Some(5))?;
                map.serialize_entry("identity", &Integer(rel.identity))?;
                map.serialize_entry("start", &Integer(rel.start))?;
                map.serialize_entry("end", &Integer(rel.end))?;
                map.serialize_entry("type", &rel.rel_type)?;
                map.serialize_entry("properties", &Properties(&rel.properties))?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Build a [`Params`] map.
///
/// ```ignore
/// let params = params! { "key" => "k", "value" => 42 };
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::value::Params::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::Params::new();
        $(
            map.insert(::std::string::String::from($key), $crate::value::Value::from($value));
        )+
        map
    }};
}
