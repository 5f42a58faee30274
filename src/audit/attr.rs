//! Key/value attributes carried by audit records.
//!
//! Attributes keep insertion order all the way to the sink. A `Group`
//! value renders as a nested object.

use serde_json::{Map, Value};

/// A single record attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: AttrValue,
}

/// Value of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
    Group(Vec<Attr>),
    Json(Value),
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A nested group of attributes.
    pub fn group(key: impl Into<String>, attrs: Vec<Attr>) -> Self {
        Self {
            key: key.into(),
            value: AttrValue::Group(attrs),
        }
    }
}

impl AttrValue {
    /// Convert into a JSON value. Groups become ordered objects.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Str(s) => Value::String(s.clone()),
            AttrValue::Int(n) => Value::from(*n),
            AttrValue::Uint(n) => Value::from(*n),
            AttrValue::Float(n) => Value::from(*n),
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            AttrValue::Group(attrs) => Value::Object(attrs_to_map(attrs)),
            AttrValue::Json(v) => v.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Render a list of attributes as an ordered JSON object.
///
/// A later attribute with the same key replaces the earlier value but keeps
/// its position.
pub fn attrs_to_map(attrs: &[Attr]) -> Map<String, Value> {
    let mut map = Map::with_capacity(attrs.len());
    for attr in attrs {
        map.insert(attr.key.clone(), attr.value.to_json());
    }
    map
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v.into())
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Uint(v)
    }
}

impl From<u16> for AttrValue {
    fn from(v: u16) -> Self {
        AttrValue::Uint(v.into())
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::Uint(v as u64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        AttrValue::List(v)
    }
}

impl From<Value> for AttrValue {
    fn from(v: Value) -> Self {
        AttrValue::Json(v)
    }
}
