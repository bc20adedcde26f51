//! # Parameter Elements
//!
//! The unit of generator output: a map from keys to values, where a value is
//! either JSON-shaped data or raw bytes (Secret data).

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single generator value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Json(Value),
    /// Opaque bytes, never re-encoded
    Bytes(Vec<u8>),
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(value) => value.serialize(serializer),
            Self::Bytes(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Json(Value::String(value))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Json(Value::String(value.to_string()))
    }
}

/// One set of parameters produced by a generator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterElement(BTreeMap<String, ParamValue>);

impl ParameterElement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Element from the fields of a JSON object
    pub fn from_object(object: serde_json::Map<String, Value>) -> Self {
        object
            .into_iter()
            .map(|(k, v)| (k, ParamValue::Json(v)))
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// JSON value for `key`, `None` for missing keys and byte values
    pub fn get_json(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            Some(ParamValue::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Copy every entry of `other` into `self`; `other` wins on collisions
    pub fn merge(&mut self, other: &ParameterElement) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn merged(&self, other: &ParameterElement) -> ParameterElement {
        let mut out = self.clone();
        out.merge(other);
        out
    }
}

impl FromIterator<(String, ParamValue)> for ParameterElement {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for ParameterElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
