//! Nested property bags and their flattening into indexable tokens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single property value: a scalar or a nested bag, to arbitrary depth.
///
/// JSON arrays are deliberately not representable; decoding one fails with an
/// encoding error. Numbers always decode to `f64`, so integers written by a
/// caller come back in floating form — an accepted, documented lossy point of
/// the encoding round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Map(Properties),
}

impl PropertyValue {
    /// Canonical token form of a scalar: numbers without a type marker
    /// (`21.0` renders as `21`), booleans as `true`/`false`, null as `null`.
    fn scalar_token(&self) -> Option<String> {
        match self {
            PropertyValue::Null => Some("null".to_string()),
            PropertyValue::Bool(b) => Some(b.to_string()),
            PropertyValue::Number(n) => Some(n.to_string()),
            PropertyValue::Text(s) => Some(s.clone()),
            PropertyValue::Map(_) => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value as f64)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Number(value.into())
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<Properties> for PropertyValue {
    fn from(value: Properties) -> Self {
        PropertyValue::Map(value)
    }
}

/// An ordered mapping from string keys to [`PropertyValue`]s.
///
/// Backed by a `BTreeMap` so iteration (and therefore flattening) is
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(pub BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    /// Serialize to the portable JSON encoding. An empty bag encodes as `{}`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the portable JSON encoding.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Flatten the bag into two space-joined, lexicographically sorted token
    /// strings: dotted-path key-tokens and scalar value-tokens.
    ///
    /// A nested map's key appears among the key-tokens (and prefixes its
    /// descendants) but contributes no value-token; its scalar descendants
    /// supply the values. An empty bag flattens to two empty strings.
    pub fn flatten(&self) -> (String, String) {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        self.walk("", &mut keys, &mut values);
        keys.sort_unstable();
        values.sort_unstable();
        (keys.join(" "), values.join(" "))
    }

    fn walk(&self, prefix: &str, keys: &mut Vec<String>, values: &mut Vec<String>) {
        for (key, value) in &self.0 {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };

            match value {
                PropertyValue::Map(nested) => {
                    keys.push(path.clone());
                    nested.walk(&path, keys, values);
                }
                scalar => {
                    keys.push(path);
                    if let Some(token) = scalar.scalar_token() {
                        values.push(token);
                    }
                }
            }
        }
    }
}

impl<const N: usize> From<[(&str, PropertyValue); N]> for Properties {
    fn from(entries: [(&str, PropertyValue); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}
