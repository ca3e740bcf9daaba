//! Record type - a schemaless JSON object stored in a collection
//!
//! The persistence layer never interprets domain fields beyond the key and
//! declared index fields. Typed views live in [`crate::domain`].

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single domain record: field name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Generate a fresh record identifier (UUID v4)
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// String value of a field, if it is a string
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Numeric value of a field. Numbers and numeric strings count,
    /// anything else (including a missing field) is zero.
    pub fn number(&self, field: &str) -> f64 {
        self.0.get(field).map(numeric_value).unwrap_or(0.0)
    }

    /// Key value under `key_field`, as a string.
    ///
    /// Only string and number keys are accepted; empty strings are rejected.
    pub fn key(&self, key_field: &str) -> Option<String> {
        match self.0.get(key_field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Field names in storage order
    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Convert a typed value into a record through serde
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self> {
        Self::try_from(serde_json::to_value(value)?)
    }

    /// Convert this record into a typed value through serde
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::Validation(format!(
                "record must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

impl std::str::FromStr for Record {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_from(serde_json::from_str::<Value>(s)?)
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

/// Numeric interpretation of a JSON value; non-numeric is zero
/// Convert every record of `collection` into `T`, skipping the ones that
/// do not fit with a warning.
pub fn parse_valid<T: DeserializeOwned>(collection: &str, records: &[Record]) -> Vec<T> {
    records
        .iter()
        .filter_map(|record| match record.to_typed() {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(
                    "Skipping malformed {} record {}: {}",
                    collection,
                    record.key("id").unwrap_or_else(|| "(no id)".to_string()),
                    e
                );
                None
            }
        })
        .collect()
}

pub(crate) fn numeric_value(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() { n } else { 0.0 }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
