//! Tagged field values and records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::EncodeError;
use crate::schema::Schema;

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "int")]
    Int32,
    #[serde(rename = "long")]
    Int64,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "null")]
    Null,
}

impl FieldType {
    /// Avro primitive name for this type
    pub fn avro_name(&self) -> &'static str {
        match self {
            FieldType::Int32 => "int",
            FieldType::Int64 => "long",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Double => "double",
            FieldType::Null => "null",
        }
    }

    /// Parse an Avro primitive name. `int32`/`int64`/`bool` are accepted as aliases.
    pub fn from_avro_name(name: &str) -> Option<Self> {
        match name {
            "int" | "int32" => Some(FieldType::Int32),
            "long" | "int64" => Some(FieldType::Int64),
            "string" => Some(FieldType::String),
            "boolean" | "bool" => Some(FieldType::Boolean),
            "double" => Some(FieldType::Double),
            "null" => Some(FieldType::Null),
            _ => None,
        }
    }

    /// Whether `value` can be written as this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Int32, Value::Int(v)) => i32::try_from(*v).is_ok(),
            (FieldType::Int64, Value::Int(_)) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Boolean, Value::Boolean(_)) => true,
            (FieldType::Double, Value::Double(_)) => true,
            (FieldType::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.avro_name())
    }
}

/// A dynamically-typed field value, checked against the declared
/// [`FieldType`] at encode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl Value {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(v) if i32::try_from(*v).is_ok() => "int",
            Value::Int(_) => "long",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Double(_) => "double",
            Value::Null => "null",
        }
    }

    /// Convert a JSON scalar. Arrays and objects have no counterpart.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Double)),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Convert to JSON. Non-finite doubles become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// A record: field name to value. Not bound to any schema until encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Overlay every field of `changes` onto this record
    pub fn merge(&mut self, changes: Record) {
        self.0.extend(changes.0);
    }

    /// Build a record from a JSON object without consulting any schema
    pub fn from_json(json: &serde_json::Value) -> Result<Self, EncodeError> {
        let object = json.as_object().ok_or_else(|| EncodeError::TypeMismatch {
            field: "<record>".to_string(),
            expected: "object".to_string(),
            found: json_type_name(json).to_string(),
        })?;

        let mut record = Record::new();
        for (name, raw) in object {
            let value = Value::from_json(raw).ok_or_else(|| EncodeError::TypeMismatch {
                field: name.clone(),
                expected: "scalar".to_string(),
                found: json_type_name(raw).to_string(),
            })?;
            record.0.insert(name.clone(), value);
        }
        Ok(record)
    }

    /// Build a record from a JSON object, widening JSON integers to doubles
    /// where `schema` declares a `double` field
    pub fn from_json_for(schema: &Schema, json: &serde_json::Value) -> Result<Self, EncodeError> {
        let mut record = Self::from_json(json)?;
        for field in schema.fields() {
            if field.field_type != FieldType::Double {
                continue;
            }
            if let Some(Value::Int(v)) = record.get(&field.name) {
                let widened = Value::Double(*v as f64);
                record.0.insert(field.name.clone(), widened);
            }
        }
        Ok(record)
    }

    /// Key-value map representation for external callers
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
