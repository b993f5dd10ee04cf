//! Schema types and structures

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::SchemaError;
use crate::fingerprint::Fingerprint;
use crate::value::{FieldType, Value};
use crate::version::SchemaVersion;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// A single named, typed field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Field {
    /// A required field. Encoding fails if a record lacks it.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
        }
    }

    /// An optional field with the value used when a record lacks it
    pub fn optional(name: impl Into<String>, field_type: FieldType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: Some(default.into()),
        }
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if !name_pattern().is_match(&self.name) {
            return Err(SchemaError::InvalidName(self.name.clone()));
        }
        match (&self.default, self.required) {
            (Some(_), true) => Err(SchemaError::RequiredWithDefault(self.name.clone())),
            (None, false) => Err(SchemaError::MissingDefault(self.name.clone())),
            (Some(default), false) if !self.field_type.accepts(default) => {
                Err(SchemaError::DefaultTypeMismatch {
                    field: self.name.clone(),
                    expected: self.field_type.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// An ordered, immutable set of fields under a name and version.
///
/// Field order defines the binary layout.
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    name: String,
    version: SchemaVersion,
    fields: Vec<Field>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version && self.fields == other.fields
    }
}

impl Schema {
    /// Create a new schema, rejecting malformed declarations
    pub fn new(
        name: impl Into<String>,
        version: SchemaVersion,
        fields: Vec<Field>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if !name_pattern().is_match(&name) {
            return Err(SchemaError::InvalidName(name));
        }

        let mut index = HashMap::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            field.validate()?;
            if index.insert(field.name.clone(), position).is_some() {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        Ok(Self {
            name,
            version,
            fields,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &SchemaVersion {
        &self.version
    }

    /// Fields in declared (wire) order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.position(name).map(|i| &self.fields[i])
    }

    /// Wire position of a field
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Parse an Avro-style record schema:
    ///
    /// ```json
    /// {"type": "record", "name": "User", "version": "v2",
    ///  "fields": [{"name": "id", "type": "long"},
    ///             {"name": "age", "type": "int", "default": 0}]}
    /// ```
    ///
    /// A field with `default` is optional. `version` overrides any top-level
    /// `"version"` key.
    pub fn from_avro_json(
        json: &serde_json::Value,
        version: Option<SchemaVersion>,
    ) -> Result<Self, SchemaError> {
        let object = json
            .as_object()
            .ok_or_else(|| SchemaError::InvalidFormat("schema must be a JSON object".to_string()))?;

        match object.get("type").and_then(|t| t.as_str()) {
            Some("record") | None => {}
            Some(other) => {
                return Err(SchemaError::InvalidFormat(format!(
                    "expected record schema, found type '{other}'"
                )))
            }
        }

        let name = object
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| SchemaError::InvalidFormat("missing schema name".to_string()))?;

        let version = match version {
            Some(v) => v,
            None => {
                let tag = object.get("version").and_then(|v| v.as_str()).ok_or_else(|| {
                    SchemaError::InvalidFormat(format!("schema '{name}' has no version"))
                })?;
                SchemaVersion::parse(tag).map_err(|e| {
                    SchemaError::InvalidFormat(format!("schema '{name}' version '{tag}': {e}"))
                })?
            }
        };

        let raw_fields = object
            .get("fields")
            .and_then(|f| f.as_array())
            .ok_or_else(|| SchemaError::InvalidFormat(format!("schema '{name}' has no fields array")))?;

        let mut fields = Vec::with_capacity(raw_fields.len());
        for raw in raw_fields {
            fields.push(parse_avro_field(raw)?);
        }

        Self::new(name, version, fields)
    }

    /// Render as an Avro-style record schema, including the version key
    pub fn to_avro_json(&self) -> serde_json::Value {
        let fields: Vec<serde_json::Value> = self
            .fields
            .iter()
            .map(|f| {
                let mut obj = serde_json::Map::new();
                obj.insert("name".to_string(), f.name.clone().into());
                obj.insert("type".to_string(), f.field_type.avro_name().into());
                if let Some(default) = &f.default {
                    obj.insert("default".to_string(), default.to_json());
                }
                serde_json::Value::Object(obj)
            })
            .collect();

        serde_json::json!({
            "type": "record",
            "name": self.name,
            "version": self.version.tag_string(),
            "fields": fields,
        })
    }

    /// SHA-256 over the canonical JSON form
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_json(&self.to_avro_json())
    }
}

fn parse_avro_field(raw: &serde_json::Value) -> Result<Field, SchemaError> {
    let name = raw
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| SchemaError::InvalidFormat("field without name".to_string()))?;

    let type_json = raw
        .get("type")
        .ok_or_else(|| SchemaError::InvalidFormat(format!("field '{name}' has no type")))?;
    let field_type = type_json
        .as_str()
        .and_then(FieldType::from_avro_name)
        .ok_or_else(|| SchemaError::UnsupportedType {
            field: name.to_string(),
            found: type_json.to_string(),
        })?;

    let Some(default_json) = raw.get("default") else {
        return Ok(Field::required(name, field_type));
    };

    let default = match (field_type, Value::from_json(default_json)) {
        (FieldType::Double, Some(Value::Int(v))) => Value::Double(v as f64),
        (_, Some(value)) => value,
        (_, None) => {
            return Err(SchemaError::DefaultTypeMismatch {
                field: name.to_string(),
                expected: field_type.to_string(),
            })
        }
    };

    Ok(Field::optional(name, field_type, default))
}
