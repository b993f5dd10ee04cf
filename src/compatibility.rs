//! Schema resolution and compatibility checking
//!
//! Data written with one schema version (the *writer*) can be read with
//! another (the *reader*) through a [`ResolutionPlan`]:
//!
//! - a reader field also present in the writer is read from the writer's
//!   position; the declared types must be identical
//! - a reader field missing from the writer takes its default, or fails
//!   resolution if it is required
//! - a writer field missing from the reader is parsed and discarded
//!
//! Bytes are always walked in writer field order since position, not name,
//! determines the binary layout.

use serde::{Deserialize, Serialize};

use crate::codec::{Codec, Reader};
use crate::error::DecodeError;
use crate::schema::Schema;
use crate::value::{FieldType, Record, Value};
use crate::version::SchemaVersion;

/// How one reader field obtains its value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAction {
    /// Take the value parsed at this writer position
    ReadAt(usize),
    /// Writer lacks the field; use the reader's default
    UseDefault(Value),
}

/// One writer field as seen while parsing bytes
#[derive(Debug, Clone, PartialEq)]
struct WriterStep {
    name: String,
    field_type: FieldType,
    /// Reader slot receiving the value; `None` means parse and discard
    target: Option<usize>,
}

/// Precomputed mapping from a writer schema to a reader schema.
///
/// Pure function of the two schemas, so it can be cached per version pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionPlan {
    writer_version: SchemaVersion,
    reader_version: SchemaVersion,
    steps: Vec<WriterStep>,
    actions: Vec<(String, FieldAction)>,
}

impl ResolutionPlan {
    pub fn writer_version(&self) -> &SchemaVersion {
        &self.writer_version
    }

    pub fn reader_version(&self) -> &SchemaVersion {
        &self.reader_version
    }

    /// Reader fields with their actions, in reader order
    pub fn actions(&self) -> impl Iterator<Item = (&str, &FieldAction)> {
        self.actions.iter().map(|(name, action)| (name.as_str(), action))
    }

    /// Names of writer fields dropped during decode
    pub fn skipped_fields(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.target.is_none())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Decode writer bytes into a record shaped by the reader schema
    pub fn decode(&self, codec: &Codec, bytes: &[u8]) -> Result<Record, DecodeError> {
        let mut reader = Reader::new(bytes);
        let mut slots: Vec<Option<Value>> = vec![None; self.actions.len()];

        for step in &self.steps {
            match step.target {
                Some(slot) => slots[slot] = Some(reader.read_value(step.field_type, &step.name)?),
                None => reader.skip_value(step.field_type, &step.name)?,
            }
        }
        codec.finish(&reader)?;

        let mut record = Record::new();
        for ((name, action), slot) in self.actions.iter().zip(slots) {
            let value = match (action, slot) {
                (FieldAction::ReadAt(_), Some(value)) => value,
                (FieldAction::UseDefault(default), _) => default.clone(),
                (FieldAction::ReadAt(position), None) => {
                    return Err(DecodeError::IncompatibleSchema {
                        field: name.clone(),
                        reason: format!("writer position {position} was not read"),
                    })
                }
            };
            record.insert(name.clone(), value);
        }

        Ok(record)
    }
}

/// Build the plan for reading `writer`-encoded bytes as `reader`.
///
/// Fails with [`DecodeError::IncompatibleSchema`] when a shared field changed
/// type or the reader requires a field the writer never wrote.
pub fn resolve(writer: &Schema, reader: &Schema) -> Result<ResolutionPlan, DecodeError> {
    let mut steps: Vec<WriterStep> = writer
        .fields()
        .iter()
        .map(|f| WriterStep {
            name: f.name.clone(),
            field_type: f.field_type,
            target: None,
        })
        .collect();

    let mut actions = Vec::with_capacity(reader.fields().len());

    for (slot, field) in reader.fields().iter().enumerate() {
        let action = match writer.position(&field.name) {
            Some(position) => {
                let writer_type = writer.fields()[position].field_type;
                if writer_type != field.field_type {
                    return Err(DecodeError::IncompatibleSchema {
                        field: field.name.clone(),
                        reason: format!(
                            "type changed from {} ({}) to {} ({})",
                            writer_type,
                            writer.version(),
                            field.field_type,
                            reader.version()
                        ),
                    });
                }
                steps[position].target = Some(slot);
                FieldAction::ReadAt(position)
            }
            None => match &field.default {
                Some(default) => FieldAction::UseDefault(default.clone()),
                None => {
                    return Err(DecodeError::IncompatibleSchema {
                        field: field.name.clone(),
                        reason: format!(
                            "required in {} but absent from writer {}",
                            reader.version(),
                            writer.version()
                        ),
                    })
                }
            },
        };
        actions.push((field.name.clone(), action));
    }

    Ok(ResolutionPlan {
        writer_version: writer.version().clone(),
        reader_version: reader.version().clone(),
        steps,
        actions,
    })
}

/// Resolve and decode in one step with the default codec
pub fn decode_resolved(writer: &Schema, reader: &Schema, bytes: &[u8]) -> Result<Record, DecodeError> {
    resolve(writer, reader)?.decode(&Codec::default(), bytes)
}

/// Result of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    /// Readers of `to` can decode data written with `from`
    pub backward_compatible: bool,
    /// Readers of `from` can decode data written with `to`
    pub forward_compatible: bool,
    /// Whether the schemas are compatible under the checker's mode
    pub is_compatible: bool,
    /// List of changes detected
    pub changes: Vec<SchemaChange>,
    /// Summary of the compatibility check
    pub summary: String,
}

/// A detected change between schema versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChange {
    pub change_type: ChangeType,
    pub field: String,
    /// Whether this change prevents new readers from decoding old data
    pub is_breaking: bool,
    pub description: String,
}

/// Type of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    FieldAdded,
    FieldRemoved,
    TypeChanged,
    /// required <-> optional
    OptionalityChanged,
    DefaultChanged,
}

/// Compatibility checker for schema versions
#[derive(Debug, Default)]
pub struct CompatibilityChecker {
    /// Strict mode - any change is considered incompatible
    strict_mode: bool,
}

impl CompatibilityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable strict mode
    pub fn strict(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    /// Compare `old` against `new`
    pub fn check(&self, old: &Schema, new: &Schema) -> CompatibilityReport {
        let changes = detect_changes(old, new);
        let backward_compatible = resolve(old, new).is_ok();
        let forward_compatible = resolve(new, old).is_ok();
        let breaking_count = changes.iter().filter(|c| c.is_breaking).count();

        let (is_compatible, summary) = if self.strict_mode && !changes.is_empty() {
            (false, format!("Strict mode: {} changes detected", changes.len()))
        } else if !backward_compatible {
            (false, format!("{} breaking changes detected", breaking_count))
        } else if changes.is_empty() {
            (true, "No changes detected".to_string())
        } else {
            (true, format!("{} compatible changes detected", changes.len()))
        };

        CompatibilityReport {
            from: old.version().clone(),
            to: new.version().clone(),
            backward_compatible,
            forward_compatible,
            is_compatible,
            changes,
            summary,
        }
    }
}

fn detect_changes(old: &Schema, new: &Schema) -> Vec<SchemaChange> {
    let mut changes = Vec::new();

    for old_field in old.fields() {
        if new.field(&old_field.name).is_none() {
            changes.push(SchemaChange {
                change_type: ChangeType::FieldRemoved,
                field: old_field.name.clone(),
                is_breaking: false,
                description: format!("Field '{}' was removed", old_field.name),
            });
        }
    }

    for new_field in new.fields() {
        let Some(old_field) = old.field(&new_field.name) else {
            changes.push(SchemaChange {
                change_type: ChangeType::FieldAdded,
                field: new_field.name.clone(),
                is_breaking: new_field.required,
                description: if new_field.required {
                    format!("Field '{}' was added without default (breaking)", new_field.name)
                } else {
                    format!("Field '{}' was added with default value", new_field.name)
                },
            });
            continue;
        };

        if old_field.field_type != new_field.field_type {
            changes.push(SchemaChange {
                change_type: ChangeType::TypeChanged,
                field: new_field.name.clone(),
                is_breaking: true,
                description: format!(
                    "Field '{}' type changed from {} to {}",
                    new_field.name, old_field.field_type, new_field.field_type
                ),
            });
        }

        if old_field.required != new_field.required {
            changes.push(SchemaChange {
                change_type: ChangeType::OptionalityChanged,
                field: new_field.name.clone(),
                is_breaking: false,
                description: format!(
                    "Field '{}' became {}",
                    new_field.name,
                    if new_field.required { "required" } else { "optional" }
                ),
            });
        } else if old_field.default != new_field.default {
            changes.push(SchemaChange {
                change_type: ChangeType::DefaultChanged,
                field: new_field.name.clone(),
                is_breaking: false,
                description: format!("Field '{}' default changed", new_field.name),
            });
        }
    }

    changes
}
