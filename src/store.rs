//! In-memory record store
//!
//! Entries keep only the encoded bytes and the writer version; every read
//! resolves the stored writer schema against the caller's reader schema.
//!
//! The store is not synchronized. Callers sharing one across threads wrap it
//! in their own lock (see [`crate::service::RecordService`]).

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::Codec;
use crate::error::StoreError;
use crate::registry::SchemaRegistry;
use crate::schema::Schema;
use crate::value::{FieldType, Record, Value};
use crate::version::SchemaVersion;

/// Field that receives the assigned id on [`RecordStore::insert`]
const ID_FIELD: &str = "id";

#[derive(Debug, Clone)]
struct StoreEntry {
    writer_version: SchemaVersion,
    bytes: Vec<u8>,
}

/// One row of [`RecordStore::list`]. A failed decode is reported per entry.
#[derive(Debug)]
pub struct ListedRecord {
    pub id: i64,
    pub result: Result<Record, StoreError>,
}

/// Keyed map from id to encoded record
#[derive(Debug)]
pub struct RecordStore {
    registry: Arc<SchemaRegistry>,
    codec: Codec,
    entries: BTreeMap<i64, StoreEntry>,
}

impl RecordStore {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_codec(registry, Codec::default())
    }

    pub fn with_codec(registry: Arc<SchemaRegistry>, codec: Codec) -> Self {
        Self {
            registry,
            codec,
            entries: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Encode `record` with `writer` and store it under `id`, replacing any
    /// existing entry. Nothing changes if encoding fails.
    pub fn put(&mut self, id: i64, writer: &Schema, record: &Record) -> Result<(), StoreError> {
        self.ensure_registered(writer)?;
        let bytes = self.codec.encode(writer, record)?;

        let previous = self.entries.insert(
            id,
            StoreEntry {
                writer_version: writer.version().clone(),
                bytes,
            },
        );
        debug!(id, version = %writer.version(), replaced = previous.is_some(), "stored record");
        Ok(())
    }

    /// Store under the next free id (highest id + 1, starting at 1).
    /// Fails with [`StoreError::IdExhausted`] once `i64::MAX` is taken.
    ///
    /// If `writer` declares an integer `id` field, the assigned id is written
    /// into it.
    pub fn insert(&mut self, writer: &Schema, record: &Record) -> Result<i64, StoreError> {
        let id = self.next_id()?;

        let mut record = record.clone();
        if writer
            .field(ID_FIELD)
            .is_some_and(|f| matches!(f.field_type, FieldType::Int32 | FieldType::Int64))
        {
            record.insert(ID_FIELD, Value::Int(id));
        }

        self.put(id, writer, &record)?;
        Ok(id)
    }

    /// Decode the entry for `id` as `reader`
    pub fn get(&self, id: i64, reader: &Schema) -> Result<Record, StoreError> {
        let entry = self.entries.get(&id).ok_or(StoreError::NotFound { id })?;
        self.decode_entry(entry, reader)
    }

    /// Decode the entry for `id` with the newest registered schema that can
    /// read it. Versions whose required fields the writer lacks are skipped.
    pub fn get_latest(&self, id: i64) -> Result<Record, StoreError> {
        let entry = self.entries.get(&id).ok_or(StoreError::NotFound { id })?;
        let writer = self.writer_schema(entry)?;
        let plan = self.registry.latest_compatible_plan(&writer)?;
        Ok(plan.decode(&self.codec, &entry.bytes)?)
    }

    /// Merge `changes` into the stored record and re-encode it with `writer`,
    /// which may differ from the version the entry was written with.
    ///
    /// The entry is decoded with its own writer schema, so `changes` can
    /// supply fields a newer `writer` requires. Fields `writer` does not
    /// declare are dropped. Returns the record as `writer` now reads it.
    pub fn update(&mut self, id: i64, writer: &Schema, changes: Record) -> Result<Record, StoreError> {
        self.ensure_registered(writer)?;
        let entry = self.entries.get(&id).ok_or(StoreError::NotFound { id })?;

        let stored_writer = self.writer_schema(entry)?;
        let mut record = self.codec.decode(&stored_writer, &entry.bytes)?;
        record.merge(changes);
        let bytes = self.codec.encode(writer, &record)?;
        let updated = self.codec.decode(writer, &bytes)?;

        debug!(id, from = %entry.writer_version, to = %writer.version(), "updated record");
        self.entries.insert(
            id,
            StoreEntry {
                writer_version: writer.version().clone(),
                bytes,
            },
        );
        Ok(updated)
    }

    /// Remove the entry for `id`, returning whether one existed
    pub fn delete(&mut self, id: i64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Decode every entry as `reader`, in ascending id order. One failing
    /// entry does not abort the listing.
    pub fn list(&self, reader: &Schema) -> Vec<ListedRecord> {
        self.entries
            .iter()
            .map(|(&id, entry)| {
                let result = self.decode_entry(entry, reader);
                if let Err(e) = &result {
                    warn!(id, version = %entry.writer_version, error = %e, "failed to decode stored record");
                }
                ListedRecord { id, result }
            })
            .collect()
    }

    /// Writer version of the stored entry
    pub fn writer_version(&self, id: i64) -> Option<&SchemaVersion> {
        self.entries.get(&id).map(|e| &e.writer_version)
    }

    /// Encoded size of the stored entry
    pub fn encoded_len(&self, id: i64) -> Option<usize> {
        self.entries.get(&id).map(|e| e.bytes.len())
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_id(&self) -> Result<i64, StoreError> {
        match self.entries.keys().next_back() {
            None => Ok(1),
            Some(&last) => last.checked_add(1).ok_or(StoreError::IdExhausted { last }),
        }
    }

    fn ensure_registered(&self, writer: &Schema) -> Result<(), StoreError> {
        match self.registry.get(writer.version()) {
            Some(registered) if registered.as_ref() == writer => Ok(()),
            _ => Err(StoreError::UnknownVersion {
                version: writer.version().to_string(),
            }),
        }
    }

    fn writer_schema(&self, entry: &StoreEntry) -> Result<Arc<Schema>, StoreError> {
        self.registry
            .get(&entry.writer_version)
            .ok_or_else(|| StoreError::UnknownVersion {
                version: entry.writer_version.to_string(),
            })
    }

    fn decode_entry(&self, entry: &StoreEntry, reader: &Schema) -> Result<Record, StoreError> {
        let writer = self.writer_schema(entry)?;
        let plan = self.registry.plan(&writer, reader)?;
        Ok(plan.decode(&self.codec, &entry.bytes)?)
    }
}
