//! Entry point for external callers (HTTP handlers, CLI drivers)
//!
//! Bundles the registry, a mutex-guarded record store, and the relay behind
//! version-addressed operations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::codec::{Codec, EncodedMessage};
use crate::config::Settings;
use crate::error::Result;
use crate::registry::SchemaRegistry;
use crate::relay::{Relay, RelayStats};
use crate::store::{ListedRecord, RecordStore};
use crate::value::Record;
use crate::version::SchemaVersion;

pub struct RecordService {
    registry: Arc<SchemaRegistry>,
    codec: Codec,
    store: Mutex<RecordStore>,
    relay: Arc<Relay>,
}

impl RecordService {
    pub fn new(registry: Arc<SchemaRegistry>, codec: Codec, relay: Arc<Relay>) -> Self {
        let store = RecordStore::with_codec(registry.clone(), codec);
        Self {
            registry,
            codec,
            store: Mutex::new(store),
            relay,
        }
    }

    /// Build from settings, loading the configured schema directory
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::new());
        if let Some(dir) = &settings.registry.schema_dir {
            registry.load_dir(dir)?;
        }
        let relay = Arc::new(Relay::from_config(&settings.relay));
        info!(
            versions = registry.len(),
            capacity = relay.capacity(),
            "record service ready"
        );
        Ok(Self::new(registry, settings.codec.codec(), relay))
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Encode with a registered schema version
    pub fn encode(&self, version: &SchemaVersion, record: &Record) -> Result<Vec<u8>> {
        let schema = self.registry.require(version)?;
        Ok(self.codec.encode(&schema, record)?)
    }

    /// Decode bytes written with exactly `version`
    pub fn decode(&self, version: &SchemaVersion, bytes: &[u8]) -> Result<Record> {
        let schema = self.registry.require(version)?;
        Ok(self.codec.decode(&schema, bytes)?)
    }

    /// Decode bytes written with `writer` as seen by `reader`
    pub fn decode_as(&self, writer: &SchemaVersion, reader: &SchemaVersion, bytes: &[u8]) -> Result<Record> {
        let plan = self.registry.plan_for_versions(writer, reader)?;
        Ok(plan.decode(&self.codec, bytes)?)
    }

    /// Decode a relayed message with `reader`, or with the newest registered
    /// version that can read it if `None`
    pub fn decode_message(&self, message: &EncodedMessage, reader: Option<&SchemaVersion>) -> Result<Record> {
        match reader {
            Some(reader) => self.decode_as(&message.version, reader, &message.bytes),
            None => {
                let writer = self.registry.require(&message.version)?;
                let plan = self.registry.latest_compatible_plan(&writer)?;
                Ok(plan.decode(&self.codec, &message.bytes)?)
            }
        }
    }

    /// Encode and push onto the relay
    pub fn publish(&self, version: &SchemaVersion, record: &Record) -> Result<()> {
        let bytes = self.encode(version, record)?;
        self.relay.push(EncodedMessage::new(version.clone(), bytes));
        Ok(())
    }

    pub fn relay_push(&self, message: EncodedMessage) {
        self.relay.push(message);
    }

    pub fn relay_pop(&self) -> Option<EncodedMessage> {
        self.relay.pop()
    }

    pub fn relay_stats(&self) -> RelayStats {
        self.relay.stats()
    }

    pub fn store_put(&self, id: i64, version: &SchemaVersion, record: &Record) -> Result<()> {
        let writer = self.registry.require(version)?;
        Ok(self.store().put(id, &writer, record)?)
    }

    pub fn store_insert(&self, version: &SchemaVersion, record: &Record) -> Result<i64> {
        let writer = self.registry.require(version)?;
        Ok(self.store().insert(&writer, record)?)
    }

    pub fn store_get(&self, id: i64, version: &SchemaVersion) -> Result<Record> {
        let reader = self.registry.require(version)?;
        Ok(self.store().get(id, &reader)?)
    }

    pub fn store_get_latest(&self, id: i64) -> Result<Record> {
        Ok(self.store().get_latest(id)?)
    }

    pub fn store_update(&self, id: i64, version: &SchemaVersion, changes: Record) -> Result<Record> {
        let writer = self.registry.require(version)?;
        Ok(self.store().update(id, &writer, changes)?)
    }

    pub fn store_delete(&self, id: i64) -> bool {
        self.store().delete(id)
    }

    pub fn store_list(&self, version: &SchemaVersion) -> Result<Vec<ListedRecord>> {
        let reader = self.registry.require(version)?;
        Ok(self.store().list(&reader))
    }

    pub fn store_len(&self) -> usize {
        self.store().len()
    }

    fn store(&self) -> MutexGuard<'_, RecordStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
