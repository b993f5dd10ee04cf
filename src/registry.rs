//! Schema Registry
//!
//! In-memory, append-only table of schema versions for one record type,
//! plus the resolution-plan cache keyed by (writer, reader) version pair.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::compatibility::{resolve, CompatibilityChecker, CompatibilityReport, ResolutionPlan};
use crate::error::{DecodeError, Result, SchemaError};
use crate::fingerprint::Fingerprint;
use crate::schema::Schema;
use crate::version::SchemaVersion;

/// A registered schema version
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub schema: Arc<Schema>,
    pub fingerprint: Fingerprint,
    pub registered_at: DateTime<Utc>,
}

type PlanKey = (SchemaVersion, SchemaVersion);

/// The schema registry. Shared between store, relay consumers, and callers
/// through an `Arc`.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: RwLock<BTreeMap<SchemaVersion, SchemaEntry>>,
    plans: Mutex<HashMap<PlanKey, Arc<ResolutionPlan>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from schemas, in order
    pub fn with_schemas(schemas: impl IntoIterator<Item = Schema>) -> std::result::Result<Self, SchemaError> {
        let registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Register a schema version.
    ///
    /// Re-registering identical content is a no-op; different content under an
    /// existing version is an [`SchemaError::ImmutabilityViolation`]. All
    /// versions must share one record name.
    pub fn register(&self, schema: Schema) -> std::result::Result<Arc<Schema>, SchemaError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = entries.values().next() {
            if existing.schema.name() != schema.name() {
                return Err(SchemaError::InvalidFormat(format!(
                    "registry holds '{}' schemas, got '{}'",
                    existing.schema.name(),
                    schema.name()
                )));
            }
        }

        let fingerprint = schema.fingerprint();

        if let Some(existing) = entries.get(schema.version()) {
            if existing.fingerprint == fingerprint {
                return Ok(existing.schema.clone());
            }
            return Err(SchemaError::ImmutabilityViolation {
                name: schema.name().to_string(),
                version: schema.version().to_string(),
            });
        }

        info!(
            schema = schema.name(),
            version = %schema.version(),
            fingerprint = fingerprint.short(),
            "registered schema version"
        );

        let version = schema.version().clone();
        let schema = Arc::new(schema);
        entries.insert(
            version,
            SchemaEntry {
                schema: schema.clone(),
                fingerprint,
                registered_at: Utc::now(),
            },
        );
        Ok(schema)
    }

    /// Get a schema by version
    pub fn get(&self, version: &SchemaVersion) -> Option<Arc<Schema>> {
        self.read_entries().get(version).map(|e| e.schema.clone())
    }

    /// Get a schema by version, failing if it is not registered
    pub fn require(&self, version: &SchemaVersion) -> std::result::Result<Arc<Schema>, SchemaError> {
        self.get(version)
            .ok_or_else(|| SchemaError::UnknownVersion(version.to_string()))
    }

    /// Get the full registry entry for a version
    pub fn entry(&self, version: &SchemaVersion) -> Option<SchemaEntry> {
        self.read_entries().get(version).cloned()
    }

    /// Get the latest version
    pub fn latest(&self) -> Option<Arc<Schema>> {
        self.read_entries().values().next_back().map(|e| e.schema.clone())
    }

    /// Get all registered versions, sorted
    pub fn versions(&self) -> Vec<SchemaVersion> {
        self.read_entries().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// Resolution plan for reading `writer` bytes as `reader`.
    ///
    /// Plans are cached per version pair when both schemas are the registered
    /// ones; ad-hoc schemas are resolved without touching the cache.
    pub fn plan(&self, writer: &Schema, reader: &Schema) -> std::result::Result<Arc<ResolutionPlan>, DecodeError> {
        if !(self.is_registered(writer) && self.is_registered(reader)) {
            return resolve(writer, reader).map(Arc::new);
        }

        let key = (writer.version().clone(), reader.version().clone());
        let mut plans = self.plans.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(plan) = plans.get(&key) {
            return Ok(plan.clone());
        }

        debug!(writer = %key.0, reader = %key.1, "resolution plan cache miss");
        let plan = Arc::new(resolve(writer, reader)?);
        plans.insert(key, plan.clone());
        Ok(plan)
    }

    /// Resolution plan between two registered versions
    pub fn plan_for_versions(
        &self,
        writer: &SchemaVersion,
        reader: &SchemaVersion,
    ) -> Result<Arc<ResolutionPlan>> {
        let writer = self.require(writer)?;
        let reader = self.require(reader)?;
        Ok(self.plan(&writer, &reader)?)
    }

    /// Plan from `writer` to the newest registered version that can read it.
    ///
    /// Versions are tried newest first; when none resolves, the error from the
    /// newest version is returned. An empty registry reads `writer` as itself.
    pub fn latest_compatible_plan(&self, writer: &Schema) -> std::result::Result<Arc<ResolutionPlan>, DecodeError> {
        let mut newest_err = None;

        for version in self.versions().into_iter().rev() {
            let Some(reader) = self.get(&version) else {
                continue;
            };
            match self.plan(writer, &reader) {
                Ok(plan) => return Ok(plan),
                Err(e) => {
                    debug!(writer = %writer.version(), reader = %version, error = %e, "skipping incompatible reader");
                    newest_err.get_or_insert(e);
                }
            }
        }

        match newest_err {
            Some(e) => Err(e),
            None => resolve(writer, writer).map(Arc::new),
        }
    }

    /// Number of cached plans
    pub fn cached_plans(&self) -> usize {
        self.plans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check compatibility between two registered versions
    pub fn check_compatibility(
        &self,
        old_version: &SchemaVersion,
        new_version: &SchemaVersion,
    ) -> std::result::Result<CompatibilityReport, SchemaError> {
        let old = self.require(old_version)?;
        let new = self.require(new_version)?;
        Ok(CompatibilityChecker::new().check(&old, &new))
    }

    /// Register every `*.avsc` file under `dir`. Each file must carry a
    /// top-level `"version"` key. Returns the number of files loaded.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut loaded = 0;

        for entry in WalkDir::new(dir.as_ref()).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("avsc") {
                continue;
            }

            let content = fs::read_to_string(path)?;
            let json: serde_json::Value = serde_json::from_str(&content)?;
            let schema = Schema::from_avro_json(&json, None)?;
            debug!(path = %path.display(), version = %schema.version(), "loading schema file");
            self.register(schema)?;
            loaded += 1;
        }

        info!(dir = %dir.as_ref().display(), loaded, "loaded schema directory");
        Ok(loaded)
    }

    fn is_registered(&self, schema: &Schema) -> bool {
        self.read_entries()
            .get(schema.version())
            .is_some_and(|e| e.schema.as_ref() == schema)
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<SchemaVersion, SchemaEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use crate::value::FieldType;
    use tempfile::tempdir;

    fn user(version: u64, extra: Option<Field>) -> Schema {
        let mut fields = vec![
            Field::required("id", FieldType::Int64),
            Field::required("name", FieldType::String),
        ];
        fields.extend(extra);
        Schema::new("User", SchemaVersion::new(version, 0, 0), fields).unwrap()
    }

    #[test]
    fn test_create_registry() {
        let registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.latest().is_none());
    }

    #[test]
    fn test_register_version() {
        let registry = SchemaRegistry::new();
        registry.register(user(1, None)).unwrap();
        registry
            .register(user(2, Some(Field::optional("age", FieldType::Int32, 0))))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.latest().unwrap().version(), &SchemaVersion::new(2, 0, 0));
        assert!(registry.get(&SchemaVersion::new(1, 0, 0)).is_some());
        assert!(registry.entry(&SchemaVersion::new(2, 0, 0)).is_some());
        assert!(matches!(
            registry.require(&SchemaVersion::new(9, 0, 0)),
            Err(SchemaError::UnknownVersion(_))
        ));
    }

    #[test]
    fn test_immutability() {
        let registry = SchemaRegistry::new();
        registry.register(user(1, None)).unwrap();

        // Identical content is accepted again
        registry.register(user(1, None)).unwrap();

        let result = registry.register(user(1, Some(Field::required("email", FieldType::String))));
        assert!(matches!(result, Err(SchemaError::ImmutabilityViolation { .. })));
    }

    #[test]
    fn test_single_record_name() {
        let registry = SchemaRegistry::new();
        registry.register(user(1, None)).unwrap();
        let other = Schema::new(
            "Order",
            SchemaVersion::new(2, 0, 0),
            vec![Field::required("id", FieldType::Int64)],
        )
        .unwrap();
        assert!(matches!(registry.register(other), Err(SchemaError::InvalidFormat(_))));
    }

    #[test]
    fn test_plan_cache() {
        let v1 = user(1, None);
        let v2 = user(2, Some(Field::optional("age", FieldType::Int32, 0)));
        let registry = SchemaRegistry::with_schemas([v1.clone(), v2.clone()]).unwrap();

        let first = registry.plan(&v1, &v2).unwrap();
        let second = registry.plan(&v1, &v2).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_plans(), 1);

        registry
            .plan_for_versions(&SchemaVersion::new(2, 0, 0), &SchemaVersion::new(1, 0, 0))
            .unwrap();
        assert_eq!(registry.cached_plans(), 2);
    }

    #[test]
    fn test_ad_hoc_reader_bypasses_cache() {
        let v1 = user(1, None);
        let registry = SchemaRegistry::with_schemas([v1.clone()]).unwrap();
        let ad_hoc = user(1, Some(Field::optional("age", FieldType::Int32, 0)));

        let plan = registry.plan(&v1, &ad_hoc).unwrap();
        assert_eq!(plan.actions().count(), 3);
        assert_eq!(registry.cached_plans(), 0);
    }

    #[test]
    fn test_latest_compatible_plan_skips_unreadable_versions() {
        let v1 = user(1, None);
        let v2 = user(2, Some(Field::optional("age", FieldType::Int32, 0)));
        let v3 = user(3, Some(Field::required("country", FieldType::String)));
        let registry = SchemaRegistry::with_schemas([v1.clone(), v2.clone(), v3.clone()]).unwrap();

        let plan = registry.latest_compatible_plan(&v1).unwrap();
        assert_eq!(plan.reader_version(), &SchemaVersion::new(2, 0, 0));

        let plan = registry.latest_compatible_plan(&v3).unwrap();
        assert_eq!(plan.reader_version(), &SchemaVersion::new(3, 0, 0));
    }

    #[test]
    fn test_latest_compatible_plan_without_readers() {
        let v1 = user(1, None);
        let registry = SchemaRegistry::with_schemas([user(
            2,
            Some(Field::required("country", FieldType::String)),
        )])
        .unwrap();
        assert!(matches!(
            registry.latest_compatible_plan(&v1),
            Err(DecodeError::IncompatibleSchema { field, .. }) if field == "country"
        ));

        let plan = SchemaRegistry::new().latest_compatible_plan(&v1).unwrap();
        assert_eq!(plan.reader_version(), &SchemaVersion::new(1, 0, 0));
    }

    #[test]
    fn test_check_compatibility() {
        let registry = SchemaRegistry::with_schemas([
            user(1, None),
            user(2, Some(Field::required("email", FieldType::String))),
        ])
        .unwrap();

        let report = registry
            .check_compatibility(&SchemaVersion::new(1, 0, 0), &SchemaVersion::new(2, 0, 0))
            .unwrap();
        assert!(!report.is_compatible);
        assert!(report.forward_compatible);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("user_v1.avsc"),
            user(1, None).to_avro_json().to_string(),
        )
        .unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("nested/user_v2.avsc"),
            user(2, Some(Field::optional("active", FieldType::Boolean, true)))
                .to_avro_json()
                .to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a schema").unwrap();

        let registry = SchemaRegistry::new();
        assert_eq!(registry.load_dir(dir.path()).unwrap(), 2);
        assert_eq!(
            registry.versions(),
            vec![SchemaVersion::new(1, 0, 0), SchemaVersion::new(2, 0, 0)]
        );
    }
}
