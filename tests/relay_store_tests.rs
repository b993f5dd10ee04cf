//! End-to-end tests for the record store, the relay, and the service facade

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use schema_relay::{
    Codec, Consumer, EncodeError, EncodedMessage, Error, Record, RecordService, RecordStore, Relay,
    SchemaRegistry, SchemaVersion, Settings, StoreError, Value,
};

fn fixtures_path() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").leak()
}

fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::new();
    registry.load_dir(fixtures_path()).unwrap();
    Arc::new(registry)
}

fn v(major: u64) -> SchemaVersion {
    SchemaVersion::new(major, 0, 0)
}

fn user(id: i64, nom: &str) -> Record {
    Record::new().with("id", id).with("nom", nom).with("age", 30)
}

// =============================================================================
// Record store
// =============================================================================

#[test]
fn test_alice_written_v1_read_v2() {
    let registry = registry();
    let v1 = registry.require(&v(1)).unwrap();
    let v2 = registry.require(&v(2)).unwrap();
    let mut store = RecordStore::new(registry.clone());

    store.put(1, &v1, &user(1, "Alice")).unwrap();
    let record = store.get(1, &v2).unwrap();

    assert_eq!(record.get("nom"), Some(&Value::String("Alice".to_string())));
    assert_eq!(record.get("actif"), Some(&Value::Boolean(true)));
    assert_eq!(record.get("email"), Some(&Value::String(String::new())));
    assert_eq!(store.writer_version(1), Some(&v(1)));
}

#[test]
fn test_store_overwrite_replaces_writer_version() {
    let registry = registry();
    let v1 = registry.require(&v(1)).unwrap();
    let v2 = registry.require(&v(2)).unwrap();
    let mut store = RecordStore::new(registry.clone());

    store.put(7, &v1, &user(7, "Bob")).unwrap();
    store
        .put(7, &v2, &user(7, "Bob").with("email", "bob@example.com"))
        .unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(store.writer_version(7), Some(&v(2)));
    assert_eq!(
        store.get(7, &v2).unwrap().get("email"),
        Some(&Value::String("bob@example.com".to_string()))
    );
}

#[test]
fn test_failed_put_leaves_entry_untouched() {
    let registry = registry();
    let v1 = registry.require(&v(1)).unwrap();
    let mut store = RecordStore::new(registry.clone());

    store.put(1, &v1, &user(1, "Alice")).unwrap();
    let bad = Record::new().with("id", 1i64).with("nom", 5);
    assert!(matches!(store.put(1, &v1, &bad), Err(StoreError::Encode(_))));
    assert_eq!(store.get(1, &v1).unwrap(), user(1, "Alice"));
}

#[test]
fn test_get_latest_uses_newest_readable_version() {
    let registry = registry();
    let v1 = registry.require(&v(1)).unwrap();
    let mut store = RecordStore::new(registry.clone());

    store.put(1, &v1, &user(1, "Alice")).unwrap();
    let record = store.get_latest(1).unwrap();
    assert_eq!(record.get("actif"), Some(&Value::Boolean(true)));
    assert_eq!(record.len(), 5);
}

#[test]
fn test_get_with_required_field_reader_fails() {
    let registry = registry();
    let v1 = registry.require(&v(1)).unwrap();
    let v3 = registry.require(&v(3)).unwrap();
    let mut store = RecordStore::new(registry.clone());

    store.put(1, &v1, &user(1, "Alice")).unwrap();
    assert!(matches!(store.get(1, &v3), Err(StoreError::Decode(_))));
    assert!(matches!(store.get(2, &v1), Err(StoreError::NotFound { id: 2 })));
}

#[test]
fn test_insert_assigns_sequential_ids() {
    let registry = registry();
    let v1 = registry.require(&v(1)).unwrap();
    let mut store = RecordStore::new(registry.clone());

    assert_eq!(store.insert(&v1, &user(0, "Alice")).unwrap(), 1);
    assert_eq!(store.insert(&v1, &user(0, "Bob")).unwrap(), 2);
    assert_eq!(store.get(2, &v1).unwrap().get("id"), Some(&Value::Int(2)));
}

// =============================================================================
// Relay
// =============================================================================

#[test]
fn test_relay_overflow_keeps_newest() {
    let relay = Relay::new(100);
    for i in 0..105u8 {
        relay.push(EncodedMessage::new(v(1), vec![i]));
    }

    assert_eq!(relay.len(), 100);
    assert_eq!(relay.dropped_count(), 5);
    assert_eq!(relay.pop().unwrap().bytes, vec![5]);
}

#[test]
fn test_consumer_decodes_published_records() {
    let service = Arc::new(RecordService::new(
        registry(),
        Codec::default(),
        Arc::new(Relay::new(10)),
    ));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handle = {
        let service = service.clone();
        let seen = seen.clone();
        Consumer::spawn(service.relay().clone(), Duration::from_millis(5), move |message| {
            let record = service.decode_message(&message, Some(&SchemaVersion::new(2, 0, 0)))?;
            seen.lock().unwrap().push(record);
            Ok(())
        })
        .unwrap()
    };

    for (id, nom) in [(1, "Alice"), (2, "Bob"), (3, "Chloé")] {
        service.publish(&v(1), &user(id, nom)).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.lock().unwrap().len() < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let stats = handle.stop();

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.failed, 0);
    let seen = seen.lock().unwrap();
    let names: Vec<_> = seen.iter().map(|r| r.get("nom").cloned()).collect();
    assert_eq!(
        names,
        vec![
            Some(Value::from("Alice")),
            Some(Value::from("Bob")),
            Some(Value::from("Chloé"))
        ]
    );
    assert!(seen.iter().all(|r| r.get("actif") == Some(&Value::Boolean(true))));
}

#[test]
fn test_consumer_counts_undecodable_messages() {
    let service = Arc::new(RecordService::new(
        registry(),
        Codec::default(),
        Arc::new(Relay::new(10)),
    ));
    service.relay_push(EncodedMessage::new(v(1), vec![0x02]));
    service.publish(&v(1), &user(1, "Alice")).unwrap();

    let handle = {
        let service = service.clone();
        Consumer::spawn(service.relay().clone(), Duration::from_millis(5), move |message| {
            service.decode_message(&message, Some(&SchemaVersion::new(1, 0, 0)))?;
            Ok(())
        })
        .unwrap()
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.stats().processed + handle.stats().failed < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let stats = handle.stop();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 1);
}

// =============================================================================
// Service
// =============================================================================

#[test]
fn test_service_from_settings() {
    let mut settings = Settings::default();
    settings.relay.capacity = 4;
    settings.registry.schema_dir = Some(fixtures_path().to_path_buf());

    let service = RecordService::from_settings(&settings).unwrap();
    assert_eq!(service.registry().len(), 3);
    assert_eq!(service.relay().capacity(), 4);

    let id = service.store_insert(&v(1), &user(0, "Alice")).unwrap();
    let updated = service
        .store_update(id, &v(2), Record::new().with("email", "alice@example.com"))
        .unwrap();
    assert_eq!(updated.get("age"), Some(&Value::Int(30)));

    // v3 requires a field v2 data lacks, so the latest readable view is v2
    let latest = service.store_get_latest(id).unwrap();
    assert_eq!(latest.get("actif"), Some(&Value::Boolean(true)));
    assert_eq!(
        latest.get("email"),
        Some(&Value::String("alice@example.com".to_string()))
    );
    assert!(!latest.contains("pays"));

    let upgraded = service
        .store_update(id, &v(3), Record::new().with("pays", "FR"))
        .unwrap();
    assert_eq!(upgraded.get("email"), Some(&Value::from("alice@example.com")));
    assert_eq!(
        service.store_get_latest(id).unwrap().get("pays"),
        Some(&Value::from("FR"))
    );
    assert!(matches!(
        service.store_get(id, &v(9)),
        Err(Error::Schema(_))
    ));
    assert_eq!(service.store_get(id, &v(1)).unwrap(), user(1, "Alice"));
}

#[test]
fn test_store_update_to_required_field_version() {
    let registry = registry();
    let v1 = registry.require(&v(1)).unwrap();
    let v3 = registry.require(&v(3)).unwrap();
    let mut store = RecordStore::new(registry.clone());
    store.put(1, &v1, &user(1, "Alice")).unwrap();

    assert!(matches!(
        store.update(1, &v3, Record::new()),
        Err(StoreError::Encode(EncodeError::MissingField { field })) if field == "pays"
    ));

    let updated = store.update(1, &v3, Record::new().with("pays", "FR")).unwrap();
    assert_eq!(updated.get("pays"), Some(&Value::from("FR")));
    assert_eq!(store.writer_version(1), Some(&v(3)));
}

#[test]
fn test_insert_after_max_id() {
    let registry = registry();
    let v1 = registry.require(&v(1)).unwrap();
    let mut store = RecordStore::new(registry.clone());
    store.put(i64::MAX, &v1, &user(i64::MAX, "Max")).unwrap();

    assert!(matches!(
        store.insert(&v1, &user(0, "Next")),
        Err(StoreError::IdExhausted { last: i64::MAX })
    ));
}
