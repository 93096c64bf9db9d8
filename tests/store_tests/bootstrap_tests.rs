//! Bootstrap Tests
//!
//! Tests verify:
//! - Rows scanned from the backend land at their own ids
//! - Gaps in the id sequence become deleted slots
//! - Bad backend contents fail `open`
//! - The writer only starts after the scan

use std::sync::Arc;

use memstore::backend::MemoryBackend;
use memstore::{ColumnType, Row, StoreConfig, StoreError, TableSchema, TableStore, Value};

fn tokens_schema() -> TableSchema {
    TableSchema::new("tokens")
        .unique_column("csrf_token", ColumnType::Text)
        .column("created_at", ColumnType::Timestamp)
}

fn config() -> StoreConfig {
    StoreConfig::builder().initial_capacity(8).build().unwrap()
}

fn seeded(ids: &[i64]) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    for id in ids {
        backend.seed(
            "tokens",
            Row::with_id(*id, vec![Value::from(format!("t{}", id)), Value::Timestamp(*id)]),
        );
    }
    backend
}

#[test]
fn test_bootstrap_empty_table() {
    let backend = Arc::new(MemoryBackend::new());
    let store = TableStore::open(backend, tokens_schema(), config()).unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(store.insert(Row::new(vec![Value::from("x"), Value::Timestamp(1)])).unwrap(), 1);
}

#[test]
fn test_bootstrap_places_rows_with_gaps() {
    let backend = seeded(&[2, 5, 3]);
    let store = TableStore::open(backend.clone(), tokens_schema(), config()).unwrap();

    assert_eq!(store.len(), 6);
    assert_eq!(store.live_count(), 3);

    for id in [2, 3, 5] {
        let row = store.get(id).unwrap();
        assert_eq!(row.values[0], Value::from(format!("t{}", id)));
        assert_eq!(store.get_by_key(format!("t{}", id)).unwrap().id, id);
    }

    for id in [1, 4] {
        assert!(matches!(store.get(id), Err(StoreError::AlreadyDeleted(_))));
    }
    assert!(matches!(store.get(0), Err(StoreError::OutOfRange { .. })));

    // Bootstrap does not echo rows back to the backend
    assert_eq!(store.queue_stats().submitted, 0);

    let next = store
        .insert(Row::new(vec![Value::from("fresh"), Value::Timestamp(9)]))
        .unwrap();
    assert_eq!(next, 6);

    store.close().unwrap();
    assert_eq!(backend.applied().len(), 1);
    assert_eq!(backend.rows("tokens").len(), 4);
}

#[test]
fn test_bootstrapped_keys_are_claimed() {
    let backend = seeded(&[1]);
    let store = TableStore::open(backend, tokens_schema(), config()).unwrap();

    let result = store.insert(Row::new(vec![Value::from("t1"), Value::Timestamp(2)]));
    assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
}

#[test]
fn test_bootstrap_duplicate_key_fails_open() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed("tokens", Row::with_id(1, vec![Value::from("same"), Value::Timestamp(1)]));
    backend.seed("tokens", Row::with_id(2, vec![Value::from("same"), Value::Timestamp(2)]));

    let result = TableStore::open(backend, tokens_schema(), config());
    assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
}

#[test]
fn test_bootstrap_invalid_row_fails_open() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed("tokens", Row::with_id(1, vec![Value::Integer(7), Value::Timestamp(1)]));

    let result = TableStore::open(backend, tokens_schema(), config());
    assert!(matches!(result, Err(StoreError::InvalidRow(_))));
}

#[test]
fn test_bootstrap_scan_failure_fails_open() {
    let backend = seeded(&[1, 2]);
    backend.fail_scan(true);

    let result = TableStore::open(backend, tokens_schema(), config());
    assert!(matches!(result, Err(StoreError::Backend(_))));
}

#[test]
fn test_bootstrap_rejects_bad_schema() {
    let backend = Arc::new(MemoryBackend::new());
    let schema = TableSchema::new("tokens").unique_column("score", ColumnType::Real);

    let result = TableStore::open(backend, schema, config());
    assert!(matches!(result, Err(StoreError::Schema(_))));
}

#[test]
fn test_bootstrap_only_reads_own_table() {
    let backend = seeded(&[1]);
    backend.seed("other", Row::with_id(7, vec![Value::from("zzz"), Value::Timestamp(1)]));

    let store = TableStore::open(backend, tokens_schema(), config()).unwrap();
    assert_eq!(store.len(), 2);
    assert!(matches!(store.get_by_key("zzz"), Err(StoreError::KeyNotFound(_))));
}

#[test]
fn test_bootstrap_rejects_runaway_id() {
    let backend = seeded(&[1, i64::MAX]);

    let result = TableStore::open(backend, tokens_schema(), config());
    assert!(matches!(result, Err(StoreError::OutOfRange { id: i64::MAX, .. })));
}
