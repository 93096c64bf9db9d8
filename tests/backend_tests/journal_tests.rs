//! Journal Backend Tests
//!
//! Tests verify:
//! - Applied statements survive reopen
//! - Torn and corrupt tails are dropped and overwritten
//! - Statements that would not replay are rejected up front
//! - A table store over a journal restarts with its rows

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use memstore::backend::journal::{encode_frame, read_frames, FRAME_HEADER_SIZE};
use memstore::backend::{Backend, JournalBackend};
use memstore::config::JournalSync;
use memstore::persist::Statement;
use memstore::{ColumnType, Row, StoreConfig, StoreError, TableSchema, TableStore, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn tokens_schema() -> TableSchema {
    TableSchema::new("tokens")
        .unique_column("csrf_token", ColumnType::Text)
        .column("created_at", ColumnType::Timestamp)
}

fn insert(schema: &TableSchema, id: i64, token: &str) -> Statement {
    Statement::insert(
        schema,
        &Row::with_id(id, vec![Value::from(token), Value::Timestamp(id * 10)]),
    )
}

fn scan_all(backend: &JournalBackend, schema: &TableSchema) -> Vec<Row> {
    let mut rows = Vec::new();
    backend
        .scan(schema, &mut |row: Row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
    rows
}

// =============================================================================
// Journal Tests
// =============================================================================

#[test]
fn test_new_journal_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.journal");

    let journal = JournalBackend::open(&path).unwrap();
    assert_eq!(journal.path(), path.as_path());
    assert_eq!(journal.next_lsn(), 1);
    assert!(scan_all(&journal, &tokens_schema()).is_empty());
    assert!(path.exists());
}

#[test]
fn test_statements_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.journal");
    let schema = tokens_schema();

    {
        let journal = JournalBackend::open_with(&path, JournalSync::EveryWrite).unwrap();
        journal.execute(&insert(&schema, 1, "a")).unwrap();
        journal.execute(&insert(&schema, 2, "b")).unwrap();
        journal.execute(&Statement::delete(&schema, 1)).unwrap();
        assert_eq!(journal.next_lsn(), 4);
    }

    let journal = JournalBackend::open(&path).unwrap();
    assert_eq!(journal.next_lsn(), 4);

    let rows = scan_all(&journal, &schema);
    assert_eq!(rows, vec![Row::with_id(2, vec![Value::from("b"), Value::Timestamp(20)])]);
}

#[test]
fn test_frames_carry_increasing_lsns() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.journal");
    let schema = tokens_schema();

    {
        let journal = JournalBackend::open(&path).unwrap();
        for id in 1..=5 {
            journal.execute(&insert(&schema, id, &format!("t{}", id))).unwrap();
        }
    }

    let (statements, valid_len, last_lsn) = read_frames(&path).unwrap();
    assert_eq!(statements.len(), 5);
    assert_eq!(last_lsn, 5);
    assert_eq!(valid_len, fs::metadata(&path).unwrap().len());
    assert_eq!(statements[2].row_id(), Some(3));
}

#[test]
fn test_duplicate_insert_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.journal");
    let schema = tokens_schema();

    let journal = JournalBackend::open(&path).unwrap();
    journal.execute(&insert(&schema, 1, "a")).unwrap();

    let result = journal.execute(&insert(&schema, 1, "again"));
    assert!(matches!(result, Err(StoreError::Backend(_))));
    assert_eq!(journal.next_lsn(), 2);

    // Deleting a missing row is not an error
    journal.execute(&Statement::delete(&schema, 42)).unwrap();
    drop(journal);

    let (statements, _, _) = read_frames(&path).unwrap();
    assert_eq!(statements.len(), 2);
}

#[test]
fn test_torn_tail_is_truncated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.journal");
    let schema = tokens_schema();

    {
        let journal = JournalBackend::open(&path).unwrap();
        journal.execute(&insert(&schema, 1, "a")).unwrap();
        journal.execute(&insert(&schema, 2, "b")).unwrap();
    }
    let good_len = fs::metadata(&path).unwrap().len();

    // Half a frame, as left by a crash mid-write
    let frame = encode_frame(3, &insert(&schema, 3, "c")).unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&frame[..frame.len() / 2]).unwrap();
    drop(file);

    let journal = JournalBackend::open(&path).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
    assert_eq!(journal.next_lsn(), 3);
    assert_eq!(scan_all(&journal, &schema).len(), 2);

    // New frames follow the last good one
    journal.execute(&insert(&schema, 3, "c")).unwrap();
    drop(journal);

    let journal = JournalBackend::open(&path).unwrap();
    assert_eq!(scan_all(&journal, &schema).len(), 3);
}

#[test]
fn test_corrupt_frame_ends_replay() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.journal");
    let schema = tokens_schema();

    {
        let journal = JournalBackend::open(&path).unwrap();
        journal.execute(&insert(&schema, 1, "a")).unwrap();
        journal.execute(&insert(&schema, 2, "b")).unwrap();
    }

    // Flip a payload byte of the second frame
    let mut data = fs::read(&path).unwrap();
    let first_len = encode_frame(1, &insert(&schema, 1, "a")).unwrap().len();
    data[first_len + FRAME_HEADER_SIZE] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    let journal = JournalBackend::open(&path).unwrap();
    let rows = scan_all(&journal, &schema);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), first_len as u64);
}

#[test]
fn test_failed_append_never_reaches_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.journal");
    let schema = tokens_schema();

    {
        let journal = JournalBackend::open(&path).unwrap();
        journal.execute(&insert(&schema, 1, "a")).unwrap();
        let good_len = journal.len();

        // Part of the frame written
        journal.tear_next_append(10);
        assert!(matches!(journal.execute(&insert(&schema, 2, "b")), Err(StoreError::Io(_))));
        assert_eq!(journal.len(), good_len);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        // Whole frame written, then the append reports failure
        journal.tear_next_append(usize::MAX);
        assert!(journal.execute(&insert(&schema, 3, "c")).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        assert_eq!(journal.next_lsn(), 2);

        journal.execute(&insert(&schema, 4, "d")).unwrap();
        let ids: Vec<i64> = scan_all(&journal, &schema).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    let (statements, _, last_lsn) = read_frames(&path).unwrap();
    assert_eq!(statements.len(), 2);
    assert_eq!(last_lsn, 2);

    let journal = JournalBackend::open(&path).unwrap();
    let ids: Vec<i64> = scan_all(&journal, &schema).iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 4]);
}

#[test]
fn test_scan_is_per_table() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.journal");
    let tokens = tokens_schema();
    let other = TableSchema::new("other")
        .unique_column("csrf_token", ColumnType::Text)
        .column("created_at", ColumnType::Timestamp);

    let journal = JournalBackend::open(&path).unwrap();
    journal.execute(&insert(&tokens, 1, "a")).unwrap();
    journal.execute(&insert(&other, 1, "a")).unwrap();
    journal.execute(&insert(&other, 2, "b")).unwrap();

    assert_eq!(scan_all(&journal, &tokens).len(), 1);
    assert_eq!(scan_all(&journal, &other).len(), 2);
}

// =============================================================================
// Table Store over a Journal
// =============================================================================

#[test]
fn test_store_restarts_from_journal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokens.journal");

    let (kept, removed) = {
        let backend = Arc::new(JournalBackend::open(&path).unwrap());
        let store = TableStore::open(backend, tokens_schema(), StoreConfig::default()).unwrap();

        let kept = store
            .insert(Row::new(vec![Value::from("keep"), Value::Timestamp(1)]))
            .unwrap();
        let removed = store
            .insert(Row::new(vec![Value::from("drop"), Value::Timestamp(2)]))
            .unwrap();
        store.delete(removed).unwrap();

        let stats = store.close().unwrap();
        assert_eq!(stats.applied, 3);
        (kept, removed)
    };

    let backend = Arc::new(JournalBackend::open(&path).unwrap());
    let store = TableStore::open(backend, tokens_schema(), StoreConfig::default()).unwrap();

    assert_eq!(store.get_by_key("keep").unwrap().id, kept);
    assert!(matches!(store.get_by_key("drop"), Err(StoreError::KeyNotFound(_))));

    // Only live rows are bootstrapped; a deleted trailing id is free again
    assert_eq!(store.len() as i64, removed);
}
