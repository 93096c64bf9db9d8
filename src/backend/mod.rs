//! Backend Module
//!
//! The durable relational store mirrored by the table store.
//!
//! ## Responsibilities
//! - Apply one persistence statement at a time (`execute`)
//! - Stream every current row of a table for bootstrap (`scan`)
//!
//! ## Implementations
//! - [`MemoryBackend`]: in-process tables, records arrival order
//! - [`SqliteBackend`]: SQLite file through rusqlite
//! - [`JournalBackend`]: append-only CRC-framed statement log on disk

pub mod journal;
mod memory;
mod sqlite;

pub use journal::JournalBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};
use crate::persist::{Statement, StatementKind};
use crate::row::{Row, RowId, Value};
use crate::schema::TableSchema;

/// Capabilities the table store needs from its backing store
///
/// After bootstrap only the write-behind worker calls `execute`, so
/// implementations see one mutating caller per table store.
pub trait Backend: Send + Sync + 'static {
    /// Apply a single mutation
    fn execute(&self, statement: &Statement) -> Result<()>;

    /// Feed every row of `schema.table_name` to `visit`, stopping at the
    /// first error either side returns
    fn scan(&self, schema: &TableSchema, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()>;
}

// =============================================================================
// Shared table image for the non-SQL backends
// =============================================================================

/// Rows of one table keyed by id
pub(crate) type TableImage = BTreeMap<RowId, Vec<Value>>;

/// Check a statement would apply to an image with SQL-like outcomes:
/// inserting an existing id fails, deleting a missing id is a no-op
pub(crate) fn check_against_image(image: &TableImage, statement: &Statement) -> Result<RowId> {
    let id = statement.row_id().ok_or_else(|| {
        StoreError::Backend(format!("statement has no integer id: {}", statement.sql))
    })?;

    if statement.kind == StatementKind::Insert && image.contains_key(&id) {
        return Err(StoreError::Backend(format!(
            "UNIQUE constraint failed: {}.id = {}",
            statement.table, id
        )));
    }
    Ok(id)
}

/// Apply a statement to an image, failing where SQL would
pub(crate) fn apply_to_image(image: &mut TableImage, statement: &Statement) -> Result<()> {
    let id = check_against_image(image, statement)?;
    match statement.kind {
        StatementKind::Insert => {
            image.insert(id, statement.params[1..].to_vec());
        }
        StatementKind::Delete => {
            image.remove(&id);
        }
    }
    Ok(())
}
