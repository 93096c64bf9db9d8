//! Error types for memstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::row::RowId;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for memstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Validation Errors (returned to the caller, state untouched)
    // -------------------------------------------------------------------------
    #[error("id {id} out of range (store length {len})")]
    OutOfRange { id: RowId, len: usize },

    #[error("id {0} is already deleted")]
    AlreadyDeleted(RowId),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("id {0} is already loaded")]
    DuplicateId(RowId),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("table has no unique key column")]
    NoUniqueKey,

    #[error("column {0} has no secondary index")]
    NotIndexed(String),

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence queue is closed")]
    QueueClosed,

    // -------------------------------------------------------------------------
    // Fatal Errors
    // -------------------------------------------------------------------------
    /// Index and row storage disagree. The store refuses further work.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Schema(err.to_string())
    }
}
