//! # memstore
//!
//! A memory-resident table store with:
//! - The whole table held in memory, bootstrapped from a backing store
//! - Dense row ids with soft delete (ids are never reused)
//! - A unique secondary key with O(1) lookup
//! - Write-behind persistence through a single-consumer FIFO queue
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Callers                               │
//! │                (many threads, concurrent)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    TableStore                                │
//! │     rows + tombstones + indexes under one RwLock             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ statements (commit order)
//!                       ▼
//!               ┌───────────────┐
//!               │ WriteBehind   │  bounded FIFO,
//!               │ Queue         │  one writer thread
//!               └───────┬───────┘
//!                       ▼
//!               ┌───────────────┐
//!               │   Backend     │  SQLite / journal / memory
//!               └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod row;
pub mod schema;
pub mod index;
pub mod persist;
pub mod backend;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::StoreConfig;
pub use row::{IndexKey, Row, RowId, Value};
pub use schema::{ColumnType, TableSchema};
pub use store::TableStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of memstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
