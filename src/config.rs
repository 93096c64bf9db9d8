//! Configuration for memstore
//!
//! Centralized configuration with sensible defaults.

use crate::error::{Result, StoreError};

/// Configuration for a single table store instance
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Persistence Queue Configuration
    // -------------------------------------------------------------------------
    /// Max statements buffered before `insert`/`delete` block (backpressure)
    pub queue_capacity: usize,

    /// Name of the background writer thread
    pub worker_name: String,

    // -------------------------------------------------------------------------
    // Table Configuration
    // -------------------------------------------------------------------------
    /// Row slots reserved up front
    pub initial_capacity: usize,

    /// Largest jump past the current length an id may make during `load`
    /// or bootstrap
    pub max_id_gap: usize,

    /// Remove a row's unique key from the index when the row is deleted.
    ///
    /// Off by default: a deleted row keeps its key claimed, and a lookup of
    /// that key reports the store as corrupted.
    pub release_key_on_delete: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            worker_name: "memstore-writer".to_string(),
            initial_capacity: 100_000,
            max_id_gap: 1 << 20,
            release_key_on_delete: false,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(StoreError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_id_gap == 0 {
            return Err(StoreError::Config("max_id_gap must be at least 1".to_string()));
        }
        if self.worker_name.is_empty() {
            return Err(StoreError::Config("worker_name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: StoreConfig,
}

impl ConfigBuilder {
    /// Set the persistence queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the writer thread name
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker_name = name.into();
        self
    }

    /// Set the number of row slots reserved at startup
    pub fn initial_capacity(mut self, slots: usize) -> Self {
        self.config.initial_capacity = slots;
        self
    }

    /// Set how far past the current length a loaded id may land
    pub fn max_id_gap(mut self, gap: usize) -> Self {
        self.config.max_id_gap = gap;
        self
    }

    /// Release unique keys of deleted rows
    pub fn release_key_on_delete(mut self, release: bool) -> Self {
        self.config.release_key_on_delete = release;
        self
    }

    pub fn build(self) -> Result<StoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Journal sync strategy: how often the journal backend fsyncs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalSync {
    /// fsync after every statement (safest, slowest)
    EveryWrite,

    /// fsync after N statements (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for JournalSync {
    fn default() -> Self {
        JournalSync::EveryNEntries { count: 100 }
    }
}
