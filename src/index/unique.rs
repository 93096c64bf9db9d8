//! Unique secondary index

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use crate::error::{Result, StoreError};
use crate::row::RowId;

use super::now_millis;

/// Maps each key to the single row id that claims it
#[derive(Debug, Clone)]
pub struct UniqueIndex<K> {
    entries: HashMap<K, RowId>,

    /// Unix millis of the last successful insert/delete
    last_updated: u64,
}

impl<K> UniqueIndex<K>
where
    K: Hash + Eq + Display,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_updated: now_millis(),
        }
    }

    /// Look up the row id claiming `key`
    pub fn find(&self, key: &K) -> Option<RowId> {
        self.entries.get(key).copied()
    }

    /// Claim `key` for `id`
    pub fn insert(&mut self, key: K, id: RowId) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(StoreError::DuplicateKey(key.to_string()));
        }
        self.entries.insert(key, id);
        self.last_updated = now_millis();
        Ok(())
    }

    /// Release `key`
    pub fn delete(&mut self, key: &K) -> Result<()> {
        if self.entries.remove(key).is_none() {
            return Err(StoreError::KeyNotFound(key.to_string()));
        }
        self.last_updated = now_millis();
        Ok(())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn last_updated(&self) -> u64 {
        self.last_updated
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> Default for UniqueIndex<K>
where
    K: Hash + Eq + Display,
{
    fn default() -> Self {
        Self::new()
    }
}
