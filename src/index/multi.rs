//! Multi-valued secondary index

use std::collections::HashMap;
use std::hash::Hash;

use crate::row::RowId;

/// Maps each key to every row id inserted under it.
///
/// Ids are never removed, so a lookup may return ids of rows that were
/// deleted since. Callers confirm existence against the row store.
#[derive(Debug, Clone)]
pub struct MultiIndex<K> {
    entries: HashMap<K, Vec<RowId>>,
}

impl<K> MultiIndex<K>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Append `id` to the ids held under `key`
    pub fn insert(&mut self, key: K, id: RowId) {
        self.entries.entry(key).or_default().push(id);
    }

    /// Snapshot of the ids held under `key`, oldest first
    pub fn select_ids(&self, key: &K) -> Vec<RowId> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

impl<K> Default for MultiIndex<K>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}
