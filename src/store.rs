//! Table Store Module
//!
//! The memory-resident table: every row lives in memory, reads never leave
//! the process and writes reach the backing store through the write-behind
//! queue.
//!
//! ## Responsibilities
//! - Bootstrap the full table from the backend before serving
//! - Assign dense, monotonically increasing row ids
//! - Enforce the unique secondary key among present rows
//! - Soft-delete rows without ever reusing their ids
//! - Hand every committed mutation to the persistence queue in commit order

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::backend::Backend;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::index::{MultiIndex, UniqueIndex};
use crate::persist::{QueueStats, Statement, WriteBehindQueue};
use crate::row::{IndexKey, Row, RowId};
use crate::schema::{ColumnType, TableSchema};

/// Non-unique index over one value column
struct SecondaryIndex {
    column: String,
    column_type: ColumnType,
    position: usize,
    index: MultiIndex<IndexKey>,
}

/// Everything guarded by the store's single read-write lock
///
/// Invariants:
/// - `rows.len() == deleted.len()`
/// - slot 0 is `None` and marked deleted
/// - a slot flips from live to deleted at most once, never back
/// - every live row's unique key maps to its id in `unique`
struct TableState {
    rows: Vec<Option<Row>>,
    deleted: Vec<bool>,
    unique: Option<UniqueIndex<IndexKey>>,
    unique_position: Option<usize>,
    unique_type: Option<ColumnType>,
    indexes: Vec<SecondaryIndex>,

    /// Largest allowed `id - len` when installing a row
    max_id_gap: usize,
}

impl TableState {
    fn new(schema: &TableSchema, config: &StoreConfig) -> Self {
        let capacity = config.initial_capacity;
        let mut rows = Vec::with_capacity(capacity.max(1));
        let mut deleted = Vec::with_capacity(capacity.max(1));

        // id = 0 is unavailable
        rows.push(None);
        deleted.push(true);

        let unique_position = schema.unique_key_position();
        let indexes = schema
            .indexes
            .iter()
            .filter_map(|column| {
                schema.value_position(column).map(|position| SecondaryIndex {
                    column: column.clone(),
                    column_type: schema.value_columns()[position].column_type,
                    position,
                    index: MultiIndex::new(),
                })
            })
            .collect();

        Self {
            rows,
            deleted,
            unique: unique_position.map(|_| UniqueIndex::new()),
            unique_position,
            unique_type: unique_position.map(|p| schema.value_columns()[p].column_type),
            indexes,
            max_id_gap: config.max_id_gap,
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    /// Slot of a present row, or the validation error for `id`
    fn live_slot(&self, id: RowId) -> Result<usize> {
        if id <= 0 || id as u64 >= self.len() as u64 {
            return Err(StoreError::OutOfRange { id, len: self.len() });
        }
        let slot = id as usize;
        if self.deleted[slot] {
            return Err(StoreError::AlreadyDeleted(id));
        }
        Ok(slot)
    }

    /// Unique key of a row, if the table has one
    fn unique_key(&self, row: &Row) -> Result<Option<IndexKey>> {
        let Some(position) = self.unique_position else {
            return Ok(None);
        };
        row.value(position)
            .and_then(|value| value.index_key())
            .map(Some)
            .ok_or_else(|| StoreError::InvalidRow("unique key column is null".to_string()))
    }

    fn check_key_free(&self, key: Option<&IndexKey>) -> Result<()> {
        if let (Some(unique), Some(key)) = (&self.unique, key) {
            if unique.contains(key) {
                return Err(StoreError::DuplicateKey(key.to_string()));
            }
        }
        Ok(())
    }

    /// The unique index with `key` re-tagged for its column
    fn unique_lookup(&self, key: IndexKey) -> Result<(&UniqueIndex<IndexKey>, IndexKey)> {
        match (&self.unique, self.unique_type) {
            (Some(unique), Some(column_type)) => Ok((unique, key.for_column(column_type))),
            _ => Err(StoreError::NoUniqueKey),
        }
    }

    /// Register a row (already holding its id) in every index
    fn index_row(&mut self, row: &Row, key: Option<IndexKey>) -> Result<()> {
        if let (Some(unique), Some(key)) = (self.unique.as_mut(), key) {
            unique.insert(key, row.id)?;
        }
        for secondary in &mut self.indexes {
            if let Some(key) = row.value(secondary.position).and_then(|v| v.index_key()) {
                secondary.index.insert(key, row.id);
            }
        }
        Ok(())
    }

    /// Place a row at its own id, growing the arrays with absent slots
    ///
    /// Ids `max_id_gap` or more past the current length are out of range.
    fn install(&mut self, row: Row) -> Result<()> {
        if row.id <= 0 || row.id as u64 >= self.len() as u64 + self.max_id_gap as u64 {
            return Err(StoreError::OutOfRange {
                id: row.id,
                len: self.len(),
            });
        }
        let slot = row.id as usize;
        if slot < self.len() && self.rows[slot].is_some() {
            return Err(StoreError::DuplicateId(row.id));
        }
        let key = self.unique_key(&row)?;
        self.check_key_free(key.as_ref())?;

        while slot >= self.len() {
            self.rows.push(None);
            self.deleted.push(true);
        }

        self.index_row(&row, key)?;
        self.rows[slot] = Some(row);
        self.deleted[slot] = false;
        Ok(())
    }
}

/// Memory-resident table with write-behind persistence
///
/// ## Concurrency Model
///
/// - **Reads** (`get`, `get_by_key`, `select_ids`): shared `state` lock,
///   any number at once
/// - **Writes** (`insert`, `delete`, `load`): `write_lock` first, then the
///   exclusive `state` lock for the in-memory change only. The statement is
///   submitted after `state` is released but before `write_lock` is, so a
///   full queue stalls the next writer, never a reader, and statements
///   enter the queue in commit order.
pub struct TableStore {
    schema: TableSchema,

    config: StoreConfig,

    /// Rows, tombstones and indexes as one unit
    state: RwLock<TableState>,

    /// Serializes mutations and their queue submissions
    write_lock: Mutex<()>,

    /// Durable writes pending application
    queue: WriteBehindQueue,

    /// Set once an index/row disagreement is detected
    corrupted: AtomicBool,
}

impl TableStore {
    /// Bootstrap a store from the backend's current table contents
    ///
    /// On startup:
    /// 1. Validate config and schema
    /// 2. Stream every row from the backend into memory
    /// 3. Start the write-behind worker
    /// 4. Ready to serve requests
    pub fn open(backend: Arc<dyn Backend>, schema: TableSchema, config: StoreConfig) -> Result<Self> {
        // Step 1: Validate
        config.validate()?;
        schema.validate()?;

        // Step 2: Bootstrap from the backend
        let started = Instant::now();
        let mut state = TableState::new(&schema, &config);
        let mut loaded = 0usize;
        backend.scan(&schema, &mut |row: Row| -> Result<()> {
            schema.check_row(&row)?;
            state.install(row)?;
            loaded += 1;
            Ok(())
        })?;

        tracing::info!(
            "Bootstrapped table {}: {} rows, length {}, took {:?}",
            schema.table_name,
            loaded,
            state.len(),
            started.elapsed()
        );

        // Step 3: Start the writer only once the scan is fully consumed
        let queue = WriteBehindQueue::start(backend, config.queue_capacity, &config.worker_name)?;

        Ok(Self {
            schema,
            config,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
            queue,
            corrupted: AtomicBool::new(false),
        })
    }

    /// Install rows that already exist durably
    ///
    /// Each row goes to the slot named by its own id. Nothing is queued.
    /// Rows before a failing one stay installed.
    pub fn load<I>(&self, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Row>,
    {
        self.ensure_intact()?;

        let _write_guard = self.write_lock.lock();
        let mut state = self.state.write();

        let mut loaded = 0;
        for row in rows {
            self.schema.check_row(&row)?;
            state.install(row)?;
            loaded += 1;
        }

        tracing::debug!("Loaded {} rows into {}", loaded, self.schema.table_name);
        Ok(loaded)
    }

    /// Insert a new row and return its assigned id
    ///
    /// Steps:
    /// 1. Validate the row against the schema
    /// 2. Under the exclusive lock: check the unique key, assign
    ///    `id = length`, append, index
    /// 3. Queue the insert statement
    pub fn insert(&self, row: Row) -> Result<RowId> {
        self.ensure_intact()?;
        self.schema.check_row(&row)?;

        let _write_guard = self.write_lock.lock();
        self.ensure_accepting()?;

        let (id, statement) = {
            let mut state = self.state.write();

            let key = state.unique_key(&row)?;
            state.check_key_free(key.as_ref())?;

            let id = state.len() as RowId;
            let mut row = row;
            row.id = id;

            state.index_row(&row, key)?;
            let statement = Statement::insert(&self.schema, &row);
            state.rows.push(Some(row));
            state.deleted.push(false);

            (id, statement)
        };

        self.queue.submit(statement)?;
        Ok(id)
    }

    /// Soft-delete a row
    ///
    /// The id is never reused. Unless `release_key_on_delete` is set, the
    /// row's unique key stays claimed.
    pub fn delete(&self, id: RowId) -> Result<()> {
        self.ensure_intact()?;

        let _write_guard = self.write_lock.lock();
        self.ensure_accepting()?;

        let statement = {
            let mut state = self.state.write();
            let slot = state.live_slot(id)?;

            if self.config.release_key_on_delete {
                let key = match &state.rows[slot] {
                    Some(row) => state.unique_key(row)?,
                    None => None,
                };
                if let (Some(unique), Some(key)) = (state.unique.as_mut(), key) {
                    unique.delete(&key)?;
                }
            }

            state.deleted[slot] = true;
            Statement::delete(&self.schema, id)
        };

        self.queue.submit(statement)
    }

    /// Copy of a present row
    pub fn get(&self, id: RowId) -> Result<Row> {
        self.ensure_intact()?;

        let state = self.state.read();
        let slot = state.live_slot(id)?;
        match &state.rows[slot] {
            Some(row) => Ok(row.clone()),
            None => Err(self.mark_corrupted(format!("live slot {} holds no row", id))),
        }
    }

    /// Copy of the present row holding `key` in the unique column
    ///
    /// A key that resolves to a missing or deleted row means the index and
    /// the rows disagree: the store is marked corrupted and refuses every
    /// later operation.
    pub fn get_by_key(&self, key: impl Into<IndexKey>) -> Result<Row> {
        self.ensure_intact()?;

        let state = self.state.read();
        let (unique, key) = state.unique_lookup(key.into())?;
        let id = unique
            .find(&key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;

        let row = state
            .live_slot(id)
            .ok()
            .and_then(|slot| state.rows[slot].as_ref());
        match row {
            Some(row) => Ok(row.clone()),
            None => Err(self.mark_corrupted(format!(
                "unique key {} resolves to dead id {}",
                key, id
            ))),
        }
    }

    /// Raw unique-index lookup, without checking the row is present
    pub fn find_key(&self, key: impl Into<IndexKey>) -> Result<Option<RowId>> {
        let state = self.state.read();
        let (unique, key) = state.unique_lookup(key.into())?;
        Ok(unique.find(&key))
    }

    /// Every id that ever held `key` in an indexed column, oldest first
    ///
    /// Ids of rows deleted since are included.
    pub fn select_ids(&self, column: &str, key: impl Into<IndexKey>) -> Result<Vec<RowId>> {
        self.ensure_intact()?;
        let key = key.into();

        let state = self.state.read();
        let secondary = state
            .indexes
            .iter()
            .find(|s| s.column == column)
            .ok_or_else(|| StoreError::NotIndexed(column.to_string()))?;
        Ok(secondary.index.select_ids(&key.for_column(secondary.column_type)))
    }

    /// Flush pending statements and stop the writer
    ///
    /// Later mutations fail with `QueueClosed`; reads keep working.
    pub fn close(&self) -> Result<QueueStats> {
        let _write_guard = self.write_lock.lock();
        self.queue.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Slot count including the reserved slot 0; the next id to assign
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Whether no row was ever stored
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Number of present rows
    pub fn live_count(&self) -> usize {
        self.state.read().deleted.iter().filter(|d| !**d).count()
    }

    /// Whether `id` names a deleted (or never used) slot
    pub fn is_deleted(&self, id: RowId) -> Result<bool> {
        let state = self.state.read();
        match state.live_slot(id) {
            Ok(_) => Ok(false),
            Err(StoreError::AlreadyDeleted(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Number of keys in the unique index (0 without a unique key)
    pub fn unique_index_len(&self) -> usize {
        self.state.read().unique.as_ref().map_or(0, |u| u.len())
    }

    /// Unix millis of the unique index's last mutation
    pub fn index_updated_at(&self) -> Option<u64> {
        self.state.read().unique.as_ref().map(|u| u.last_updated())
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::SeqCst)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_intact(&self) -> Result<()> {
        if self.is_corrupted() {
            return Err(StoreError::Corrupted(format!(
                "table {} was marked corrupted earlier",
                self.schema.table_name
            )));
        }
        Ok(())
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.queue.is_closed() {
            return Err(StoreError::QueueClosed);
        }
        Ok(())
    }

    fn mark_corrupted(&self, reason: String) -> StoreError {
        tracing::error!(
            "internal error: table {}: {}; refusing further operations",
            self.schema.table_name,
            reason
        );
        self.corrupted.store(true, Ordering::SeqCst);
        StoreError::Corrupted(reason)
    }
}
