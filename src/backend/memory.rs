//! In-memory backend
//!
//! Keeps table images in a map and records every applied statement in
//! arrival order. Failures and latency can be injected.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::persist::Statement;
use crate::row::Row;
use crate::schema::TableSchema;

use super::{apply_to_image, Backend, TableImage};

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, TableImage>,
    applied: Vec<Statement>,
    rejected: Vec<Statement>,
    fail_next: usize,
    fail_scan: bool,
    delay: Option<Duration>,
}

/// Backing store held entirely in process memory
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a row straight into a table, bypassing `execute`
    pub fn seed(&self, table: &str, row: Row) {
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(row.id, row.values);
    }

    /// Reject the next `count` statements
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    /// Make `scan` fail
    pub fn fail_scan(&self, fail: bool) {
        self.state.lock().fail_scan = fail;
    }

    /// Sleep this long before applying each statement
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Successfully applied statements, oldest first
    pub fn applied(&self) -> Vec<Statement> {
        self.state.lock().applied.clone()
    }

    /// Statements that failed, oldest first
    pub fn rejected(&self) -> Vec<Statement> {
        self.state.lock().rejected.clone()
    }

    /// Current rows of a table in id order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|image| {
                image
                    .iter()
                    .map(|(id, values)| Row::with_id(*id, values.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Backend for MemoryBackend {
    fn execute(&self, statement: &Statement) -> Result<()> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            state.rejected.push(statement.clone());
            return Err(StoreError::Backend("injected failure".to_string()));
        }

        let image = state.tables.entry(statement.table.clone()).or_default();
        match apply_to_image(image, statement) {
            Ok(()) => {
                state.applied.push(statement.clone());
                Ok(())
            }
            Err(e) => {
                state.rejected.push(statement.clone());
                Err(e)
            }
        }
    }

    fn scan(&self, schema: &TableSchema, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()> {
        if self.state.lock().fail_scan {
            return Err(StoreError::Backend("injected scan failure".to_string()));
        }

        for row in self.rows(&schema.table_name) {
            visit(row)?;
        }
        Ok(())
    }
}
