//! Persistence intents
//!
//! A statement is built while the store's write lock is held and describes
//! one mutation that memory already reflects.

use serde::{Deserialize, Serialize};

use crate::row::{Row, RowId, Value};
use crate::schema::TableSchema;

/// What a statement does to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// Params are the full row: `id` followed by every value column
    Insert,

    /// Params are `[id]`
    Delete,
}

/// One pending durable write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,

    /// Target table
    pub table: String,

    /// Positional template, e.g. `INSERT INTO tokens VALUES(?,?,?)`
    pub sql: String,

    /// Positional arguments bound to the template's `?` markers
    pub params: Vec<Value>,
}

impl Statement {
    /// Insert of a row that already carries its assigned id
    pub fn insert(schema: &TableSchema, row: &Row) -> Self {
        let mut params = Vec::with_capacity(row.values.len() + 1);
        params.push(Value::Integer(row.id));
        params.extend(row.values.iter().cloned());
        Self {
            kind: StatementKind::Insert,
            table: schema.table_name.clone(),
            sql: schema.insert_statement(),
            params,
        }
    }

    /// Delete by id
    pub fn delete(schema: &TableSchema, id: RowId) -> Self {
        Self {
            kind: StatementKind::Delete,
            table: schema.table_name.clone(),
            sql: schema.delete_statement(),
            params: vec![Value::Integer(id)],
        }
    }

    /// The row id this statement targets, if the first param is an integer
    pub fn row_id(&self) -> Option<RowId> {
        match self.params.first() {
            Some(Value::Integer(id)) => Some(*id),
            _ => None,
        }
    }
}
