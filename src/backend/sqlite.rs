//! SQLite backend
//!
//! Executes statement templates against a SQLite database through rusqlite.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};

use crate::error::{Result, StoreError};
use crate::persist::Statement;
use crate::row::{Row, Value};
use crate::schema::{ColumnDef, ColumnType, TableSchema};

use super::Backend;

/// Backing store over a single SQLite connection
pub struct SqliteBackend {
    /// rusqlite connections are `Send` but not `Sync`
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::debug!("Opened SQLite database at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the table described by `schema` if it does not exist
    pub fn create_table(&self, schema: &TableSchema) -> Result<()> {
        schema.validate()?;
        self.conn
            .lock()
            .execute_batch(&schema.create_table_statement())?;
        Ok(())
    }

    /// Number of rows currently in `table`
    pub fn count(&self, table: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

impl Backend for SqliteBackend {
    fn execute(&self, statement: &Statement) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
        if changed == 0 {
            tracing::debug!("Statement changed no rows: {} {:?}", statement.sql, statement.params);
        }
        Ok(())
    }

    fn scan(&self, schema: &TableSchema, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&schema.select_all_statement())?;
        let mut rows = stmt.query([])?;

        while let Some(raw) = rows.next()? {
            let id: i64 = raw.get(0)?;
            let mut values = Vec::with_capacity(schema.value_width());
            for (i, col) in schema.value_columns().iter().enumerate() {
                values.push(decode_value(col, raw.get_ref(i + 1)?)?);
            }
            visit(Row::with_id(id, values))?;
        }
        Ok(())
    }
}

/// Convert a stored SQLite value to the column's semantic type
fn decode_value(col: &ColumnDef, raw: ValueRef<'_>) -> Result<Value> {
    let value = match (col.column_type, raw) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnType::Integer, ValueRef::Integer(v)) => Value::Integer(v),
        (ColumnType::Timestamp, ValueRef::Integer(v)) => Value::Timestamp(v),
        (ColumnType::Boolean, ValueRef::Integer(v)) => Value::Boolean(v != 0),
        (ColumnType::Real, ValueRef::Real(v)) => Value::Real(v),
        (ColumnType::Real, ValueRef::Integer(v)) => Value::Real(v as f64),
        (ColumnType::Text, ValueRef::Text(bytes)) => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                StoreError::Backend(format!("column {} holds invalid UTF-8: {}", col.name, e))
            })?;
            Value::Text(text.to_string())
        }
        (column_type, other) => {
            return Err(StoreError::Backend(format!(
                "column {} ({:?}) holds unexpected {:?}",
                col.name,
                column_type,
                other.data_type()
            )))
        }
    };
    Ok(value)
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) | Value::Timestamp(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Boolean(v) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*v))),
        };
        Ok(out)
    }
}
