//! Schema Descriptor
//!
//! The resolved shape of the cached table: its name, ordered columns and the
//! optional unique secondary key. Produced outside this crate (by hand, or
//! deserialized from JSON) and consumed by the table store and backends.
//!
//! ## JSON form
//! ```text
//! {
//!   "table_name": "tokens",
//!   "columns": [
//!     { "name": "id", "type": "integer" },
//!     { "name": "csrf_token", "type": "text" },
//!     { "name": "created_at", "type": "timestamp" }
//!   ],
//!   "unique_key": "csrf_token",
//!   "indexes": []
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::row::Row;

/// Name of the mandatory identifier column
pub const ID_COLUMN: &str = "id";

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Timestamp,
    Boolean,
}

impl ColumnType {
    /// Whether values of this type can key a secondary index
    pub fn is_indexable(self) -> bool {
        !matches!(self, ColumnType::Real)
    }

    /// SQL type used when creating the table in a relational backend
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Timestamp | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// One column of the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ColumnType,

    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Resolved table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,

    /// All columns including `id`, which must come first
    pub columns: Vec<ColumnDef>,

    /// Column holding the unique secondary key
    #[serde(default)]
    pub unique_key: Option<String>,

    /// Columns with a non-unique secondary index
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableSchema {
    /// Start a schema with the mandatory `id` column
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: vec![ColumnDef::new(ID_COLUMN, ColumnType::Integer).not_null()],
            unique_key: None,
            indexes: Vec::new(),
        }
    }

    /// Append a column
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef::new(name, column_type));
        self
    }

    /// Append a column and mark it as the unique key
    pub fn unique_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        self.columns.push(ColumnDef::new(name.clone(), column_type).not_null());
        self.unique_key = Some(name);
        self
    }

    /// Add a non-unique index over an existing column
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.indexes.push(name.into());
        self
    }

    /// Parse a JSON descriptor
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: TableSchema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Read and parse a JSON descriptor file
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check structural rules
    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(StoreError::Schema("table name is empty".to_string()));
        }
        if !self
            .table_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::Schema(format!(
                "table name {:?} is not a plain identifier",
                self.table_name
            )));
        }

        match self.columns.first() {
            Some(col) if col.name == ID_COLUMN && col.column_type == ColumnType::Integer => {}
            _ => {
                return Err(StoreError::Schema(
                    "first column must be `id` of type integer".to_string(),
                ))
            }
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(StoreError::Schema(format!("duplicate column {}", col.name)));
            }
        }

        if let Some(key) = &self.unique_key {
            self.indexable_position(key)?;
        }
        for name in &self.indexes {
            self.indexable_position(name)?;
        }

        Ok(())
    }

    /// Number of value columns (everything but `id`)
    pub fn value_width(&self) -> usize {
        self.columns.len().saturating_sub(1)
    }

    /// Non-`id` columns in order
    pub fn value_columns(&self) -> &[ColumnDef] {
        self.columns.get(1..).unwrap_or(&[])
    }

    /// Position of a non-`id` column inside `Row::values`
    pub fn value_position(&self, name: &str) -> Option<usize> {
        self.value_columns().iter().position(|c| c.name == name)
    }

    /// Position of the unique key inside `Row::values`
    pub fn unique_key_position(&self) -> Option<usize> {
        self.unique_key
            .as_deref()
            .and_then(|name| self.value_position(name))
    }

    /// `INSERT INTO <table> VALUES(?,?,...)`
    pub fn insert_statement(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(",");
        format!("INSERT INTO {} VALUES({})", self.table_name, placeholders)
    }

    /// `DELETE FROM <table> WHERE id = ?`
    pub fn delete_statement(&self) -> String {
        format!("DELETE FROM {} WHERE {} = ?", self.table_name, ID_COLUMN)
    }

    /// `SELECT <columns> FROM <table> ORDER BY id`
    pub fn select_all_statement(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        format!(
            "SELECT {} FROM {} ORDER BY {}",
            names.join(", "),
            self.table_name,
            ID_COLUMN
        )
    }

    /// `CREATE TABLE IF NOT EXISTS ...` with a UNIQUE constraint on the key
    pub fn create_table_statement(&self) -> String {
        let mut defs = Vec::with_capacity(self.columns.len() + 1);
        for col in &self.columns {
            let mut def = format!("{} {}", col.name, col.column_type.sql_type());
            if col.name == ID_COLUMN {
                def.push_str(" PRIMARY KEY");
            } else if !col.nullable {
                def.push_str(" NOT NULL");
            }
            defs.push(def);
        }
        if let Some(key) = &self.unique_key {
            defs.push(format!("UNIQUE ({})", key));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table_name,
            defs.join(", ")
        )
    }

    /// Check a row's arity, value types and nullability
    pub fn check_row(&self, row: &Row) -> Result<()> {
        if row.values.len() != self.value_width() {
            return Err(StoreError::InvalidRow(format!(
                "expected {} values, got {}",
                self.value_width(),
                row.values.len()
            )));
        }
        for (col, value) in self.value_columns().iter().zip(&row.values) {
            if !value.fits(col.column_type) {
                return Err(StoreError::InvalidRow(format!(
                    "column {} expects {:?}, got {:?}",
                    col.name, col.column_type, value
                )));
            }
            if value.is_null() && !col.nullable {
                return Err(StoreError::InvalidRow(format!("column {} is not nullable", col.name)));
            }
        }
        Ok(())
    }

    fn indexable_position(&self, name: &str) -> Result<usize> {
        let position = self.value_position(name).ok_or_else(|| {
            StoreError::Schema(format!("indexed column {} does not exist", name))
        })?;
        let col = &self.value_columns()[position];
        if !col.column_type.is_indexable() {
            return Err(StoreError::Schema(format!(
                "column {} of type {:?} cannot be indexed",
                name, col.column_type
            )));
        }
        Ok(position)
    }
}
