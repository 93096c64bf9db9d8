//! Rows and typed values
//!
//! A [`Row`] is one record of the cached table: an identifier plus one
//! [`Value`] per non-`id` schema column, in schema order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::schema::ColumnType;

/// Row identifier. `0` is reserved and never assigned.
pub type RowId = i64;

/// A single typed cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Unix milliseconds
    Timestamp(i64),
    Boolean(bool),
}

impl Value {
    /// Whether this value may be stored in a column of `column_type`
    pub fn fits(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Value::Null, _)
                | (Value::Integer(_), ColumnType::Integer)
                | (Value::Real(_), ColumnType::Real)
                | (Value::Text(_), ColumnType::Text)
                | (Value::Timestamp(_), ColumnType::Timestamp)
                | (Value::Boolean(_), ColumnType::Boolean)
        )
    }

    /// The hashable form of this value, if it can key an index
    pub fn index_key(&self) -> Option<IndexKey> {
        match self {
            Value::Integer(v) => Some(IndexKey::Integer(*v)),
            Value::Text(v) => Some(IndexKey::Text(v.clone())),
            Value::Timestamp(v) => Some(IndexKey::Timestamp(*v)),
            Value::Boolean(v) => Some(IndexKey::Boolean(*v)),
            Value::Null | Value::Real(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Parse textual input (CLI arguments) for a column of `column_type`.
    /// `NULL` parses to [`Value::Null`]; timestamps are unix millis.
    pub fn parse(column_type: ColumnType, raw: &str) -> Result<Value> {
        if raw == "NULL" {
            return Ok(Value::Null);
        }
        let invalid = || StoreError::InvalidRow(format!("{:?} is not a valid {:?}", raw, column_type));
        let value = match column_type {
            ColumnType::Integer => Value::Integer(raw.parse().map_err(|_| invalid())?),
            ColumnType::Real => Value::Real(raw.parse().map_err(|_| invalid())?),
            ColumnType::Text => Value::Text(raw.to_string()),
            ColumnType::Timestamp => Value::Timestamp(raw.parse().map_err(|_| invalid())?),
            ColumnType::Boolean => Value::Boolean(raw.parse().map_err(|_| invalid())?),
        };
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "@{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

/// Key of a secondary index entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Integer(i64),
    Text(String),
    Timestamp(i64),
    Boolean(bool),
}

impl IndexKey {
    /// Re-tag an integer-like key for a column of `column_type`
    ///
    /// `i64` converts to [`IndexKey::Integer`]; looking that up in a
    /// timestamp column needs [`IndexKey::Timestamp`], and vice versa.
    pub fn for_column(self, column_type: ColumnType) -> IndexKey {
        match (self, column_type) {
            (IndexKey::Integer(v), ColumnType::Timestamp) => IndexKey::Timestamp(v),
            (IndexKey::Timestamp(v), ColumnType::Integer) => IndexKey::Integer(v),
            (key, _) => key,
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Integer(v) => write!(f, "{}", v),
            IndexKey::Text(v) => write!(f, "{}", v),
            IndexKey::Timestamp(v) => write!(f, "@{}", v),
            IndexKey::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for IndexKey {
    fn from(v: i64) -> Self {
        IndexKey::Integer(v)
    }
}

impl From<&str> for IndexKey {
    fn from(v: &str) -> Self {
        IndexKey::Text(v.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(v: String) -> Self {
        IndexKey::Text(v)
    }
}

impl From<bool> for IndexKey {
    fn from(v: bool) -> Self {
        IndexKey::Boolean(v)
    }
}

/// One record of the cached table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Assigned by the store on insert; ignored on input
    pub id: RowId,

    /// One value per non-`id` column, in schema order
    pub values: Vec<Value>,
}

impl Row {
    /// Build a row that has not been assigned an id yet
    pub fn new(values: Vec<Value>) -> Self {
        Self { id: 0, values }
    }

    /// Build a row with a known id (bootstrap, tests)
    pub fn with_id(id: RowId, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    /// Value at a non-`id` column position
    pub fn value(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }
}
