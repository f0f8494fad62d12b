//! Store access for the seeder
//!
//! Both targets are wrapped in a schema-aware writer: a record is filtered
//! down to the columns that exist on the target table before it is written,
//! and a failed write is reported without leaving a partial row behind.

#[cfg(test)]
pub mod memory;
pub mod relational;
pub mod wide_column;

use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use relational::RelationalStore;
pub use wide_column::WideColumnStore;

pub type BoxError = Box<dyn StdError + Send + Sync>;

// ============================================================================
// Records
// ============================================================================

/// A single field value. Only the shapes the chat domain needs are modelled.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
    Null,
}

impl Value {
    #[cfg(test)]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Uuid(id) => write!(f, "{}", id),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::Null => f.write_str("NULL"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Value::Uuid(id)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

/// Column name to value mapping, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an earlier value for the same column.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    /// Append the fields of `other`; its values win on shared columns.
    pub fn merge(mut self, other: Record) -> Self {
        for (name, value) in other.fields {
            self.set(&name, value);
        }
        self
    }

    #[cfg(test)]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Split the record into the fields whose column exists on the target
    /// and the names of the columns that do not.
    pub fn retain_columns(&self, existing: &HashSet<String>) -> (Record, Vec<String>) {
        let mut kept = Record::new();
        let mut dropped = Vec::new();
        for (name, value) in &self.fields {
            if existing.contains(name) {
                kept.fields.push((name.clone(), value.clone()));
            } else {
                dropped.push(name.clone());
            }
        }
        (kept, dropped)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a row did not make it into a store.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("none of the record's columns exist on table {0}")]
    NoMatchingColumns(String),

    #[error("schema lookup for {table} failed: {source}")]
    Schema {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("integrity violation writing to {table}: {source}")]
    Integrity {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("write to {table} failed: {source}")]
    Write {
        table: String,
        #[source]
        source: BoxError,
    },
}

impl WriteError {
    /// Short classification used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteError::TableNotFound(_) | WriteError::NoMatchingColumns(_) => "schema_mismatch",
            WriteError::Schema { .. } => "schema_lookup",
            WriteError::Integrity { .. } => "integrity",
            WriteError::Write { .. } => "unclassified",
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub columns_written: usize,
    pub dropped_columns: Vec<String>,
}

// ============================================================================
// Store
// ============================================================================

/// A schema-aware write target.
#[async_trait]
pub trait Store: Send + Sync {
    /// Name used in log fields ("relational", "wide_column", ...).
    fn name(&self) -> &'static str;

    /// Write one row, keeping only the columns that exist on `table`.
    async fn try_insert_row(&self, table: &str, record: &Record)
    -> Result<InsertSummary, WriteError>;

    /// All values of `column` across the rows of `table`. Empty when the
    /// table or column does not exist.
    #[allow(dead_code)] // the seeding run only writes
    async fn get_column(&self, table: &str, column: &str) -> Vec<Value>;

    /// Write one row and log the outcome. Returns false if nothing was written.
    async fn insert_row(&self, table: &str, record: &Record) -> bool {
        match self.try_insert_row(table, record).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    store = self.name(),
                    table = table,
                    kind = e.kind(),
                    error = %e,
                    "Row write failed"
                );
                false
            }
        }
    }
}

/// Filter `record` against the columns of `table` and log every dropped field.
pub(crate) fn filter_record(
    store: &'static str,
    table: &str,
    record: &Record,
    existing: &HashSet<String>,
) -> Result<(Record, Vec<String>), WriteError> {
    let (kept, dropped) = record.retain_columns(existing);
    for column in &dropped {
        info!(store, table, column = %column, "Column not found, dropping field");
    }
    if kept.is_empty() {
        return Err(WriteError::NoMatchingColumns(table.to_string()));
    }
    Ok((kept, dropped))
}

/// Double-quote an identifier for SQL/CQL, escaping embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn columns(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_record_set_replaces_existing_column() {
        let record = Record::new().with("name", "a").with("name", "b");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("name"), Some(&Value::from("b")));
    }

    #[test]
    fn test_retain_columns_drops_only_unknown() {
        let record = Record::new()
            .with("user_id", "1")
            .with("nickname", "x")
            .with("email", "a@b.c");
        let (kept, dropped) = record.retain_columns(&columns(&["user_id", "email"]));

        assert_eq!(kept.columns().collect::<Vec<_>>(), vec!["user_id", "email"]);
        assert_eq!(dropped, vec!["nickname".to_string()]);
    }

    #[test]
    fn test_filter_record_with_no_matching_columns() {
        let record = Record::new().with("nickname", "x");
        let result = filter_record("test", "users", &record, &columns(&["user_id"]));
        assert_matches!(result, Err(WriteError::NoMatchingColumns(t)) if t == "users");
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_write_error_kind() {
        assert_eq!(WriteError::TableNotFound("t".into()).kind(), "schema_mismatch");
        let err = WriteError::Integrity {
            table: "t".into(),
            source: "dup".into(),
        };
        assert_eq!(err.kind(), "integrity");
    }
}
