//! Wide-column store writer (Cassandra / ScyllaDB)
//!
//! Column existence is answered from the driver's cluster metadata for the
//! session keyspace. Each insert is a single CQL statement, so there is no
//! partial row to undo when it fails.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::value::{CqlTimestamp, CqlValue, Row};
use tracing::{debug, info, warn};

use super::{InsertSummary, Record, Store, Value, WriteError, filter_record, quote_ident};
use crate::config::WideColumnConfig;

/// Rows read back for a set of columns. `columns` lists only the requested
/// columns that exist, in the order they were requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub struct WideColumnStore {
    session: Session,
    keyspace: String,
}

impl WideColumnStore {
    /// Connect to the cluster and switch the session to the configured keyspace.
    pub async fn connect(config: &WideColumnConfig) -> Result<Self> {
        let mut builder = SessionBuilder::new().known_node(config.contact_point());
        if let Some(user) = &config.user {
            builder = builder.user(user, config.password.as_deref().unwrap_or_default());
        }

        let session = builder
            .build()
            .await
            .context("Failed to connect to wide-column store")?;
        session
            .use_keyspace(&config.keyspace, true)
            .await
            .with_context(|| format!("Failed to use keyspace {}", config.keyspace))?;

        info!(
            store = "wide_column",
            keyspace = %config.keyspace,
            "Wide-column store connected"
        );
        Ok(Self {
            session,
            keyspace: config.keyspace.clone(),
        })
    }

    /// Column names of `table`, or `None` when the table is not in the keyspace.
    pub fn table_columns(&self, table: &str) -> Option<HashSet<String>> {
        let cluster = self.session.get_cluster_state();
        let keyspace = cluster.get_keyspace(&self.keyspace)?;
        keyspace
            .tables
            .get(table)
            .map(|t| t.columns.keys().cloned().collect())
    }

    /// Read the requested columns of every row. Columns that do not exist are
    /// skipped; a missing table or failed read yields no rows.
    pub async fn get_rows(&self, table: &str, columns: &[&str]) -> Rows {
        let Some(existing) = self.table_columns(table) else {
            info!(store = "wide_column", table, "Table not found");
            return Rows::default();
        };
        let selected = existing_columns(columns, &existing);
        if selected.is_empty() {
            info!(store = "wide_column", table, "No requested column exists");
            return Rows::default();
        }

        let cql = select_cql(&self.keyspace, table, &selected);
        let rows = match self.fetch(&cql).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(store = "wide_column", table, error = %e, "Read failed");
                return Rows::default();
            }
        };

        Rows {
            columns: selected,
            rows: rows
                .into_iter()
                .map(|row| row.columns.into_iter().map(from_cql).collect())
                .collect(),
        }
    }

    async fn fetch(&self, cql: &str) -> Result<Vec<Row>> {
        let result = self.session.query_unpaged(cql, ()).await?;
        let rows = result.into_rows_result()?;
        let rows = rows.rows::<Row>()?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn close(self) {
        drop(self.session);
        info!(store = "wide_column", "Wide-column store session closed");
    }
}

#[async_trait]
impl Store for WideColumnStore {
    fn name(&self) -> &'static str {
        "wide_column"
    }

    async fn try_insert_row(
        &self,
        table: &str,
        record: &Record,
    ) -> Result<InsertSummary, WriteError> {
        let existing = self.table_columns(table).ok_or_else(|| {
            info!(store = "wide_column", table, "Table not found");
            WriteError::TableNotFound(table.to_string())
        })?;
        let (kept, dropped) = filter_record(self.name(), table, record, &existing)?;

        let columns: Vec<String> = kept.columns().map(str::to_string).collect();
        let cql = insert_cql(&self.keyspace, table, &columns);
        let values: Vec<Option<CqlValue>> = kept.values().map(to_cql).collect();
        debug!(store = "wide_column", cql = %cql, "Inserting row");

        self.session
            .query_unpaged(cql, values)
            .await
            .map_err(|e| WriteError::Write {
                table: table.to_string(),
                source: e.into(),
            })?;

        Ok(InsertSummary {
            columns_written: kept.len(),
            dropped_columns: dropped,
        })
    }

    async fn get_column(&self, table: &str, column: &str) -> Vec<Value> {
        let rows = self.get_rows(table, &[column]).await;
        rows.rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect()
    }
}

// ============================================================================
// CQL helpers
// ============================================================================

/// The requested names that exist on the table, in request order.
pub(crate) fn existing_columns(requested: &[&str], existing: &HashSet<String>) -> Vec<String> {
    requested
        .iter()
        .filter(|c| existing.contains(**c))
        .map(|c| c.to_string())
        .collect()
}

fn table_ref(keyspace: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(keyspace), quote_ident(table))
}

pub(crate) fn insert_cql(keyspace: &str, table: &str, columns: &[String]) -> String {
    let names = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let markers = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_ref(keyspace, table),
        names,
        markers
    )
}

pub(crate) fn select_cql(keyspace: &str, table: &str, columns: &[String]) -> String {
    let names = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", names, table_ref(keyspace, table))
}

/// `None` is bound as a CQL null.
pub(crate) fn to_cql(value: &Value) -> Option<CqlValue> {
    match value {
        Value::Text(s) => Some(CqlValue::Text(s.clone())),
        Value::Uuid(id) => Some(CqlValue::Uuid(*id)),
        Value::Timestamp(ts) => Some(CqlValue::Timestamp(CqlTimestamp(
            ts.and_utc().timestamp_millis(),
        ))),
        Value::Null => None,
    }
}

pub(crate) fn from_cql(value: Option<CqlValue>) -> Value {
    match value {
        None => Value::Null,
        Some(CqlValue::Text(s)) | Some(CqlValue::Ascii(s)) => Value::Text(s),
        Some(CqlValue::Uuid(id)) => Value::Uuid(id),
        Some(CqlValue::Timestamp(CqlTimestamp(ms))) => DateTime::from_timestamp_millis(ms)
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .unwrap_or(Value::Null),
        Some(other) => Value::Text(format!("{:?}", other)),
    }
}
