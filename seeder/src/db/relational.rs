//! Relational store writer
//!
//! Works against SQLite (default) or PostgreSQL depending on the crate
//! feature. Columns are looked up before every write so that fields the
//! target schema does not know are dropped instead of failing the row.

#[cfg(all(feature = "sqlite", feature = "postgres"))]
compile_error!("features `sqlite` and `postgres` are mutually exclusive");

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("one of the features `sqlite` or `postgres` must be enabled");

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::query::Query;
use tracing::{debug, info, warn};

#[cfg(feature = "sqlite")]
use sqlx::{Sqlite as Db, SqlitePool as Pool, sqlite::SqlitePoolOptions as PoolOptions};
#[cfg(feature = "postgres")]
use sqlx::{PgPool as Pool, Postgres as Db, postgres::PgPoolOptions as PoolOptions};

use super::{InsertSummary, Record, Store, Value, WriteError, filter_record, quote_ident};

type Args<'q> = <Db as sqlx::Database>::Arguments<'q>;

/// A column as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    /// Namespace of the column type, when the catalog reports one
    pub type_schema: Option<String>,
}

/// Schema-aware writer over a single-connection pool.
pub struct RelationalStore {
    pool: Pool,
    schema: String,
}

impl RelationalStore {
    /// Wrap an existing pool. `schema` is the namespace searched for tables
    /// (ignored by SQLite).
    pub fn new(pool: Pool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    /// Open the store. Writes are sequential, so one connection is enough.
    pub async fn connect(url: &str, schema: &str) -> Result<Self> {
        let pool = PoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .context("Failed to connect to relational store")?;

        info!(store = "relational", "Relational store connected");
        Ok(Self::new(pool, schema))
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!(store = "relational", "Relational store connection closed");
    }

    /// Columns of `table`, or `None` when the table does not exist.
    pub async fn table_columns(&self, table: &str) -> Result<Option<Vec<ColumnInfo>>, sqlx::Error> {
        if !self.table_exists(table).await? {
            return Ok(None);
        }
        self.fetch_columns(table).await.map(Some)
    }

    #[allow(dead_code)] // read path, only used when inspecting seeded data
    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool, sqlx::Error> {
        Ok(self
            .table_columns(table)
            .await?
            .is_some_and(|columns| columns.iter().any(|c| c.name == column)))
    }
}

// ============================================================================
// Dialect: SQLite
// ============================================================================

#[cfg(feature = "sqlite")]
impl RelationalStore {
    pub async fn table_exists(&self, table: &str) -> Result<bool, sqlx::Error> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;

        Ok(result.is_some())
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, type FROM pragma_table_info(?)")
                .bind(table)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| ColumnInfo {
                name,
                data_type: data_type.to_lowercase(),
                type_schema: None,
            })
            .collect())
    }

    fn qualified(_schema: &str, table: &str) -> String {
        quote_ident(table)
    }

    fn placeholder(_index: usize, _column: Option<&ColumnInfo>) -> String {
        "?".to_string()
    }
}

// ============================================================================
// Dialect: PostgreSQL
// ============================================================================

#[cfg(feature = "postgres")]
impl RelationalStore {
    pub async fn table_exists(&self, table: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, sqlx::Error> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT column_name::text, udt_name::text, udt_schema::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, type_schema)| ColumnInfo {
                name,
                data_type,
                type_schema,
            })
            .collect())
    }

    fn qualified(schema: &str, table: &str) -> String {
        format!("{}.{}", quote_ident(schema), quote_ident(table))
    }

    /// Parameters are cast to the column type so text-encoded identifiers
    /// and timestamps are accepted by `uuid` / `timestamptz` columns.
    /// User-defined types are qualified with their schema, which need not be
    /// on the search path.
    fn placeholder(index: usize, column: Option<&ColumnInfo>) -> String {
        let Some(c) = column else {
            return format!("${}", index);
        };
        match c.type_schema.as_deref() {
            Some(ns) if ns != "pg_catalog" => format!(
                "CAST(${} AS {}.{})",
                index,
                quote_ident(ns),
                quote_ident(&c.data_type)
            ),
            _ => format!("CAST(${} AS {})", index, quote_ident(&c.data_type)),
        }
    }
}

// ============================================================================
// Writes
// ============================================================================

/// `INSERT` statement for the columns of `record`, in record order.
fn insert_sql(schema: &str, table: &str, record: &Record, columns: &[ColumnInfo]) -> String {
    let column_list = record.columns().map(quote_ident).collect::<Vec<_>>().join(", ");
    let placeholders = record
        .columns()
        .enumerate()
        .map(|(i, name)| {
            RelationalStore::placeholder(i + 1, columns.iter().find(|c| c.name == name))
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        RelationalStore::qualified(schema, table),
        column_list,
        placeholders
    )
}

fn bind_value<'q>(query: Query<'q, Db, Args<'q>>, value: &Value) -> Query<'q, Db, Args<'q>> {
    match value {
        Value::Text(s) => query.bind(s.clone()),
        Value::Uuid(id) => query.bind(*id),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::Null => query.bind(None::<String>),
    }
}

fn is_integrity_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        ),
        _ => false,
    }
}

fn classify(table: &str, err: sqlx::Error) -> WriteError {
    if is_integrity_violation(&err) {
        WriteError::Integrity {
            table: table.to_string(),
            source: err.into(),
        }
    } else {
        WriteError::Write {
            table: table.to_string(),
            source: err.into(),
        }
    }
}

#[async_trait]
impl Store for RelationalStore {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn try_insert_row(
        &self,
        table: &str,
        record: &Record,
    ) -> Result<InsertSummary, WriteError> {
        let columns = self
            .table_columns(table)
            .await
            .map_err(|e| WriteError::Schema {
                table: table.to_string(),
                source: e.into(),
            })?
            .ok_or_else(|| {
                info!(store = "relational", table, "Table not found");
                WriteError::TableNotFound(table.to_string())
            })?;

        let existing: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        let (kept, dropped) = filter_record(self.name(), table, record, &existing)?;

        let sql = insert_sql(&self.schema, table, &kept, &columns);
        debug!(store = "relational", sql = %sql, "Inserting row");

        let mut query = sqlx::query(&sql);
        for value in kept.values() {
            query = bind_value(query, value);
        }

        let mut tx = self.pool.begin().await.map_err(|e| classify(table, e))?;
        match query.execute(&mut *tx).await {
            Ok(_) => {
                tx.commit().await.map_err(|e| classify(table, e))?;
                Ok(InsertSummary {
                    columns_written: kept.len(),
                    dropped_columns: dropped,
                })
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(store = "relational", table, error = %rollback, "Rollback failed");
                }
                Err(classify(table, e))
            }
        }
    }

    async fn get_column(&self, table: &str, column: &str) -> Vec<Value> {
        match self.column_exists(table, column).await {
            Ok(true) => {}
            Ok(false) => {
                info!(store = "relational", table, column, "Table or column not found");
                return Vec::new();
            }
            Err(e) => {
                warn!(store = "relational", table, error = %e, "Schema lookup failed");
                return Vec::new();
            }
        }

        let sql = format!(
            "SELECT CAST({} AS TEXT) FROM {}",
            quote_ident(column),
            Self::qualified(&self.schema, table)
        );
        match sqlx::query_scalar::<_, Option<String>>(&sql)
            .fetch_all(&self.pool)
            .await
        {
            Ok(values) => values
                .into_iter()
                .map(|v| v.map(Value::Text).unwrap_or(Value::Null))
                .collect(),
            Err(e) => {
                warn!(store = "relational", table, column, error = %e, "Read failed");
                Vec::new()
            }
        }
    }
}
