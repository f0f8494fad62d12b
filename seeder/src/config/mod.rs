//! Seeder configuration management

use std::env;

use anyhow::{Context, Result};

/// Wide-column store connection settings
#[derive(Debug, Clone)]
pub struct WideColumnConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub keyspace: String,
}

impl WideColumnConfig {
    pub fn contact_point(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Seeder configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of users, chats and attachments to create (messages are 3x)
    pub seed_count: usize,

    /// Optional seed for the random source, for reproducible runs
    pub rng_seed: Option<u64>,

    /// Relational store URL (PostgreSQL) or SQLite connection string
    pub database_url: String,

    /// Schema searched for tables (PostgreSQL only)
    pub database_schema: String,

    pub wide_column: WideColumnConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let seed_count: usize = lookup("SEED_COUNT")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("Invalid SEED_COUNT")?;

        let rng_seed = lookup("SEED_RNG")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("Invalid SEED_RNG")?;

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => relational_url(&lookup)?,
        };

        let wide_column = WideColumnConfig {
            host: lookup("CASSANDRA_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: lookup("CASSANDRA_PORT")
                .unwrap_or_else(|| "9042".to_string())
                .parse()
                .context("Invalid CASSANDRA_PORT")?,
            user: lookup("CASSANDRA_USER"),
            password: lookup("CASSANDRA_PASSWORD"),
            keyspace: lookup("CASSANDRA_DB").context("CASSANDRA_DB is required")?,
        };

        Ok(Self {
            seed_count,
            rng_seed,
            database_url,
            database_schema: lookup("POSTGRES_SCHEMA").unwrap_or_else(|| "public".to_string()),
            wide_column,
        })
    }
}

/// Build the SQLite connection string, creating the file if it is missing.
#[cfg(feature = "sqlite")]
fn relational_url<F>(lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let path = lookup("DATABASE_PATH").unwrap_or_else(|| "./data/seed.db".to_string());
    Ok(format!("sqlite:{}?mode=rwc", path))
}

/// Build the PostgreSQL URL from its parts.
#[cfg(feature = "postgres")]
fn relational_url<F>(lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string());
    let port: u16 = lookup("POSTGRES_PORT")
        .unwrap_or_else(|| "5432".to_string())
        .parse()
        .context("Invalid POSTGRES_PORT")?;
    let db = lookup("POSTGRES_DB").context("POSTGRES_DB is required")?;
    let user = lookup("POSTGRES_USER").context("POSTGRES_USER is required")?;
    let password = lookup("POSTGRES_PASSWORD").unwrap_or_default();

    Ok(format!(
        "postgres://{}:{}@{}:{}/{}",
        urlencoding::encode(&user),
        urlencoding::encode(&password),
        host,
        port,
        urlencoding::encode(&db)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("CASSANDRA_DB", "chat"),
        ]))
        .unwrap();
        assert_eq!(config.seed_count, 10);
        assert_eq!(config.rng_seed, None);
        assert_eq!(config.database_schema, "public");
        assert_eq!(config.wide_column.contact_point(), "localhost:9042");
        assert_eq!(config.wide_column.keyspace, "chat");
        assert!(config.wide_column.user.is_none());
    }

    #[test]
    fn test_explicit_values() {
        let config = Config::from_lookup(lookup(&[
            ("SEED_COUNT", "3"),
            ("SEED_RNG", "42"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("CASSANDRA_HOST", "scylla"),
            ("CASSANDRA_PORT", "19042"),
            ("CASSANDRA_USER", "cassandra"),
            ("CASSANDRA_PASSWORD", "secret"),
            ("CASSANDRA_DB", "chat"),
        ]))
        .unwrap();

        assert_eq!(config.seed_count, 3);
        assert_eq!(config.rng_seed, Some(42));
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.wide_column.contact_point(), "scylla:19042");
        assert_eq!(config.wide_column.user.as_deref(), Some("cassandra"));
        assert_eq!(config.wide_column.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_keyspace_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_seed_count_zero_is_allowed() {
        let config = Config::from_lookup(lookup(&[
            ("SEED_COUNT", "0"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("CASSANDRA_DB", "chat"),
        ]))
        .unwrap();
        assert_eq!(config.seed_count, 0);
    }

    #[test]
    fn test_rejects_bad_seed_count() {
        for bad in ["many", "-1", ""] {
            let vars = lookup(&[("SEED_COUNT", bad), ("CASSANDRA_DB", "chat")]);
            assert!(Config::from_lookup(vars).is_err(), "{:?}", bad);
        }
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_url_from_path() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_PATH", "/tmp/fixtures.db"),
            ("CASSANDRA_DB", "chat"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite:/tmp/fixtures.db?mode=rwc");
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_postgres_url_from_parts() {
        let config = Config::from_lookup(lookup(&[
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_DB", "chat"),
            ("POSTGRES_USER", "app"),
            ("POSTGRES_PASSWORD", "p@ss word"),
            ("CASSANDRA_DB", "chat"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://app:p%40ss%20word@db:5432/chat");
    }
}
