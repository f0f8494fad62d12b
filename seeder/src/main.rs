//! Chat seeder - fills a relational and a wide-column store with
//! referentially consistent fake chat data.
//!
//! Configuration comes from the environment (see `config`). The run is
//! strictly sequential: users, chats, memberships, messages, attachments,
//! message-attachment links.

mod config;
mod db;
mod seed;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::{RelationalStore, WideColumnStore};
use crate::seed::Seeder;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_seeder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        seed_count = config.seed_count,
        keyspace = %config.wide_column.keyspace,
        "Starting chat seeder"
    );

    // Connection failures abort the run.
    let relational = RelationalStore::connect(&config.database_url, &config.database_schema).await?;
    let wide = WideColumnStore::connect(&config.wide_column).await?;

    let rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (_, report) = Seeder::new(&relational, &wide, config.seed_count, rng)
        .run()
        .await;
    report.log_summary();

    relational.close().await;
    wide.close().await;

    Ok(())
}
