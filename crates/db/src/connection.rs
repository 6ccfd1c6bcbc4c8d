//! SQLite pool construction for the sync subsystem.
//!
//! Every connection gets the same pragma set: WAL so dispatch passes and
//! admin reads can overlap, foreign keys on, and a busy timeout so the
//! claim UPDATE backs off under write contention instead of failing.

use std::time::Duration;

use kirana_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT_MS: u32 = 5_000;

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                let pragmas = [
                    "PRAGMA journal_mode = WAL".to_string(),
                    "PRAGMA foreign_keys = ON".to_string(),
                    format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"),
                ];
                for pragma in pragmas {
                    sqlx::query(&pragma).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
