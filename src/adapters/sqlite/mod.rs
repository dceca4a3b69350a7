//! SQLite adapters for the armada coordination core.

pub mod blackboard_store;
pub mod checkpoint_store;
pub mod mail_store;
pub mod migrations;
pub mod spawn_queue_store;
pub mod task_store;
pub mod trigger_store;
pub mod work_item_store;
pub mod worker_store;
pub mod workflow_store;

pub use blackboard_store::SqliteBlackboardStore;
pub use checkpoint_store::SqliteCheckpointStore;
pub use mail_store::SqliteMailStore;
pub use migrations::{apply_migrations, schema_version};
pub use spawn_queue_store::SqliteSpawnQueueStore;
pub use task_store::SqliteTaskStore;
pub use trigger_store::SqliteTriggerStore;
pub use work_item_store::SqliteWorkItemStore;
pub use worker_store::SqliteWorkerStore;
pub use workflow_store::SqliteWorkflowStore;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::services::config::DatabaseConfig;

/// Open the configured database file, creating it and its parent directory
/// on first use. WAL mode, foreign keys on, 30 s busy timeout. The pool is
/// pinged once before it is handed out.
pub async fn connect(config: &DatabaseConfig) -> DomainResult<SqlitePool> {
    let path = Path::new(&config.path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DomainError::Database(format!("create {}: {e}", parent.display()))
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;
    sqlx::query("SELECT 1").fetch_one(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory pool for tests.
pub async fn connect_memory() -> DomainResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| DomainError::Database(e.to_string()))?
        .shared_cache(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Open the configured database and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DomainResult<SqlitePool> {
    let pool = connect(config).await?;
    migrations::apply_migrations(&pool).await?;
    Ok(pool)
}

/// In-memory pool with the full schema applied, for tests.
pub async fn create_migrated_test_pool() -> DomainResult<SqlitePool> {
    let pool = connect_memory().await?;
    migrations::apply_migrations(&pool).await?;
    Ok(pool)
}

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::Serialization(e.to_string()))
}

/// Parse an optional UUID string from a SQLite row field.
pub fn parse_optional_uuid(s: Option<String>) -> DomainResult<Option<Uuid>> {
    s.map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| DomainError::Serialization(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::Serialization(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| DomainError::Serialization(e.to_string()))
}
