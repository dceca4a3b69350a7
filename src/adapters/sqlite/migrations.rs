//! Embedded schema migrations.
//!
//! The schema version lives in SQLite's `user_version` pragma rather than a
//! bookkeeping table. Each entry runs as one script and bumps the pragma;
//! entries are append-only once shipped.

use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};

/// Ordered migration scripts.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../../migrations/001_initial_schema.sql")),
    (2, include_str!("../../../migrations/002_workflow_schema.sql")),
];

/// The schema version recorded in the database.
pub async fn schema_version(pool: &SqlitePool) -> DomainResult<i64> {
    let (version,): (i64,) = sqlx::query_as("PRAGMA user_version").fetch_one(pool).await?;
    Ok(version)
}

/// Apply every migration newer than the database's recorded version.
/// Returns the number of scripts applied; zero means already up to date.
pub async fn apply_migrations(pool: &SqlitePool) -> DomainResult<usize> {
    let current = schema_version(pool).await?;
    let mut applied = 0;
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|e| DomainError::Database(format!("migration {version} failed: {e}")))?;
        sqlx::query(&format!("PRAGMA user_version = {version}"))
            .execute(pool)
            .await
            .map_err(|e| {
                DomainError::Database(format!("migration {version} version stamp failed: {e}"))
            })?;
        applied += 1;
    }
    Ok(applied)
}
