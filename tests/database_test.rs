//! Tests for database initialization and migrations.

use armada::adapters::sqlite::{apply_migrations, initialize_database, schema_version};
use armada::services::config::DatabaseConfig;

#[tokio::test]
async fn initialize_creates_the_file_and_applies_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("armada.db");
    let config = DatabaseConfig { path: db_path.display().to_string(), max_connections: 2 };

    let pool = initialize_database(&config).await.unwrap();
    assert!(db_path.exists());
    assert_eq!(schema_version(&pool).await.unwrap(), 2);

    // Already up to date: nothing further to apply.
    assert_eq!(apply_migrations(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn schema_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("armada.db").display().to_string(),
        max_connections: 1,
    };

    let first = initialize_database(&config).await.unwrap();
    first.close().await;

    let second = initialize_database(&config).await.unwrap();
    assert_eq!(schema_version(&second).await.unwrap(), 2);
}
