//! SQLite implementation of the CheckpointStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::Handle;
use crate::domain::models::{Checkpoint, CheckpointStatus};
use crate::domain::ports::CheckpointStore;

use super::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};

#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_checkpoint(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Checkpoint> {
        Ok(Checkpoint {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            execution_id: parse_optional_uuid(row.get("execution_id"))?,
            from_handle: row.get::<Option<String>, _>("from_handle").map(Handle::new),
            to_handle: Handle::new(row.get::<String, _>("to_handle")),
            summary: row.get("summary"),
            context: serde_json::from_str(row.get::<String, _>("context").as_str())?,
            status: CheckpointStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| DomainError::Serialization("bad checkpoint status".into()))?,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            decided_at: parse_optional_datetime(row.get("decided_at"))?,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO checkpoints (id, execution_id, from_handle, to_handle, summary,
               context, status, created_at, decided_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(checkpoint.id.to_string())
        .bind(checkpoint.execution_id.map(|id| id.to_string()))
        .bind(checkpoint.from_handle.as_ref().map(|h| h.as_str().to_string()))
        .bind(checkpoint.to_handle.as_str())
        .bind(&checkpoint.summary)
        .bind(serde_json::to_string(&checkpoint.context)?)
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.created_at.to_rfc3339())
        .bind(checkpoint.decided_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_checkpoint(&self, id: Uuid) -> DomainResult<Option<Checkpoint>> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    async fn list_pending_for(&self, handle: &Handle) -> DomainResult<Vec<Checkpoint>> {
        let rows = sqlx::query(
            "SELECT * FROM checkpoints WHERE to_handle = ? AND status = 'pending' ORDER BY created_at",
        )
        .bind(handle.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_checkpoint).collect()
    }

    async fn decide_checkpoint(
        &self,
        id: Uuid,
        status: CheckpointStatus,
    ) -> DomainResult<Checkpoint> {
        let checkpoint = self
            .get_checkpoint(id)
            .await?
            .ok_or(DomainError::CheckpointNotFound(id))?;
        if checkpoint.status != CheckpointStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: checkpoint.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        sqlx::query("UPDATE checkpoints SET status = ?, decided_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        self.get_checkpoint(id)
            .await?
            .ok_or(DomainError::CheckpointNotFound(id))
    }
}
