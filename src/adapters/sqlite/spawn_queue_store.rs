//! SQLite implementation of the SpawnQueueStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::{Handle, SwarmId};
use crate::domain::models::{MessagePriority, SpawnRequest, SpawnStatus};
use crate::domain::ports::SpawnQueueStore;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteSpawnQueueStore {
    pool: SqlitePool,
}

impl SqliteSpawnQueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> DomainResult<SpawnRequest> {
        Ok(SpawnRequest {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            requester_handle: Handle::new(row.get::<String, _>("requester_handle")),
            target_agent_type: row.get("target_agent_type"),
            task: row.get("task"),
            swarm_id: row.get::<Option<String>, _>("swarm_id").map(SwarmId::new),
            priority: MessagePriority::from_str(row.get::<String, _>("priority").as_str())
                .ok_or_else(|| DomainError::Serialization("bad priority".into()))?,
            depth_level: row.get::<i64, _>("depth_level") as u32,
            parent_handle: row.get::<Option<String>, _>("parent_handle").map(Handle::new),
            depends_on: BTreeSet::new(),
            status: SpawnStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| DomainError::Serialization("bad spawn status".into()))?,
            reason: row.get("reason"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            decided_at: parse_optional_datetime(row.get("decided_at"))?,
        })
    }

    async fn load_deps(&self, request_id: Uuid) -> DomainResult<BTreeSet<Uuid>> {
        let rows = sqlx::query("SELECT depends_on_id FROM spawn_request_deps WHERE request_id = ?")
            .bind(request_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| parse_uuid(row.get::<String, _>("depends_on_id").as_str()))
            .collect()
    }
}

#[async_trait]
impl SpawnQueueStore for SqliteSpawnQueueStore {
    async fn create_request(&self, request: &SpawnRequest) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO spawn_requests (id, requester_handle, target_agent_type, task,
               swarm_id, priority, depth_level, parent_handle, status, reason, created_at, decided_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(request.id.to_string())
        .bind(request.requester_handle.as_str())
        .bind(&request.target_agent_type)
        .bind(&request.task)
        .bind(request.swarm_id.as_ref().map(|s| s.as_str().to_string()))
        .bind(request.priority.as_str())
        .bind(request.depth_level as i64)
        .bind(request.parent_handle.as_ref().map(|h| h.as_str().to_string()))
        .bind(request.status.as_str())
        .bind(&request.reason)
        .bind(request.created_at.to_rfc3339())
        .bind(request.decided_at.map(|t| t.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        for dep in &request.depends_on {
            sqlx::query(
                "INSERT OR IGNORE INTO spawn_request_deps (request_id, depends_on_id) VALUES (?, ?)",
            )
            .bind(request.id.to_string())
            .bind(dep.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> DomainResult<Option<SpawnRequest>> {
        let row = sqlx::query("SELECT * FROM spawn_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let mut request = Self::row_to_request(&row)?;
                request.depends_on = self.load_deps(request.id).await?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        status: SpawnStatus,
        reason: Option<&str>,
    ) -> DomainResult<SpawnRequest> {
        let decided_at = status.is_terminal().then(|| Utc::now().to_rfc3339());
        let result = sqlx::query(
            "UPDATE spawn_requests SET status = ?, reason = COALESCE(?, reason), decided_at = COALESCE(?, decided_at) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(decided_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::SpawnRequestNotFound(id));
        }
        self.get_request(id)
            .await?
            .ok_or(DomainError::SpawnRequestNotFound(id))
    }

    async fn list_by_status(&self, status: SpawnStatus) -> DomainResult<Vec<SpawnRequest>> {
        let rows = sqlx::query("SELECT * FROM spawn_requests WHERE status = ? ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut request = Self::row_to_request(row)?;
            request.depends_on = self.load_deps(request.id).await?;
            requests.push(request);
        }
        Ok(requests)
    }

    async fn count_by_status(&self, status: SpawnStatus) -> DomainResult<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spawn_requests WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 as u64)
    }
}
