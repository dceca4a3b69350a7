//! SQLite implementation of the TaskStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::{Handle, TeamName, Uid};
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::TaskStore;

use super::{parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_blockers(&self, task_id: Uuid) -> DomainResult<BTreeSet<Uuid>> {
        let rows = sqlx::query("SELECT blocked_by_id FROM task_blockers WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| parse_uuid(row.get::<String, _>("blocked_by_id").as_str()))
            .collect()
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Task> {
        let status = TaskStatus::from_str(row.get::<String, _>("status").as_str())
            .ok_or_else(|| DomainError::Serialization("bad task status".into()))?;
        Ok(Task {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            team_name: TeamName::new(row.get::<String, _>("team_name")),
            owner_handle: Handle::new(row.get::<String, _>("owner_handle")),
            owner_uid: Uid::from_stored(row.get::<String, _>("owner_uid")),
            created_by_handle: Handle::new(row.get::<String, _>("created_by_handle")),
            created_by_uid: Uid::from_stored(row.get::<String, _>("created_by_uid")),
            subject: row.get("subject"),
            description: row.get("description"),
            status,
            blocked_by: BTreeSet::new(),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            updated_at: parse_datetime(row.get::<String, _>("updated_at").as_str())?,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(&self, task: &Task) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO tasks (id, team_name, owner_handle, owner_uid, created_by_handle,
               created_by_uid, subject, description, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.team_name.as_str())
        .bind(task.owner_handle.as_str())
        .bind(task.owner_uid.as_str())
        .bind(task.created_by_handle.as_str())
        .bind(task.created_by_uid.as_str())
        .bind(&task.subject)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for blocker in &task.blocked_by {
            sqlx::query("INSERT OR IGNORE INTO task_blockers (task_id, blocked_by_id) VALUES (?, ?)")
                .bind(task.id.to_string())
                .bind(blocker.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let mut task = Self::row_to_task(&row)?;
                task.blocked_by = self.load_blockers(task.id).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn list_tasks_by_team(&self, team: &TeamName) -> DomainResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE team_name = ? ORDER BY created_at DESC")
            .bind(team.as_str())
            .fetch_all(&self.pool)
            .await?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut task = Self::row_to_task(row)?;
            task.blocked_by = self.load_blockers(task.id).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> DomainResult<Task> {
        let mut task = self
            .get_task(id)
            .await?
            .ok_or(DomainError::TaskNotFound(id))?;

        if status == TaskStatus::Resolved {
            let mut unresolved = Vec::new();
            for blocker_id in &task.blocked_by {
                let blocker = self
                    .get_task(*blocker_id)
                    .await?
                    .ok_or(DomainError::TaskNotFound(*blocker_id))?;
                if blocker.status != TaskStatus::Resolved {
                    unresolved.push(*blocker_id);
                }
            }
            if !unresolved.is_empty() {
                return Err(DomainError::BlockedByUnresolved {
                    task_id: id,
                    blocked_by: unresolved,
                });
            }
        }

        task.status = status;
        task.updated_at = Utc::now();
        sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(task.status.as_str())
            .bind(task.updated_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(task)
    }

    async fn add_blockers(&self, id: Uuid, blocked_by: &[Uuid]) -> DomainResult<()> {
        if self.get_task(id).await?.is_none() {
            return Err(DomainError::TaskNotFound(id));
        }
        for blocker in blocked_by {
            sqlx::query("INSERT OR IGNORE INTO task_blockers (task_id, blocked_by_id) VALUES (?, ?)")
                .bind(id.to_string())
                .bind(blocker.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
