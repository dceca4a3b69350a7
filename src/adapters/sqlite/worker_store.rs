//! SQLite implementation of the WorkerStore.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::{Handle, SwarmId, TeamName};
use crate::domain::models::{SpawnMode, Worker, WorkerHealth, WorkerState};
use crate::domain::ports::WorkerStore;

use super::{parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteWorkerStore {
    pool: SqlitePool,
}

impl SqliteWorkerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Worker> {
        Ok(Worker {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            handle: Handle::new(row.get::<String, _>("handle")),
            team_name: TeamName::new(row.get::<String, _>("team_name")),
            swarm_id: row.get::<Option<String>, _>("swarm_id").map(SwarmId::new),
            state: WorkerState::from_str(row.get::<String, _>("state").as_str())
                .ok_or_else(|| DomainError::Serialization("bad worker state".into()))?,
            health: WorkerHealth::from_str(row.get::<String, _>("health").as_str())
                .ok_or_else(|| DomainError::Serialization("bad worker health".into()))?,
            spawn_mode: SpawnMode::from_str(row.get::<String, _>("spawn_mode").as_str())
                .ok_or_else(|| DomainError::Serialization("bad spawn mode".into()))?,
            depth_level: row.get::<i64, _>("depth_level") as u32,
            parent_handle: row.get::<Option<String>, _>("parent_handle").map(Handle::new),
            pid: row.get::<Option<i64>, _>("pid").map(|p| p as u32),
            restart_count: row.get::<i64, _>("restart_count") as u32,
            last_heartbeat: parse_datetime(row.get::<String, _>("last_heartbeat").as_str())?,
            spawned_at: parse_datetime(row.get::<String, _>("spawned_at").as_str())?,
        })
    }
}

#[async_trait]
impl WorkerStore for SqliteWorkerStore {
    async fn upsert_worker(&self, worker: &Worker) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO workers (id, handle, team_name, swarm_id, state, health, spawn_mode,
               depth_level, parent_handle, pid, restart_count, last_heartbeat, spawned_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (team_name, handle) DO UPDATE SET
                   id = excluded.id,
                   swarm_id = excluded.swarm_id,
                   state = excluded.state,
                   health = excluded.health,
                   spawn_mode = excluded.spawn_mode,
                   depth_level = excluded.depth_level,
                   parent_handle = excluded.parent_handle,
                   pid = excluded.pid,
                   restart_count = excluded.restart_count,
                   last_heartbeat = excluded.last_heartbeat,
                   spawned_at = excluded.spawned_at"#,
        )
        .bind(worker.id.to_string())
        .bind(worker.handle.as_str())
        .bind(worker.team_name.as_str())
        .bind(worker.swarm_id.as_ref().map(|s| s.as_str().to_string()))
        .bind(worker.state.as_str())
        .bind(worker.health.as_str())
        .bind(worker.spawn_mode.as_str())
        .bind(worker.depth_level as i64)
        .bind(worker.parent_handle.as_ref().map(|h| h.as_str().to_string()))
        .bind(worker.pid.map(|p| p as i64))
        .bind(worker.restart_count as i64)
        .bind(worker.last_heartbeat.to_rfc3339())
        .bind(worker.spawned_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_worker(&self, team: &TeamName, handle: &Handle) -> DomainResult<Option<Worker>> {
        let row = sqlx::query("SELECT * FROM workers WHERE team_name = ? AND handle = ?")
            .bind(team.as_str())
            .bind(handle.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_worker).transpose()
    }

    async fn list_by_team(&self, team: &TeamName) -> DomainResult<Vec<Worker>> {
        let rows = sqlx::query("SELECT * FROM workers WHERE team_name = ? ORDER BY spawned_at")
            .bind(team.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn list_by_swarm(&self, swarm: &SwarmId) -> DomainResult<Vec<Worker>> {
        let rows = sqlx::query("SELECT * FROM workers WHERE swarm_id = ? ORDER BY spawned_at")
            .bind(swarm.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn list_live(&self) -> DomainResult<Vec<Worker>> {
        let rows = sqlx::query("SELECT * FROM workers WHERE state != 'dismissed' ORDER BY spawned_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn remove_worker(&self, team: &TeamName, handle: &Handle) -> DomainResult<()> {
        sqlx::query("DELETE FROM workers WHERE team_name = ? AND handle = ?")
            .bind(team.as_str())
            .bind(handle.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
