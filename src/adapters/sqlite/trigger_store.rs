//! SQLite implementation of the TriggerStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Trigger;
use crate::domain::ports::TriggerStore;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteTriggerStore {
    pool: SqlitePool,
}

impl SqliteTriggerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_trigger(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Trigger> {
        Ok(Trigger {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            workflow_id: parse_uuid(row.get::<String, _>("workflow_id").as_str())?,
            config: serde_json::from_str(row.get::<String, _>("config").as_str())?,
            is_enabled: row.get::<i64, _>("is_enabled") != 0,
            last_fired_at: parse_optional_datetime(row.get("last_fired_at"))?,
            fire_count: row.get::<i64, _>("fire_count") as u64,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
        })
    }
}

#[async_trait]
impl TriggerStore for SqliteTriggerStore {
    async fn create_trigger(&self, trigger: &Trigger) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO triggers (id, workflow_id, trigger_type, config, is_enabled,
               last_fired_at, fire_count, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(trigger.id.to_string())
        .bind(trigger.workflow_id.to_string())
        .bind(trigger.config.type_str())
        .bind(serde_json::to_string(&trigger.config)?)
        .bind(i64::from(trigger.is_enabled))
        .bind(trigger.last_fired_at.map(|t| t.to_rfc3339()))
        .bind(trigger.fire_count as i64)
        .bind(trigger.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_trigger(&self, id: Uuid) -> DomainResult<Option<Trigger>> {
        let row = sqlx::query("SELECT * FROM triggers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_trigger).transpose()
    }

    async fn list_enabled(&self, trigger_type: &str) -> DomainResult<Vec<Trigger>> {
        let rows = sqlx::query(
            "SELECT * FROM triggers WHERE trigger_type = ? AND is_enabled = 1 ORDER BY created_at",
        )
        .bind(trigger_type)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_trigger).collect()
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<()> {
        let result = sqlx::query("UPDATE triggers SET is_enabled = ? WHERE id = ?")
            .bind(i64::from(enabled))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TriggerNotFound(id));
        }
        Ok(())
    }

    async fn record_fire(&self, id: Uuid, fired_at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE triggers SET fire_count = fire_count + 1, last_fired_at = ? WHERE id = ?",
        )
        .bind(fired_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TriggerNotFound(id));
        }
        Ok(())
    }

    async fn delete_trigger(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM triggers WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TriggerNotFound(id));
        }
        Ok(())
    }
}
