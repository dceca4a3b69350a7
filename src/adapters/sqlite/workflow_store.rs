//! SQLite implementation of the WorkflowStore.
//!
//! Step configs persist as the tagged JSON produced by the `StepConfig`
//! enum, so a row round-trips into exactly the variant the dispatcher
//! matches on.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::SwarmId;
use crate::domain::models::{
    Execution, ExecutionStatus, OnFailure, Step, StepStatus, StepType, Workflow,
};
use crate::domain::ports::WorkflowStore;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteWorkflowStore {
    pool: SqlitePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_workflow(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Workflow> {
        Ok(Workflow {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            name: row.get("name"),
            version: row.get::<i64, _>("version") as u32,
            definition: serde_json::from_str(row.get::<String, _>("definition").as_str())?,
            is_template: row.get::<i64, _>("is_template") != 0,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            updated_at: parse_datetime(row.get::<String, _>("updated_at").as_str())?,
        })
    }

    fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Execution> {
        Ok(Execution {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            workflow_id: parse_uuid(row.get::<String, _>("workflow_id").as_str())?,
            swarm_id: row.get::<Option<String>, _>("swarm_id").map(SwarmId::new),
            status: ExecutionStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| DomainError::Serialization("bad execution status".into()))?,
            context: serde_json::from_str(row.get::<String, _>("context").as_str())?,
            error: row.get("error"),
            created_by: row.get("created_by"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            started_at: parse_optional_datetime(row.get("started_at"))?,
            completed_at: parse_optional_datetime(row.get("completed_at"))?,
        })
    }

    fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Step> {
        let depends_on: BTreeSet<String> =
            serde_json::from_str(row.get::<String, _>("depends_on").as_str())?;
        Ok(Step {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            execution_id: parse_uuid(row.get::<String, _>("execution_id").as_str())?,
            step_key: row.get("step_key"),
            step_type: StepType::from_str(row.get::<String, _>("step_type").as_str())
                .ok_or_else(|| DomainError::Serialization("bad step type".into()))?,
            status: StepStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| DomainError::Serialization("bad step status".into()))?,
            config: serde_json::from_str(row.get::<String, _>("config").as_str())?,
            depends_on,
            blocked_by_count: row.get::<i64, _>("blocked_by_count") as u32,
            guard: row.get("guard"),
            on_failure: OnFailure::from_str(row.get::<String, _>("on_failure").as_str())
                .ok_or_else(|| DomainError::Serialization("bad on_failure".into()))?,
            output: row
                .get::<Option<String>, _>("output")
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            assigned_to: row.get("assigned_to"),
            external_ref: row.get("external_ref"),
            error: row.get("error"),
            retry_count: row.get::<i64, _>("retry_count") as u32,
            max_retries: row.get::<i64, _>("max_retries") as u32,
            timeout_ms: row.get::<Option<i64>, _>("timeout_ms").map(|t| t as u64),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            started_at: parse_optional_datetime(row.get("started_at"))?,
            completed_at: parse_optional_datetime(row.get("completed_at"))?,
        })
    }

    async fn insert_step(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        step: &Step,
    ) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO steps (id, execution_id, step_key, step_type, status, config,
               depends_on, blocked_by_count, guard, on_failure, output, assigned_to,
               external_ref, error, retry_count, max_retries, timeout_ms, created_at,
               started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(step.id.to_string())
        .bind(step.execution_id.to_string())
        .bind(&step.step_key)
        .bind(step.step_type.as_str())
        .bind(step.status.as_str())
        .bind(serde_json::to_string(&step.config)?)
        .bind(serde_json::to_string(&step.depends_on)?)
        .bind(step.blocked_by_count as i64)
        .bind(&step.guard)
        .bind(step.on_failure.as_str())
        .bind(step.output.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&step.assigned_to)
        .bind(&step.external_ref)
        .bind(&step.error)
        .bind(step.retry_count as i64)
        .bind(step.max_retries as i64)
        .bind(step.timeout_ms.map(|t| t as i64))
        .bind(step.created_at.to_rfc3339())
        .bind(step.started_at.map(|t| t.to_rfc3339()))
        .bind(step.completed_at.map(|t| t.to_rfc3339()))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn create_workflow(&self, workflow: &Workflow) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO workflows (id, name, version, definition, is_template, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(workflow.version as i64)
        .bind(serde_json::to_string(&workflow.definition)?)
        .bind(i64::from(workflow.is_template))
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> DomainResult<Option<Workflow>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_workflow).transpose()
    }

    async fn get_workflow_by_name(&self, name: &str) -> DomainResult<Option<Workflow>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_workflow).transpose()
    }

    async fn list_workflows(&self, is_template: Option<bool>) -> DomainResult<Vec<Workflow>> {
        let rows = match is_template {
            Some(flag) => {
                sqlx::query("SELECT * FROM workflows WHERE is_template = ? ORDER BY name")
                    .bind(i64::from(flag))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM workflows ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::row_to_workflow).collect()
    }

    async fn update_workflow(&self, workflow: &Workflow) -> DomainResult<Workflow> {
        let result = sqlx::query(
            "UPDATE workflows SET definition = ?, is_template = ?, version = version + 1, updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(&workflow.definition)?)
        .bind(i64::from(workflow.is_template))
        .bind(Utc::now().to_rfc3339())
        .bind(workflow.id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::WorkflowNotFound(workflow.id));
        }
        self.get_workflow(workflow.id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow.id))
    }

    async fn delete_workflow(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::WorkflowNotFound(id));
        }
        Ok(())
    }

    async fn create_execution(&self, execution: &Execution) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO executions (id, workflow_id, swarm_id, status, context, error,
               created_by, created_at, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.swarm_id.as_ref().map(|s| s.as_str().to_string()))
        .bind(execution.status.as_str())
        .bind(serde_json::to_string(&execution.context)?)
        .bind(&execution.error)
        .bind(&execution.created_by)
        .bind(execution.created_at.to_rfc3339())
        .bind(execution.started_at.map(|t| t.to_rfc3339()))
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> DomainResult<Option<Execution>> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_execution).transpose()
    }

    async fn list_executions(
        &self,
        status: Option<ExecutionStatus>,
    ) -> DomainResult<Vec<Execution>> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM executions WHERE status = ? ORDER BY created_at")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM executions ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn update_execution(&self, execution: &Execution) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE executions SET status = ?, context = ?, error = ?, started_at = ?,
               completed_at = ? WHERE id = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(serde_json::to_string(&execution.context)?)
        .bind(&execution.error)
        .bind(execution.started_at.map(|t| t.to_rfc3339()))
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::ExecutionNotFound(execution.id));
        }
        Ok(())
    }

    async fn create_steps(&self, steps: &[Step]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for step in steps {
            Self::insert_step(&mut tx, step).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_step(&self, id: Uuid) -> DomainResult<Option<Step>> {
        let row = sqlx::query("SELECT * FROM steps WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_step).transpose()
    }

    async fn get_step_by_key(&self, execution_id: Uuid, key: &str) -> DomainResult<Option<Step>> {
        let row = sqlx::query("SELECT * FROM steps WHERE execution_id = ? AND step_key = ?")
            .bind(execution_id.to_string())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_step).transpose()
    }

    async fn list_steps(&self, execution_id: Uuid) -> DomainResult<Vec<Step>> {
        let rows = sqlx::query("SELECT * FROM steps WHERE execution_id = ? ORDER BY created_at, step_key")
            .bind(execution_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_step).collect()
    }

    async fn list_steps_by_status(
        &self,
        execution_id: Uuid,
        status: StepStatus,
    ) -> DomainResult<Vec<Step>> {
        let rows = sqlx::query(
            "SELECT * FROM steps WHERE execution_id = ? AND status = ? ORDER BY created_at, step_key",
        )
        .bind(execution_id.to_string())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_step).collect()
    }

    async fn list_ready_steps(&self, execution_id: Uuid, limit: usize) -> DomainResult<Vec<Step>> {
        let rows = sqlx::query(
            r#"SELECT * FROM steps WHERE execution_id = ? AND status = 'ready'
               AND blocked_by_count = 0 ORDER BY created_at, step_key LIMIT ?"#,
        )
        .bind(execution_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_step).collect()
    }

    async fn update_step(&self, step: &Step) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE steps SET status = ?, blocked_by_count = ?, output = ?, assigned_to = ?,
               external_ref = ?, error = ?, retry_count = ?, started_at = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(step.status.as_str())
        .bind(step.blocked_by_count as i64)
        .bind(step.output.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&step.assigned_to)
        .bind(&step.external_ref)
        .bind(&step.error)
        .bind(step.retry_count as i64)
        .bind(step.started_at.map(|t| t.to_rfc3339()))
        .bind(step.completed_at.map(|t| t.to_rfc3339()))
        .bind(step.id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::StepNotFound(step.id));
        }
        Ok(())
    }

    async fn cascade_dependency(
        &self,
        execution_id: Uuid,
        dep_key: &str,
    ) -> DomainResult<Vec<Step>> {
        // Decrement-and-promote in one transaction so the blocked_by_count
        // invariant holds at every read.
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "SELECT * FROM steps WHERE execution_id = ? AND status = 'pending'",
        )
        .bind(execution_id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        let mut promoted = Vec::new();
        for row in &rows {
            let mut step = Self::row_to_step(row)?;
            if !step.depends_on.contains(dep_key) {
                continue;
            }
            step.blocked_by_count = step.blocked_by_count.saturating_sub(1);
            if step.blocked_by_count == 0 {
                step.status = StepStatus::Ready;
            }
            sqlx::query("UPDATE steps SET blocked_by_count = ?, status = ? WHERE id = ?")
                .bind(step.blocked_by_count as i64)
                .bind(step.status.as_str())
                .bind(step.id.to_string())
                .execute(&mut *tx)
                .await?;
            if step.status == StepStatus::Ready {
                promoted.push(step);
            }
        }
        tx.commit().await?;
        Ok(promoted)
    }
}
