//! SQLite implementation of the WorkItemStore.
//!
//! Every status change appends its event inside the same transaction, so
//! readers always observe a consistent (status, event log) pair.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Batch, BatchStatus, WorkItem, WorkItemEvent, WorkItemEventType, WorkItemStatus,
};
use crate::domain::ports::{WorkItemFilter, WorkItemStore};

use super::parse_datetime;

#[derive(Clone)]
pub struct SqliteWorkItemStore {
    pool: SqlitePool,
}

impl SqliteWorkItemStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> DomainResult<WorkItem> {
        Ok(WorkItem {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            status: WorkItemStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| DomainError::Serialization("bad work item status".into()))?,
            assigned_to: row.get("assigned_to"),
            batch_id: row.get("batch_id"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
        })
    }

    fn row_to_batch(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Batch> {
        Ok(Batch {
            id: row.get("id"),
            name: row.get("name"),
            status: BatchStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| DomainError::Serialization("bad batch status".into()))?,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
        })
    }

    async fn append_event_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        work_item_id: &str,
        event_type: WorkItemEventType,
        actor: Option<&str>,
        details: &str,
    ) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO work_item_events (work_item_id, event_type, actor, details, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(work_item_id)
        .bind(event_type.as_str())
        .bind(actor)
        .bind(details)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Check whether every member of a batch is completed; if so, mark the
    /// batch completed.
    async fn maybe_complete_batch(&self, batch_id: &str) -> DomainResult<()> {
        let outstanding: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM work_items WHERE batch_id = ? AND status != 'completed'",
        )
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await?;
        if outstanding.0 == 0 {
            sqlx::query(
                "UPDATE batches SET status = 'completed' WHERE id = ? AND status = 'dispatched'",
            )
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkItemStore for SqliteWorkItemStore {
    async fn create_work_item(&self, item: &WorkItem, actor: Option<&str>) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO work_items (id, title, description, status, assigned_to, batch_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.status.as_str())
        .bind(&item.assigned_to)
        .bind(&item.batch_id)
        .bind(item.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        Self::append_event_tx(&mut tx, &item.id, WorkItemEventType::Created, actor, &item.title)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_work_item(&self, id: &str) -> DomainResult<Option<WorkItem>> {
        let row = sqlx::query("SELECT * FROM work_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn list_work_items(&self, filter: WorkItemFilter) -> DomainResult<Vec<WorkItem>> {
        let mut query = String::from("SELECT * FROM work_items WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(assignee) = &filter.assigned_to {
            query.push_str(" AND assigned_to = ?");
            bindings.push(assignee.clone());
        }
        if let Some(batch_id) = &filter.batch_id {
            query.push_str(" AND batch_id = ?");
            bindings.push(batch_id.clone());
        }
        query.push_str(" ORDER BY created_at");

        let mut q = sqlx::query(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_item).collect()
    }

    async fn assign_work_item(
        &self,
        id: &str,
        worker: &str,
        actor: Option<&str>,
    ) -> DomainResult<WorkItem> {
        let item = self
            .get_work_item(id)
            .await?
            .ok_or_else(|| DomainError::WorkItemNotFound(id.to_string()))?;

        // Idempotent: same assignee means no write and no duplicate event.
        if item.assigned_to.as_deref() == Some(worker) {
            return Ok(item);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE work_items SET assigned_to = ? WHERE id = ?")
            .bind(worker)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Self::append_event_tx(&mut tx, id, WorkItemEventType::Assigned, actor, worker).await?;
        tx.commit().await?;

        let mut item = item;
        item.assigned_to = Some(worker.to_string());
        Ok(item)
    }

    async fn update_work_item_status(
        &self,
        id: &str,
        status: WorkItemStatus,
        actor: Option<&str>,
        details: &str,
    ) -> DomainResult<WorkItem> {
        let mut item = self
            .get_work_item(id)
            .await?
            .ok_or_else(|| DomainError::WorkItemNotFound(id.to_string()))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE work_items SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Self::append_event_tx(&mut tx, id, status.event_type(), actor, details).await?;
        tx.commit().await?;

        item.status = status;
        if status == WorkItemStatus::Completed {
            if let Some(batch_id) = item.batch_id.clone() {
                self.maybe_complete_batch(&batch_id).await?;
            }
        }
        Ok(item)
    }

    async fn append_work_item_event(
        &self,
        id: &str,
        event_type: WorkItemEventType,
        actor: Option<&str>,
        details: &str,
    ) -> DomainResult<()> {
        if self.get_work_item(id).await?.is_none() {
            return Err(DomainError::WorkItemNotFound(id.to_string()));
        }
        let mut tx = self.pool.begin().await?;
        Self::append_event_tx(&mut tx, id, event_type, actor, details).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_work_item_events(&self, id: &str) -> DomainResult<Vec<WorkItemEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM work_item_events WHERE work_item_id = ? ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(WorkItemEvent {
                    work_item_id: row.get("work_item_id"),
                    event_type: WorkItemEventType::from_str(
                        row.get::<String, _>("event_type").as_str(),
                    )
                    .ok_or_else(|| DomainError::Serialization("bad event type".into()))?,
                    actor: row.get("actor"),
                    details: row.get("details"),
                    created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
                })
            })
            .collect()
    }

    async fn create_batch(&self, batch: &Batch) -> DomainResult<()> {
        sqlx::query("INSERT INTO batches (id, name, status, created_at) VALUES (?, ?, ?, ?)")
            .bind(&batch.id)
            .bind(&batch.name)
            .bind(batch.status.as_str())
            .bind(batch.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_batch(&self, id: &str) -> DomainResult<Option<Batch>> {
        let row = sqlx::query("SELECT * FROM batches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_batch).transpose()
    }

    async fn update_batch_status(&self, id: &str, status: BatchStatus) -> DomainResult<Batch> {
        let mut batch = self
            .get_batch(id)
            .await?
            .ok_or_else(|| DomainError::BatchNotFound(id.to_string()))?;
        sqlx::query("UPDATE batches SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        batch.status = status;
        Ok(batch)
    }

    async fn list_batch_items(&self, batch_id: &str) -> DomainResult<Vec<WorkItem>> {
        let rows = sqlx::query("SELECT * FROM work_items WHERE batch_id = ? ORDER BY created_at")
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_item).collect()
    }

    async fn dispatch_batch(&self, batch_id: &str, worker: &str) -> DomainResult<Batch> {
        let batch = self
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| DomainError::BatchNotFound(batch_id.to_string()))?;
        if matches!(batch.status, BatchStatus::Completed | BatchStatus::Cancelled) {
            return Err(DomainError::InvalidStateTransition {
                from: batch.status.as_str().to_string(),
                to: BatchStatus::Dispatched.as_str().to_string(),
            });
        }

        // Assigning an already-assigned member again is a no-op, so a retry
        // of a half-finished dispatch converges instead of duplicating
        // events.
        let items = self.list_batch_items(batch_id).await?;
        for item in &items {
            self.assign_work_item(&item.id, worker, Some("dispatch")).await?;
        }
        self.update_batch_status(batch_id, BatchStatus::Dispatched).await
    }
}
