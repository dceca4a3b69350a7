//! SQLite implementation of the BlackboardStore.
//!
//! Read-state lives in a `(message_id, reader_handle)` join table so
//! `read_by` stays a set no matter how often `mark_read` retries.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::{Handle, SwarmId};
use crate::domain::models::{BlackboardFilter, BlackboardMessage, MessagePriority, MessageType};
use crate::domain::ports::BlackboardStore;

use super::parse_uuid;

#[derive(Clone)]
pub struct SqliteBlackboardStore {
    pool: SqlitePool,
}

impl SqliteBlackboardStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> DomainResult<BlackboardMessage> {
        Ok(BlackboardMessage {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            swarm_id: SwarmId::new(row.get::<String, _>("swarm_id")),
            sender_handle: Handle::new(row.get::<String, _>("sender_handle")),
            message_type: MessageType::from_str(row.get::<String, _>("message_type").as_str())
                .ok_or_else(|| DomainError::Serialization("bad message type".into()))?,
            priority: MessagePriority::from_str(row.get::<String, _>("priority").as_str())
                .ok_or_else(|| DomainError::Serialization("bad message priority".into()))?,
            target_handle: row.get::<Option<String>, _>("target_handle").map(Handle::new),
            payload: serde_json::from_str(row.get::<String, _>("payload").as_str())?,
            created_at_ms: row.get("created_at_ms"),
            read_by: BTreeSet::new(),
            archived: row.get::<i64, _>("archived") != 0,
        })
    }

    async fn load_readers(&self, message_id: Uuid) -> DomainResult<BTreeSet<Handle>> {
        let rows = sqlx::query("SELECT reader_handle FROM blackboard_reads WHERE message_id = ?")
            .bind(message_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Handle::new(row.get::<String, _>("reader_handle")))
            .collect())
    }
}

#[async_trait]
impl BlackboardStore for SqliteBlackboardStore {
    async fn post(&self, message: &BlackboardMessage) -> DomainResult<Uuid> {
        sqlx::query(
            r#"INSERT INTO blackboard_messages (id, swarm_id, sender_handle, message_type,
               priority, target_handle, payload, created_at_ms, archived)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.swarm_id.as_str())
        .bind(message.sender_handle.as_str())
        .bind(message.message_type.as_str())
        .bind(message.priority.as_str())
        .bind(message.target_handle.as_ref().map(|h| h.as_str().to_string()))
        .bind(serde_json::to_string(&message.payload)?)
        .bind(message.created_at_ms)
        .bind(i64::from(message.archived))
        .execute(&self.pool)
        .await?;
        Ok(message.id)
    }

    async fn read(
        &self,
        swarm: &SwarmId,
        filter: BlackboardFilter,
    ) -> DomainResult<Vec<BlackboardMessage>> {
        if filter.unread_only && filter.reader_handle.is_none() {
            return Err(DomainError::Validation(
                "unread_only requires reader_handle".into(),
            ));
        }

        let mut query =
            String::from("SELECT * FROM blackboard_messages WHERE swarm_id = ?");
        let mut bindings: Vec<String> = vec![swarm.as_str().to_string()];

        if !filter.include_archived {
            query.push_str(" AND archived = 0");
        }
        if let Some(message_type) = &filter.message_type {
            query.push_str(" AND message_type = ?");
            bindings.push(message_type.as_str().to_string());
        }
        if let Some(priority) = &filter.priority {
            query.push_str(" AND priority = ?");
            bindings.push(priority.as_str().to_string());
        }
        if filter.unread_only {
            // reader_handle presence checked above.
            query.push_str(
                " AND id NOT IN (SELECT message_id FROM blackboard_reads WHERE reader_handle = ?)",
            );
            bindings.push(
                filter
                    .reader_handle
                    .as_ref()
                    .map(|h| h.as_str().to_string())
                    .unwrap_or_default(),
            );
        }
        query.push_str(" ORDER BY created_at_ms, id");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut message = Self::row_to_message(row)?;
            message.read_by = self.load_readers(message.id).await?;
            messages.push(message);
        }
        Ok(messages)
    }

    async fn mark_read(&self, message_ids: &[Uuid], reader: &Handle) -> DomainResult<()> {
        for id in message_ids {
            // Missing messages are silently skipped; the subselect makes the
            // insert a no-op for them.
            sqlx::query(
                r#"INSERT OR IGNORE INTO blackboard_reads (message_id, reader_handle, read_at)
                   SELECT id, ?, ? FROM blackboard_messages WHERE id = ?"#,
            )
            .bind(reader.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn archive(&self, message_ids: &[Uuid]) -> DomainResult<()> {
        for id in message_ids {
            sqlx::query("UPDATE blackboard_messages SET archived = 1 WHERE id = ?")
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn archive_older_than(&self, swarm: &SwarmId, max_age_ms: i64) -> DomainResult<u64> {
        let cutoff = Utc::now().timestamp_millis() - max_age_ms;
        let result = sqlx::query(
            "UPDATE blackboard_messages SET archived = 1
             WHERE swarm_id = ? AND archived = 0 AND created_at_ms <= ?",
        )
        .bind(swarm.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_unread_count(&self, swarm: &SwarmId, reader: &Handle) -> DomainResult<u64> {
        let count: (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM blackboard_messages
               WHERE swarm_id = ? AND archived = 0
               AND id NOT IN (SELECT message_id FROM blackboard_reads WHERE reader_handle = ?)"#,
        )
        .bind(swarm.as_str())
        .bind(reader.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 as u64)
    }

    async fn read_since(
        &self,
        swarm: &SwarmId,
        after_ms: i64,
    ) -> DomainResult<Vec<BlackboardMessage>> {
        let rows = sqlx::query(
            r#"SELECT * FROM blackboard_messages
               WHERE swarm_id = ? AND archived = 0 AND created_at_ms > ?
               ORDER BY created_at_ms, id"#,
        )
        .bind(swarm.as_str())
        .bind(after_ms)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_message).collect()
    }
}
