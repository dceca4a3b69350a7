//! SQLite implementation of the MailStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::Handle;
use crate::domain::models::{Handoff, HandoffStatus, Mail};
use crate::domain::ports::MailStore;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteMailStore {
    pool: SqlitePool,
}

impl SqliteMailStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_mail(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Mail> {
        Ok(Mail {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            from: Handle::new(row.get::<String, _>("sender")),
            to: Handle::new(row.get::<String, _>("recipient")),
            subject: row.get("subject"),
            body: row.get("body"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            read_at: parse_optional_datetime(row.get("read_at"))?,
        })
    }

    fn row_to_handoff(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Handoff> {
        Ok(Handoff {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            from_handle: Handle::new(row.get::<String, _>("from_handle")),
            to_handle: Handle::new(row.get::<String, _>("to_handle")),
            reason: row.get("reason"),
            context: serde_json::from_str(row.get::<String, _>("context").as_str())?,
            status: HandoffStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| DomainError::Serialization("bad handoff status".into()))?,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
        })
    }
}

#[async_trait]
impl MailStore for SqliteMailStore {
    async fn send_mail(&self, mail: &Mail) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO mail (id, sender, recipient, subject, body, created_at, read_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(mail.id.to_string())
        .bind(mail.from.as_str())
        .bind(mail.to.as_str())
        .bind(&mail.subject)
        .bind(&mail.body)
        .bind(mail.created_at.to_rfc3339())
        .bind(mail.read_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_mail(&self, handle: &Handle) -> DomainResult<Vec<Mail>> {
        let rows = sqlx::query("SELECT * FROM mail WHERE recipient = ? ORDER BY created_at")
            .bind(handle.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_mail).collect()
    }

    async fn get_unread(&self, handle: &Handle) -> DomainResult<Vec<Mail>> {
        let rows = sqlx::query(
            "SELECT * FROM mail WHERE recipient = ? AND read_at IS NULL ORDER BY created_at",
        )
        .bind(handle.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_mail).collect()
    }

    async fn mark_read(&self, mail_id: Uuid) -> DomainResult<()> {
        // Idempotent: the first stamp wins.
        let result = sqlx::query("UPDATE mail SET read_at = ? WHERE id = ? AND read_at IS NULL")
            .bind(Utc::now().to_rfc3339())
            .bind(mail_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mail WHERE id = ?")
                .bind(mail_id.to_string())
                .fetch_one(&self.pool)
                .await?;
            if exists.0 == 0 {
                return Err(DomainError::MailNotFound(mail_id));
            }
        }
        Ok(())
    }

    async fn create_handoff(&self, handoff: &Handoff) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO handoffs (id, from_handle, to_handle, reason, context, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(handoff.id.to_string())
        .bind(handoff.from_handle.as_str())
        .bind(handoff.to_handle.as_str())
        .bind(&handoff.reason)
        .bind(serde_json::to_string(&handoff.context)?)
        .bind(handoff.status.as_str())
        .bind(handoff.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_handoff(&self, id: Uuid) -> DomainResult<Option<Handoff>> {
        let row = sqlx::query("SELECT * FROM handoffs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_handoff).transpose()
    }

    async fn list_handoffs_for(&self, handle: &Handle) -> DomainResult<Vec<Handoff>> {
        let rows = sqlx::query("SELECT * FROM handoffs WHERE to_handle = ? ORDER BY created_at")
            .bind(handle.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_handoff).collect()
    }

    async fn decide_handoff(&self, id: Uuid, status: HandoffStatus) -> DomainResult<Handoff> {
        let handoff = self
            .get_handoff(id)
            .await?
            .ok_or(DomainError::MailNotFound(id))?;
        if handoff.status != HandoffStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: handoff.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        sqlx::query("UPDATE handoffs SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        let mut handoff = handoff;
        handoff.status = status;
        Ok(handoff)
    }
}
