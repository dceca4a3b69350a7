//! Trigger store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Trigger;

#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn create_trigger(&self, trigger: &Trigger) -> DomainResult<()>;

    async fn get_trigger(&self, id: Uuid) -> DomainResult<Option<Trigger>>;

    /// Enabled triggers of a given kind (`event`, `schedule`, `webhook`,
    /// `blackboard`).
    async fn list_enabled(&self, trigger_type: &str) -> DomainResult<Vec<Trigger>>;

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<()>;

    /// Bump `fire_count` and stamp `last_fired_at`.
    async fn record_fire(&self, id: Uuid, fired_at: DateTime<Utc>) -> DomainResult<()>;

    async fn delete_trigger(&self, id: Uuid) -> DomainResult<()>;
}
