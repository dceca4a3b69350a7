//! Blackboard store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::identity::{Handle, SwarmId};
use crate::domain::models::{BlackboardFilter, BlackboardMessage};

#[async_trait]
pub trait BlackboardStore: Send + Sync {
    /// Append a message. The message's `created_at_ms` and ID are assigned
    /// by the caller at construction; the store never mutates a posted body.
    async fn post(&self, message: &BlackboardMessage) -> DomainResult<Uuid>;

    /// Read a swarm's messages ordered by `(created_at_ms, id)` ascending.
    ///
    /// `filter.unread_only` requires `filter.reader_handle` and excludes
    /// messages whose `read_by` contains that reader. Archived messages are
    /// excluded unless `filter.include_archived` is set.
    async fn read(
        &self,
        swarm: &SwarmId,
        filter: BlackboardFilter,
    ) -> DomainResult<Vec<BlackboardMessage>>;

    /// Add `reader` to each message's `read_by` set. Idempotent; IDs that
    /// don't exist are silently skipped.
    async fn mark_read(&self, message_ids: &[Uuid], reader: &Handle) -> DomainResult<()>;

    /// Set `archived = true` on each message. Terminal; idempotent.
    async fn archive(&self, message_ids: &[Uuid]) -> DomainResult<()>;

    /// Bulk-archive messages older than `max_age_ms`. Returns the number of
    /// messages newly archived.
    async fn archive_older_than(&self, swarm: &SwarmId, max_age_ms: i64) -> DomainResult<u64>;

    /// Count of non-archived messages in `swarm` not yet read by `reader`.
    async fn get_unread_count(&self, swarm: &SwarmId, reader: &Handle) -> DomainResult<u64>;

    /// Messages newer than `after_ms`, for trigger sampling.
    async fn read_since(
        &self,
        swarm: &SwarmId,
        after_ms: i64,
    ) -> DomainResult<Vec<BlackboardMessage>>;
}
