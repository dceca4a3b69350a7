//! Spawn queue store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{SpawnRequest, SpawnStatus};

#[async_trait]
pub trait SpawnQueueStore: Send + Sync {
    /// Persist a request with its dependency edges recorded verbatim.
    async fn create_request(&self, request: &SpawnRequest) -> DomainResult<()>;

    async fn get_request(&self, id: Uuid) -> DomainResult<Option<SpawnRequest>>;

    /// Transition a request's status; stamps `decided_at` on terminal
    /// transitions and records `reason` when given.
    async fn update_request_status(
        &self,
        id: Uuid,
        status: SpawnStatus,
        reason: Option<&str>,
    ) -> DomainResult<SpawnRequest>;

    /// All requests in `status`, oldest first.
    async fn list_by_status(&self, status: SpawnStatus) -> DomainResult<Vec<SpawnRequest>>;

    /// Count of requests per status.
    async fn count_by_status(&self, status: SpawnStatus) -> DomainResult<u64>;
}
