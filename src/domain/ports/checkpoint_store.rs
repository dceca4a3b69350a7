//! Checkpoint store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::identity::Handle;
use crate::domain::models::{Checkpoint, CheckpointStatus};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> DomainResult<()>;

    async fn get_checkpoint(&self, id: Uuid) -> DomainResult<Option<Checkpoint>>;

    /// Pending checkpoints addressed to `handle`, oldest first.
    async fn list_pending_for(&self, handle: &Handle) -> DomainResult<Vec<Checkpoint>>;

    /// Record the accept/reject decision, stamping `decided_at`.
    async fn decide_checkpoint(
        &self,
        id: Uuid,
        status: CheckpointStatus,
    ) -> DomainResult<Checkpoint>;
}
