//! Work item, batch, and event-log store port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Batch, BatchStatus, WorkItem, WorkItemEvent, WorkItemEventType, WorkItemStatus,
};

/// Filter for listing work items.
#[derive(Debug, Clone, Default)]
pub struct WorkItemFilter {
    pub status: Option<WorkItemStatus>,
    pub assigned_to: Option<String>,
    pub batch_id: Option<String>,
}

#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Persist a new item and append its `created` event atomically.
    async fn create_work_item(&self, item: &WorkItem, actor: Option<&str>) -> DomainResult<()>;

    async fn get_work_item(&self, id: &str) -> DomainResult<Option<WorkItem>>;

    async fn list_work_items(&self, filter: WorkItemFilter) -> DomainResult<Vec<WorkItem>>;

    /// Assign an item to a worker, appending an `assigned` event in the same
    /// unit. Re-assigning to the same worker is a no-op (no duplicate event).
    async fn assign_work_item(&self, id: &str, worker: &str, actor: Option<&str>)
        -> DomainResult<WorkItem>;

    /// Transition an item's status, appending the matching event in the same
    /// atomic unit.
    async fn update_work_item_status(
        &self,
        id: &str,
        status: WorkItemStatus,
        actor: Option<&str>,
        details: &str,
    ) -> DomainResult<WorkItem>;

    /// Append a free-form event (e.g. a comment) without a status change.
    async fn append_work_item_event(
        &self,
        id: &str,
        event_type: WorkItemEventType,
        actor: Option<&str>,
        details: &str,
    ) -> DomainResult<()>;

    /// Full event history for an item, oldest first.
    async fn get_work_item_events(&self, id: &str) -> DomainResult<Vec<WorkItemEvent>>;

    async fn create_batch(&self, batch: &Batch) -> DomainResult<()>;

    async fn get_batch(&self, id: &str) -> DomainResult<Option<Batch>>;

    async fn update_batch_status(&self, id: &str, status: BatchStatus) -> DomainResult<Batch>;

    /// Items belonging to a batch.
    async fn list_batch_items(&self, batch_id: &str) -> DomainResult<Vec<WorkItem>>;

    /// Assign every member of a batch to `worker` and mark the batch
    /// `dispatched`. Idempotent on retry: members already assigned to
    /// `worker` are left alone.
    async fn dispatch_batch(&self, batch_id: &str, worker: &str) -> DomainResult<Batch>;
}
