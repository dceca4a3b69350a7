//! Capability ports for the armada coordination core.
//!
//! The core never touches a concrete backend; everything goes through these
//! narrow async traits. The SQLite adapters are the reference
//! implementation.

pub mod blackboard_store;
pub mod checkpoint_store;
pub mod mail_store;
pub mod spawn_queue_store;
pub mod task_store;
pub mod trigger_store;
pub mod work_item_store;
pub mod worker_store;
pub mod workflow_store;

pub use blackboard_store::BlackboardStore;
pub use checkpoint_store::CheckpointStore;
pub use mail_store::MailStore;
pub use spawn_queue_store::SpawnQueueStore;
pub use task_store::TaskStore;
pub use trigger_store::TriggerStore;
pub use work_item_store::{WorkItemFilter, WorkItemStore};
pub use worker_store::WorkerStore;
pub use workflow_store::WorkflowStore;
