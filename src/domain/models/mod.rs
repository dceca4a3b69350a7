//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod blackboard;
pub mod checkpoint;
pub mod execution;
pub mod mail;
pub mod spawn;
pub mod task;
pub mod trigger;
pub mod work_item;
pub mod worker;
pub mod workflow;

pub use blackboard::{BlackboardFilter, BlackboardMessage, MessagePriority, MessageType};
pub use checkpoint::{Checkpoint, CheckpointStatus};
pub use execution::{Execution, ExecutionStatus, Step, StepStatus};
pub use mail::{Handoff, HandoffStatus, Mail};
pub use spawn::{SpawnQueueStatus, SpawnRequest, SpawnStatus};
pub use task::{Task, TaskStatus};
pub use trigger::{Trigger, TriggerConfig};
pub use work_item::{
    short_slug, Batch, BatchStatus, WorkItem, WorkItemEvent, WorkItemEventType, WorkItemStatus,
};
pub use worker::{SpawnMode, Worker, WorkerHealth, WorkerState};
pub use workflow::{
    InputDef, OnFailure, ParallelStrategy, StepConfig, StepDef, StepType, Workflow,
    WorkflowDefinition,
};
