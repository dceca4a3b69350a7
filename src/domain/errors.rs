//! Domain errors for the armada coordination core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors returned by stores and services.
///
/// The transport layer maps these onto status codes: `Validation` → 400,
/// the `*NotFound` family → 404, conflicts → 409, capacity → 429, the
/// rest → 500.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Work item not found: {0}")]
    WorkItemNotFound(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Mail not found: {0}")]
    MailNotFound(Uuid),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Spawn request not found: {0}")]
    SpawnRequestNotFound(Uuid),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("Step not found: {0}")]
    StepNotFound(Uuid),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(Uuid),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(Uuid),

    #[error("Task {task_id} is blocked by unresolved tasks: {blocked_by:?}")]
    BlockedByUnresolved { task_id: Uuid, blocked_by: Vec<Uuid> },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Missing required workflow input: {0}")]
    MissingInput(String),

    #[error("Spawn depth {depth} exceeds the maximum of {max_depth}")]
    DepthLimitExceeded { depth: u32, max_depth: u32 },

    #[error("Hard worker limit reached: {active} active of {hard_limit} allowed")]
    HardLimitReached { active: usize, hard_limit: usize },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error is a conflict (invariant-violating transition).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::BlockedByUnresolved { .. }
                | Self::InvalidStateTransition { .. }
                | Self::DepthLimitExceeded { .. }
        )
    }

    /// Whether this error is a missing-entity lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_)
                | Self::WorkItemNotFound(_)
                | Self::BatchNotFound(_)
                | Self::MailNotFound(_)
                | Self::WorkerNotFound(_)
                | Self::SpawnRequestNotFound(_)
                | Self::WorkflowNotFound(_)
                | Self::ExecutionNotFound(_)
                | Self::StepNotFound(_)
                | Self::TriggerNotFound(_)
                | Self::CheckpointNotFound(_)
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
