//! Team task store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::identity::TeamName;
use crate::domain::models::{Task, TaskStatus};

/// Persistence for team-scoped tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task, including its `blocked_by` set.
    async fn create_task(&self, task: &Task) -> DomainResult<()>;

    /// Fetch a task by ID.
    async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// All tasks for a team, newest first.
    async fn list_tasks_by_team(&self, team: &TeamName) -> DomainResult<Vec<Task>>;

    /// Transition a task's status.
    ///
    /// Transitions are free except `→ resolved`, which fails with
    /// [`DomainError::BlockedByUnresolved`](crate::domain::errors::DomainError)
    /// enumerating the offending blocker IDs while any of them is
    /// unresolved.
    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> DomainResult<Task>;

    /// Add blockers to an existing task.
    async fn add_blockers(&self, id: Uuid, blocked_by: &[Uuid]) -> DomainResult<()>;
}
