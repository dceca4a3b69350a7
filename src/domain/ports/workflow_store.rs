//! Workflow, execution, and step store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Execution, ExecutionStatus, Step, StepStatus, Workflow,
};

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // -- workflow definitions ------------------------------------------------

    async fn create_workflow(&self, workflow: &Workflow) -> DomainResult<()>;

    async fn get_workflow(&self, id: Uuid) -> DomainResult<Option<Workflow>>;

    async fn get_workflow_by_name(&self, name: &str) -> DomainResult<Option<Workflow>>;

    async fn list_workflows(&self, is_template: Option<bool>) -> DomainResult<Vec<Workflow>>;

    /// Replace a workflow's definition, bumping `version`.
    async fn update_workflow(&self, workflow: &Workflow) -> DomainResult<Workflow>;

    async fn delete_workflow(&self, id: Uuid) -> DomainResult<()>;

    // -- executions ----------------------------------------------------------

    async fn create_execution(&self, execution: &Execution) -> DomainResult<()>;

    async fn get_execution(&self, id: Uuid) -> DomainResult<Option<Execution>>;

    async fn list_executions(&self, status: Option<ExecutionStatus>)
        -> DomainResult<Vec<Execution>>;

    async fn update_execution(&self, execution: &Execution) -> DomainResult<()>;

    // -- steps ---------------------------------------------------------------

    /// Materialize all steps of an execution in one atomic unit, with
    /// zero-dependency steps already promoted to `ready`.
    async fn create_steps(&self, steps: &[Step]) -> DomainResult<()>;

    async fn get_step(&self, id: Uuid) -> DomainResult<Option<Step>>;

    async fn get_step_by_key(&self, execution_id: Uuid, key: &str) -> DomainResult<Option<Step>>;

    async fn list_steps(&self, execution_id: Uuid) -> DomainResult<Vec<Step>>;

    async fn list_steps_by_status(
        &self,
        execution_id: Uuid,
        status: StepStatus,
    ) -> DomainResult<Vec<Step>>;

    /// Ready steps of an execution ordered by creation, capped at `limit`.
    async fn list_ready_steps(&self, execution_id: Uuid, limit: usize) -> DomainResult<Vec<Step>>;

    async fn update_step(&self, step: &Step) -> DomainResult<()>;

    /// Decrement `blocked_by_count` (clamped at zero) for every pending step
    /// of the execution whose `depends_on` contains `dep_key`, promoting
    /// steps that reach zero to `ready`. Returns the promoted steps.
    async fn cascade_dependency(
        &self,
        execution_id: Uuid,
        dep_key: &str,
    ) -> DomainResult<Vec<Step>>;
}
