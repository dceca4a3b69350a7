//! DAG-scheduled workflow engine.
//!
//! Executions materialize a workflow's step definitions into step rows
//! carrying Kahn-style ready-set bookkeeping: every step starts `pending`
//! with `blocked_by_count = |depends_on|`, zero-dep steps are promoted to
//! `ready` in the same unit, and each terminal transition cascades a
//! decrement-and-promote over its dependents. The scheduler tick dispatches
//! ready steps by type; external work (tasks, spawned workers, checkpoints)
//! reports back through [`WorkflowEngine::complete_step`].

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::{Handle, SwarmId, TeamName};
use crate::domain::models::{
    Checkpoint, CheckpointStatus, Execution, ExecutionStatus, OnFailure, ParallelStrategy,
    SpawnRequest, Step, StepConfig, StepStatus, Task, TaskStatus, Workflow, WorkflowDefinition,
};
use crate::domain::ports::{CheckpointStore, TaskStore, WorkflowStore};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::expression;
use crate::services::spawn_controller::SpawnController;

/// Engine tuning.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Ready steps dispatched per execution per tick.
    pub max_ready_per_tick: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { max_ready_per_tick: 5 }
    }
}

/// The workflow engine.
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    tasks: Arc<dyn TaskStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    spawner: Arc<SpawnController>,
    bus: Arc<EventBus>,
    settings: EngineSettings,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        tasks: Arc<dyn TaskStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        spawner: Arc<SpawnController>,
        bus: Arc<EventBus>,
        settings: EngineSettings,
    ) -> Self {
        Self { store, tasks, checkpoints, spawner, bus, settings }
    }

    // ------------------------------------------------------------------
    // Workflow CRUD
    // ------------------------------------------------------------------

    /// Validate and persist a new workflow.
    pub async fn create_workflow(
        &self,
        name: &str,
        definition: WorkflowDefinition,
        is_template: bool,
    ) -> DomainResult<Workflow> {
        definition.validate()?;
        if self.store.get_workflow_by_name(name).await?.is_some() {
            return Err(DomainError::Validation(format!(
                "workflow name already in use: {name}"
            )));
        }
        let mut workflow = Workflow::new(name, definition);
        workflow.is_template = is_template;
        self.store.create_workflow(&workflow).await?;
        Ok(workflow)
    }

    /// Replace a workflow's definition, bumping its version.
    pub async fn update_workflow(
        &self,
        id: Uuid,
        definition: WorkflowDefinition,
    ) -> DomainResult<Workflow> {
        definition.validate()?;
        let mut workflow = self
            .store
            .get_workflow(id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(id))?;
        workflow.definition = definition;
        workflow.updated_at = Utc::now();
        self.store.update_workflow(&workflow).await
    }

    // ------------------------------------------------------------------
    // Execution lifecycle
    // ------------------------------------------------------------------

    /// Start an execution of a workflow.
    ///
    /// Declared inputs are validated against the caller-provided values:
    /// a required input with no value and no default fails with
    /// `MissingInput`; absent optional inputs are filled from defaults. The
    /// merged map lands in `context.inputs`, and the trigger payload (if
    /// any) in `context.trigger`.
    pub async fn start_execution(
        &self,
        workflow_id: Uuid,
        inputs: serde_json::Map<String, Value>,
        swarm_id: Option<SwarmId>,
        created_by: &str,
        trigger_payload: Option<Value>,
    ) -> DomainResult<Execution> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow_id))?;

        let mut merged = inputs;
        for (name, def) in &workflow.definition.inputs {
            if merged.contains_key(name) {
                continue;
            }
            match (&def.default, def.required) {
                (Some(default), _) => {
                    merged.insert(name.clone(), default.clone());
                }
                (None, true) => return Err(DomainError::MissingInput(name.clone())),
                (None, false) => {}
            }
        }

        let mut execution = Execution::new(workflow_id, created_by);
        execution.swarm_id = swarm_id;
        execution.context = json!({ "inputs": Value::Object(merged) });
        if let Some(trigger) = trigger_payload {
            execution.context["trigger"] = trigger;
        }
        self.store.create_execution(&execution).await?;

        // Materialize steps; zero-dep steps go straight to ready in the
        // same atomic unit.
        let mut steps: Vec<Step> = workflow
            .definition
            .steps
            .iter()
            .map(|def| Step::materialize(execution.id, def))
            .collect();
        for step in &mut steps {
            if step.blocked_by_count == 0 {
                step.status = StepStatus::Ready;
            }
        }
        self.store.create_steps(&steps).await?;

        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());
        self.store.update_execution(&execution).await?;

        self.bus.publish(EventPayload::WorkflowStarted {
            execution_id: execution.id,
            workflow_id,
            workflow_name: workflow.name.clone(),
        });
        info!(execution = %execution.id, workflow = %workflow.name, "execution started");
        Ok(execution)
    }

    /// Pause a running execution. In-flight steps keep running; their
    /// completions are recorded but no new steps dispatch.
    pub async fn pause(&self, execution_id: Uuid) -> DomainResult<Execution> {
        let mut execution = self.get_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Running {
            return Err(DomainError::InvalidStateTransition {
                from: execution.status.as_str().to_string(),
                to: ExecutionStatus::Paused.as_str().to_string(),
            });
        }
        execution.status = ExecutionStatus::Paused;
        self.store.update_execution(&execution).await?;
        self.bus.publish(EventPayload::ExecutionPaused { execution_id });
        Ok(execution)
    }

    /// Resume a paused execution.
    pub async fn resume(&self, execution_id: Uuid) -> DomainResult<Execution> {
        let mut execution = self.get_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Paused {
            return Err(DomainError::InvalidStateTransition {
                from: execution.status.as_str().to_string(),
                to: ExecutionStatus::Running.as_str().to_string(),
            });
        }
        execution.status = ExecutionStatus::Running;
        self.store.update_execution(&execution).await?;
        self.bus.publish(EventPayload::ExecutionResumed { execution_id });
        // Steps that finished while paused may already satisfy completion.
        self.check_completion(execution_id).await?;
        self.get_execution(execution_id).await
    }

    /// Cancel a running or paused execution. Terminal. Running external
    /// steps are not force-killed; their late completions are recorded but
    /// ignored for the cascade.
    pub async fn cancel(&self, execution_id: Uuid) -> DomainResult<Execution> {
        let mut execution = self.get_execution(execution_id).await?;
        if !matches!(execution.status, ExecutionStatus::Running | ExecutionStatus::Paused) {
            return Err(DomainError::InvalidStateTransition {
                from: execution.status.as_str().to_string(),
                to: ExecutionStatus::Cancelled.as_str().to_string(),
            });
        }
        execution.status = ExecutionStatus::Cancelled;
        execution.error = Some("Cancelled by user".to_string());
        execution.completed_at = Some(Utc::now());
        self.store.update_execution(&execution).await?;
        self.bus.publish(EventPayload::ExecutionCancelled { execution_id });
        Ok(execution)
    }

    async fn get_execution(&self, id: Uuid) -> DomainResult<Execution> {
        self.store
            .get_execution(id)
            .await?
            .ok_or(DomainError::ExecutionNotFound(id))
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance every running execution by one cooperative pass. Errors in
    /// one execution fail that execution, never the tick.
    pub async fn tick(&self) -> DomainResult<()> {
        let running = self.store.list_executions(Some(ExecutionStatus::Running)).await?;
        for execution in running {
            if let Err(e) = self.tick_execution(&execution).await {
                warn!(execution = %execution.id, error = %e, "execution failed during tick");
                self.fail_execution(execution.id, &e.to_string()).await?;
            }
        }
        Ok(())
    }

    /// One pass over a single running execution: poll in-flight external
    /// steps, sweep timeouts, then dispatch up to `max_ready_per_tick`
    /// ready steps.
    pub async fn tick_execution(&self, execution: &Execution) -> DomainResult<()> {
        self.poll_running_steps(execution).await?;
        self.sweep_timeouts(execution).await?;

        let ready = self
            .store
            .list_ready_steps(execution.id, self.settings.max_ready_per_tick)
            .await?;
        for step in ready {
            // The execution may have finished or been cancelled mid-pass.
            let current = self.get_execution(execution.id).await?;
            if current.status != ExecutionStatus::Running {
                break;
            }
            self.dispatch_step(&current, step).await?;
        }
        Ok(())
    }

    /// Poll external completion conditions for running steps: task steps
    /// complete when their task resolves, checkpoint steps follow the
    /// checkpoint decision, parallel steps follow their watched set.
    async fn poll_running_steps(&self, execution: &Execution) -> DomainResult<()> {
        let running = self
            .store
            .list_steps_by_status(execution.id, StepStatus::Running)
            .await?;
        for step in running {
            match &step.config {
                StepConfig::Task { .. } => {
                    let Some(task_id) = step.external_ref.as_deref().and_then(|s| s.parse().ok())
                    else {
                        continue;
                    };
                    if let Some(task) = self.tasks.get_task(task_id).await? {
                        if task.status == TaskStatus::Resolved {
                            self.finish_step(step.id, Some(json!({ "task_id": task_id })), None)
                                .await?;
                        }
                    }
                }
                StepConfig::Checkpoint { wait_for_acceptance: true, .. } => {
                    let Some(cp_id) = step.external_ref.as_deref().and_then(|s| s.parse().ok())
                    else {
                        continue;
                    };
                    if let Some(checkpoint) = self.checkpoints.get_checkpoint(cp_id).await? {
                        match checkpoint.status {
                            CheckpointStatus::Accepted => {
                                self.finish_step(
                                    step.id,
                                    Some(json!({ "checkpoint_id": cp_id, "accepted": true })),
                                    None,
                                )
                                .await?;
                            }
                            CheckpointStatus::Rejected => {
                                self.finish_step(step.id, None, Some("checkpoint rejected"))
                                    .await?;
                            }
                            CheckpointStatus::Pending => {}
                        }
                    }
                }
                StepConfig::Parallel { step_keys, strategy } => {
                    self.poll_parallel(execution, &step, step_keys, *strategy).await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn poll_parallel(
        &self,
        execution: &Execution,
        step: &Step,
        step_keys: &[String],
        strategy: ParallelStrategy,
    ) -> DomainResult<()> {
        let mut watched = Vec::with_capacity(step_keys.len());
        for key in step_keys {
            if let Some(s) = self.store.get_step_by_key(execution.id, key).await? {
                watched.push(s);
            }
        }

        match strategy {
            ParallelStrategy::All => {
                if watched.iter().all(|s| s.status.is_terminal()) {
                    let failed: Vec<&Step> = watched
                        .iter()
                        .filter(|s| s.status == StepStatus::Failed)
                        .collect();
                    if failed.is_empty() {
                        let outputs: serde_json::Map<String, Value> = watched
                            .iter()
                            .map(|s| (s.step_key.clone(), s.output.clone().unwrap_or(Value::Null)))
                            .collect();
                        self.finish_step(step.id, Some(Value::Object(outputs)), None).await?;
                    } else {
                        let keys: Vec<&str> =
                            failed.iter().map(|s| s.step_key.as_str()).collect();
                        self.finish_step(
                            step.id,
                            None,
                            Some(&format!("parallel branch failed: {}", keys.join(", "))),
                        )
                        .await?;
                    }
                }
            }
            ParallelStrategy::Any | ParallelStrategy::Race => {
                let winner = watched.iter().find(|s| s.status == StepStatus::Completed);
                if let Some(winner) = winner {
                    // Losers are skipped; under `race` this doubles as the
                    // cancel (their late completions are ignored).
                    for loser in watched.iter().filter(|s| !s.status.is_terminal()) {
                        let mut loser = loser.clone();
                        loser.status = StepStatus::Skipped;
                        loser.error = Some(match strategy {
                            ParallelStrategy::Race => "cancelled: lost race".to_string(),
                            _ => "skipped: sibling completed first".to_string(),
                        });
                        loser.completed_at = Some(Utc::now());
                        self.store.update_step(&loser).await?;
                        self.cascade_and_check(execution.id, &loser.step_key).await?;
                    }
                    self.finish_step(
                        step.id,
                        Some(json!({
                            "winner": winner.step_key,
                            "output": winner.output.clone().unwrap_or(Value::Null),
                        })),
                        None,
                    )
                    .await?;
                } else if watched.iter().all(|s| s.status.is_terminal()) {
                    self.finish_step(step.id, None, Some("all parallel branches failed"))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Fail running steps that outlived their `timeout_ms`, honoring each
    /// step's `on_failure`.
    async fn sweep_timeouts(&self, execution: &Execution) -> DomainResult<()> {
        let now = Utc::now();
        let running = self
            .store
            .list_steps_by_status(execution.id, StepStatus::Running)
            .await?;
        for step in running {
            if step.timed_out(now) {
                warn!(execution = %execution.id, step = %step.step_key, "step timed out");
                self.finish_step(step.id, None, Some("TimeoutExceeded")).await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    async fn dispatch_step(&self, execution: &Execution, mut step: Step) -> DomainResult<()> {
        // The ready snapshot may be stale: an earlier dispatch in the same
        // pass (a gate, a parallel promote) can have moved this step on.
        match self.store.get_step(step.id).await? {
            Some(current) if current.status == StepStatus::Ready => step = current,
            _ => return Ok(()),
        }

        // Guard: false skips the step outright.
        if let Some(guard) = &step.guard {
            let context = self.build_eval_context(execution).await?;
            match expression::evaluate_bool(guard, &context) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(step = %step.step_key, "guard false, skipping");
                    step.status = StepStatus::Skipped;
                    step.completed_at = Some(Utc::now());
                    self.store.update_step(&step).await?;
                    self.cascade_and_check(execution.id, &step.step_key).await?;
                    return Ok(());
                }
                Err(e) => {
                    return self
                        .handle_step_failure(step, &format!("guard error: {e}"))
                        .await;
                }
            }
        }

        let config = step.config.clone();
        match config {
            StepConfig::Task { assign_to, team, subject, description } => {
                let team = team.unwrap_or_else(|| TeamName::new("fleet"));
                let mut task = Task::new(
                    team,
                    assign_to.clone(),
                    Handle::new(format!("workflow:{}", execution.id)),
                    subject.unwrap_or_else(|| step.step_key.clone()),
                );
                if let Some(description) = description {
                    task = task.with_description(description);
                }
                self.tasks.create_task(&task).await?;
                self.bus.publish(EventPayload::TaskAssigned {
                    task_id: task.id,
                    owner: assign_to.to_string(),
                });

                step.status = StepStatus::Running;
                step.assigned_to = Some(assign_to.to_string());
                step.external_ref = Some(task.id.to_string());
                step.started_at = Some(Utc::now());
                self.store.update_step(&step).await?;
            }
            StepConfig::Spawn { agent_role, task } => {
                let request = SpawnRequest::new(
                    Handle::new(format!("workflow:{}", execution.id)),
                    agent_role,
                    task,
                );
                let request = match &execution.swarm_id {
                    Some(swarm) => request.with_swarm(swarm.clone()),
                    None => request,
                };
                let request = self.spawner.enqueue(request).await?;

                step.status = StepStatus::Running;
                step.external_ref = Some(request.id.to_string());
                step.started_at = Some(Utc::now());
                self.store.update_step(&step).await?;
            }
            StepConfig::Checkpoint { to_handle, summary, wait_for_acceptance } => {
                let mut checkpoint = Checkpoint::new(
                    to_handle,
                    summary.unwrap_or_else(|| step.step_key.clone()),
                );
                checkpoint.execution_id = Some(execution.id);
                checkpoint.context = self.build_eval_context(execution).await?;
                self.checkpoints.create_checkpoint(&checkpoint).await?;

                if wait_for_acceptance {
                    step.status = StepStatus::Running;
                    step.external_ref = Some(checkpoint.id.to_string());
                    step.started_at = Some(Utc::now());
                    self.store.update_step(&step).await?;
                } else {
                    step.started_at = Some(Utc::now());
                    self.store.update_step(&step).await?;
                    self.finish_step(
                        step.id,
                        Some(json!({ "checkpoint_id": checkpoint.id })),
                        None,
                    )
                    .await?;
                }
            }
            StepConfig::Gate { condition, on_true, on_false } => {
                let context = self.build_eval_context(execution).await?;
                let verdict = match expression::evaluate_bool(&condition, &context) {
                    Ok(v) => v,
                    Err(e) => {
                        return self
                            .handle_step_failure(step, &format!("gate error: {e}"))
                            .await;
                    }
                };
                let (taken, not_taken) =
                    if verdict { (&on_true, &on_false) } else { (&on_false, &on_true) };
                for key in not_taken {
                    if let Some(mut branch) =
                        self.store.get_step_by_key(execution.id, key).await?
                    {
                        if !branch.status.is_terminal() {
                            branch.status = StepStatus::Skipped;
                            branch.completed_at = Some(Utc::now());
                            self.store.update_step(&branch).await?;
                            self.cascade_and_check(execution.id, key).await?;
                        }
                    }
                }
                // The winning branch is marked ready directly, the same way
                // a parallel step promotes its watched set; remaining
                // dependencies do not hold it back.
                for key in taken {
                    if let Some(mut branch) =
                        self.store.get_step_by_key(execution.id, key).await?
                    {
                        if branch.status == StepStatus::Pending {
                            branch.status = StepStatus::Ready;
                            branch.blocked_by_count = 0;
                            self.store.update_step(&branch).await?;
                        }
                    }
                }
                step.started_at = Some(Utc::now());
                self.store.update_step(&step).await?;
                self.finish_step(step.id, Some(json!({ "condition": verdict })), None)
                    .await?;
            }
            StepConfig::Parallel { step_keys, .. } => {
                // Promote the watched set; completion is polled per strategy.
                for key in &step_keys {
                    if let Some(mut watched) =
                        self.store.get_step_by_key(execution.id, key).await?
                    {
                        if watched.status == StepStatus::Pending {
                            watched.status = StepStatus::Ready;
                            watched.blocked_by_count = 0;
                            self.store.update_step(&watched).await?;
                        }
                    }
                }
                step.status = StepStatus::Running;
                step.started_at = Some(Utc::now());
                self.store.update_step(&step).await?;
            }
            StepConfig::Script { script } => {
                let context = self.build_eval_context(execution).await?;
                step.started_at = Some(Utc::now());
                self.store.update_step(&step).await?;
                match expression::evaluate(&script, &context) {
                    Ok(output) => {
                        self.finish_step(step.id, Some(output), None).await?;
                    }
                    Err(e) => {
                        return self
                            .handle_step_failure(step, &format!("script error: {e}"))
                            .await;
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// External completion hook for task and spawn steps.
    ///
    /// Returns `false` without transitioning anything when the step is
    /// already terminal or the execution is no longer accepting completions
    /// (cancelled/terminal); the late output is recorded on the step either
    /// way so nothing is lost.
    pub async fn complete_step(
        &self,
        step_id: Uuid,
        output: Option<Value>,
        error: Option<&str>,
    ) -> DomainResult<bool> {
        let step = self
            .store
            .get_step(step_id)
            .await?
            .ok_or(DomainError::StepNotFound(step_id))?;
        if step.status.is_terminal() {
            return Ok(false);
        }
        let execution = self.get_execution(step.execution_id).await?;
        if execution.status.is_terminal() {
            // Late completion: record the output, skip the cascade.
            let mut late = step;
            late.output = output;
            self.store.update_step(&late).await?;
            return Ok(false);
        }
        self.finish_step(step_id, output, error).await?;
        Ok(true)
    }

    /// Re-queue a failed step (external retry hook).
    pub async fn retry_step(&self, step_id: Uuid) -> DomainResult<Step> {
        let mut step = self
            .store
            .get_step(step_id)
            .await?
            .ok_or(DomainError::StepNotFound(step_id))?;
        if step.status != StepStatus::Failed {
            return Err(DomainError::InvalidStateTransition {
                from: step.status.as_str().to_string(),
                to: StepStatus::Ready.as_str().to_string(),
            });
        }
        step.status = StepStatus::Ready;
        step.error = None;
        step.started_at = None;
        step.completed_at = None;
        self.store.update_step(&step).await?;
        Ok(step)
    }

    /// Terminal-transition a step and run the cascade + completion check.
    async fn finish_step(
        &self,
        step_id: Uuid,
        output: Option<Value>,
        error: Option<&str>,
    ) -> DomainResult<()> {
        let step = self
            .store
            .get_step(step_id)
            .await?
            .ok_or(DomainError::StepNotFound(step_id))?;
        if step.status.is_terminal() {
            return Ok(());
        }

        if let Some(error) = error {
            return self.handle_step_failure(step, error).await;
        }

        let mut step = step;
        step.status = StepStatus::Completed;
        step.output = output;
        step.completed_at = Some(Utc::now());
        self.store.update_step(&step).await?;
        self.bus.publish(EventPayload::StepCompleted {
            execution_id: step.execution_id,
            step_key: step.step_key.clone(),
        });
        self.cascade_and_check(step.execution_id, &step.step_key).await
    }

    /// Apply a step failure per its `on_failure` policy.
    async fn handle_step_failure(&self, mut step: Step, error: &str) -> DomainResult<()> {
        self.bus.publish(EventPayload::StepFailed {
            execution_id: step.execution_id,
            step_key: step.step_key.clone(),
            error: error.to_string(),
        });

        match step.on_failure {
            OnFailure::Retry if step.retry_count < step.max_retries => {
                step.retry_count += 1;
                step.status = StepStatus::Ready;
                step.error = None;
                step.started_at = None;
                self.store.update_step(&step).await?;
                debug!(step = %step.step_key, attempt = step.retry_count, "step re-queued for retry");
                Ok(())
            }
            OnFailure::Skip => {
                step.status = StepStatus::Skipped;
                step.error = Some(error.to_string());
                step.completed_at = Some(Utc::now());
                self.store.update_step(&step).await?;
                self.cascade_and_check(step.execution_id, &step.step_key).await
            }
            OnFailure::Continue => {
                step.status = StepStatus::Failed;
                step.error = Some(error.to_string());
                step.completed_at = Some(Utc::now());
                self.store.update_step(&step).await?;
                // Cascade as if completed; the execution keeps going.
                self.cascade_and_check(step.execution_id, &step.step_key).await
            }
            // `Fail`, or `Retry` with retries exhausted.
            _ => {
                step.status = StepStatus::Failed;
                step.error = Some(error.to_string());
                step.completed_at = Some(Utc::now());
                self.store.update_step(&step).await?;
                self.fail_execution(step.execution_id, error).await
            }
        }
    }

    /// Decrement-and-promote over the finished step's dependents, then run
    /// completion detection.
    async fn cascade_and_check(&self, execution_id: Uuid, step_key: &str) -> DomainResult<()> {
        let promoted = self.store.cascade_dependency(execution_id, step_key).await?;
        for step in &promoted {
            debug!(execution = %execution_id, step = %step.step_key, "step promoted to ready");
        }
        self.check_completion(execution_id).await
    }

    /// If every step is terminal, finish the execution: `failed` when any
    /// step failed with a fatal policy, `completed` otherwise.
    async fn check_completion(&self, execution_id: Uuid) -> DomainResult<()> {
        let execution = self.get_execution(execution_id).await?;
        // Paused executions finish only after resume.
        if execution.status != ExecutionStatus::Running {
            return Ok(());
        }
        let steps = self.store.list_steps(execution_id).await?;
        if !steps.iter().all(|s| s.status.is_terminal()) {
            return Ok(());
        }

        let fatal: Vec<&Step> = steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed && s.on_failure != OnFailure::Continue)
            .collect();

        let mut execution = execution;
        execution.completed_at = Some(Utc::now());
        if fatal.is_empty() {
            execution.status = ExecutionStatus::Completed;
            self.store.update_execution(&execution).await?;
            self.bus.publish(EventPayload::WorkflowCompleted { execution_id });
            info!(execution = %execution_id, "execution completed");
        } else {
            let keys: Vec<&str> = fatal.iter().map(|s| s.step_key.as_str()).collect();
            let error = format!("steps failed: {}", keys.join(", "));
            execution.status = ExecutionStatus::Failed;
            execution.error = Some(error.clone());
            self.store.update_execution(&execution).await?;
            self.bus.publish(EventPayload::WorkflowFailed { execution_id, error });
        }
        Ok(())
    }

    /// Record a fatal execution error and emit `workflow:failed`.
    async fn fail_execution(&self, execution_id: Uuid, error: &str) -> DomainResult<()> {
        let mut execution = self.get_execution(execution_id).await?;
        if execution.status.is_terminal() {
            return Ok(());
        }
        execution.status = ExecutionStatus::Failed;
        execution.error = Some(error.to_string());
        execution.completed_at = Some(Utc::now());
        self.store.update_execution(&execution).await?;
        self.bus.publish(EventPayload::WorkflowFailed {
            execution_id,
            error: error.to_string(),
        });
        Ok(())
    }

    /// Assemble the guard/script evaluation context:
    /// `{inputs, trigger, steps.KEY.output}`.
    async fn build_eval_context(&self, execution: &Execution) -> DomainResult<Value> {
        let mut context = execution.context.clone();
        if !context.is_object() {
            context = json!({});
        }
        let steps = self.store.list_steps(execution.id).await?;
        let step_outputs: serde_json::Map<String, Value> = steps
            .into_iter()
            .map(|s| {
                (
                    s.step_key,
                    json!({
                        "status": s.status.as_str(),
                        "output": s.output.unwrap_or(Value::Null),
                    }),
                )
            })
            .collect();
        context["steps"] = Value::Object(step_outputs);
        Ok(context)
    }
}
