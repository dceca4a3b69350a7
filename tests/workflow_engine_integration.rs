//! Integration tests for the workflow engine: DAG cascade, gate branching,
//! pause/cancel semantics, retries, guards, and parallel strategies.

use std::sync::Arc;

use armada::adapters::sqlite::{
    create_migrated_test_pool, SqliteCheckpointStore, SqliteSpawnQueueStore, SqliteTaskStore,
    SqliteWorkerStore, SqliteWorkflowStore,
};
use armada::domain::errors::DomainError;
use armada::domain::identity::Handle;
use armada::domain::models::{
    CheckpointStatus, ExecutionStatus, OnFailure, ParallelStrategy, StepConfig, StepDef,
    StepStatus, TaskStatus, WorkflowDefinition,
};
use armada::domain::ports::{CheckpointStore, TaskStore, WorkflowStore};
use armada::services::config::SpawnLimitsConfig;
use armada::services::event_bus::{EventBus, EventBusConfig};
use armada::services::spawn_controller::SpawnController;
use armada::services::worker_registry::{RegistrySettings, WorkerRegistry};
use armada::services::workflow_engine::{EngineSettings, WorkflowEngine};
use serde_json::json;

struct Harness {
    engine: WorkflowEngine,
    store: Arc<SqliteWorkflowStore>,
    tasks: Arc<SqliteTaskStore>,
    checkpoints: Arc<SqliteCheckpointStore>,
}

async fn setup() -> Harness {
    let pool = create_migrated_test_pool().await.unwrap();
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    let store = Arc::new(SqliteWorkflowStore::new(pool.clone()));
    let tasks = Arc::new(SqliteTaskStore::new(pool.clone()));
    let checkpoints = Arc::new(SqliteCheckpointStore::new(pool.clone()));
    let registry = Arc::new(WorkerRegistry::new(
        Arc::new(SqliteWorkerStore::new(pool.clone())),
        bus.clone(),
        RegistrySettings::default(),
    ));
    let spawner = Arc::new(SpawnController::new(
        Arc::new(SqliteSpawnQueueStore::new(pool)),
        registry,
        bus.clone(),
        SpawnLimitsConfig::default(),
    ));
    let engine = WorkflowEngine::new(
        store.clone(),
        tasks.clone(),
        checkpoints.clone(),
        spawner,
        bus,
        EngineSettings::default(),
    );
    Harness { engine, store, tasks, checkpoints }
}

fn spawn_step(key: &str) -> StepDef {
    StepDef::new(
        key,
        key,
        StepConfig::Spawn { agent_role: "builder".into(), task: format!("run {key}") },
    )
}

fn script_step(key: &str, script: &str) -> StepDef {
    StepDef::new(key, key, StepConfig::Script { script: script.into() })
}

impl Harness {
    async fn step_status(&self, execution_id: uuid::Uuid, key: &str) -> (StepStatus, u32) {
        let step = self.store.get_step_by_key(execution_id, key).await.unwrap().unwrap();
        (step.status, step.blocked_by_count)
    }

    async fn execution_status(&self, execution_id: uuid::Uuid) -> ExecutionStatus {
        self.store.get_execution(execution_id).await.unwrap().unwrap().status
    }

    async fn tick(&self, execution_id: uuid::Uuid) {
        let execution = self.store.get_execution(execution_id).await.unwrap().unwrap();
        self.engine.tick_execution(&execution).await.unwrap();
    }
}

#[tokio::test]
async fn dag_cascade_promotes_steps_as_dependencies_complete() {
    // Scenario: a, b(deps a), c(deps a, b).
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "cascade",
            WorkflowDefinition {
                steps: vec![
                    spawn_step("a"),
                    spawn_step("b").depends_on(["a"]),
                    spawn_step("c").depends_on(["a", "b"]),
                ],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();

    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Running);

    assert_eq!(h.step_status(execution.id, "a").await, (StepStatus::Ready, 0));
    assert_eq!(h.step_status(execution.id, "b").await, (StepStatus::Pending, 1));
    assert_eq!(h.step_status(execution.id, "c").await, (StepStatus::Pending, 2));

    // Dispatch a, then complete it.
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "a").await.0, StepStatus::Running);
    let a = h.store.get_step_by_key(execution.id, "a").await.unwrap().unwrap();
    assert!(h.engine.complete_step(a.id, Some(json!({"out": 1})), None).await.unwrap());

    assert_eq!(h.step_status(execution.id, "b").await, (StepStatus::Ready, 0));
    assert_eq!(h.step_status(execution.id, "c").await, (StepStatus::Pending, 1));

    h.tick(execution.id).await;
    let b = h.store.get_step_by_key(execution.id, "b").await.unwrap().unwrap();
    assert!(h.engine.complete_step(b.id, None, None).await.unwrap());
    assert_eq!(h.step_status(execution.id, "c").await, (StepStatus::Ready, 0));

    h.tick(execution.id).await;
    let c = h.store.get_step_by_key(execution.id, "c").await.unwrap().unwrap();
    assert!(h.engine.complete_step(c.id, None, None).await.unwrap());

    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);
}

#[tokio::test]
async fn gate_branches_and_skips_the_untaken_side() {
    // Scenario: prep → gate(condition: steps.prep.output.ok) → yes | no.
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "gated",
            WorkflowDefinition {
                steps: vec![
                    spawn_step("prep"),
                    StepDef::new(
                        "gate",
                        "gate",
                        StepConfig::Gate {
                            condition: "steps.prep.output.ok".into(),
                            on_true: vec!["yes".into()],
                            on_false: vec!["no".into()],
                        },
                    )
                    .depends_on(["prep"]),
                    script_step("yes", "'took yes'").depends_on(["gate"]),
                    script_step("no", "'took no'").depends_on(["gate"]),
                ],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();

    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    h.tick(execution.id).await;
    let prep = h.store.get_step_by_key(execution.id, "prep").await.unwrap().unwrap();
    h.engine.complete_step(prep.id, Some(json!({"ok": true})), None).await.unwrap();

    // Gate is ready; dispatching it skips `no` and promotes `yes`.
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "no").await.0, StepStatus::Skipped);
    assert_eq!(h.step_status(execution.id, "yes").await.0, StepStatus::Ready);

    // The script branch completes on dispatch, finishing the execution.
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "yes").await.0, StepStatus::Completed);
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);
}

#[tokio::test]
async fn pause_blocks_dispatch_and_cancel_ignores_late_completions() {
    // Scenario: a → b; pause while b runs, then cancel; late complete(b)
    // returns false.
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "pausable",
            WorkflowDefinition {
                steps: vec![spawn_step("a"), spawn_step("b").depends_on(["a"])],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    h.tick(execution.id).await;
    let a = h.store.get_step_by_key(execution.id, "a").await.unwrap().unwrap();
    h.engine.complete_step(a.id, None, None).await.unwrap();
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "b").await.0, StepStatus::Running);

    h.engine.pause(execution.id).await.unwrap();
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Paused);

    // Pause is only valid from running.
    assert!(matches!(
        h.engine.pause(execution.id).await,
        Err(DomainError::InvalidStateTransition { .. })
    ));

    h.engine.cancel(execution.id).await.unwrap();
    let execution_row = h.store.get_execution(execution.id).await.unwrap().unwrap();
    assert_eq!(execution_row.status, ExecutionStatus::Cancelled);
    assert_eq!(execution_row.error.as_deref(), Some("Cancelled by user"));

    // Late completion: recorded, ignored, no transition.
    let b = h.store.get_step_by_key(execution.id, "b").await.unwrap().unwrap();
    let accepted = h.engine.complete_step(b.id, Some(json!({"late": true})), None).await.unwrap();
    assert!(!accepted);
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Cancelled);
    let b = h.store.get_step_by_key(execution.id, "b").await.unwrap().unwrap();
    assert_eq!(b.output, Some(json!({"late": true})));
    assert_eq!(b.status, StepStatus::Running);
}

#[tokio::test]
async fn resume_reenables_dispatch() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "resumable",
            WorkflowDefinition { steps: vec![spawn_step("a")], ..Default::default() },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    h.engine.pause(execution.id).await.unwrap();
    assert!(h.engine.resume(execution.id).await.is_ok());
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Running);

    // Resume is only valid from paused.
    assert!(h.engine.resume(execution.id).await.is_err());
}

#[tokio::test]
async fn missing_required_input_fails_and_defaults_fill() {
    let h = setup().await;
    let mut inputs = std::collections::BTreeMap::new();
    inputs.insert(
        "env".to_string(),
        armada::domain::models::InputDef { required: true, default: None },
    );
    inputs.insert(
        "replicas".to_string(),
        armada::domain::models::InputDef { required: false, default: Some(json!(2)) },
    );
    let workflow = h
        .engine
        .create_workflow(
            "needs-input",
            WorkflowDefinition {
                steps: vec![script_step("emit", "inputs.replicas")],
                inputs,
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();

    let err = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MissingInput(name) if name == "env"));

    let mut provided = serde_json::Map::new();
    provided.insert("env".to_string(), json!("prod"));
    let execution = h
        .engine
        .start_execution(workflow.id, provided, None, "test", None)
        .await
        .unwrap();
    assert_eq!(execution.context["inputs"]["env"], "prod");
    assert_eq!(execution.context["inputs"]["replicas"], 2);

    // The script step reads the defaulted input.
    h.tick(execution.id).await;
    let step = h.store.get_step_by_key(execution.id, "emit").await.unwrap().unwrap();
    assert_eq!(step.output, Some(json!(2)));
}

#[tokio::test]
async fn retry_requeues_until_exhausted_then_fails_the_execution() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "retrying",
            WorkflowDefinition {
                steps: vec![
                    script_step("boom", "1 / 0").with_on_failure(OnFailure::Retry, 2),
                ],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    // Attempt 1 fails and re-queues.
    h.tick(execution.id).await;
    let step = h.store.get_step_by_key(execution.id, "boom").await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Ready);
    assert_eq!(step.retry_count, 1);
    assert!(step.error.is_none());

    // Attempt 2 fails and re-queues; attempt 3 exhausts retries.
    h.tick(execution.id).await;
    h.tick(execution.id).await;
    let step = h.store.get_step_by_key(execution.id, "boom").await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.retry_count, 2);
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Failed);
}

#[tokio::test]
async fn skip_and_continue_policies_do_not_fail_the_execution() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "lenient",
            WorkflowDefinition {
                steps: vec![
                    script_step("skipped", "1 / 0").with_on_failure(OnFailure::Skip, 0),
                    script_step("continued", "1 / 0")
                        .with_on_failure(OnFailure::Continue, 0)
                        .depends_on(["skipped"]),
                    script_step("after", "'ran'").depends_on(["continued"]),
                ],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    // skipped → cascade → continued → cascade → after, across ticks.
    h.tick(execution.id).await;
    h.tick(execution.id).await;
    h.tick(execution.id).await;

    assert_eq!(h.step_status(execution.id, "skipped").await.0, StepStatus::Skipped);
    assert_eq!(h.step_status(execution.id, "continued").await.0, StepStatus::Failed);
    assert_eq!(h.step_status(execution.id, "after").await.0, StepStatus::Completed);
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);
}

#[tokio::test]
async fn false_guard_skips_the_step() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "guarded",
            WorkflowDefinition {
                steps: vec![
                    script_step("a", "'always'"),
                    script_step("conditional", "'never'")
                        .depends_on(["a"])
                        .with_guard("inputs.enabled"),
                    script_step("tail", "'end'").depends_on(["conditional"]),
                ],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();

    let mut inputs = serde_json::Map::new();
    inputs.insert("enabled".to_string(), json!(false));
    let execution = h
        .engine
        .start_execution(workflow.id, inputs, None, "test", None)
        .await
        .unwrap();

    h.tick(execution.id).await;
    h.tick(execution.id).await;
    h.tick(execution.id).await;

    assert_eq!(h.step_status(execution.id, "conditional").await.0, StepStatus::Skipped);
    assert_eq!(h.step_status(execution.id, "tail").await.0, StepStatus::Completed);
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);
}

#[tokio::test]
async fn task_steps_complete_when_their_task_resolves() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "task-backed",
            WorkflowDefinition {
                steps: vec![StepDef::new(
                    "review",
                    "review",
                    StepConfig::Task {
                        assign_to: Handle::from("reviewer"),
                        team: None,
                        subject: Some("review the change".into()),
                        description: None,
                    },
                )],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    // Dispatch materializes the task.
    h.tick(execution.id).await;
    let step = h.store.get_step_by_key(execution.id, "review").await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Running);
    assert_eq!(step.assigned_to.as_deref(), Some("reviewer"));
    let task_id: uuid::Uuid = step.external_ref.unwrap().parse().unwrap();
    let task = h.tasks.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.subject, "review the change");

    // Unresolved task: the step stays running.
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "review").await.0, StepStatus::Running);

    h.tasks.update_task_status(task_id, TaskStatus::Resolved).await.unwrap();
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "review").await.0, StepStatus::Completed);
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);
}

#[tokio::test]
async fn checkpoint_steps_follow_the_decision() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "checkpointed",
            WorkflowDefinition {
                steps: vec![StepDef::new(
                    "signoff",
                    "signoff",
                    StepConfig::Checkpoint {
                        to_handle: Handle::from("lead"),
                        summary: Some("ship it?".into()),
                        wait_for_acceptance: true,
                    },
                )],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    h.tick(execution.id).await;
    let step = h.store.get_step_by_key(execution.id, "signoff").await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Running);
    let cp_id: uuid::Uuid = step.external_ref.unwrap().parse().unwrap();

    let pending = h.checkpoints.list_pending_for(&Handle::from("lead")).await.unwrap();
    assert_eq!(pending.len(), 1);

    h.checkpoints.decide_checkpoint(cp_id, CheckpointStatus::Accepted).await.unwrap();
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "signoff").await.0, StepStatus::Completed);
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);
}

#[tokio::test]
async fn parallel_any_skips_the_losers() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "fan-out",
            WorkflowDefinition {
                steps: vec![
                    StepDef::new(
                        "fan",
                        "fan",
                        StepConfig::Parallel {
                            step_keys: vec!["left".into(), "right".into()],
                            strategy: ParallelStrategy::Any,
                        },
                    ),
                    spawn_step("left").depends_on(["fan"]),
                    spawn_step("right").depends_on(["fan"]),
                ],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    // Dispatch the parallel step: both watched steps are promoted.
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "fan").await.0, StepStatus::Running);
    assert_eq!(h.step_status(execution.id, "left").await.0, StepStatus::Ready);
    assert_eq!(h.step_status(execution.id, "right").await.0, StepStatus::Ready);

    // Both start running; the first completion wins.
    h.tick(execution.id).await;
    let left = h.store.get_step_by_key(execution.id, "left").await.unwrap().unwrap();
    h.engine.complete_step(left.id, Some(json!({"winner": true})), None).await.unwrap();

    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "right").await.0, StepStatus::Skipped);
    let fan = h.store.get_step_by_key(execution.id, "fan").await.unwrap().unwrap();
    assert_eq!(fan.status, StepStatus::Completed);
    assert_eq!(fan.output.unwrap()["winner"], "left");
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);

    // The skipped loser rejects late completions.
    let right = h.store.get_step_by_key(execution.id, "right").await.unwrap().unwrap();
    assert!(!h.engine.complete_step(right.id, None, None).await.unwrap());
}

#[tokio::test]
async fn parallel_all_waits_for_every_branch() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "join",
            WorkflowDefinition {
                steps: vec![
                    StepDef::new(
                        "fan",
                        "fan",
                        StepConfig::Parallel {
                            step_keys: vec!["left".into(), "right".into()],
                            strategy: ParallelStrategy::All,
                        },
                    ),
                    spawn_step("left").depends_on(["fan"]),
                    spawn_step("right").depends_on(["fan"]),
                ],
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    h.tick(execution.id).await;
    h.tick(execution.id).await;
    let left = h.store.get_step_by_key(execution.id, "left").await.unwrap().unwrap();
    h.engine.complete_step(left.id, None, None).await.unwrap();

    // One branch done: the join still waits.
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "fan").await.0, StepStatus::Running);

    let right = h.store.get_step_by_key(execution.id, "right").await.unwrap().unwrap();
    h.engine.complete_step(right.id, None, None).await.unwrap();
    h.tick(execution.id).await;
    assert_eq!(h.step_status(execution.id, "fan").await.0, StepStatus::Completed);
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);
}

#[tokio::test]
async fn step_timeouts_honor_on_failure() {
    let h = setup().await;
    let mut timed = spawn_step("slow");
    timed.timeout_ms = Some(1);
    timed.on_failure = OnFailure::Skip;
    let workflow = h
        .engine
        .create_workflow(
            "timeboxed",
            WorkflowDefinition { steps: vec![timed], ..Default::default() },
            false,
        )
        .await
        .unwrap();
    let execution = h
        .engine
        .start_execution(workflow.id, serde_json::Map::new(), None, "test", None)
        .await
        .unwrap();

    h.tick(execution.id).await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    h.tick(execution.id).await;

    let step = h.store.get_step_by_key(execution.id, "slow").await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Skipped);
    assert_eq!(step.error.as_deref(), Some("TimeoutExceeded"));
    assert_eq!(h.execution_status(execution.id).await, ExecutionStatus::Completed);
}

#[tokio::test]
async fn updating_a_workflow_bumps_its_version() {
    let h = setup().await;
    let workflow = h
        .engine
        .create_workflow(
            "versioned",
            WorkflowDefinition { steps: vec![script_step("a", "1")], ..Default::default() },
            false,
        )
        .await
        .unwrap();
    assert_eq!(workflow.version, 1);

    let updated = h
        .engine
        .update_workflow(
            workflow.id,
            WorkflowDefinition { steps: vec![script_step("a", "2")], ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
}

#[tokio::test]
async fn starting_a_missing_workflow_is_not_found() {
    let h = setup().await;
    let err = h
        .engine
        .start_execution(uuid::Uuid::new_v4(), serde_json::Map::new(), None, "test", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::WorkflowNotFound(_)));
}
