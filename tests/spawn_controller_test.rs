//! Integration tests for spawn queue admission control.

use std::sync::Arc;

use armada::adapters::sqlite::{
    create_migrated_test_pool, SqliteSpawnQueueStore, SqliteWorkerStore,
};
use armada::domain::errors::DomainError;
use armada::domain::identity::Handle;
use armada::domain::models::{SpawnRequest, SpawnStatus};
use armada::services::config::SpawnLimitsConfig;
use armada::services::event_bus::{EventBus, EventBusConfig};
use armada::services::spawn_controller::SpawnController;
use armada::services::worker_registry::{RegistrySettings, WorkerRegistry};

async fn setup(limits: SpawnLimitsConfig) -> (SpawnController, Arc<WorkerRegistry>) {
    let pool = create_migrated_test_pool().await.unwrap();
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    let registry = Arc::new(WorkerRegistry::new(
        Arc::new(SqliteWorkerStore::new(pool.clone())),
        bus.clone(),
        RegistrySettings::default(),
    ));
    let controller = SpawnController::new(
        Arc::new(SqliteSpawnQueueStore::new(pool)),
        registry.clone(),
        bus,
        limits,
    );
    (controller, registry)
}

fn request(agent_type: &str) -> SpawnRequest {
    SpawnRequest::new(Handle::from("lead"), agent_type, "do the thing")
}

#[tokio::test]
async fn depth_limited_requests_are_persisted_rejected() {
    // Scenario: maxDepth=2, enqueue at depth 3.
    let (controller, _) = setup(SpawnLimitsConfig { max_depth: 2, ..Default::default() }).await;

    let req = request("builder").with_depth(3, Some(Handle::from("parent")));
    let persisted = controller.enqueue(req).await.unwrap();
    assert_eq!(persisted.status, SpawnStatus::Rejected);
    assert!(persisted.reason.as_deref().unwrap().contains("DepthLimitExceeded"));
    assert!(persisted.decided_at.is_some());

    let status = controller.status().await.unwrap();
    assert_eq!(status.active, 0);
    assert_eq!(status.pending, 0);
}

#[tokio::test]
async fn requests_at_the_depth_boundary_are_accepted() {
    let (controller, _) = setup(SpawnLimitsConfig { max_depth: 2, ..Default::default() }).await;
    let persisted = controller
        .enqueue(request("builder").with_depth(2, None))
        .await
        .unwrap();
    assert_eq!(persisted.status, SpawnStatus::Pending);
}

#[tokio::test]
async fn drain_spawns_and_respects_the_soft_limit() {
    let (controller, registry) = setup(SpawnLimitsConfig {
        soft_limit: 2,
        hard_limit: 10,
        max_depth: 3,
    })
    .await;

    for i in 0..4 {
        controller.enqueue(request(&format!("agent-{i}"))).await.unwrap();
    }

    let spawned = controller.drain().await.unwrap();
    assert_eq!(spawned, 2, "soft limit caps approvals per drain");

    let status = controller.status().await.unwrap();
    assert_eq!(status.active, 2);
    assert_eq!(status.pending, 2);
    assert_eq!(status.active, registry.active_count().await);

    // Capacity freed, the queue resumes draining.
    controller.release_slot();
    let spawned = controller.drain().await.unwrap();
    assert_eq!(spawned, 1);
}

#[tokio::test]
async fn hard_limit_rejects_outright() {
    let (controller, _) = setup(SpawnLimitsConfig {
        soft_limit: 1,
        hard_limit: 1,
        max_depth: 3,
    })
    .await;

    controller.enqueue(request("first")).await.unwrap();
    controller.drain().await.unwrap();

    let err = controller.enqueue(request("second")).await.unwrap_err();
    assert!(matches!(err, DomainError::HardLimitReached { active: 1, hard_limit: 1 }));
}

#[tokio::test]
async fn dependencies_gate_approval() {
    // A dependent request never leaves pending while its dependency is
    // not spawned.
    let (controller, _) = setup(SpawnLimitsConfig {
        soft_limit: 1,
        hard_limit: 10,
        max_depth: 3,
    })
    .await;

    let first = controller.enqueue(request("first")).await.unwrap();
    controller
        .enqueue(request("second").with_dependencies([first.id]))
        .await
        .unwrap();

    // One slot: only `first` spawns.
    controller.drain().await.unwrap();
    let status = controller.status().await.unwrap();
    assert_eq!(status.active, 1);
    assert_eq!(status.pending, 1);

    // Still at the soft limit: `second` stays pending even though its
    // dependency is now satisfied.
    controller.drain().await.unwrap();
    assert_eq!(controller.status().await.unwrap().pending, 1);

    controller.release_slot();
    let spawned = controller.drain().await.unwrap();
    assert_eq!(spawned, 1);
}

#[tokio::test]
async fn dead_dependency_parks_the_request() {
    let (controller, _) =
        setup(SpawnLimitsConfig { max_depth: 0, ..Default::default() }).await;

    // Depth 1 > max 0: rejected on enqueue.
    let dead = controller
        .enqueue(request("dead").with_depth(1, None))
        .await
        .unwrap();
    assert_eq!(dead.status, SpawnStatus::Rejected);

    controller
        .enqueue(request("dependent").with_dependencies([dead.id]))
        .await
        .unwrap();
    controller.drain().await.unwrap();

    let status = controller.status().await.unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.active, 0);
}

#[tokio::test]
async fn cancel_is_only_valid_before_spawn() {
    let (controller, _) = setup(SpawnLimitsConfig::default()).await;

    let req = controller.enqueue(request("cancel-me")).await.unwrap();
    let cancelled = controller.cancel(req.id).await.unwrap();
    assert_eq!(cancelled.status, SpawnStatus::Cancelled);

    // Terminal: cannot cancel twice.
    assert!(controller.cancel(req.id).await.is_err());

    // A spawned request cannot be cancelled either.
    let spawned = controller.enqueue(request("runs")).await.unwrap();
    controller.drain().await.unwrap();
    let err = controller.cancel(spawned.id).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn worker_exit_releases_capacity_through_the_registry() {
    let (controller, registry) = setup(SpawnLimitsConfig {
        soft_limit: 1,
        hard_limit: 10,
        max_depth: 3,
    })
    .await;

    controller.enqueue(request("short-lived")).await.unwrap();
    controller.drain().await.unwrap();
    assert_eq!(controller.status().await.unwrap().active, 1);

    // The spawned worker exits; the tick drains the exit and releases.
    let worker = registry.list_all().await.pop().unwrap();
    registry.record_exit(&worker.handle, "finished").await.unwrap();
    for _ in registry.drain_exits().await {
        controller.release_slot();
    }

    assert_eq!(controller.status().await.unwrap().active, 0);
    assert_eq!(registry.active_count().await, 0);
}
