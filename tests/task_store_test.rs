//! Integration tests for the team task store.

use armada::adapters::sqlite::{create_migrated_test_pool, SqliteTaskStore};
use armada::domain::errors::DomainError;
use armada::domain::identity::{Handle, TeamName, Uid};
use armada::domain::models::{Task, TaskStatus};
use armada::domain::ports::TaskStore;

async fn setup() -> SqliteTaskStore {
    let pool = create_migrated_test_pool().await.unwrap();
    SqliteTaskStore::new(pool)
}

fn task(subject: &str) -> Task {
    Task::new(
        TeamName::from("alpha"),
        Handle::from("worker-1"),
        Handle::from("lead"),
        subject,
    )
}

#[tokio::test]
async fn create_and_get_round_trip() {
    let store = setup().await;
    let t = task("setup").with_description("prepare the environment");
    store.create_task(&t).await.unwrap();

    let got = store.get_task(t.id).await.unwrap().unwrap();
    assert_eq!(got.subject, "setup");
    assert_eq!(got.status, TaskStatus::Open);
    assert_eq!(got.owner_uid, Uid::derive(&got.team_name, &got.owner_handle));
    assert_eq!(got.description.as_deref(), Some("prepare the environment"));
}

#[tokio::test]
async fn blocked_task_cannot_resolve_until_blockers_do() {
    // Scenario: A "setup", then B "deploy" blocked by A.
    let store = setup().await;
    let a = task("setup");
    store.create_task(&a).await.unwrap();
    let b = task("deploy").with_blocked_by([a.id]);
    store.create_task(&b).await.unwrap();

    // B cannot resolve; the error names the offending blocker.
    let err = store.update_task_status(b.id, TaskStatus::Resolved).await.unwrap_err();
    match &err {
        DomainError::BlockedByUnresolved { task_id, blocked_by } => {
            assert_eq!(*task_id, b.id);
            assert_eq!(*blocked_by, vec![a.id]);
        }
        other => panic!("expected BlockedByUnresolved, got {other:?}"),
    }
    assert!(err.is_conflict());

    // Resolve A, then B resolves fine.
    store.update_task_status(a.id, TaskStatus::Resolved).await.unwrap();
    let b2 = store.update_task_status(b.id, TaskStatus::Resolved).await.unwrap();
    assert_eq!(b2.status, TaskStatus::Resolved);
}

#[tokio::test]
async fn non_resolved_transitions_are_free() {
    let store = setup().await;
    let a = task("gate");
    store.create_task(&a).await.unwrap();
    let b = task("work").with_blocked_by([a.id]);
    store.create_task(&b).await.unwrap();

    // Blocked-by only gates `resolved`; everything else is free.
    for status in [TaskStatus::InProgress, TaskStatus::Blocked, TaskStatus::Open] {
        let updated = store.update_task_status(b.id, status).await.unwrap();
        assert_eq!(updated.status, status);
    }
}

#[tokio::test]
async fn add_blockers_after_creation() {
    let store = setup().await;
    let a = task("first");
    let b = task("second");
    store.create_task(&a).await.unwrap();
    store.create_task(&b).await.unwrap();

    store.add_blockers(b.id, &[a.id]).await.unwrap();
    // Adding the same blocker twice is a no-op.
    store.add_blockers(b.id, &[a.id]).await.unwrap();

    let got = store.get_task(b.id).await.unwrap().unwrap();
    assert_eq!(got.blocked_by.len(), 1);
    assert!(store.update_task_status(b.id, TaskStatus::Resolved).await.is_err());
}

#[tokio::test]
async fn list_by_team_scopes_results() {
    let store = setup().await;
    store.create_task(&task("one")).await.unwrap();
    store.create_task(&task("two")).await.unwrap();
    let other = Task::new(
        TeamName::from("beta"),
        Handle::from("b-worker"),
        Handle::from("b-lead"),
        "elsewhere",
    );
    store.create_task(&other).await.unwrap();

    let alpha = store.list_tasks_by_team(&TeamName::from("alpha")).await.unwrap();
    assert_eq!(alpha.len(), 2);
    let beta = store.list_tasks_by_team(&TeamName::from("beta")).await.unwrap();
    assert_eq!(beta.len(), 1);
}

#[tokio::test]
async fn updating_missing_task_is_not_found() {
    let store = setup().await;
    let err = store
        .update_task_status(uuid::Uuid::new_v4(), TaskStatus::Resolved)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
