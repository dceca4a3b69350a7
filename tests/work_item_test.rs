//! Integration tests for work items, batches, and the event log.

use armada::adapters::sqlite::{create_migrated_test_pool, SqliteWorkItemStore};
use armada::domain::models::{
    Batch, BatchStatus, WorkItem, WorkItemEventType, WorkItemStatus,
};
use armada::domain::ports::{WorkItemFilter, WorkItemStore};

async fn setup() -> SqliteWorkItemStore {
    let pool = create_migrated_test_pool().await.unwrap();
    SqliteWorkItemStore::new(pool)
}

#[tokio::test]
async fn create_appends_created_event() {
    let store = setup().await;
    let item = WorkItem::new("wire the parser");
    store.create_work_item(&item, Some("lead")).await.unwrap();

    let events = store.get_work_item_events(&item.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, WorkItemEventType::Created);
    assert_eq!(events[0].actor.as_deref(), Some("lead"));
}

#[tokio::test]
async fn status_is_derivable_from_the_event_log() {
    let store = setup().await;
    let item = WorkItem::new("index the corpus");
    store.create_work_item(&item, None).await.unwrap();

    store
        .update_work_item_status(&item.id, WorkItemStatus::InProgress, Some("w1"), "picked up")
        .await
        .unwrap();
    store
        .append_work_item_event(&item.id, WorkItemEventType::Comment, Some("w1"), "halfway")
        .await
        .unwrap();
    store
        .update_work_item_status(&item.id, WorkItemStatus::Completed, Some("w1"), "done")
        .await
        .unwrap();

    let current = store.get_work_item(&item.id).await.unwrap().unwrap();
    let events = store.get_work_item_events(&item.id).await.unwrap();

    // The last status-changing event implies the current status.
    let implied = events
        .iter()
        .rev()
        .find_map(|e| e.event_type.implied_status())
        .unwrap();
    assert_eq!(implied, current.status);
    assert_eq!(current.status, WorkItemStatus::Completed);
    assert_eq!(events.len(), 4);
}

#[tokio::test]
async fn assign_is_idempotent_per_worker() {
    let store = setup().await;
    let item = WorkItem::new("triage");
    store.create_work_item(&item, None).await.unwrap();

    store.assign_work_item(&item.id, "scout", None).await.unwrap();
    store.assign_work_item(&item.id, "scout", None).await.unwrap();

    let events = store.get_work_item_events(&item.id).await.unwrap();
    let assigned: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == WorkItemEventType::Assigned)
        .collect();
    assert_eq!(assigned.len(), 1, "re-assigning the same worker must not duplicate events");
}

#[tokio::test]
async fn list_filters_by_status_assignee_and_batch() {
    let store = setup().await;
    let batch = Batch::new("sprint-1");
    store.create_batch(&batch).await.unwrap();

    let mut a = WorkItem::new("a");
    a.batch_id = Some(batch.id.clone());
    let b = WorkItem::new("b");
    store.create_work_item(&a, None).await.unwrap();
    store.create_work_item(&b, None).await.unwrap();
    store.assign_work_item(&b.id, "scout", None).await.unwrap();

    let by_batch = store
        .list_work_items(WorkItemFilter { batch_id: Some(batch.id.clone()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(by_batch.len(), 1);
    assert_eq!(by_batch[0].id, a.id);

    let by_assignee = store
        .list_work_items(WorkItemFilter {
            assigned_to: Some("scout".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_assignee.len(), 1);
    assert_eq!(by_assignee[0].id, b.id);

    let pending = store
        .list_work_items(WorkItemFilter {
            status: Some(WorkItemStatus::Pending),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
async fn dispatch_batch_assigns_every_member_and_is_idempotent() {
    let store = setup().await;
    let batch = Batch::new("sprint-2");
    store.create_batch(&batch).await.unwrap();

    for title in ["one", "two", "three"] {
        let mut item = WorkItem::new(title);
        item.batch_id = Some(batch.id.clone());
        store.create_work_item(&item, None).await.unwrap();
    }

    let dispatched = store.dispatch_batch(&batch.id, "scout").await.unwrap();
    assert_eq!(dispatched.status, BatchStatus::Dispatched);
    for item in store.list_batch_items(&batch.id).await.unwrap() {
        assert_eq!(item.assigned_to.as_deref(), Some("scout"));
    }

    // Retrying converges without duplicate events.
    store.dispatch_batch(&batch.id, "scout").await.unwrap();
    for item in store.list_batch_items(&batch.id).await.unwrap() {
        let events = store.get_work_item_events(&item.id).await.unwrap();
        let assigned = events
            .iter()
            .filter(|e| e.event_type == WorkItemEventType::Assigned)
            .count();
        assert_eq!(assigned, 1);
    }
}

#[tokio::test]
async fn batch_auto_completes_when_all_members_complete() {
    let store = setup().await;
    let batch = Batch::new("sprint-3");
    store.create_batch(&batch).await.unwrap();

    let mut ids = Vec::new();
    for title in ["x", "y"] {
        let mut item = WorkItem::new(title);
        item.batch_id = Some(batch.id.clone());
        store.create_work_item(&item, None).await.unwrap();
        ids.push(item.id);
    }
    store.dispatch_batch(&batch.id, "scout").await.unwrap();

    store
        .update_work_item_status(&ids[0], WorkItemStatus::Completed, None, "")
        .await
        .unwrap();
    assert_eq!(
        store.get_batch(&batch.id).await.unwrap().unwrap().status,
        BatchStatus::Dispatched
    );

    store
        .update_work_item_status(&ids[1], WorkItemStatus::Completed, None, "")
        .await
        .unwrap();
    assert_eq!(
        store.get_batch(&batch.id).await.unwrap().unwrap().status,
        BatchStatus::Completed
    );
}

#[tokio::test]
async fn slugs_use_the_restricted_alphabet() {
    let item = WorkItem::new("slug check");
    assert!(item.id.starts_with("wi-"));
    let batch = Batch::new("slug check");
    assert!(batch.id.starts_with("batch-"));
}
