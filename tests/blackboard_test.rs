//! Integration tests for the swarm blackboard.

use armada::adapters::sqlite::{create_migrated_test_pool, SqliteBlackboardStore};
use armada::domain::identity::{Handle, SwarmId};
use armada::domain::models::{
    BlackboardFilter, BlackboardMessage, MessagePriority, MessageType,
};
use armada::domain::ports::BlackboardStore;
use serde_json::json;

async fn setup() -> SqliteBlackboardStore {
    let pool = create_migrated_test_pool().await.unwrap();
    SqliteBlackboardStore::new(pool)
}

fn message(swarm: &SwarmId, sender: &str, body: serde_json::Value) -> BlackboardMessage {
    BlackboardMessage::new(
        swarm.clone(),
        Handle::from(sender),
        MessageType::Status,
        MessagePriority::Normal,
        body,
    )
}

#[tokio::test]
async fn unread_filtering_and_archival() {
    // Scenario: X posts M1, M2; Y reads M1; archive-older-than sweeps both.
    let store = setup().await;
    let swarm = SwarmId::from("s");
    let reader = Handle::from("y");

    let m1 = message(&swarm, "x", json!({"n": 1}));
    let mut m2 = message(&swarm, "x", json!({"n": 2}));
    // Distinct timestamps so ordering is deterministic.
    m2.created_at_ms = m1.created_at_ms + 1;
    store.post(&m1).await.unwrap();
    store.post(&m2).await.unwrap();

    let unread = store
        .read(
            &swarm,
            BlackboardFilter {
                unread_only: true,
                reader_handle: Some(reader.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unread.len(), 2);

    store.mark_read(&[m1.id], &reader).await.unwrap();
    let unread = store
        .read(
            &swarm,
            BlackboardFilter {
                unread_only: true,
                reader_handle: Some(reader.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, m2.id);

    assert_eq!(store.get_unread_count(&swarm, &reader).await.unwrap(), 1);

    let archived = store.archive_older_than(&swarm, 0).await.unwrap();
    assert_eq!(archived, 2);
    let remaining = store.read(&swarm, BlackboardFilter::default()).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn messages_order_by_created_at_then_id() {
    let store = setup().await;
    let swarm = SwarmId::from("ordered");

    let base = chrono::Utc::now().timestamp_millis();
    let mut posted = Vec::new();
    for offset in [2, 0, 1] {
        let mut m = message(&swarm, "x", json!({"offset": offset}));
        m.created_at_ms = base + offset;
        store.post(&m).await.unwrap();
        posted.push(m);
    }

    let read = store.read(&swarm, BlackboardFilter::default()).await.unwrap();
    let stamps: Vec<i64> = read.iter().map(|m| m.created_at_ms).collect();
    assert_eq!(stamps, vec![base, base + 1, base + 2]);
}

#[tokio::test]
async fn mark_read_is_idempotent_and_skips_missing_ids() {
    let store = setup().await;
    let swarm = SwarmId::from("s");
    let reader = Handle::from("y");
    let m = message(&swarm, "x", json!({}));
    store.post(&m).await.unwrap();

    let missing = uuid::Uuid::new_v4();
    store.mark_read(&[m.id, missing], &reader).await.unwrap();
    store.mark_read(&[m.id], &reader).await.unwrap();

    let read = store
        .read(&swarm, BlackboardFilter { include_archived: true, ..Default::default() })
        .await
        .unwrap();
    // read_by stays a set under repeated marking.
    assert_eq!(read[0].read_by.len(), 1);
    assert!(read[0].is_read_by(&reader));
}

#[tokio::test]
async fn filters_by_type_and_priority() {
    let store = setup().await;
    let swarm = SwarmId::from("s");

    let directive = BlackboardMessage::new(
        swarm.clone(),
        Handle::from("lead"),
        MessageType::Directive,
        MessagePriority::Critical,
        json!({"do": "halt"}),
    );
    store.post(&directive).await.unwrap();
    store.post(&message(&swarm, "x", json!({}))).await.unwrap();

    let directives = store
        .read(
            &swarm,
            BlackboardFilter {
                message_type: Some(MessageType::Directive),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(directives.len(), 1);
    assert_eq!(directives[0].priority, MessagePriority::Critical);

    let critical = store
        .read(
            &swarm,
            BlackboardFilter {
                priority: Some(MessagePriority::Critical),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(critical.len(), 1);
}

#[tokio::test]
async fn unread_only_without_reader_is_a_validation_error() {
    let store = setup().await;
    let swarm = SwarmId::from("s");
    let err = store
        .read(&swarm, BlackboardFilter { unread_only: true, ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, armada::domain::errors::DomainError::Validation(_)));
}

#[tokio::test]
async fn archived_is_terminal_and_hidden_from_default_reads() {
    let store = setup().await;
    let swarm = SwarmId::from("s");
    let m = message(&swarm, "x", json!({}));
    store.post(&m).await.unwrap();

    store.archive(&[m.id]).await.unwrap();
    store.archive(&[m.id]).await.unwrap();

    assert!(store.read(&swarm, BlackboardFilter::default()).await.unwrap().is_empty());
    let with_archived = store
        .read(&swarm, BlackboardFilter { include_archived: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(with_archived.len(), 1);
    assert!(with_archived[0].archived);
}
