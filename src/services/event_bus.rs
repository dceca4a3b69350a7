//! Event bus for fleet-wide event fan-out.
//!
//! Broadcast-based pub/sub with two subject kinds: a global stream every
//! subscriber sees, and chat-scoped streams delivered only to that chat's
//! subscribers. Delivery is at-most-once per subscriber (a lagged receiver
//! simply misses events); ordering is preserved per subject via a global
//! sequence counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned at publish time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an event is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    /// Every subscriber.
    Global,
    /// Only subscribers of this chat.
    Chat(String),
}

/// Event payload, one variant per fleet state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    // Worker lifecycle
    WorkerSpawned {
        handle: String,
        team_name: String,
        swarm_id: Option<String>,
    },
    WorkerOutput {
        handle: String,
        line: String,
    },
    WorkerExit {
        handle: String,
        reason: String,
    },
    WorkerDismissed {
        handle: String,
    },
    WorkerRestart {
        handle: String,
        restart_count: u32,
    },

    // Spawn queue
    SpawnApproved {
        request_id: Uuid,
        agent_type: String,
    },
    SpawnRejected {
        request_id: Uuid,
        reason: String,
    },

    // Coordination primitives
    NewMessage {
        chat_id: String,
        sender: String,
        body: String,
    },
    TaskAssigned {
        task_id: Uuid,
        owner: String,
    },
    TaskUpdated {
        task_id: Uuid,
        status: String,
    },
    BlackboardPosted {
        swarm_id: String,
        message_id: Uuid,
        message_type: String,
    },

    // Workflow lifecycle
    WorkflowStarted {
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
    },
    WorkflowCompleted {
        execution_id: Uuid,
    },
    WorkflowFailed {
        execution_id: Uuid,
        error: String,
    },
    ExecutionPaused {
        execution_id: Uuid,
    },
    ExecutionResumed {
        execution_id: Uuid,
    },
    ExecutionCancelled {
        execution_id: Uuid,
    },
    StepCompleted {
        execution_id: Uuid,
        step_key: String,
    },
    StepFailed {
        execution_id: Uuid,
        step_key: String,
        error: String,
    },

    // Triggers
    TriggerFired {
        trigger_id: Uuid,
        workflow_id: Uuid,
        execution_id: Uuid,
    },
}

impl EventPayload {
    /// Stable event name, used by event triggers and WS message types.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::WorkerSpawned { .. } => "worker:spawned",
            Self::WorkerOutput { .. } => "worker:output",
            Self::WorkerExit { .. } => "worker:exit",
            Self::WorkerDismissed { .. } => "worker:dismissed",
            Self::WorkerRestart { .. } => "worker:restart",
            Self::SpawnApproved { .. } => "spawn:approved",
            Self::SpawnRejected { .. } => "spawn:rejected",
            Self::NewMessage { .. } => "new_message",
            Self::TaskAssigned { .. } => "task_assigned",
            Self::TaskUpdated { .. } => "task_updated",
            Self::BlackboardPosted { .. } => "blackboard:posted",
            Self::WorkflowStarted { .. } => "workflow:started",
            Self::WorkflowCompleted { .. } => "workflow:completed",
            Self::WorkflowFailed { .. } => "workflow:failed",
            Self::ExecutionPaused { .. } => "execution:paused",
            Self::ExecutionResumed { .. } => "execution:resumed",
            Self::ExecutionCancelled { .. } => "execution:cancelled",
            Self::StepCompleted { .. } => "step:completed",
            Self::StepFailed { .. } => "step:failed",
            Self::TriggerFired { .. } => "trigger:fired",
        }
    }

    /// Payload fields as JSON, for trigger filters.
    pub fn to_filter_json(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("data").cloned())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub subject: Subject,
    pub payload: EventPayload,
}

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of each broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024 }
    }
}

/// Process-local publish/subscribe hub.
///
/// Publishing never blocks: fan-out goes through `tokio::sync::broadcast`
/// channels, and subscribers that fall behind are dropped by the channel,
/// not waited on.
pub struct EventBus {
    global: broadcast::Sender<FleetEvent>,
    chats: RwLock<HashMap<String, broadcast::Sender<FleetEvent>>>,
    sequence: AtomicU64,
    config: EventBusConfig,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (global, _) = broadcast::channel(config.channel_capacity);
        Self {
            global,
            chats: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            config,
        }
    }

    /// Publish to the global subject.
    pub fn publish(&self, payload: EventPayload) -> FleetEvent {
        self.publish_to(Subject::Global, payload)
    }

    /// Publish to a specific subject. Global events reach only global
    /// subscribers; chat events reach only that chat's subscribers.
    pub fn publish_to(&self, subject: Subject, payload: EventPayload) -> FleetEvent {
        let event = FleetEvent {
            id: EventId::new(),
            sequence: SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst)),
            timestamp: Utc::now(),
            subject: subject.clone(),
            payload,
        };

        match &subject {
            Subject::Global => {
                // Send errors just mean no subscribers.
                let _ = self.global.send(event.clone());
            }
            Subject::Chat(chat_id) => {
                let chats = self.chats.read().unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(sender) = chats.get(chat_id) {
                    let _ = sender.send(event.clone());
                }
            }
        }
        event
    }

    /// Subscribe to the global stream.
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.global.subscribe()
    }

    /// Subscribe to a chat-scoped stream, creating the subject on first use.
    pub fn subscribe_chat(&self, chat_id: &str) -> broadcast::Receiver<FleetEvent> {
        let mut chats = self.chats.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        chats
            .entry(chat_id.to_string())
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity).0)
            .subscribe()
    }

    /// Drop a chat subject that no longer has subscribers.
    pub fn prune_chat(&self, chat_id: &str) {
        let mut chats = self.chats.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(sender) = chats.get(chat_id) {
            if sender.receiver_count() == 0 {
                chats.remove(chat_id);
            }
        }
    }

    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    pub fn subscriber_count(&self) -> usize {
        self.global.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn global_events_are_sequenced_in_publish_order() {
        let bus = EventBus::new(EventBusConfig::default());
        let mut rx = bus.subscribe();

        bus.publish(EventPayload::WorkerDismissed { handle: "a".into() });
        bus.publish(EventPayload::WorkerDismissed { handle: "b".into() });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.sequence.0, 0);
        assert_eq!(second.sequence.0, 1);
        assert!(first.sequence < second.sequence);
    }

    #[tokio::test]
    async fn chat_events_stay_scoped_to_their_chat() {
        let bus = EventBus::new(EventBusConfig::default());
        let mut chat_a = bus.subscribe_chat("a");
        let mut chat_b = bus.subscribe_chat("b");
        let mut global = bus.subscribe();

        bus.publish_to(
            Subject::Chat("a".into()),
            EventPayload::NewMessage {
                chat_id: "a".into(),
                sender: "lead".into(),
                body: "hi".into(),
            },
        );

        let got = chat_a.recv().await.unwrap();
        assert_eq!(got.payload.variant_name(), "new_message");
        assert!(chat_b.try_recv().is_err());
        assert!(global.try_recv().is_err());
    }

    #[test]
    fn variant_names_are_stable() {
        let payload = EventPayload::WorkerExit { handle: "w".into(), reason: "done".into() };
        assert_eq!(payload.variant_name(), "worker:exit");
        let json = payload.to_filter_json();
        assert_eq!(json["handle"], "w");
        assert_eq!(json["reason"], "done");
    }
}
