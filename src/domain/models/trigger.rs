//! Workflow triggers.
//!
//! A trigger pairs a workflow with a firing rule. The matcher samples
//! schedule and blackboard triggers from the tick; event triggers are fed
//! from the bus; webhook triggers are fired by the transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::identity::SwarmId;
use crate::domain::models::blackboard::MessageType;

/// Per-kind trigger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Fire on a named bus event. Every entry in `filter` must match the
    /// corresponding key of the event payload.
    Event {
        event_name: String,
        #[serde(default)]
        filter: BTreeMap<String, serde_json::Value>,
    },
    /// Fire every `interval_ms`, or on cron boundary crossings when `cron`
    /// is set.
    Schedule {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cron: Option<String>,
    },
    /// Fired externally by an HTTP POST; `secret` enables HMAC-SHA256
    /// signature verification over the raw body.
    Webhook {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
    },
    /// Fire on a matching new blackboard message.
    Blackboard {
        swarm_id: SwarmId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_type: Option<MessageType>,
        #[serde(default)]
        filter: BTreeMap<String, serde_json::Value>,
    },
}

impl TriggerConfig {
    pub fn type_str(&self) -> &'static str {
        match self {
            Self::Event { .. } => "event",
            Self::Schedule { .. } => "schedule",
            Self::Webhook { .. } => "webhook",
            Self::Blackboard { .. } => "blackboard",
        }
    }
}

/// A registered trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub config: TriggerConfig,
    pub is_enabled: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub fire_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Trigger {
    pub fn new(workflow_id: Uuid, config: TriggerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            config,
            is_enabled: true,
            last_fired_at: None,
            fire_count: 0,
            created_at: Utc::now(),
        }
    }
}
