//! Blackboard message model.
//!
//! The blackboard is an append-only, swarm-scoped log. Messages are never
//! edited after posting; the only mutations are adding readers to `read_by`
//! and the terminal `archived` flag. Order within a swarm is
//! `(created_at_ms, id)` ascending.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::identity::{Handle, SwarmId};

/// Kind of blackboard message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Status,
    Directive,
    Checkpoint,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Status => "status",
            Self::Directive => "directive",
            Self::Checkpoint => "checkpoint",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "request" => Some(Self::Request),
            "response" => Some(Self::Response),
            "status" => Some(Self::Status),
            "directive" => Some(Self::Directive),
            "checkpoint" => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

/// Message priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for MessagePriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// One message on a swarm's blackboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackboardMessage {
    pub id: Uuid,
    pub swarm_id: SwarmId,
    pub sender_handle: Handle,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub target_handle: Option<Handle>,
    pub payload: serde_json::Value,
    /// Millisecond timestamp assigned at post time.
    pub created_at_ms: i64,
    pub read_by: BTreeSet<Handle>,
    pub archived: bool,
}

impl BlackboardMessage {
    pub fn new(
        swarm_id: SwarmId,
        sender_handle: Handle,
        message_type: MessageType,
        priority: MessagePriority,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            swarm_id,
            sender_handle,
            message_type,
            priority,
            target_handle: None,
            payload,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
            read_by: BTreeSet::new(),
            archived: false,
        }
    }

    pub fn with_target(mut self, target: Handle) -> Self {
        self.target_handle = Some(target);
        self
    }

    pub fn is_read_by(&self, reader: &Handle) -> bool {
        self.read_by.contains(reader)
    }
}

/// Filter for blackboard reads. Default reads exclude archived messages.
#[derive(Debug, Clone, Default)]
pub struct BlackboardFilter {
    pub message_type: Option<MessageType>,
    pub priority: Option<MessagePriority>,
    /// When true, `reader_handle` is required and messages already read by
    /// that reader are excluded.
    pub unread_only: bool,
    pub reader_handle: Option<Handle>,
    pub include_archived: bool,
    pub limit: Option<usize>,
}
