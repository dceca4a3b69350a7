//! Checkpoint records.
//!
//! A checkpoint asks a named agent (usually a human or team lead) to sign
//! off on accumulated context. Checkpoint workflow steps block on the
//! decision when `wait_for_acceptance` is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::Handle;

/// Decision state of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Accepted,
    Rejected,
}

impl Default for CheckpointStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A sign-off request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub execution_id: Option<Uuid>,
    pub from_handle: Option<Handle>,
    pub to_handle: Handle,
    pub summary: String,
    pub context: serde_json::Value,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(to_handle: Handle, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id: None,
            from_handle: None,
            to_handle,
            summary: summary.into(),
            context: serde_json::json!({}),
            status: CheckpointStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}
