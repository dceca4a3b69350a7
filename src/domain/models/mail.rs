//! Directed mail between agents and handoff records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::Handle;

/// A directed message. Unread means `read_at` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mail {
    pub id: Uuid,
    pub from: Handle,
    pub to: Handle,
    pub subject: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Mail {
    pub fn new(from: Handle, to: Handle, subject: Option<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            subject,
            body: body.into(),
            created_at: Utc::now(),
            read_at: None,
        }
    }

    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// Outcome of a handoff offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Accepted,
    Rejected,
}

impl Default for HandoffStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl HandoffStatus {
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

/// A context-transfer record from one agent to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub id: Uuid,
    pub from_handle: Handle,
    pub to_handle: Handle,
    pub reason: Option<String>,
    pub context: serde_json::Value,
    pub status: HandoffStatus,
    pub created_at: DateTime<Utc>,
}

impl Handoff {
    pub fn new(
        from_handle: Handle,
        to_handle: Handle,
        reason: Option<String>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_handle,
            to_handle,
            reason,
            context,
            status: HandoffStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
