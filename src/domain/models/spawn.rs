//! Spawn request model.
//!
//! A spawn request is the controller's unit of admission. The core never
//! launches processes itself; an approved request is handed to the worker
//! registry, and the actual spawn mechanism lives outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::identity::{Handle, SwarmId};
use crate::domain::models::blackboard::MessagePriority;

/// Status of a spawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnStatus {
    /// Waiting for capacity or dependencies.
    Pending,
    /// Slot reserved; spawn handed to the registry.
    Approved,
    /// Worker launched. Terminal for the queue's purposes.
    Spawned,
    /// Refused (depth limit or explicit). Terminal.
    Rejected,
    /// Parked on unsatisfied dependencies.
    Blocked,
    /// Withdrawn before spawning. Terminal.
    Cancelled,
}

impl Default for SpawnStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SpawnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Spawned => "spawned",
            Self::Rejected => "rejected",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "spawned" => Some(Self::Spawned),
            "rejected" => Some(Self::Rejected),
            "blocked" => Some(Self::Blocked),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Spawned | Self::Rejected | Self::Cancelled)
    }

    /// Whether `cancel` is allowed from this status.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

/// A request to spawn a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub id: Uuid,
    pub requester_handle: Handle,
    pub target_agent_type: String,
    pub task: String,
    pub swarm_id: Option<SwarmId>,
    pub priority: MessagePriority,
    pub depth_level: u32,
    pub parent_handle: Option<Handle>,
    /// Request IDs that must reach `spawned` before this one can leave
    /// `pending`.
    pub depends_on: BTreeSet<Uuid>,
    pub status: SpawnStatus,
    /// Rejection reason, when status is `rejected`.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl SpawnRequest {
    pub fn new(
        requester_handle: Handle,
        target_agent_type: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_handle,
            target_agent_type: target_agent_type.into(),
            task: task.into(),
            swarm_id: None,
            priority: MessagePriority::Normal,
            depth_level: 0,
            parent_handle: None,
            depends_on: BTreeSet::new(),
            status: SpawnStatus::Pending,
            reason: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn with_swarm(mut self, swarm_id: SwarmId) -> Self {
        self.swarm_id = Some(swarm_id);
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_depth(mut self, depth_level: u32, parent_handle: Option<Handle>) -> Self {
        self.depth_level = depth_level;
        self.parent_handle = parent_handle;
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Uuid>) -> Self {
        self.depends_on = deps.into_iter().collect();
        self
    }
}

/// Snapshot returned by the controller's `status()` operation.
#[derive(Debug, Clone, Serialize)]
pub struct SpawnQueueStatus {
    pub soft_limit: usize,
    pub hard_limit: usize,
    pub max_depth: u32,
    pub active: usize,
    pub pending: usize,
    pub approved: usize,
}
