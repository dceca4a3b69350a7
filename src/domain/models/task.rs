//! Team-scoped task model.
//!
//! Tasks are the coordination primitive team leads hand to workers. They
//! carry a free-form status machine with a single hard rule: a task cannot
//! resolve while anything in `blocked_by` is unresolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::identity::{Handle, TeamName, Uid};

/// Status of a team task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Resolved,
    Blocked,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Blocked => "blocked",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// A team-scoped task.
///
/// Transitions between statuses are free except `→ resolved`, which the
/// store rejects with `BlockedByUnresolved` while any task in `blocked_by`
/// is not itself resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub team_name: TeamName,
    pub owner_handle: Handle,
    pub owner_uid: Uid,
    pub created_by_handle: Handle,
    pub created_by_uid: Uid,
    pub subject: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub blocked_by: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        team_name: TeamName,
        owner_handle: Handle,
        created_by_handle: Handle,
        subject: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let owner_uid = Uid::derive(&team_name, &owner_handle);
        let created_by_uid = Uid::derive(&team_name, &created_by_handle);
        Self {
            id: Uuid::new_v4(),
            team_name,
            owner_handle,
            owner_uid,
            created_by_handle,
            created_by_uid,
            subject: subject.into(),
            description: None,
            status: TaskStatus::Open,
            blocked_by: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_blocked_by(mut self, blockers: impl IntoIterator<Item = Uuid>) -> Self {
        self.blocked_by = blockers.into_iter().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_derives_uids_from_team_and_handles() {
        let task = Task::new(
            TeamName::from("alpha"),
            Handle::from("worker-1"),
            Handle::from("lead"),
            "setup",
        );
        assert_eq!(task.owner_uid, Uid::derive(&task.team_name, &task.owner_handle));
        assert_eq!(
            task.created_by_uid,
            Uid::derive(&task.team_name, &task.created_by_handle)
        );
        assert_eq!(task.status, TaskStatus::Open);
    }
}
