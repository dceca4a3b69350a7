//! Worker domain model.
//!
//! A worker is an externally-spawned coding agent supervised by the
//! registry. The roster is in-memory; rows are mirrored to storage so the
//! fleet survives a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::{Handle, SwarmId, TeamName};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Spawn issued, process not yet checked in.
    Starting,
    /// Checked in and idle.
    Ready,
    /// Actively executing a task.
    Working,
    /// Terminated; kept only for audit.
    Dismissed,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::Starting
    }
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Working => "working",
            Self::Dismissed => "dismissed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "starting" => Some(Self::Starting),
            "ready" => Some(Self::Ready),
            "working" => Some(Self::Working),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    /// Whether this worker counts against the spawn controller's capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Ready | Self::Working)
    }
}

/// Health derived from heartbeat age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Default for WorkerHealth {
    fn default() -> Self {
        Self::Healthy
    }
}

impl WorkerHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "healthy" => Some(Self::Healthy),
            "degraded" => Some(Self::Degraded),
            "unhealthy" => Some(Self::Unhealthy),
            _ => None,
        }
    }

    /// Classify a heartbeat age in seconds.
    pub fn from_heartbeat_age_secs(age: i64) -> Self {
        if age < 30 {
            Self::Healthy
        } else if age <= 120 {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }
}

/// How the worker process was launched. The core treats all three the same;
/// the spawn mechanism itself lives outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnMode {
    Native,
    Tmux,
    External,
}

impl Default for SpawnMode {
    fn default() -> Self {
        Self::Native
    }
}

impl SpawnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Tmux => "tmux",
            Self::External => "external",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "native" => Some(Self::Native),
            "tmux" => Some(Self::Tmux),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// A supervised worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub handle: Handle,
    pub team_name: TeamName,
    pub swarm_id: Option<SwarmId>,
    pub state: WorkerState,
    pub health: WorkerHealth,
    pub spawn_mode: SpawnMode,
    /// Distance from a root-spawned worker. Roots are 0; a spawned child is
    /// `parent.depth_level + 1`.
    pub depth_level: u32,
    pub parent_handle: Option<Handle>,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub last_heartbeat: DateTime<Utc>,
    pub spawned_at: DateTime<Utc>,
}

impl Worker {
    /// Create a freshly-registered worker in `Starting` state.
    pub fn new(
        handle: Handle,
        team_name: TeamName,
        swarm_id: Option<SwarmId>,
        spawn_mode: SpawnMode,
        depth_level: u32,
        parent_handle: Option<Handle>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            handle,
            team_name,
            swarm_id,
            state: WorkerState::Starting,
            health: WorkerHealth::Healthy,
            spawn_mode,
            depth_level,
            parent_handle,
            pid: None,
            restart_count: 0,
            last_heartbeat: now,
            spawned_at: now,
        }
    }

    /// Age of the last heartbeat relative to `now`, in seconds.
    pub fn heartbeat_age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_heartbeat).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_bands() {
        assert_eq!(WorkerHealth::from_heartbeat_age_secs(0), WorkerHealth::Healthy);
        assert_eq!(WorkerHealth::from_heartbeat_age_secs(29), WorkerHealth::Healthy);
        assert_eq!(WorkerHealth::from_heartbeat_age_secs(30), WorkerHealth::Degraded);
        assert_eq!(WorkerHealth::from_heartbeat_age_secs(120), WorkerHealth::Degraded);
        assert_eq!(WorkerHealth::from_heartbeat_age_secs(121), WorkerHealth::Unhealthy);
    }

    #[test]
    fn active_states_count_against_capacity() {
        assert!(WorkerState::Starting.is_active());
        assert!(WorkerState::Ready.is_active());
        assert!(WorkerState::Working.is_active());
        assert!(!WorkerState::Dismissed.is_active());
    }
}
