//! In-memory worker roster with durable mirroring.
//!
//! The registry owns the live `handle → Worker` map. All mutation goes
//! through its methods; the scheduler tick drives health sweeps and drains
//! queued exits so the spawn controller can release capacity. Rows are
//! mirrored through the [`WorkerStore`] so the roster survives restarts.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::{Handle, SwarmId, TeamName};
use crate::domain::models::{SpawnMode, Worker, WorkerHealth, WorkerState};
use crate::domain::ports::WorkerStore;
use crate::services::event_bus::{EventBus, EventPayload};

/// What to register. Issued by the spawn controller on admission or by the
/// transport layer for externally-started workers.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub handle: Handle,
    pub team_name: TeamName,
    pub swarm_id: Option<SwarmId>,
    pub spawn_mode: SpawnMode,
    pub depth_level: u32,
    pub parent_handle: Option<Handle>,
}

/// A drained worker exit, consumed by the scheduler tick.
#[derive(Debug, Clone)]
pub struct WorkerExit {
    pub handle: Handle,
    pub reason: String,
}

/// Registry tuning.
#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    /// Seconds a worker may stay unhealthy before becoming restart-eligible.
    pub restart_threshold_secs: i64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self { restart_threshold_secs: 300 }
    }
}

/// In-memory roster of live workers.
pub struct WorkerRegistry {
    store: Arc<dyn WorkerStore>,
    bus: Arc<EventBus>,
    settings: RegistrySettings,
    roster: RwLock<HashMap<Handle, Worker>>,
    /// Time each worker was first seen unhealthy, for restart eligibility.
    unhealthy_since: Mutex<HashMap<Handle, DateTime<Utc>>>,
    /// Exits recorded since the last tick drained them.
    pending_exits: Mutex<Vec<WorkerExit>>,
}

impl WorkerRegistry {
    pub fn new(store: Arc<dyn WorkerStore>, bus: Arc<EventBus>, settings: RegistrySettings) -> Self {
        Self {
            store,
            bus,
            settings,
            roster: RwLock::new(HashMap::new()),
            unhealthy_since: Mutex::new(HashMap::new()),
            pending_exits: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild the roster from persisted non-dismissed workers. Called once
    /// at startup.
    pub async fn rebuild(&self) -> DomainResult<usize> {
        let live = self.store.list_live().await?;
        let count = live.len();
        let mut roster = self.roster.write().await;
        roster.clear();
        for worker in live {
            roster.insert(worker.handle.clone(), worker);
        }
        info!(workers = count, "worker registry rebuilt from store");
        Ok(count)
    }

    /// Register a new worker in `Starting` state.
    ///
    /// Registering a handle that is already live fails with a validation
    /// error; dismissed rows are replaced.
    pub async fn register(&self, spec: WorkerSpec) -> DomainResult<Worker> {
        {
            let roster = self.roster.read().await;
            if let Some(existing) = roster.get(&spec.handle) {
                if existing.state.is_active() {
                    return Err(DomainError::Validation(format!(
                        "worker {} is already registered",
                        spec.handle
                    )));
                }
            }
        }

        let worker = Worker::new(
            spec.handle,
            spec.team_name,
            spec.swarm_id,
            spec.spawn_mode,
            spec.depth_level,
            spec.parent_handle,
        );
        self.store.upsert_worker(&worker).await?;
        self.roster.write().await.insert(worker.handle.clone(), worker.clone());

        self.bus.publish(EventPayload::WorkerSpawned {
            handle: worker.handle.to_string(),
            team_name: worker.team_name.to_string(),
            swarm_id: worker.swarm_id.as_ref().map(ToString::to_string),
        });
        debug!(handle = %worker.handle, depth = worker.depth_level, "worker registered");
        Ok(worker)
    }

    pub async fn get(&self, handle: &Handle) -> Option<Worker> {
        self.roster.read().await.get(handle).cloned()
    }

    /// Transition a worker's lifecycle state.
    pub async fn update_state(&self, handle: &Handle, state: WorkerState) -> DomainResult<Worker> {
        let mut roster = self.roster.write().await;
        let worker = roster
            .get_mut(handle)
            .ok_or_else(|| DomainError::WorkerNotFound(handle.to_string()))?;
        worker.state = state;
        let snapshot = worker.clone();
        drop(roster);
        self.store.upsert_worker(&snapshot).await?;
        Ok(snapshot)
    }

    /// Record a heartbeat, refreshing health immediately.
    pub async fn heartbeat(&self, handle: &Handle) -> DomainResult<()> {
        let mut roster = self.roster.write().await;
        let worker = roster
            .get_mut(handle)
            .ok_or_else(|| DomainError::WorkerNotFound(handle.to_string()))?;
        worker.last_heartbeat = Utc::now();
        worker.health = WorkerHealth::Healthy;
        let snapshot = worker.clone();
        drop(roster);
        self.unhealthy_since.lock().await.remove(handle);
        self.store.upsert_worker(&snapshot).await?;
        Ok(())
    }

    /// Explicitly set a worker's health.
    pub async fn mark_health(&self, handle: &Handle, health: WorkerHealth) -> DomainResult<()> {
        let mut roster = self.roster.write().await;
        let worker = roster
            .get_mut(handle)
            .ok_or_else(|| DomainError::WorkerNotFound(handle.to_string()))?;
        worker.health = health;
        let snapshot = worker.clone();
        drop(roster);
        self.store.upsert_worker(&snapshot).await?;
        Ok(())
    }

    /// Record a line of worker output and fan it out.
    pub fn record_output(&self, handle: &Handle, line: &str) {
        self.bus.publish(EventPayload::WorkerOutput {
            handle: handle.to_string(),
            line: line.to_string(),
        });
    }

    /// Record a worker exit. The roster entry is removed immediately; the
    /// exit is queued so the next tick can release the controller slot.
    pub async fn record_exit(&self, handle: &Handle, reason: &str) -> DomainResult<()> {
        let removed = {
            let mut roster = self.roster.write().await;
            roster.remove(handle)
        };
        let Some(mut worker) = removed else {
            // Unknown handle: nothing to release, nothing to persist.
            return Ok(());
        };
        worker.state = WorkerState::Dismissed;
        self.store.upsert_worker(&worker).await?;
        self.unhealthy_since.lock().await.remove(handle);
        self.pending_exits.lock().await.push(WorkerExit {
            handle: handle.clone(),
            reason: reason.to_string(),
        });
        self.bus.publish(EventPayload::WorkerExit {
            handle: handle.to_string(),
            reason: reason.to_string(),
        });
        info!(handle = %handle, reason, "worker exited");
        Ok(())
    }

    /// Dismiss a worker. Idempotent: dismissing a gone worker is a no-op.
    pub async fn dismiss(&self, handle: &Handle) -> DomainResult<()> {
        let removed = {
            let mut roster = self.roster.write().await;
            roster.remove(handle)
        };
        let Some(mut worker) = removed else {
            return Ok(());
        };
        worker.state = WorkerState::Dismissed;
        self.store.upsert_worker(&worker).await?;
        self.unhealthy_since.lock().await.remove(handle);
        self.pending_exits.lock().await.push(WorkerExit {
            handle: handle.clone(),
            reason: "dismissed".to_string(),
        });
        self.bus.publish(EventPayload::WorkerDismissed { handle: handle.to_string() });
        Ok(())
    }

    /// Take all exits recorded since the last drain.
    pub async fn drain_exits(&self) -> Vec<WorkerExit> {
        std::mem::take(&mut *self.pending_exits.lock().await)
    }

    /// Recompute health from heartbeat age for every live worker, emitting
    /// `worker:restart` for workers unhealthy past the restart threshold.
    pub async fn sweep_health(&self, now: DateTime<Utc>) -> DomainResult<()> {
        let mut restart_eligible = Vec::new();
        {
            let mut roster = self.roster.write().await;
            let mut unhealthy = self.unhealthy_since.lock().await;
            for worker in roster.values_mut() {
                if !worker.state.is_active() {
                    continue;
                }
                let health = WorkerHealth::from_heartbeat_age_secs(worker.heartbeat_age_secs(now));
                worker.health = health;
                match health {
                    WorkerHealth::Unhealthy => {
                        let since = *unhealthy.entry(worker.handle.clone()).or_insert(now);
                        if (now - since).num_seconds() > self.settings.restart_threshold_secs {
                            worker.restart_count += 1;
                            restart_eligible.push((worker.handle.clone(), worker.restart_count));
                            // Restart resets the eligibility window.
                            unhealthy.insert(worker.handle.clone(), now);
                        }
                    }
                    _ => {
                        unhealthy.remove(&worker.handle);
                    }
                }
            }
        }

        for (handle, restart_count) in restart_eligible {
            warn!(handle = %handle, restart_count, "worker unhealthy past threshold, restart eligible");
            if let Some(worker) = self.get(&handle).await {
                self.store.upsert_worker(&worker).await?;
            }
            self.bus.publish(EventPayload::WorkerRestart {
                handle: handle.to_string(),
                restart_count,
            });
        }
        Ok(())
    }

    pub async fn list_by_team(&self, team: &TeamName) -> Vec<Worker> {
        self.roster
            .read()
            .await
            .values()
            .filter(|w| &w.team_name == team)
            .cloned()
            .collect()
    }

    pub async fn list_by_swarm(&self, swarm: &SwarmId) -> Vec<Worker> {
        self.roster
            .read()
            .await
            .values()
            .filter(|w| w.swarm_id.as_ref() == Some(swarm))
            .cloned()
            .collect()
    }

    pub async fn list_all(&self) -> Vec<Worker> {
        self.roster.read().await.values().cloned().collect()
    }

    /// Number of workers counting against spawn capacity.
    pub async fn active_count(&self) -> usize {
        self.roster
            .read()
            .await
            .values()
            .filter(|w| w.state.is_active())
            .count()
    }
}
