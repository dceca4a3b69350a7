//! Spawn queue admission control.
//!
//! The controller enforces three bounded resources: a soft limit that queues
//! new work, a hard limit that rejects it outright, and a depth limit on the
//! spawn tree. Approval runs from the scheduler tick and drains the queue in
//! FIFO order within priority class.
//!
//! Slot accounting: `approved` reserves a slot, `spawned` finalizes it, a
//! failed spawn releases it, and a worker exit releases it.

use chrono::Utc;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::{Handle, TeamName};
use crate::domain::models::{SpawnMode, SpawnQueueStatus, SpawnRequest, SpawnStatus};
use crate::domain::ports::SpawnQueueStore;
use crate::services::config::SpawnLimitsConfig;
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::worker_registry::{WorkerRegistry, WorkerSpec};

pub struct SpawnController {
    store: Arc<dyn SpawnQueueStore>,
    registry: Arc<WorkerRegistry>,
    bus: Arc<EventBus>,
    limits: SpawnLimitsConfig,
    /// Reserved + live slots. See the module doc for the accounting rules.
    active: AtomicUsize,
}

impl SpawnController {
    pub fn new(
        store: Arc<dyn SpawnQueueStore>,
        registry: Arc<WorkerRegistry>,
        bus: Arc<EventBus>,
        limits: SpawnLimitsConfig,
    ) -> Self {
        Self { store, registry, bus, limits, active: AtomicUsize::new(0) }
    }

    /// Recompute `active` from live workers plus outstanding reservations.
    /// Called once at startup after the registry rebuilds.
    pub async fn rebuild(&self) -> DomainResult<()> {
        let live = self.registry.active_count().await;
        let reserved = self.store.count_by_status(SpawnStatus::Approved).await? as usize;
        self.active.store(live + reserved, Ordering::SeqCst);
        info!(live, reserved, "spawn controller rebuilt");
        Ok(())
    }

    /// Enqueue a spawn request.
    ///
    /// Depth violations persist the request as `rejected` and return it; the
    /// caller sees the decision on the record. At the hard limit the request
    /// is rejected with [`DomainError::HardLimitReached`].
    pub async fn enqueue(&self, mut request: SpawnRequest) -> DomainResult<SpawnRequest> {
        if request.depth_level > self.limits.max_depth {
            request.status = SpawnStatus::Rejected;
            request.reason = Some(format!(
                "DepthLimitExceeded: depth {} > max {}",
                request.depth_level, self.limits.max_depth
            ));
            request.decided_at = Some(Utc::now());
            self.store.create_request(&request).await?;
            self.bus.publish(EventPayload::SpawnRejected {
                request_id: request.id,
                reason: request.reason.clone().unwrap_or_default(),
            });
            return Ok(request);
        }

        let active = self.active.load(Ordering::SeqCst);
        if active >= self.limits.hard_limit {
            return Err(DomainError::HardLimitReached {
                active,
                hard_limit: self.limits.hard_limit,
            });
        }

        self.store.create_request(&request).await?;
        debug!(id = %request.id, agent_type = %request.target_agent_type, "spawn request queued");
        Ok(request)
    }

    /// Queue snapshot.
    pub async fn status(&self) -> DomainResult<SpawnQueueStatus> {
        Ok(SpawnQueueStatus {
            soft_limit: self.limits.soft_limit,
            hard_limit: self.limits.hard_limit,
            max_depth: self.limits.max_depth,
            active: self.active.load(Ordering::SeqCst),
            pending: self.store.count_by_status(SpawnStatus::Pending).await? as usize,
            approved: self.store.count_by_status(SpawnStatus::Approved).await? as usize,
        })
    }

    /// Cancel a request. Only `pending` and `approved` requests can be
    /// cancelled; cancelling an approved request releases its slot. A worker
    /// already produced by the request is left alone.
    pub async fn cancel(&self, id: Uuid) -> DomainResult<SpawnRequest> {
        let request = self
            .store
            .get_request(id)
            .await?
            .ok_or(DomainError::SpawnRequestNotFound(id))?;
        if !request.status.is_cancellable() {
            return Err(DomainError::InvalidStateTransition {
                from: request.status.as_str().to_string(),
                to: SpawnStatus::Cancelled.as_str().to_string(),
            });
        }
        let was_approved = request.status == SpawnStatus::Approved;
        let updated = self
            .store
            .update_request_status(id, SpawnStatus::Cancelled, Some("cancelled by caller"))
            .await?;
        if was_approved {
            self.release_slot();
        }
        Ok(updated)
    }

    /// Release one slot. Called by the tick for every drained worker exit
    /// and internally on spawn failure.
    pub fn release_slot(&self) {
        // Saturating: a stray release must not underflow the counter.
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// One approval pass, invoked from the scheduler tick.
    ///
    /// Pending requests are visited oldest first, tie-broken by higher
    /// priority then lower depth. A request is approved only when every
    /// dependency is `spawned`, a soft-limit slot is free, and depth is in
    /// range. Returns the number of workers spawned.
    pub async fn drain(&self) -> DomainResult<usize> {
        let mut pending = self.store.list_by_status(SpawnStatus::Pending).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        pending.sort_by_key(|r| (r.created_at, Reverse(r.priority), r.depth_level));

        let mut spawned = 0;
        for request in pending {
            if self.active.load(Ordering::SeqCst) >= self.limits.soft_limit {
                break;
            }
            match self.dependencies_satisfied(&request).await? {
                DependencyCheck::Satisfied => {}
                DependencyCheck::Waiting => continue,
                DependencyCheck::Dead(dep_id) => {
                    // A dependency that can never spawn parks the request.
                    warn!(id = %request.id, dep = %dep_id, "spawn dependency terminally unsatisfied");
                    self.store
                        .update_request_status(
                            request.id,
                            SpawnStatus::Blocked,
                            Some(&format!("dependency {dep_id} will never spawn")),
                        )
                        .await?;
                    continue;
                }
            }

            // Reserve the slot, then try to spawn.
            self.active.fetch_add(1, Ordering::SeqCst);
            self.store
                .update_request_status(request.id, SpawnStatus::Approved, None)
                .await?;
            self.bus.publish(EventPayload::SpawnApproved {
                request_id: request.id,
                agent_type: request.target_agent_type.clone(),
            });

            let spec = WorkerSpec {
                handle: Handle::new(format!(
                    "{}-{}",
                    request.target_agent_type,
                    &request.id.simple().to_string()[..8]
                )),
                team_name: TeamName::new("fleet"),
                swarm_id: request.swarm_id.clone(),
                spawn_mode: SpawnMode::Native,
                depth_level: request.depth_level,
                parent_handle: request.parent_handle.clone(),
            };
            match self.registry.register(spec).await {
                Ok(worker) => {
                    self.store
                        .update_request_status(request.id, SpawnStatus::Spawned, None)
                        .await?;
                    debug!(id = %request.id, handle = %worker.handle, "spawn request fulfilled");
                    spawned += 1;
                }
                Err(e) => {
                    // Release the reservation and retry on a later tick.
                    warn!(id = %request.id, error = %e, "spawn failed, returning request to pending");
                    self.release_slot();
                    self.store
                        .update_request_status(request.id, SpawnStatus::Pending, None)
                        .await?;
                }
            }
        }
        Ok(spawned)
    }

    async fn dependencies_satisfied(&self, request: &SpawnRequest) -> DomainResult<DependencyCheck> {
        for dep_id in &request.depends_on {
            let dep = self
                .store
                .get_request(*dep_id)
                .await?
                .ok_or(DomainError::SpawnRequestNotFound(*dep_id))?;
            match dep.status {
                SpawnStatus::Spawned => {}
                SpawnStatus::Rejected | SpawnStatus::Cancelled => {
                    return Ok(DependencyCheck::Dead(*dep_id));
                }
                _ => return Ok(DependencyCheck::Waiting),
            }
        }
        Ok(DependencyCheck::Satisfied)
    }
}

enum DependencyCheck {
    Satisfied,
    Waiting,
    /// The dependency is terminal without having spawned.
    Dead(Uuid),
}
