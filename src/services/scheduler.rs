//! The cooperative scheduler tick.
//!
//! One loop at `tick_interval_ms` advances the whole core: running
//! executions, the spawn queue, heartbeat health, and schedule/blackboard
//! trigger sampling. Re-entrancy is blocked by a boolean guard: a tick that
//! fires while the previous one is still running is skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::services::event_bus::{EventBus, FleetEvent};
use crate::services::spawn_controller::SpawnController;
use crate::services::trigger_matcher::TriggerMatcher;
use crate::services::worker_registry::WorkerRegistry;
use crate::services::workflow_engine::WorkflowEngine;

/// Scheduler tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub tick_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { tick_interval_ms: 1000 }
    }
}

/// The scheduler loop.
pub struct Scheduler {
    engine: Arc<WorkflowEngine>,
    controller: Arc<SpawnController>,
    registry: Arc<WorkerRegistry>,
    matcher: Arc<TriggerMatcher>,
    settings: SchedulerSettings,
    running: Arc<AtomicBool>,
    /// Re-entrancy guard. Held for the duration of one tick.
    in_tick: Arc<AtomicBool>,
    /// Bus events drained each tick and fed to event triggers.
    events: tokio::sync::Mutex<broadcast::Receiver<FleetEvent>>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        controller: Arc<SpawnController>,
        registry: Arc<WorkerRegistry>,
        matcher: Arc<TriggerMatcher>,
        bus: &EventBus,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            engine,
            controller,
            registry,
            matcher,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            in_tick: Arc::new(AtomicBool::new(false)),
            events: tokio::sync::Mutex::new(bus.subscribe()),
        }
    }

    /// Run one tick. Returns `false` when a previous tick was still running
    /// and this one was skipped.
    pub async fn tick(&self) -> bool {
        // compare_exchange take: only one tick at a time, overlaps skipped.
        if self
            .in_tick
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("tick still running, skipping");
            return false;
        }

        // 1. Advance running executions.
        if let Err(e) = self.engine.tick().await {
            error!(error = %e, "workflow tick failed");
        }

        // 2. Release capacity for workers that exited since the last tick,
        //    then drain the spawn queue.
        for exit in self.registry.drain_exits().await {
            debug!(handle = %exit.handle, reason = %exit.reason, "releasing spawn slot");
            self.controller.release_slot();
        }
        if let Err(e) = self.controller.drain().await {
            error!(error = %e, "spawn queue drain failed");
        }

        // 3. Heartbeat sweep.
        if let Err(e) = self.registry.sweep_health(chrono::Utc::now()).await {
            error!(error = %e, "health sweep failed");
        }

        // 4. Trigger sampling: buffered bus events, then schedules, then
        //    the blackboard.
        loop {
            let event = {
                let mut events = self.events.lock().await;
                match events.try_recv() {
                    Ok(event) => event,
                    Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                        debug!(missed, "event feed lagged, continuing");
                        continue;
                    }
                    Err(_) => break,
                }
            };
            if let Err(e) = self.matcher.handle_event(&event).await {
                error!(error = %e, "event trigger matching failed");
            }
        }
        if let Err(e) = self.matcher.sample_schedules(chrono::Utc::now()).await {
            error!(error = %e, "schedule trigger sampling failed");
        }
        if let Err(e) = self.matcher.sample_blackboard().await {
            error!(error = %e, "blackboard trigger sampling failed");
        }

        self.in_tick.store(false, Ordering::SeqCst);
        true
    }

    /// Start the loop. Returns a handle; the loop stops when [`Self::stop`]
    /// is called.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let scheduler = self;
        let interval = Duration::from_millis(scheduler.settings.tick_interval_ms);
        info!(interval_ms = scheduler.settings.tick_interval_ms, "scheduler started");
        tokio::spawn(async move {
            while scheduler.running.load(Ordering::SeqCst) {
                tokio::time::sleep(interval).await;
                scheduler.tick().await;
            }
            info!("scheduler stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
