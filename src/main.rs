//! Armada daemon entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use armada::adapters::sqlite::{
    initialize_database, SqliteBlackboardStore, SqliteCheckpointStore, SqliteSpawnQueueStore,
    SqliteTaskStore, SqliteTriggerStore, SqliteWorkerStore, SqliteWorkflowStore,
};
use armada::services::config::Config;
use armada::services::event_bus::{EventBus, EventBusConfig};
use armada::services::scheduler::{Scheduler, SchedulerSettings};
use armada::services::spawn_controller::SpawnController;
use armada::services::trigger_matcher::TriggerMatcher;
use armada::services::worker_registry::{RegistrySettings, WorkerRegistry};
use armada::services::workflow_engine::{EngineSettings, WorkflowEngine};
use armada::services::logging;

/// Coordination core for a multi-agent fleet orchestrator.
#[derive(Debug, Parser)]
#[command(name = "armada", version, about)]
struct Cli {
    /// Path to the SQLite database (overrides config).
    #[arg(long, env = "ARMADA_DB_PATH")]
    db_path: Option<String>,

    /// Tick interval in milliseconds (overrides config).
    #[arg(long)]
    tick_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    if let Some(interval) = cli.tick_interval_ms {
        config.scheduler.tick_interval_ms = interval;
    }

    let _log_guard = logging::init(&config.logging);
    tracing::info!(db = %config.database.path, "armada starting");

    let pool = initialize_database(&config.database)
        .await
        .context("failed to initialize database")?;

    let bus = Arc::new(EventBus::new(EventBusConfig::default()));

    let worker_store = Arc::new(SqliteWorkerStore::new(pool.clone()));
    let task_store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let checkpoint_store = Arc::new(SqliteCheckpointStore::new(pool.clone()));
    let spawn_store = Arc::new(SqliteSpawnQueueStore::new(pool.clone()));
    let workflow_store = Arc::new(SqliteWorkflowStore::new(pool.clone()));
    let trigger_store = Arc::new(SqliteTriggerStore::new(pool.clone()));
    let blackboard_store = Arc::new(SqliteBlackboardStore::new(pool.clone()));

    let registry = Arc::new(WorkerRegistry::new(
        worker_store,
        bus.clone(),
        RegistrySettings {
            restart_threshold_secs: config.registry.restart_threshold_secs as i64,
        },
    ));
    registry.rebuild().await.context("failed to rebuild worker roster")?;

    let controller = Arc::new(SpawnController::new(
        spawn_store,
        registry.clone(),
        bus.clone(),
        config.spawn,
    ));
    controller.rebuild().await.context("failed to rebuild spawn controller")?;

    let engine = Arc::new(WorkflowEngine::new(
        workflow_store,
        task_store,
        checkpoint_store,
        controller.clone(),
        bus.clone(),
        EngineSettings { max_ready_per_tick: config.scheduler.max_ready_per_tick },
    ));

    let matcher = Arc::new(TriggerMatcher::new(
        trigger_store,
        blackboard_store,
        engine.clone(),
        bus.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        engine,
        controller,
        registry,
        matcher,
        &bus,
        SchedulerSettings { tick_interval_ms: config.scheduler.tick_interval_ms },
    ));
    let handle = scheduler.clone().start();

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    scheduler.stop();
    let _ = handle.await;
    Ok(())
}
