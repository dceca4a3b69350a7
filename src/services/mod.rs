//! Application services for the armada coordination core.

pub mod config;
pub mod event_bus;
pub mod expression;
pub mod logging;
pub mod scheduler;
pub mod spawn_controller;
pub mod trigger_matcher;
pub mod worker_registry;
pub mod workflow_engine;

pub use config::{Config, ConfigError};
pub use event_bus::{EventBus, EventBusConfig, EventPayload, FleetEvent, Subject};
pub use scheduler::{Scheduler, SchedulerSettings};
pub use spawn_controller::SpawnController;
pub use trigger_matcher::TriggerMatcher;
pub use worker_registry::{RegistrySettings, WorkerRegistry, WorkerSpec};
pub use workflow_engine::{EngineSettings, WorkflowEngine};
