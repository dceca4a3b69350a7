//! Worker store port.
//!
//! The registry owns the live roster in memory; this port is the durable
//! mirror it rebuilds from on startup.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::identity::{Handle, SwarmId, TeamName};
use crate::domain::models::Worker;

#[async_trait]
pub trait WorkerStore: Send + Sync {
    /// Insert or replace a worker row (keyed by `(team_name, handle)`).
    async fn upsert_worker(&self, worker: &Worker) -> DomainResult<()>;

    async fn get_worker(&self, team: &TeamName, handle: &Handle) -> DomainResult<Option<Worker>>;

    async fn list_by_team(&self, team: &TeamName) -> DomainResult<Vec<Worker>>;

    async fn list_by_swarm(&self, swarm: &SwarmId) -> DomainResult<Vec<Worker>>;

    /// All workers not in `dismissed` state, for roster rebuild.
    async fn list_live(&self) -> DomainResult<Vec<Worker>>;

    /// Remove a worker row. Removing a missing row is a no-op.
    async fn remove_worker(&self, team: &TeamName, handle: &Handle) -> DomainResult<()>;
}
