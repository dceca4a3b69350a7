//! Armada — coordination core for a multi-agent fleet orchestrator.
//!
//! Supervises a bounded pool of externally-spawned coding agents:
//! - Spawn queue with admission control, depth limits, and dependency
//!   ordering
//! - DAG-scheduled workflow executions with step-type dispatch
//! - Swarm-scoped blackboard with per-reader read state and archival
//! - Task / work-item / mail / handoff coordination primitives
//! - A single cooperative scheduler tick driving the lot

pub mod adapters;
pub mod domain;
pub mod services;
