//! Domain layer for the armada coordination core.
//!
//! Core entities, the error taxonomy, identity kinds, and the capability
//! ports the services depend on.

pub mod errors;
pub mod identity;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
pub use identity::{Handle, SwarmId, TeamName, Uid};
