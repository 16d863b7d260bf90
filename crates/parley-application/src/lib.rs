//! Application layer for Parley.
//!
//! This crate wires the domain store to its infrastructure
//! collaborators: optimistic send orchestration, health polling,
//! debounced persistence and the engine facade UI layers construct.

pub mod engine;
pub mod health;
pub mod persister;
pub mod sync;

pub use engine::ChatEngine;
pub use health::{HealthMonitor, HealthStatus};
pub use persister::SnapshotPersister;
pub use sync::{SendOutcome, SyncCoordinator};
