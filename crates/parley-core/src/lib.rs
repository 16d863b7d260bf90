//! Parley core domain: sessions, messages, the in-memory store, and the
//! contracts (`SnapshotStore`, `BackendClient`) the outer layers
//! implement.

pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod snapshot;

// Re-export common error type
pub use error::{ParleyError, Result};
