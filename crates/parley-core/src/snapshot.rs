//! Durable snapshot schema and storage contract.
//!
//! The full session collection plus the active-session pointer is
//! serialized as one version-stamped JSON object. Implementations live
//! in `parley-infrastructure`; the store and engine only see this trait.

use crate::error::Result;
use crate::session::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Current snapshot schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Oldest schema version `load` still accepts. Snapshots outside
/// `[MIN_SUPPORTED_SCHEMA_VERSION, SCHEMA_VERSION]` are discarded.
pub const MIN_SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// The complete serialized state written to durable local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub schema_version: u32,
    pub active_session_id: Option<String>,
    /// ISO 8601 timestamp of the write.
    pub saved_at: String,
    /// Monotonically increasing write counter used for last-writer-wins
    /// detection between concurrent writers (e.g. two open tabs).
    #[serde(default)]
    pub write_counter: u64,
    pub sessions: Vec<Session>,
}

impl StoreSnapshot {
    /// An empty, usable state. Returned whenever a persisted snapshot
    /// is missing, corrupt, or of an unsupported schema version.
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            active_session_id: None,
            saved_at: chrono::Utc::now().to_rfc3339(),
            write_counter: 0,
            sessions: Vec::new(),
        }
    }

    /// Equality over the reachable state, ignoring the `saved_at` /
    /// `write_counter` bookkeeping fields.
    pub fn same_state_as(&self, other: &Self) -> bool {
        self.active_session_id == other.active_session_id && self.sessions == other.sessions
    }
}

/// A loaded snapshot plus its staleness flag.
///
/// Stale data is never discarded for age alone; the flag lets the
/// caller prompt a refresh against the backend.
#[derive(Debug, Clone)]
pub struct SnapshotLoad {
    pub snapshot: StoreSnapshot,
    pub stale: bool,
}

/// An abstract store for the durable snapshot.
///
/// Implementations must never surface corrupt data as an error: a
/// snapshot that cannot be parsed, or whose schema version is outside
/// the supported range, is discarded and replaced by an empty state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Reads the persisted snapshot, or an empty state when none is
    /// usable.
    async fn load(&self) -> Result<SnapshotLoad>;

    /// Writes a snapshot. The implementation stamps `saved_at` and
    /// `write_counter`.
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;
}
