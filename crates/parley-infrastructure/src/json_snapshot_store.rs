//! JSON file-backed `SnapshotStore` implementation.
//!
//! One version-stamped JSON object holds the complete session
//! collection plus the active-session pointer. Writes are atomic
//! (temp file + rename). Concurrent writers (e.g. two open tabs
//! sharing the file) are resolved last-writer-wins via the embedded
//! write counter; there is no cross-process locking.

use crate::paths::ParleyPaths;
use async_trait::async_trait;
use parley_core::error::{ParleyError, Result};
use parley_core::snapshot::{
    SnapshotLoad, SnapshotStore, StoreSnapshot, MIN_SUPPORTED_SCHEMA_VERSION, SCHEMA_VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

pub struct JsonSnapshotStore {
    path: PathBuf,
    freshness_window: chrono::Duration,
    /// Highest write counter this process has written, used to detect
    /// another writer advancing the file between our writes.
    last_written: AtomicU64,
}

impl JsonSnapshotStore {
    pub fn new(path: impl AsRef<Path>, freshness_window: chrono::Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            freshness_window,
            last_written: AtomicU64::new(0),
        }
    }

    /// Creates a store at the default platform location
    /// (`~/.config/parley/snapshot.json`).
    pub fn default_location(freshness_window: chrono::Duration) -> Result<Self> {
        let path = ParleyPaths::snapshot_file()
            .map_err(|e| ParleyError::config(format!("Failed to resolve snapshot path: {}", e)))?;
        Ok(Self::new(path, freshness_window))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the write counter currently on disk, tolerating any read
    /// or parse failure as counter 0.
    async fn counter_on_disk(&self) -> u64 {
        let Ok(raw) = fs::read_to_string(&self.path).await else {
            return 0;
        };
        serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| v.get("write_counter").and_then(|c| c.as_u64()))
            .unwrap_or(0)
    }

    fn is_stale(&self, saved_at: &str) -> bool {
        match chrono::DateTime::parse_from_rfc3339(saved_at) {
            Ok(saved) => {
                let age = chrono::Utc::now().signed_duration_since(saved);
                age > self.freshness_window
            }
            Err(_) => {
                tracing::warn!(
                    "[JsonSnapshotStore] Unparseable saved_at '{}', treating snapshot as fresh",
                    saved_at
                );
                false
            }
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    /// Loads the snapshot, degrading to an empty usable state on any
    /// problem. Missing, corrupt or unsupported snapshots never
    /// surface as errors; data is only flagged, never discarded, for
    /// age.
    async fn load(&self) -> Result<SnapshotLoad> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "[JsonSnapshotStore] No snapshot at {}, starting empty",
                    self.path.display()
                );
                return Ok(SnapshotLoad {
                    snapshot: StoreSnapshot::empty(),
                    stale: false,
                });
            }
            Err(e) => {
                tracing::warn!(
                    "[JsonSnapshotStore] Failed to read snapshot at {}: {}, starting empty",
                    self.path.display(),
                    e
                );
                return Ok(SnapshotLoad {
                    snapshot: StoreSnapshot::empty(),
                    stale: false,
                });
            }
        };

        let snapshot: StoreSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    "[JsonSnapshotStore] Corrupt snapshot discarded ({}), starting empty",
                    e
                );
                return Ok(SnapshotLoad {
                    snapshot: StoreSnapshot::empty(),
                    stale: false,
                });
            }
        };

        if snapshot.schema_version < MIN_SUPPORTED_SCHEMA_VERSION
            || snapshot.schema_version > SCHEMA_VERSION
        {
            tracing::warn!(
                "[JsonSnapshotStore] Unsupported schema version {} (supported {}..={}), starting empty",
                snapshot.schema_version,
                MIN_SUPPORTED_SCHEMA_VERSION,
                SCHEMA_VERSION
            );
            return Ok(SnapshotLoad {
                snapshot: StoreSnapshot::empty(),
                stale: false,
            });
        }

        // Continue the write sequence from what we loaded.
        self.last_written
            .fetch_max(snapshot.write_counter, Ordering::SeqCst);

        let stale = self.is_stale(&snapshot.saved_at);
        if stale {
            tracing::info!(
                "[JsonSnapshotStore] Snapshot saved_at {} predates the freshness window",
                snapshot.saved_at
            );
        }

        Ok(SnapshotLoad { snapshot, stale })
    }

    /// Atomically writes the snapshot, stamping `saved_at` and the next
    /// write counter.
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ParleyError::persistence(format!("create dir: {}", e)))?;
        }

        let observed = self.counter_on_disk().await;
        let last = self.last_written.load(Ordering::SeqCst);
        if last > 0 && observed > last {
            tracing::warn!(
                "[JsonSnapshotStore] Another writer advanced the snapshot (counter {} > {}), \
                 overwriting last-writer-wins",
                observed,
                last
            );
        }
        let next = observed.max(last) + 1;

        let mut stamped = snapshot.clone();
        stamped.saved_at = chrono::Utc::now().to_rfc3339();
        stamped.write_counter = next;

        let json = serde_json::to_string_pretty(&stamped)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| ParleyError::persistence(format!("write snapshot: {}", e)))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ParleyError::persistence(format!("rename snapshot: {}", e)))?;

        self.last_written.store(next, Ordering::SeqCst);
        tracing::debug!(
            "[JsonSnapshotStore] Saved snapshot (counter {}, {} session(s))",
            next,
            stamped.sessions.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::{MessageDraft, SessionStore};
    use tempfile::TempDir;

    fn window_hours(hours: i64) -> chrono::Duration {
        chrono::Duration::hours(hours)
    }

    async fn populated_snapshot() -> StoreSnapshot {
        let store = SessionStore::new();
        let session = store.create_session(Some("Kept".to_string()), None).await;
        store
            .append_message(&session.id, MessageDraft::user("hello"))
            .await
            .unwrap();
        store.to_snapshot().await
    }

    #[tokio::test]
    async fn test_round_trip_ignores_bookkeeping_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let snapshots = JsonSnapshotStore::new(&path, window_hours(24));

        let snapshot = populated_snapshot().await;
        snapshots.save(&snapshot).await.unwrap();

        let loaded = snapshots.load().await.unwrap();
        assert!(!loaded.stale);
        assert!(loaded.snapshot.same_state_as(&snapshot));
        // Bookkeeping fields were stamped by save.
        assert_eq!(loaded.snapshot.write_counter, 1);
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let snapshots = JsonSnapshotStore::new(dir.path().join("never-written.json"), window_hours(24));

        let loaded = snapshots.load().await.unwrap();
        assert!(loaded.snapshot.sessions.is_empty());
        assert_eq!(loaded.snapshot.active_session_id, None);
        assert!(!loaded.stale);
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty_without_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{ not json at all").unwrap();

        let snapshots = JsonSnapshotStore::new(&path, window_hours(24));
        let loaded = snapshots.load().await.unwrap();
        assert!(loaded.snapshot.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_schema_version_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut snapshot = populated_snapshot().await;
        snapshot.schema_version = SCHEMA_VERSION + 1;
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        let snapshots = JsonSnapshotStore::new(&path, window_hours(24));
        let loaded = snapshots.load().await.unwrap();
        assert!(loaded.snapshot.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_old_snapshot_is_loaded_but_flagged_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut snapshot = populated_snapshot().await;
        snapshot.saved_at = (chrono::Utc::now() - chrono::Duration::hours(48)).to_rfc3339();
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        let snapshots = JsonSnapshotStore::new(&path, window_hours(24));
        let loaded = snapshots.load().await.unwrap();
        assert!(loaded.stale);
        // Data is never discarded purely for age.
        assert_eq!(loaded.snapshot.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_write_counter_advances_across_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let snapshot = populated_snapshot().await;

        let writer_a = JsonSnapshotStore::new(&path, window_hours(24));
        let writer_b = JsonSnapshotStore::new(&path, window_hours(24));

        writer_a.save(&snapshot).await.unwrap();
        writer_b.save(&snapshot).await.unwrap();
        // Writer A sees B's counter on disk and continues past it.
        writer_a.save(&snapshot).await.unwrap();

        let loaded = writer_b.load().await.unwrap();
        assert_eq!(loaded.snapshot.write_counter, 3);
    }
}
