//! Debounced snapshot writer.
//!
//! Every data-changing store event arms a debounce timer; when the
//! burst goes quiet the whole state is written once. A write failure is
//! logged and the in-memory state stays authoritative; the next
//! mutation schedules another attempt.

use parley_core::session::SessionStore;
use parley_core::snapshot::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct SnapshotPersister {
    store: Arc<SessionStore>,
    snapshot_store: Arc<dyn SnapshotStore>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotPersister {
    pub fn new(store: Arc<SessionStore>, snapshot_store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            snapshot_store,
            task: Mutex::new(None),
        }
    }

    /// Spawns the writer task. One snapshot write per burst of
    /// mutations, `debounce` after the first event of the burst.
    pub async fn start(self: &Arc<Self>, debounce: Duration) {
        let persister = Arc::clone(self);
        let mut events = self.store.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.is_data_change() => {
                        tokio::time::sleep(debounce).await;
                        // Coalesce everything that arrived during the
                        // debounce window into this one write.
                        loop {
                            match events.try_recv() {
                                Ok(_) => continue,
                                Err(_) => break,
                            }
                        }
                        persister.flush().await;
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "[SnapshotPersister] Missed {} event(s), writing snapshot",
                            skipped
                        );
                        persister.flush().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut task = self.task.lock().await;
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    /// Writes the current state immediately.
    pub async fn flush(&self) {
        let snapshot = self.store.to_snapshot().await;
        if let Err(e) = self.snapshot_store.save(&snapshot).await {
            tracing::warn!("[SnapshotPersister] Snapshot write failed: {}", e);
        }
    }

    /// Stops the writer task and performs a final flush so nothing from
    /// an unfinished debounce window is lost.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.flush().await;
        tracing::info!("[SnapshotPersister] Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::error::{ParleyError, Result};
    use parley_core::session::MessageDraft;
    use parley_core::snapshot::{SnapshotLoad, StoreSnapshot};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemorySnapshotStore {
        saves: AtomicUsize,
        last: Mutex<Option<StoreSnapshot>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl SnapshotStore for MemorySnapshotStore {
        async fn load(&self) -> Result<SnapshotLoad> {
            let snapshot = self
                .last
                .lock()
                .await
                .clone()
                .unwrap_or_else(StoreSnapshot::empty);
            Ok(SnapshotLoad {
                snapshot,
                stale: false,
            })
        }

        async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ParleyError::persistence("quota exceeded"));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().await = Some(snapshot.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_burst_of_mutations_writes_once() {
        let store = Arc::new(SessionStore::new());
        let disk = Arc::new(MemorySnapshotStore::default());
        let persister = Arc::new(SnapshotPersister::new(
            Arc::clone(&store),
            disk.clone() as Arc<dyn SnapshotStore>,
        ));
        persister.start(Duration::from_millis(50)).await;

        let session = store.create_session(None, None).await;
        for i in 0..5 {
            store
                .append_message(&session.id, MessageDraft::user(format!("m{}", i)))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(disk.saves.load(Ordering::SeqCst), 1);

        let written = disk.last.lock().await.clone().unwrap();
        assert!(written.same_state_as(&store.to_snapshot().await));
        persister.stop().await;
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_state() {
        let store = Arc::new(SessionStore::new());
        let disk = Arc::new(MemorySnapshotStore::default());
        disk.fail.store(true, Ordering::SeqCst);
        let persister = Arc::new(SnapshotPersister::new(
            Arc::clone(&store),
            disk.clone() as Arc<dyn SnapshotStore>,
        ));

        let session = store.create_session(Some("kept".to_string()), None).await;
        persister.flush().await;

        assert_eq!(disk.saves.load(Ordering::SeqCst), 0);
        assert_eq!(store.session(&session.id).await.unwrap().title, "kept");
    }

    #[tokio::test]
    async fn test_stop_flushes_pending_changes() {
        let store = Arc::new(SessionStore::new());
        let disk = Arc::new(MemorySnapshotStore::default());
        let persister = Arc::new(SnapshotPersister::new(
            Arc::clone(&store),
            disk.clone() as Arc<dyn SnapshotStore>,
        ));
        // Long debounce so the timer cannot fire before stop().
        persister.start(Duration::from_secs(60)).await;

        store.create_session(Some("unflushed".to_string()), None).await;
        persister.stop().await;

        let written = disk.last.lock().await.clone().unwrap();
        assert_eq!(written.sessions.len(), 1);
        assert_eq!(written.sessions[0].title, "unflushed");
    }

    #[tokio::test]
    async fn test_can_send_flip_does_not_dirty_snapshot() {
        let store = Arc::new(SessionStore::new());
        let disk = Arc::new(MemorySnapshotStore::default());
        let persister = Arc::new(SnapshotPersister::new(
            Arc::clone(&store),
            disk.clone() as Arc<dyn SnapshotStore>,
        ));
        persister.start(Duration::from_millis(20)).await;

        store.set_can_send(false);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(disk.saves.load(Ordering::SeqCst), 0);
        persister.stop().await;
    }
}
