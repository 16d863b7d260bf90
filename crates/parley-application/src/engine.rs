//! Top-level engine wiring.
//!
//! `ChatEngine` is constructed once at startup and handed around
//! explicitly; every collaborator receives its dependencies through the
//! constructor. There is no global instance.

use crate::health::HealthMonitor;
use crate::persister::SnapshotPersister;
use crate::sync::{SendOutcome, SyncCoordinator};
use parley_core::backend::BackendClient;
use parley_core::config::EngineConfig;
use parley_core::error::Result;
use parley_core::session::{MessageKind, ModelConfig, Session, SessionStore, StoreEvent};
use parley_core::snapshot::SnapshotStore;
use parley_infrastructure::{HttpBackendClient, JsonSnapshotStore};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct ChatEngine {
    config: EngineConfig,
    store: Arc<SessionStore>,
    snapshot_store: Arc<dyn SnapshotStore>,
    sync: SyncCoordinator,
    health: Arc<HealthMonitor>,
    persister: Arc<SnapshotPersister>,
}

impl ChatEngine {
    pub fn new(
        config: EngineConfig,
        snapshot_store: Arc<dyn SnapshotStore>,
        backend: Arc<dyn BackendClient>,
    ) -> Self {
        let store = Arc::new(SessionStore::with_title_budget(config.title_max_chars));
        let sync = SyncCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            config.send_timeout(),
        );
        let health = Arc::new(HealthMonitor::new(Arc::clone(&store), backend));
        let persister = Arc::new(SnapshotPersister::new(
            Arc::clone(&store),
            Arc::clone(&snapshot_store),
        ));
        Self {
            config,
            store,
            snapshot_store,
            sync,
            health,
            persister,
        }
    }

    /// Builds an engine over the on-disk snapshot store and the
    /// configured HTTP backend.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let freshness = config.freshness_window();
        let snapshot_store: Arc<dyn SnapshotStore> = match &config.snapshot_path {
            Some(path) => Arc::new(JsonSnapshotStore::new(path, freshness)),
            None => Arc::new(JsonSnapshotStore::default_location(freshness)?),
        };
        let backend: Arc<dyn BackendClient> = Arc::new(HttpBackendClient::new(
            config.backend_base_url.clone(),
            config.api_token.clone(),
        )?);
        Ok(Self::new(config, snapshot_store, backend))
    }

    /// Restores persisted state and spawns the background tasks.
    ///
    /// A stale snapshot is still loaded; the flag is only surfaced in
    /// the log since the freshest local data beats no data.
    pub async fn start(&self) -> Result<()> {
        let loaded = self.snapshot_store.load().await?;
        if loaded.stale {
            tracing::warn!(
                "[ChatEngine] Snapshot is older than {}h, consider a refresh",
                self.config.freshness_window_hours
            );
        }
        self.store.restore(loaded.snapshot).await;

        // Eager poll so the first send is not gated on the interval.
        self.health.poll_once().await;
        self.health.start(self.config.health_interval()).await;
        self.persister.start(self.config.debounce()).await;

        tracing::info!("[ChatEngine] Started");
        Ok(())
    }

    /// Stops background tasks and flushes the final snapshot.
    pub async fn shutdown(&self) {
        self.health.stop().await;
        self.persister.stop().await;
        tracing::info!("[ChatEngine] Shut down");
    }

    // -- Store surface for UI layers --

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub fn can_send(&self) -> bool {
        self.store.can_send()
    }

    // -- Conversation operations --

    /// Sends a text message through the active session.
    pub async fn send_text(&self, content: impl Into<String>) -> Result<SendOutcome> {
        self.sync.send_message(content, MessageKind::Text).await
    }

    /// Sends a message of an explicit kind (image prompt, code, ...).
    pub async fn send(
        &self,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Result<SendOutcome> {
        self.sync.send_message(content, kind).await
    }

    /// Creates a session locally and mirrors it to the backend. A
    /// failed mirror leaves the session usable locally.
    pub async fn create_session(
        &self,
        title: Option<String>,
        config: Option<ModelConfig>,
    ) -> Session {
        let session = self.store.create_session(title, config).await;
        if let Err(e) = self.sync.create_remote_session(&session.id).await {
            tracing::warn!(
                "[ChatEngine] Session {} is local-only for now: {}",
                session.id,
                e
            );
        }
        session
    }

    /// Deletes a session locally and mirrors the deletion.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.sync.delete_session(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::backend::{ChatReply, HealthReport, RemoteSession};
    use parley_core::error::Result;
    use parley_core::session::Message;
    use parley_core::snapshot::{SnapshotLoad, StoreSnapshot};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct EchoBackend;

    #[async_trait]
    impl BackendClient for EchoBackend {
        async fn send_message(
            &self,
            _session_id: &str,
            messages: &[Message],
            _config: &ModelConfig,
        ) -> Result<ChatReply> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatReply {
                content: format!("echo: {}", last),
                correlation_id: "1".to_string(),
                metadata: HashMap::new(),
            })
        }

        async fn create_session(&self, title: &str, _config: &ModelConfig) -> Result<RemoteSession> {
            Ok(RemoteSession {
                id: "remote".to_string(),
                title: title.to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            })
        }

        async fn delete_session(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }

        async fn check_health(&self) -> Result<HealthReport> {
            Ok(HealthReport {
                ready: true,
                models_status: HashMap::new(),
            })
        }
    }

    #[derive(Default)]
    struct MemorySnapshotStore {
        last: Mutex<Option<StoreSnapshot>>,
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
            *self.last.lock().await = Some(snapshot.clone());
            Ok(())
        }
    }

    fn quick_config() -> EngineConfig {
        EngineConfig {
            debounce_ms: 10,
            send_timeout_secs: 5,
            health_interval_secs: 600,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_restores_across_restart() {
        let disk = Arc::new(MemorySnapshotStore::default());

        {
            let engine = ChatEngine::new(
                quick_config(),
                disk.clone() as Arc<dyn SnapshotStore>,
                Arc::new(EchoBackend),
            );
            engine.start().await.unwrap();
            assert!(engine.can_send());

            let outcome = engine.send_text("Hello").await.unwrap();
            assert!(matches!(outcome, SendOutcome::Delivered { .. }));
            engine.shutdown().await;
        }

        // A fresh engine over the same storage sees the conversation.
        let engine = ChatEngine::new(
            quick_config(),
            disk as Arc<dyn SnapshotStore>,
            Arc::new(EchoBackend),
        );
        engine.start().await.unwrap();

        let session = engine.store().active_session().await.unwrap();
        assert_eq!(session.title, "Hello");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content, "echo: Hello");
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_mutations_reach_disk_without_explicit_flush() {
        let disk = Arc::new(MemorySnapshotStore::default());
        let engine = ChatEngine::new(
            quick_config(),
            disk.clone() as Arc<dyn SnapshotStore>,
            Arc::new(EchoBackend),
        );
        engine.start().await.unwrap();

        engine.create_session(Some("durable".to_string()), None).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let written = disk.last.lock().await.clone().unwrap();
        assert_eq!(written.sessions.len(), 1);
        assert_eq!(written.sessions[0].title, "durable");
        engine.shutdown().await;
    }
}
