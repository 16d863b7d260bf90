//! Backend readiness polling.
//!
//! The monitor polls `check_health` on a fixed cadence and feeds the
//! result into the store's `can_send` flag. An unreachable backend is a
//! degraded state, never a fatal one: the flag simply goes false and
//! sends are rejected until the next successful poll.

use parley_core::backend::BackendClient;
use parley_core::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Outcome of a single readiness probe.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub ready: bool,
    /// Human-readable reason when not ready.
    pub reason: Option<String>,
}

pub struct HealthMonitor {
    store: Arc<SessionStore>,
    backend: Arc<dyn BackendClient>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(store: Arc<SessionStore>, backend: Arc<dyn BackendClient>) -> Self {
        Self {
            store,
            backend,
            task: Mutex::new(None),
        }
    }

    /// Probes the backend once and updates the store's send capability.
    ///
    /// The flag only publishes `CanSendChanged` on actual transitions,
    /// so repeated polls with a stable backend are silent.
    pub async fn poll_once(&self) -> HealthStatus {
        let status = match self.backend.check_health().await {
            Ok(report) if report.ready => HealthStatus {
                ready: true,
                reason: None,
            },
            Ok(report) => {
                let loading: Vec<String> = report
                    .models_status
                    .iter()
                    .filter(|(_, state)| state.as_str() != "loaded")
                    .map(|(model, state)| format!("{}: {}", model, state))
                    .collect();
                HealthStatus {
                    ready: false,
                    reason: Some(if loading.is_empty() {
                        "Backend not ready".to_string()
                    } else {
                        loading.join(", ")
                    }),
                }
            }
            Err(e) => {
                tracing::debug!("[HealthMonitor] Probe failed: {}", e);
                HealthStatus {
                    ready: false,
                    reason: Some(e.to_string()),
                }
            }
        };

        self.store.set_can_send(status.ready);
        status
    }

    /// Spawns the polling task. Restarting replaces the previous task.
    pub async fn start(self: &Arc<Self>, interval: Duration) {
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // interval fires immediately; the engine already did an
            // eager poll, so skip the first tick.
            ticker.tick().await;
            tracing::info!(
                "[HealthMonitor] Polling started ({}s interval)",
                interval.as_secs()
            );
            loop {
                ticker.tick().await;
                monitor.poll_once().await;
            }
        });

        let mut task = self.task.lock().await;
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    /// Aborts the polling task. The `can_send` flag keeps its last
    /// observed value.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            tracing::info!("[HealthMonitor] Polling stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::backend::{ChatReply, HealthReport, RemoteSession};
    use parley_core::error::{ParleyError, Result};
    use parley_core::session::{Message, ModelConfig, StoreEvent};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockBackend {
        healthy: AtomicBool,
    }

    impl MockBackend {
        fn new(healthy: bool) -> Self {
            Self {
                healthy: AtomicBool::new(healthy),
            }
        }
    }

    #[async_trait]
    impl BackendClient for MockBackend {
        async fn send_message(
            &self,
            _session_id: &str,
            _messages: &[Message],
            _config: &ModelConfig,
        ) -> Result<ChatReply> {
            unimplemented!("not exercised")
        }

        async fn create_session(
            &self,
            _title: &str,
            _config: &ModelConfig,
        ) -> Result<RemoteSession> {
            unimplemented!("not exercised")
        }

        async fn delete_session(&self, _session_id: &str) -> Result<()> {
            unimplemented!("not exercised")
        }

        async fn check_health(&self) -> Result<HealthReport> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(HealthReport {
                    ready: true,
                    models_status: HashMap::new(),
                })
            } else {
                Err(ParleyError::backend_transient("connection refused"))
            }
        }
    }

    #[tokio::test]
    async fn test_failed_probe_downgrades_and_recovery_restores() {
        let store = Arc::new(SessionStore::new());
        let backend = Arc::new(MockBackend::new(false));
        let monitor = HealthMonitor::new(Arc::clone(&store), backend.clone());
        let mut rx = store.subscribe();

        let status = monitor.poll_once().await;
        assert!(!status.ready);
        assert!(status.reason.unwrap().contains("connection refused"));
        assert!(!store.can_send());
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::CanSendChanged { can_send: false }
        );

        backend.healthy.store(true, Ordering::SeqCst);
        let status = monitor.poll_once().await;
        assert!(status.ready);
        assert!(store.can_send());
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::CanSendChanged { can_send: true }
        );
    }

    #[tokio::test]
    async fn test_not_ready_report_names_loading_models() {
        struct LoadingBackend;

        #[async_trait]
        impl BackendClient for LoadingBackend {
            async fn send_message(
                &self,
                _session_id: &str,
                _messages: &[Message],
                _config: &ModelConfig,
            ) -> Result<ChatReply> {
                unimplemented!("not exercised")
            }
            async fn create_session(
                &self,
                _title: &str,
                _config: &ModelConfig,
            ) -> Result<RemoteSession> {
                unimplemented!("not exercised")
            }
            async fn delete_session(&self, _session_id: &str) -> Result<()> {
                unimplemented!("not exercised")
            }
            async fn check_health(&self) -> Result<HealthReport> {
                let mut models_status = HashMap::new();
                models_status.insert("chat".to_string(), "loading".to_string());
                Ok(HealthReport {
                    ready: false,
                    models_status,
                })
            }
        }

        let store = Arc::new(SessionStore::new());
        let monitor = HealthMonitor::new(store, Arc::new(LoadingBackend));

        let status = monitor.poll_once().await;
        assert!(!status.ready);
        assert_eq!(status.reason.as_deref(), Some("chat: loading"));
    }
}
