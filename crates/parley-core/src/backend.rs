//! Backend collaborator contract.
//!
//! The remote backend (inference, session mirror, health) is an
//! external collaborator; this trait is the whole of what the engine
//! knows about it. `SyncCoordinator` is the only component permitted to
//! invoke it.

use crate::error::Result;
use crate::session::{Message, ModelConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A completed inference reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Assistant-authored content.
    pub content: String,
    /// Server-side id correlating this reply to the originating user
    /// message. Informational only; local reconciliation always keys on
    /// the client-generated message id.
    pub correlation_id: String,
    /// Open reply metadata (model used, token count, timing, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A session record as the backend knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub id: String,
    pub title: String,
    pub created_at: String,
}

/// Result of a backend readiness probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub ready: bool,
    /// Per-model readiness, e.g. `{"chat": "loaded", "code": "loading"}`.
    #[serde(default)]
    pub models_status: HashMap<String, String>,
}

/// The external backend API consumed by the engine.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Sends the conversation to the model and returns the reply.
    ///
    /// `messages` is the session log at send time, in logical order.
    async fn send_message(
        &self,
        session_id: &str,
        messages: &[Message],
        config: &ModelConfig,
    ) -> Result<ChatReply>;

    /// Mirrors a locally created session to the backend.
    async fn create_session(&self, title: &str, config: &ModelConfig) -> Result<RemoteSession>;

    /// Mirrors a local session deletion to the backend.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Probes backend/model readiness.
    async fn check_health(&self) -> Result<HealthReport>;
}
