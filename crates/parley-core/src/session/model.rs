//! Session domain model.
//!
//! This module contains the core Session entity: a single named
//! conversation with an ordered message log and its own model
//! configuration.

use super::message::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder title given to newly created sessions until the first
/// user message replaces it.
pub const DEFAULT_SESSION_TITLE: &str = "New conversation";

/// Inference safety level attached to a session's model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Relaxed,
    #[default]
    Standard,
    Strict,
}

/// Per-session model configuration, copied from defaults at session
/// creation and mutable in place afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub safety_level: SafetyLevel,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "microsoft/DialoGPT-medium".to_string(),
            temperature: 0.7,
            top_k: 50,
            top_p: 0.9,
            max_tokens: 1000,
            safety_level: SafetyLevel::Standard,
        }
    }
}

/// A single named conversation.
///
/// The session `id` is client-generated and stable for the session's
/// lifetime; the server never renumbers it. Message order in `messages`
/// is logical send order, regardless of when confirmations arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Human-readable session title
    pub title: String,
    /// Timestamp when the session was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format)
    pub updated_at: String,
    /// Model configuration for this session
    pub model_config: ModelConfig,
    /// Ordered message log
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    /// Creates a fresh session with a client-generated id.
    pub fn new(title: Option<String>, config: Option<ModelConfig>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string()),
            created_at: now.clone(),
            updated_at: now,
            model_config: config.unwrap_or_default(),
            messages: Vec::new(),
        }
    }

    /// True while the session still carries the placeholder title.
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_SESSION_TITLE
    }

    /// Bumps `updated_at`, keeping it monotonically non-decreasing even
    /// if the wall clock steps backwards.
    pub fn touch(&mut self) {
        let now = chrono::Utc::now().to_rfc3339();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn find_message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn find_message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Deep-copies the session under a fresh session id with fresh
    /// message ids. Message ids only need to be unique within one
    /// session's lifetime, but the copy is an independent log from the
    /// original going forward.
    pub fn duplicate(&self) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            title: format!("{} (copy)", self.title),
            created_at: now.clone(),
            updated_at: now,
            model_config: self.model_config.clone(),
            messages: self
                .messages
                .iter()
                .map(|m| {
                    let mut copy = m.clone();
                    copy.id = Uuid::new_v4().to_string();
                    copy
                })
                .collect(),
        }
    }

    /// Case-insensitive substring match over title and message content.
    pub fn matches(&self, query_lower: &str) -> bool {
        if self.title.to_lowercase().contains(query_lower) {
            return true;
        }
        self.messages
            .iter()
            .any(|m| m.content.to_lowercase().contains(query_lower))
    }
}

/// Lightweight listing/search projection of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub updated_at: String,
    pub message_count: usize,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            updated_at: session.updated_at.clone(),
            message_count: session.messages.len(),
        }
    }
}
