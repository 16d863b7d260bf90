//! Conversation message types.
//!
//! A message's identity is its client-generated `id`; it is assigned at
//! creation time and is the only key used to reconcile backend responses.
//! The server correlation id, when one arrives, lives inside
//! `DeliveryState::Confirmed` and is informational only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
    /// System-generated message (notices injected for local display).
    System,
}

/// The modality of a message's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Code,
    Audio,
    File,
}

/// Delivery lifecycle of a message.
///
/// Modeled as a tagged variant rather than a status string so that
/// illegal combinations (a failed message carrying a server id) are
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryState {
    /// Sent optimistically, awaiting backend confirmation.
    Pending,
    /// Acknowledged by the backend (or purely local content that needs
    /// no acknowledgement).
    Confirmed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_id: Option<String>,
    },
    /// The send failed. The content is preserved verbatim so the user
    /// can retry.
    Failed { reason: String },
}

impl DeliveryState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A single message in a conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Client-generated id (UUID format), stable for the message lifetime.
    pub id: String,
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
    /// Content modality.
    #[serde(default)]
    pub kind: MessageKind,
    /// Timestamp when the message was created (ISO 8601 format).
    pub timestamp: String,
    /// Delivery lifecycle state.
    #[serde(flatten)]
    pub state: DeliveryState,
    /// Open key/value metadata (model used, token counts, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A message as authored by the caller, before the store assigns
/// identity and delivery state.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub role: MessageRole,
    pub content: String,
    pub kind: MessageKind,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MessageDraft {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            kind: MessageKind::Text,
            metadata: HashMap::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            kind: MessageKind::Text,
            metadata: HashMap::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            kind: MessageKind::Text,
            metadata: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Materializes the draft into a `Message`.
    ///
    /// User messages enter `Pending` (optimistic send); system notices
    /// and assistant messages are purely local by the time they are
    /// appended and enter `Confirmed` directly.
    pub fn into_message(self) -> Message {
        let state = match self.role {
            MessageRole::User => DeliveryState::Pending,
            MessageRole::Assistant | MessageRole::System => {
                DeliveryState::Confirmed { server_id: None }
            }
        };
        Message {
            id: Uuid::new_v4().to_string(),
            role: self.role,
            content: self.content,
            kind: self.kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
            state,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_draft_enters_pending() {
        let msg = MessageDraft::user("hello").into_message();
        assert!(msg.state.is_pending());
        assert_eq!(msg.role, MessageRole::User);
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_system_draft_enters_confirmed() {
        let msg = MessageDraft::system("participant joined").into_message();
        assert_eq!(
            msg.state,
            DeliveryState::Confirmed { server_id: None }
        );
    }

    #[test]
    fn test_state_serializes_with_status_tag() {
        let msg = MessageDraft::user("hi").into_message();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["status"], "pending");

        let confirmed = DeliveryState::Confirmed {
            server_id: Some("srv-1".to_string()),
        };
        let json = serde_json::to_value(&confirmed).unwrap();
        assert_eq!(json["status"], "confirmed");
        assert_eq!(json["server_id"], "srv-1");
    }

    #[test]
    fn test_message_round_trip() {
        let mut msg = MessageDraft::user("payload").into_message();
        msg.state = DeliveryState::Failed {
            reason: "offline".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
