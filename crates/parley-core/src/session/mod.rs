//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`, `ModelConfig`)
//! - `message`: Message types (`Message`, `MessageRole`, `DeliveryState`)
//! - `event`: Store change notifications (`StoreEvent`)
//! - `store`: The authoritative in-memory registry (`SessionStore`)

mod event;
mod message;
mod model;
mod store;

// Re-export public API
pub use event::StoreEvent;
pub use message::{DeliveryState, Message, MessageDraft, MessageKind, MessageRole};
pub use model::{
    ModelConfig, SafetyLevel, Session, SessionSummary, DEFAULT_SESSION_TITLE,
};
pub use store::{SessionStore, DEFAULT_TITLE_MAX_CHARS};
