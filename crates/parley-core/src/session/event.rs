//! Store change notifications.
//!
//! UI layers subscribe to specific slices of the store (active session
//! contents, session list, the send capability flag) instead of relying
//! on implicit dependency tracking.

use serde::{Deserialize, Serialize};

/// Events published by the session store on every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The active-session pointer moved (or cleared).
    ActiveSessionChanged { session_id: Option<String> },
    /// A session was created, deleted, renamed or duplicated.
    SessionListChanged,
    /// The message log of a session changed (append, state transition,
    /// removal).
    MessagesChanged { session_id: String },
    /// The send capability flag flipped.
    CanSendChanged { can_send: bool },
}

impl StoreEvent {
    /// True for events that dirty the persisted snapshot. `can_send` is
    /// derived runtime state and is never persisted.
    pub fn is_data_change(&self) -> bool {
        !matches!(self, Self::CanSendChanged { .. })
    }
}
