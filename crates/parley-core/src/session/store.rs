//! The authoritative in-memory session registry.
//!
//! `SessionStore` owns the set of sessions, the active-session pointer,
//! the per-session message logs, and the subscribe/notify mechanism the
//! UI layers consume. It is constructed once at startup and passed
//! explicitly (`Arc<SessionStore>`) to whatever needs it; there is no
//! process-wide singleton.

use super::event::StoreEvent;
use super::message::{DeliveryState, Message, MessageDraft, MessageRole};
use super::model::{ModelConfig, Session, SessionSummary};
use crate::snapshot::{StoreSnapshot, SCHEMA_VERSION};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default character budget for auto-generated session titles.
pub const DEFAULT_TITLE_MAX_CHARS: usize = 48;

struct StoreState {
    /// Insertion-ordered collection; new sessions go to the front.
    sessions: Vec<Session>,
    /// Exactly one active session, or none when no sessions exist.
    active_id: Option<String>,
}

/// Authoritative in-memory registry of sessions and the active pointer.
pub struct SessionStore {
    inner: RwLock<StoreState>,
    events: broadcast::Sender<StoreEvent>,
    /// Capability flag fed by the health monitor. Gating the send
    /// action only; drafted input is never touched.
    can_send: AtomicBool,
    title_max_chars: usize,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_title_budget(DEFAULT_TITLE_MAX_CHARS)
    }

    pub fn with_title_budget(title_max_chars: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(StoreState {
                sessions: Vec::new(),
                active_id: None,
            }),
            events,
            can_send: AtomicBool::new(true),
            title_max_chars,
        }
    }

    /// Subscribes to store change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine; the store does not require subscribers.
        let _ = self.events.send(event);
    }

    // -- Capability flag --

    /// Whether sends are currently permitted.
    pub fn can_send(&self) -> bool {
        self.can_send.load(Ordering::SeqCst)
    }

    /// Updates the capability flag, publishing `CanSendChanged` on
    /// transitions only.
    pub fn set_can_send(&self, can_send: bool) {
        let previous = self.can_send.swap(can_send, Ordering::SeqCst);
        if previous != can_send {
            tracing::info!("[SessionStore] can_send changed: {}", can_send);
            self.publish(StoreEvent::CanSendChanged { can_send });
        }
    }

    // -- Session lifecycle --

    /// Creates a new session, inserts it at the front of the collection
    /// and sets it active.
    pub async fn create_session(
        &self,
        title: Option<String>,
        config: Option<ModelConfig>,
    ) -> Session {
        let session = Session::new(title, config);
        {
            let mut state = self.inner.write().await;
            state.sessions.insert(0, session.clone());
            state.active_id = Some(session.id.clone());
        }
        tracing::info!("[SessionStore] Created session {}", session.id);
        self.publish(StoreEvent::SessionListChanged);
        self.publish(StoreEvent::ActiveSessionChanged {
            session_id: Some(session.id.clone()),
        });
        session
    }

    /// Sets the active pointer if `session_id` exists. Unknown ids are
    /// a no-op returning false, not an error.
    pub async fn select_session(&self, session_id: &str) -> bool {
        let changed = {
            let mut state = self.inner.write().await;
            if !state.sessions.iter().any(|s| s.id == session_id) {
                return false;
            }
            if state.active_id.as_deref() == Some(session_id) {
                false
            } else {
                state.active_id = Some(session_id.to_string());
                true
            }
        };
        if changed {
            self.publish(StoreEvent::ActiveSessionChanged {
                session_id: Some(session_id.to_string()),
            });
        }
        true
    }

    /// Removes a session and its messages, returning the removed
    /// session so callers can roll the deletion back if a mirrored
    /// remote delete definitively fails.
    ///
    /// When the deleted session was active, the most recently updated
    /// survivor becomes active, or none.
    pub async fn delete_session(&self, session_id: &str) -> Option<Session> {
        let (removed, new_active) = {
            let mut state = self.inner.write().await;
            let index = state.sessions.iter().position(|s| s.id == session_id)?;
            let removed = state.sessions.remove(index);

            let mut new_active = None;
            if state.active_id.as_deref() == Some(session_id) {
                state.active_id = state
                    .sessions
                    .iter()
                    .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
                    .map(|s| s.id.clone());
                new_active = Some(state.active_id.clone());
            }
            (removed, new_active)
        };

        tracing::info!("[SessionStore] Deleted session {}", session_id);
        self.publish(StoreEvent::SessionListChanged);
        if let Some(active) = new_active {
            self.publish(StoreEvent::ActiveSessionChanged { session_id: active });
        }
        Some(removed)
    }

    /// Re-inserts a previously deleted session (delete rollback).
    pub async fn restore_session(&self, session: Session, make_active: bool) {
        let session_id = session.id.clone();
        {
            let mut state = self.inner.write().await;
            state.sessions.insert(0, session);
            if make_active {
                state.active_id = Some(session_id.clone());
            }
        }
        tracing::info!("[SessionStore] Restored session {}", session_id);
        self.publish(StoreEvent::SessionListChanged);
        if make_active {
            self.publish(StoreEvent::ActiveSessionChanged {
                session_id: Some(session_id),
            });
        }
    }

    /// Renames a session. Returns false when the id is unknown.
    pub async fn rename_session(&self, session_id: &str, title: impl Into<String>) -> bool {
        let renamed = {
            let mut state = self.inner.write().await;
            match state.sessions.iter_mut().find(|s| s.id == session_id) {
                Some(session) => {
                    session.title = title.into();
                    session.touch();
                    true
                }
                None => false,
            }
        };
        if renamed {
            self.publish(StoreEvent::SessionListChanged);
        }
        renamed
    }

    /// Deep-copies a session (fresh session id, fresh message ids) and
    /// inserts the copy at the front. The copy is not made active.
    pub async fn duplicate_session(&self, session_id: &str) -> Option<Session> {
        let copy = {
            let mut state = self.inner.write().await;
            let copy = state
                .sessions
                .iter()
                .find(|s| s.id == session_id)?
                .duplicate();
            state.sessions.insert(0, copy.clone());
            copy
        };
        tracing::info!(
            "[SessionStore] Duplicated session {} -> {}",
            session_id,
            copy.id
        );
        self.publish(StoreEvent::SessionListChanged);
        Some(copy)
    }

    /// Case-insensitive substring search over titles and message
    /// content. Returns full sessions so callers can show where a
    /// match occurred; recomputed on every call, so the view is
    /// restartable.
    pub async fn search(&self, query: &str) -> Vec<Session> {
        let query_lower = query.to_lowercase();
        let state = self.inner.read().await;
        state
            .sessions
            .iter()
            .filter(|s| s.matches(&query_lower))
            .cloned()
            .collect()
    }

    // -- Accessors --

    pub async fn active_session_id(&self) -> Option<String> {
        self.inner.read().await.active_id.clone()
    }

    pub async fn active_session(&self) -> Option<Session> {
        let state = self.inner.read().await;
        let active_id = state.active_id.as_deref()?;
        state.sessions.iter().find(|s| s.id == active_id).cloned()
    }

    pub async fn session(&self, session_id: &str) -> Option<Session> {
        let state = self.inner.read().await;
        state.sessions.iter().find(|s| s.id == session_id).cloned()
    }

    pub async fn sessions(&self) -> Vec<SessionSummary> {
        let state = self.inner.read().await;
        state.sessions.iter().map(SessionSummary::from).collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Current delivery state of a message, used by the coordinator's
    /// staleness check.
    pub async fn message_state(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Option<DeliveryState> {
        let state = self.inner.read().await;
        state
            .sessions
            .iter()
            .find(|s| s.id == session_id)?
            .find_message(message_id)
            .map(|m| m.state.clone())
    }

    // -- Message log --

    /// Appends a message to a session's log, assigning the id, the
    /// timestamp and the initial delivery state from the draft's role.
    ///
    /// Applies the auto-title policy: the first user message of a
    /// session still carrying its placeholder title becomes the title,
    /// truncated to the configured character budget.
    ///
    /// Returns `None` when the session does not exist.
    pub async fn append_message(
        &self,
        session_id: &str,
        draft: MessageDraft,
    ) -> Option<Message> {
        let is_user = draft.role == MessageRole::User;
        let message = {
            let mut state = self.inner.write().await;
            let session = state.sessions.iter_mut().find(|s| s.id == session_id)?;
            let message = draft.into_message();
            session.messages.push(message.clone());
            if is_user && session.has_default_title() {
                session.title = truncate_title(&message.content, self.title_max_chars);
            }
            session.touch();
            message
        };
        self.publish(StoreEvent::MessagesChanged {
            session_id: session_id.to_string(),
        });
        Some(message)
    }

    /// Reconciles a pending message to `Confirmed`.
    ///
    /// Only a `Pending` message can be confirmed: a message that was
    /// deleted in the meantime, already confirmed, or already marked
    /// failed (a local timeout won the race) is left untouched and
    /// false is returned. The check and the transition happen under
    /// one write lock, so a racing `mark_failed` cannot interleave.
    pub async fn mark_confirmed(
        &self,
        session_id: &str,
        message_id: &str,
        server_id: Option<String>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> bool {
        let confirmed = {
            let mut state = self.inner.write().await;
            let Some(session) = state.sessions.iter_mut().find(|s| s.id == session_id) else {
                return false;
            };
            let Some(message) = session.find_message_mut(message_id) else {
                return false;
            };
            if !message.state.is_pending() {
                return false;
            }
            message.state = DeliveryState::Confirmed { server_id };
            if let Some(metadata) = metadata {
                message.metadata.extend(metadata);
            }
            session.touch();
            true
        };
        if confirmed {
            self.publish(StoreEvent::MessagesChanged {
                session_id: session_id.to_string(),
            });
        }
        confirmed
    }

    /// Marks a pending message `Failed`, preserving its content
    /// verbatim.
    ///
    /// Only a `Pending` message can fail: a message already confirmed
    /// (a late reply landed before the local timeout resolved) or
    /// already failed is left untouched and false is returned, so a
    /// delivered exchange is never retroactively undone.
    pub async fn mark_failed(
        &self,
        session_id: &str,
        message_id: &str,
        reason: impl Into<String>,
    ) -> bool {
        let failed = {
            let mut state = self.inner.write().await;
            let Some(session) = state.sessions.iter_mut().find(|s| s.id == session_id) else {
                return false;
            };
            let Some(message) = session.find_message_mut(message_id) else {
                return false;
            };
            if !message.state.is_pending() {
                return false;
            }
            message.state = DeliveryState::Failed {
                reason: reason.into(),
            };
            session.touch();
            true
        };
        if failed {
            self.publish(StoreEvent::MessagesChanged {
                session_id: session_id.to_string(),
            });
        }
        failed
    }

    /// Removes a message from a session's log.
    ///
    /// Explicit user deletion only; retry logic never removes messages,
    /// it marks them failed.
    pub async fn remove_message(&self, session_id: &str, message_id: &str) -> bool {
        let removed = {
            let mut state = self.inner.write().await;
            let Some(session) = state.sessions.iter_mut().find(|s| s.id == session_id) else {
                return false;
            };
            let before = session.messages.len();
            session.messages.retain(|m| m.id != message_id);
            if session.messages.len() == before {
                return false;
            }
            session.touch();
            true
        };
        if removed {
            self.publish(StoreEvent::MessagesChanged {
                session_id: session_id.to_string(),
            });
        }
        removed
    }

    // -- Snapshot integration --

    /// Projects the current state into a persistable snapshot.
    pub async fn to_snapshot(&self) -> StoreSnapshot {
        let state = self.inner.read().await;
        StoreSnapshot {
            schema_version: SCHEMA_VERSION,
            active_session_id: state.active_id.clone(),
            saved_at: chrono::Utc::now().to_rfc3339(),
            write_counter: 0,
            sessions: state.sessions.clone(),
        }
    }

    /// Replaces the in-memory state with a loaded snapshot.
    ///
    /// An active-session id that no longer resolves to a session is
    /// not kept dangling: the most recently updated session takes over
    /// (the same rule deletion uses), or none when the snapshot holds
    /// no sessions at all.
    pub async fn restore(&self, snapshot: StoreSnapshot) {
        let active_id = {
            let mut state = self.inner.write().await;
            state.sessions = snapshot.sessions;
            state.active_id = snapshot
                .active_session_id
                .filter(|id| state.sessions.iter().any(|s| &s.id == id))
                .or_else(|| {
                    state
                        .sessions
                        .iter()
                        .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
                        .map(|s| s.id.clone())
                });
            state.active_id.clone()
        };
        tracing::info!(
            "[SessionStore] Restored {} session(s) from snapshot",
            self.session_count().await
        );
        self.publish(StoreEvent::SessionListChanged);
        self.publish(StoreEvent::ActiveSessionChanged {
            session_id: active_id,
        });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncates a title to `max_chars` characters, appending an ellipsis
/// marker when truncated. Counts characters, not bytes, so multi-byte
/// content cannot split a code point.
fn truncate_title(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let mut title: String = trimmed.chars().take(max_chars).collect();
        title.push('…');
        title
    }
}
