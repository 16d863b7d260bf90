//! Optimistic send/receive orchestration.
//!
//! The coordinator is the only component that talks to the backend. It
//! applies local mutations first (optimistic), then reconciles backend
//! results against the store, discarding any result whose originating
//! message or session no longer exists or has already left `Pending`.
//! That staleness check is what keeps late responses from mutating a
//! log the user has since deleted or retried.

use parley_core::backend::{BackendClient, RemoteSession};
use parley_core::error::{ParleyError, Result};
use parley_core::session::{Message, MessageDraft, MessageKind, SessionStore};
use std::sync::Arc;
use std::time::Duration;

/// What `send_message` resolved to within the local timeout.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Reply received and applied; both sides of the exchange returned.
    Delivered { user_message: Message, reply: Message },
    /// The user message was appended but marked failed (backend error
    /// or local timeout). Its content is preserved in the log.
    Failed { user_message: Message, reason: String },
}

/// Terminal state of a detached reconciliation task.
#[derive(Debug, Clone, PartialEq)]
enum Reconciliation {
    Delivered(Message),
    Failed(String),
    /// The session or message disappeared, or the message already left
    /// `Pending` (timeout fired first, or a competing reconciliation
    /// won). Discarded without error.
    Stale,
}

pub struct SyncCoordinator {
    store: Arc<SessionStore>,
    backend: Arc<dyn BackendClient>,
    send_timeout: Duration,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        backend: Arc<dyn BackendClient>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            send_timeout,
        }
    }

    /// Sends a user message through the active session.
    ///
    /// Rejects with `SendUnavailable` before touching the log when the
    /// health monitor has gated sends off. When no session is active,
    /// one is created implicitly. The user message is appended
    /// `Pending` immediately; the backend call runs as a detached task
    /// whose result is reconciled whenever it lands, even after the
    /// local timeout has already marked the message failed.
    pub async fn send_message(
        &self,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Result<SendOutcome> {
        if !self.store.can_send() {
            return Err(ParleyError::send_unavailable("backend is not ready"));
        }
        let session_id = match self.store.active_session_id().await {
            Some(id) => id,
            None => self.store.create_session(None, None).await.id,
        };
        self.send_message_in(&session_id, content, kind).await
    }

    /// Sends a user message through an explicit session.
    pub async fn send_message_in(
        &self,
        session_id: &str,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Result<SendOutcome> {
        if !self.store.can_send() {
            return Err(ParleyError::send_unavailable("backend is not ready"));
        }

        let session = self
            .store
            .session(session_id)
            .await
            .ok_or_else(|| ParleyError::not_found("Session", session_id))?;

        let user_message = self
            .store
            .append_message(&session.id, MessageDraft::user(content).with_kind(kind))
            .await
            .ok_or_else(|| ParleyError::not_found("Session", session.id.clone()))?;

        // Send time log: everything up to and including the new message.
        let log = self
            .store
            .session(&session.id)
            .await
            .map(|s| s.messages)
            .unwrap_or_default();
        let config = session.model_config.clone();

        let task = {
            let store = Arc::clone(&self.store);
            let backend = Arc::clone(&self.backend);
            let session_id = session.id.clone();
            let message_id = user_message.id.clone();
            tokio::spawn(async move {
                let result = backend.send_message(&session_id, &log, &config).await;
                reconcile(&store, &session_id, &message_id, result).await
            })
        };

        match tokio::time::timeout(self.send_timeout, task).await {
            Ok(Ok(Reconciliation::Delivered(reply))) => {
                let user_message = self
                    .store
                    .session(&session.id)
                    .await
                    .and_then(|s| s.find_message(&user_message.id).cloned())
                    .unwrap_or(user_message);
                Ok(SendOutcome::Delivered { user_message, reply })
            }
            Ok(Ok(Reconciliation::Failed(reason))) => Ok(SendOutcome::Failed {
                user_message,
                reason,
            }),
            Ok(Ok(Reconciliation::Stale)) => {
                // The log this send targeted is gone; report failure
                // without inventing new state.
                Ok(SendOutcome::Failed {
                    user_message,
                    reason: "session no longer exists".to_string(),
                })
            }
            Ok(Err(join_error)) => {
                let reason = format!("send task failed: {}", join_error);
                self.store
                    .mark_failed(&session.id, &user_message.id, &reason)
                    .await;
                Ok(SendOutcome::Failed {
                    user_message,
                    reason,
                })
            }
            Err(_) => {
                // Local bound reached. The detached task keeps running;
                // once we mark the message failed here its late result
                // fails the staleness check and is discarded.
                let reason = format!(
                    "send timed out after {}s",
                    self.send_timeout.as_secs()
                );
                tracing::warn!(
                    "[SyncCoordinator] {} (message {})",
                    reason,
                    user_message.id
                );
                let failed = self
                    .store
                    .mark_failed(&session.id, &user_message.id, &reason)
                    .await;
                if !failed {
                    // A late reply confirmed the message between the
                    // timeout firing and this mark; the store already
                    // holds the delivered exchange and subscribers saw
                    // it, so leave the log alone.
                    tracing::debug!(
                        "[SyncCoordinator] Late reply beat the timeout for message {}",
                        user_message.id
                    );
                }
                Ok(SendOutcome::Failed {
                    user_message,
                    reason,
                })
            }
        }
    }

    /// Mirrors a locally created session to the backend.
    ///
    /// Local state is authoritative: any flavor of backend failure
    /// leaves the local session standing, because dropping user
    /// content over a mirroring problem is never acceptable. The error
    /// is still returned so the caller knows the session is
    /// local-only.
    pub async fn create_remote_session(&self, session_id: &str) -> Result<RemoteSession> {
        let session = self
            .store
            .session(session_id)
            .await
            .ok_or_else(|| ParleyError::not_found("Session", session_id))?;
        match self
            .backend
            .create_session(&session.title, &session.model_config)
            .await
        {
            Ok(remote) => {
                tracing::debug!(
                    "[SyncCoordinator] Session {} mirrored as {}",
                    session_id,
                    remote.id
                );
                Ok(remote)
            }
            Err(e) => {
                tracing::warn!(
                    "[SyncCoordinator] Could not mirror session {} (kept locally): {}",
                    session_id,
                    e
                );
                Err(e)
            }
        }
    }

    /// Deletes a session locally, then mirrors the deletion.
    ///
    /// The local removal is optimistic. A definitive backend rejection
    /// rolls it back (re-activating the session when it had been
    /// active); a transient failure leaves it deleted, since data
    /// reappearing after the user removed it is worse than a stale
    /// remote record.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let was_active = self.store.active_session_id().await.as_deref() == Some(session_id);
        let Some(removed) = self.store.delete_session(session_id).await else {
            return Ok(false);
        };

        match self.backend.delete_session(session_id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_definitive_failure() => {
                tracing::warn!(
                    "[SyncCoordinator] Backend refused deletion of {}, restoring: {}",
                    session_id,
                    e
                );
                self.store.restore_session(removed, was_active).await;
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    "[SyncCoordinator] Deletion of {} not mirrored ({}), keeping local removal",
                    session_id,
                    e
                );
                Ok(true)
            }
        }
    }
}

/// Applies a backend result to the store, or discards it as stale.
///
/// Runs inside the detached send task so a response landing after the
/// local timeout still goes through the same checks.
async fn reconcile(
    store: &SessionStore,
    session_id: &str,
    message_id: &str,
    result: Result<parley_core::backend::ChatReply>,
) -> Reconciliation {
    let still_pending = store
        .message_state(session_id, message_id)
        .await
        .map(|state| state.is_pending())
        .unwrap_or(false);
    if !still_pending {
        tracing::debug!(
            "[SyncCoordinator] Discarding stale result for message {} in {}",
            message_id,
            session_id
        );
        return Reconciliation::Stale;
    }

    match result {
        Ok(reply) => {
            // The store refuses the confirm when the message left
            // `Pending` after the check above (timeout or user deletion
            // won the race); no assistant message may be appended then.
            let confirmed = store
                .mark_confirmed(
                    session_id,
                    message_id,
                    Some(reply.correlation_id.clone()),
                    None,
                )
                .await;
            if !confirmed {
                tracing::debug!(
                    "[SyncCoordinator] Discarding stale result for message {} in {}",
                    message_id,
                    session_id
                );
                return Reconciliation::Stale;
            }
            let draft = MessageDraft::assistant(reply.content).with_metadata(reply.metadata);
            match store.append_message(session_id, draft).await {
                Some(assistant) => Reconciliation::Delivered(assistant),
                // Session vanished between the confirm and the append.
                None => Reconciliation::Stale,
            }
        }
        Err(e) => {
            let reason = e.to_string();
            if store.mark_failed(session_id, message_id, &reason).await {
                Reconciliation::Failed(reason)
            } else {
                Reconciliation::Stale
            }
        }
    }
}
