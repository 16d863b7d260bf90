//! Error types for the Parley session engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire engine.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ParleyError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Sends are currently gated off by the health monitor
    #[error("Sending is unavailable: {reason}")]
    SendUnavailable { reason: String },

    /// Backend call failed.
    ///
    /// `definitive` is true when the backend answered and rejected the
    /// request (an HTTP status error), false for network failures and
    /// timeouts where the remote outcome is unknown. Optimistic local
    /// state is only rolled back on definitive failures.
    #[error("Backend error: {message}")]
    Backend { message: String, definitive: bool },

    /// Durable snapshot read/write error (storage quota, unavailable, ...)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a SendUnavailable error
    pub fn send_unavailable(reason: impl Into<String>) -> Self {
        Self::SendUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a transient (non-definitive) backend error
    pub fn backend_transient(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            definitive: false,
        }
    }

    /// Creates a definitive backend error (the backend answered and said no)
    pub fn backend_definitive(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            definitive: true,
        }
    }

    /// Creates a Persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a backend error that definitively failed.
    ///
    /// Rollback of optimistic state is only justified when this returns
    /// true; an unknown outcome (network drop, timeout) leaves the
    /// optimistic state in place.
    pub fn is_definitive_failure(&self) -> bool {
        matches!(
            self,
            Self::Backend {
                definitive: true,
                ..
            }
        )
    }
}

impl From<std::io::Error> for ParleyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ParleyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, ParleyError>`.
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitive_classification() {
        assert!(ParleyError::backend_definitive("409 conflict").is_definitive_failure());
        assert!(!ParleyError::backend_transient("connection reset").is_definitive_failure());
        assert!(!ParleyError::persistence("disk full").is_definitive_failure());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ParleyError = io.into();
        assert!(matches!(err, ParleyError::Io { .. }));
    }
}
