//! Error types for the AMI client

use crate::connection::{ConnectionState, DisconnectReason};
use thiserror::Error;

/// Errors surfaced by the AMI client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AmiError {
    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply (or no banner) within the deadline.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Login rejected by the server.
    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    /// The action's `Response` was `Error`.
    #[error("action failed: {message}")]
    ActionFailed { message: String },

    /// The connection ended while the caller was waiting.
    #[error("connection lost: {0}")]
    ConnectionLost(DisconnectReason),

    /// The connection is not in the `Ready` state.
    #[error("connection not ready (state: {state})")]
    NotReady { state: ConnectionState },

    /// A caller-supplied ActionID collides with one still in flight.
    #[error("duplicate ActionID: {action_id}")]
    DuplicateActionId { action_id: String },

    /// A field name or value that cannot be put on the wire.
    #[error("invalid field: {field}")]
    InvalidField { field: String },

    /// Stream-level protocol fault (banner missing, buffer overrun).
    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    /// Invalid client configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The event queue overflowed and events were dropped.
    #[error("event queue full, events dropped")]
    QueueFull,
}

impl AmiError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        AmiError::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn auth_failed(message: impl Into<String>) -> Self {
        AmiError::AuthFailed {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        AmiError::InvalidConfig {
            message: message.into(),
        }
    }

    /// `true` for errors that end the connection rather than a single action.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AmiError::Io(_) | AmiError::ConnectionLost(_) | AmiError::ProtocolError { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type AmiResult<T> = Result<T, AmiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            AmiError::Timeout { timeout_ms: 250 }.to_string(),
            "timed out after 250ms"
        );
        assert_eq!(
            AmiError::auth_failed("Authentication failed").to_string(),
            "authentication failed: Authentication failed"
        );
        assert_eq!(
            AmiError::ConnectionLost(DisconnectReason::ClientRequested).to_string(),
            "connection lost: client requested disconnect"
        );
    }

    #[test]
    fn connection_error_classification() {
        assert!(AmiError::ConnectionLost(DisconnectReason::ConnectionClosed).is_connection_error());
        assert!(AmiError::protocol_error("desync").is_connection_error());
        assert!(!AmiError::Timeout { timeout_ms: 1 }.is_connection_error());
        assert!(!AmiError::ActionFailed {
            message: "Permission denied".into()
        }
        .is_connection_error());
    }
}
