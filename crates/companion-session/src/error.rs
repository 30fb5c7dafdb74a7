//! Error types for the session engine.

use std::time::Duration;

use companion_protocol::{FirmwareErrorCode, ProtocolError};
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// An awaited response did not arrive before its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The firmware answered with an error code.
    #[error("device reported error: {0}")]
    Device(FirmwareErrorCode),

    /// A caller-supplied value cannot be sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The wait was cancelled before it resolved.
    #[error("operation cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// The firmware answered with an event the operation cannot use.
    #[error("unexpected response to {operation}: {event}")]
    UnexpectedResponse {
        operation: &'static str,
        event: &'static str,
    },

    /// A request with the same correlation key is still outstanding.
    #[error("a request for {0} is already pending")]
    AlreadyPending(String),

    #[error("feature disabled on device")]
    Disabled,

    #[error("session is not connected")]
    NotConnected,

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidInput(message) => SessionError::InvalidInput(message),
            other => SessionError::Protocol(other),
        }
    }
}

impl SessionError {
    /// Whether retrying the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Timeout { .. } | SessionError::Device(_))
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_through() {
        let err: SessionError = ProtocolError::InvalidInput("client id is empty".into()).into();
        assert!(matches!(err, SessionError::InvalidInput(ref m) if m == "client id is empty"));

        let err: SessionError = ProtocolError::UnknownCode(0x7F).into();
        assert!(matches!(err, SessionError::Protocol(_)));
    }

    #[test]
    fn test_timeout_message() {
        let err = SessionError::Timeout {
            operation: "handshake",
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "handshake timed out after 5s");
        assert!(err.is_retryable());
        assert!(!SessionError::Cancelled.is_retryable());
    }

    #[test]
    fn test_device_error_message() {
        let err = SessionError::Device(FirmwareErrorCode::TableFull);
        assert!(err.to_string().contains("table full"));
    }
}
