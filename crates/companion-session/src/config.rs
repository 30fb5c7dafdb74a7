//! Session configuration.

use std::path::Path;
use std::time::Duration;

use companion_protocol::CLIENT_ID_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Tunables for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identifier sent in the start-session frame (at most 12 bytes).
    pub client_id: String,
    /// Protocol version byte sent at handshake.
    pub app_version: u8,
    /// Deadline for a plain command/response exchange.
    pub command_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    /// Deadline for a whole contact enumeration.
    pub contact_sync_timeout_ms: u64,
    /// Ack deadline used when the firmware suggests none.
    pub default_ack_timeout_ms: u64,
    /// Deadline for answers that travel over the mesh (status, telemetry,
    /// login, binary requests, traces).
    pub response_timeout_ms: u64,
    /// Start draining the message queue whenever the radio says messages
    /// are waiting.
    pub auto_fetch_messages: bool,
    /// Pause before the drain loop retries after a timeout.
    pub drain_retry_ms: u64,
    /// Upper bound on one signing chunk.
    pub max_sign_chunk: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            client_id: "companion".to_string(),
            app_version: 3,
            command_timeout_ms: 5_000,
            handshake_timeout_ms: 5_000,
            contact_sync_timeout_ms: 30_000,
            default_ack_timeout_ms: 10_000,
            response_timeout_ms: 30_000,
            auto_fetch_messages: true,
            drain_retry_ms: 1_000,
            max_sign_chunk: 128,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SessionError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(SessionError::InvalidInput("client id is empty".into()));
        }
        if self.client_id.len() > CLIENT_ID_SIZE {
            return Err(SessionError::InvalidInput(format!(
                "client id is {} bytes, limit is {}",
                self.client_id.len(),
                CLIENT_ID_SIZE
            )));
        }
        if self.max_sign_chunk == 0 {
            return Err(SessionError::InvalidInput(
                "max sign chunk must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn contact_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.contact_sync_timeout_ms)
    }

    pub fn default_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.default_ack_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn drain_retry(&self) -> Duration {
        Duration::from_millis(self.drain_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.app_version, 3);
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert!(config.auto_fetch_messages);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            SessionConfig::from_json(r#"{ "client_id": "bench", "response_timeout_ms": 45000 }"#)
                .unwrap();
        assert_eq!(config.client_id, "bench");
        assert_eq!(config.response_timeout(), Duration::from_secs(45));
        assert_eq!(config.max_sign_chunk, 128);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            SessionConfig::from_json(r#"{ "client_id": "" }"#),
            Err(SessionError::InvalidInput(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{ "client_id": "much-too-long-id" }"#),
            Err(SessionError::InvalidInput(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{ "max_sign_chunk": 0 }"#),
            Err(SessionError::InvalidInput(_))
        ));
        assert!(matches!(
            SessionConfig::from_json("{ not json"),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = SessionConfig {
            auto_fetch_messages: false,
            ..SessionConfig::default()
        };
        let text = config.to_json().unwrap();
        assert_eq!(SessionConfig::from_json(&text).unwrap(), config);
    }
}
