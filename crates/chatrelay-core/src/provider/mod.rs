//! Provider boundary: the abstract remote messaging operations
//!
//! The relay manager never talks to the network itself. Everything remote
//! goes through [`MessagingProvider`], a five-operation capability that an
//! external collaborator implements. Two implementations ship with the
//! crate:
//!
//! - [`SimulatedProvider`] - deterministic in-memory provider for tests,
//!   examples, and offline development
//! - [`HttpProvider`] - network-backed provider speaking to a session
//!   gateway over REST

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod simulated;

pub use http::{HttpProvider, HttpProviderConfig};
pub use simulated::{SimulatedProvider, SimulatedProviderConfig};

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors a provider operation can produce
///
/// The distinction that matters to the polling loops is terminal versus
/// transient: terminal errors end a loop immediately, transient errors are
/// retried within the loop's budget. Transport failures are carried as
/// strings so the error stays `Clone` and can ride inside events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("session expired")]
    SessionExpired,

    #[error("session not authenticated")]
    NotAuthenticated,

    #[error("request rejected: {reason}")]
    Rejected { reason: String },

    #[error("provider unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("transport failure: {reason}")]
    Transport { reason: String },

    #[error("invalid provider response: {reason}")]
    InvalidResponse { reason: String },
}

impl ProviderError {
    /// Terminal errors mean the session is gone; the affected loop must stop
    /// immediately and never retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderError::SessionNotFound { .. }
                | ProviderError::SessionExpired
                | ProviderError::NotAuthenticated
        )
    }

    /// Transient errors are eligible for retry within a loop's budget
    pub fn is_transient(&self) -> bool {
        !self.is_terminal()
    }
}

/// One status-poll response
///
/// All fields are optional on the wire; absent fields read as their
/// defaults, so a bare `{}` means "still pending".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStatus {
    /// Pairing code to present for device linking, when one is active
    pub pairing_code: Option<String>,
    /// True once the remote peer authenticated
    pub authenticated: bool,
    /// Identity of the authenticated peer; accompanies `authenticated`
    pub peer_identity: Option<String>,
    /// Opaque session payload returned on authentication
    pub session_payload: Option<serde_json::Value>,
    /// True when the session expired before pairing completed
    pub expired: bool,
    /// True when the provider reports the session disconnected
    pub disconnected: bool,
}

/// One inbound message as the provider delivers it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Provider-issued message identifier, when available
    #[serde(default)]
    pub id: Option<String>,
    /// Remote peer that sent the message
    pub peer_id: String,
    /// Display name of the peer, when the provider knows it
    #[serde(default)]
    pub display_name: Option<String>,
    /// Message body
    pub text: String,
    /// Send time reported by the provider, when available
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Device telemetry delivered alongside message polls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Telemetry {
    /// Battery percentage of the paired device
    pub battery: Option<u8>,
    /// Whether the device is on external power
    pub plugged: Option<bool>,
}

/// One message-poll response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageBatch {
    /// New inbound messages, in chronological order
    pub messages: Vec<InboundMessage>,
    /// Telemetry payload, when the device reported one
    pub telemetry: Option<Telemetry>,
}

/// The abstract remote operations the relay consumes
///
/// | Operation | Failure meaning |
/// |---|---|
/// | `initiate_session` | provider unavailable |
/// | `poll_status` | not-found/expired are terminal; others transient |
/// | `poll_messages` | not-authenticated is terminal; others transient |
/// | `send_message` | request rejected; no partial credit consumption |
/// | `terminate_session` | best-effort, errors ignored by the caller |
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Request a new session handle for `number_id`
    async fn initiate_session(&self, number_id: &str) -> ProviderResult<String>;

    /// Ask for the current pairing/authentication status of a session
    async fn poll_status(&self, session_id: &str) -> ProviderResult<SessionStatus>;

    /// Drain new inbound messages and telemetry for a session
    async fn poll_messages(&self, session_id: &str) -> ProviderResult<MessageBatch>;

    /// Send a message to `peer_id`, returning the provider's message id
    async fn send_message(
        &self,
        session_id: &str,
        peer_id: &str,
        text: &str,
    ) -> ProviderResult<String>;

    /// Terminate a session. Callers treat failures as best-effort.
    async fn terminate_session(&self, session_id: &str) -> ProviderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(ProviderError::SessionExpired.is_terminal());
        assert!(ProviderError::NotAuthenticated.is_terminal());
        assert!(ProviderError::SessionNotFound { session_id: "s".into() }.is_terminal());
        assert!(ProviderError::Unavailable { reason: "503".into() }.is_transient());
        assert!(ProviderError::Transport { reason: "refused".into() }.is_transient());
    }

    #[test]
    fn sparse_status_parses_with_defaults() {
        let status: SessionStatus = serde_json::from_str("{}").unwrap();
        assert!(!status.authenticated);
        assert!(!status.expired);
        assert_eq!(status.pairing_code, None);

        let status: SessionStatus =
            serde_json::from_str(r#"{"pairingCode":"AB12-CD34"}"#).unwrap();
        assert_eq!(status.pairing_code.as_deref(), Some("AB12-CD34"));
    }

    #[test]
    fn message_batch_parses_camel_case() {
        let raw = r#"{
            "messages": [
                {"peerId": "+15550001111", "text": "hola", "displayName": "Ana"}
            ],
            "telemetry": {"battery": 74, "plugged": true}
        }"#;
        let batch: MessageBatch = serde_json::from_str(raw).unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.messages[0].peer_id, "+15550001111");
        assert_eq!(batch.messages[0].display_name.as_deref(), Some("Ana"));
        assert_eq!(batch.telemetry.unwrap().battery, Some(74));
    }
}
