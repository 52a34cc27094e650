//! Error types and handling for the chatrelay-core library
//!
//! This module defines all error types that can occur while driving a relay
//! session and provides guidance on how to handle them.
//!
//! # Error Categories
//!
//! Errors are categorized to help with recovery strategies:
//!
//! - **Precondition Errors** - The call was refused before anything was sent to
//!   the provider (`NotConnected`, `InsufficientCredit`, `SessionAlreadyActive`).
//!   Fix the local state (connect, top up credits) and retry.
//! - **Session Errors** - The remote session is gone (`SessionExpired`,
//!   `SessionNotFound`). The only recovery is a fresh `initialize`.
//! - **Polling Errors** - A polling loop gave up (`PollRetriesExhausted`,
//!   `PairingTimeout`, `ConnectionTimeout`). These arrive through `error`
//!   events, never as return values.
//! - **Send Errors** - The provider rejected an outbound message
//!   (`SendRejected`). No credit was consumed.
//! - **Configuration Errors** - Invalid settings; can't recover without fixing
//!   the configuration.
//!
//! # Error Handling Guide
//!
//! ## Basic Pattern
//!
//! ```rust,no_run
//! # use chatrelay_core::{RelayManager, RelayError};
//! # use std::sync::Arc;
//! # async fn example(relay: Arc<RelayManager>) {
//! match relay.send_message("+15551234567", "Hello from the CRM").await {
//!     Ok(message_id) => {
//!         println!("Sent: {}", message_id);
//!     }
//!     Err(RelayError::NotConnected) => {
//!         eprintln!("Session is not authenticated yet");
//!         // Wait for the `ready` event before sending
//!     }
//!     Err(RelayError::InsufficientCredit) => {
//!         eprintln!("Send budget exhausted");
//!         // Top up with relay.add_credits(..) and retry
//!     }
//!     Err(e) => {
//!         eprintln!("Send failed: {}", e);
//!         // The ledger was not touched; safe to retry later
//!     }
//! }
//! # }
//! ```
//!
//! ## Async Faults
//!
//! Faults inside the polling loops never surface as return values. Subscribe
//! to events and watch for `error`:
//!
//! ```rust,no_run
//! # use chatrelay_core::{RelayManager, RelayEvent};
//! # use std::sync::Arc;
//! # async fn example(relay: Arc<RelayManager>) {
//! let mut events = relay.subscribe_events();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let RelayEvent::Error { error, context, .. } = event {
//!             eprintln!("relay fault ({:?}): {}", context, error);
//!             // The session has already been cleaned up; call
//!             // relay.initialize(..) again when appropriate.
//!         }
//!     }
//! });
//! # }
//! ```

use thiserror::Error;

use crate::provider::ProviderError;

/// Result type alias for chatrelay-core operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Comprehensive error types for relay session operations
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// Precondition errors, returned synchronously to the caller
    #[error("Session is not authenticated")]
    NotConnected,

    #[error("Insufficient credit: send budget is exhausted")]
    InsufficientCredit,

    #[error("A session is already active (state: {state})")]
    SessionAlreadyActive { state: String },

    /// Session lifecycle errors
    #[error("Session initiation failed: {reason}")]
    SessionInitiationFailed { reason: String },

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Polling loop errors, surfaced through `error` events
    #[error("Status polling gave up after {attempts} consecutive failures")]
    PollRetriesExhausted { attempts: u32 },

    #[error("Pairing was not completed within {polls} status polls")]
    PairingTimeout { polls: u32 },

    #[error("Connection timed out after {duration_ms}ms")]
    ConnectionTimeout { duration_ms: u64 },

    /// Send path errors
    #[error("Send rejected: {reason}")]
    SendRejected { reason: String },

    /// Provider boundary errors passed through unchanged
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Missing required configuration: {field}")]
    MissingConfiguration { field: String },

    /// Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RelayError {
    /// Create a session initiation failure
    pub fn initiation_failed(reason: impl Into<String>) -> Self {
        Self::SessionInitiationFailed { reason: reason.into() }
    }

    /// Create a send rejection error
    pub fn send_rejected(reason: impl Into<String>) -> Self {
        Self::SendRejected { reason: reason.into() }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { field: field.into(), reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if this error is a precondition failure (refused before any
    /// remote call was attempted)
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RelayError::NotConnected
                | RelayError::InsufficientCredit
                | RelayError::SessionAlreadyActive { .. }
                | RelayError::InvalidConfiguration { .. }
                | RelayError::MissingConfiguration { .. }
        )
    }

    /// Check if this error means the remote session is gone for good
    pub fn is_terminal_session(&self) -> bool {
        match self {
            RelayError::SessionExpired | RelayError::SessionNotFound { .. } => true,
            RelayError::Provider(e) => e.is_terminal(),
            _ => false,
        }
    }

    /// Check if this error is worth retrying after a fresh `initialize`
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Recoverable with a new session
            RelayError::SessionExpired |
            RelayError::SessionNotFound { .. } |
            RelayError::PollRetriesExhausted { .. } |
            RelayError::PairingTimeout { .. } |
            RelayError::ConnectionTimeout { .. } |
            RelayError::SessionInitiationFailed { .. } => true,

            // Recoverable without a new session
            RelayError::NotConnected |
            RelayError::InsufficientCredit |
            RelayError::SessionAlreadyActive { .. } |
            RelayError::SendRejected { .. } => true,

            // Not recoverable without fixing something
            RelayError::InvalidConfiguration { .. } |
            RelayError::MissingConfiguration { .. } |
            RelayError::Internal { .. } => false,

            RelayError::Provider(e) => !e.is_terminal(),
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::NotConnected |
            RelayError::InsufficientCredit |
            RelayError::SessionAlreadyActive { .. } => "precondition",

            RelayError::SessionInitiationFailed { .. } |
            RelayError::SessionExpired |
            RelayError::SessionNotFound { .. } => "session",

            RelayError::PollRetriesExhausted { .. } |
            RelayError::PairingTimeout { .. } |
            RelayError::ConnectionTimeout { .. } => "polling",

            RelayError::SendRejected { .. } => "send",

            RelayError::Provider(_) => "provider",

            RelayError::InvalidConfiguration { .. } |
            RelayError::MissingConfiguration { .. } => "configuration",

            RelayError::Internal { .. } => "system",
        }
    }
}
