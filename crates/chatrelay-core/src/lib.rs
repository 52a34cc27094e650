//! Chatrelay-core: session lifecycle and message relay coordination
//!
//! This crate connects a CRM to a session-oriented messaging network that
//! requires device pairing via a scannable code, asynchronous
//! authentication, and polling-based delivery of inbound messages.
//!
//! ## Layer Separation
//! ```text
//! CRM surface -> chatrelay-core -> MessagingProvider (HTTP gateway / simulated)
//! ```
//!
//! Chatrelay-core focuses on:
//! - Driving one session from initiation through pairing to authentication
//! - Two owned polling loops with bounded retries and hard timeouts
//! - Credit accounting: one credit per confirmed delivery, never on failure
//! - Conversation tracking and an event surface for UI integration
//!
//! The remote network itself is reached only through the
//! [`provider::MessagingProvider`] trait; everything on the wire side of
//! that boundary is out of scope here.

pub mod conversation;
pub mod credits;
pub mod error;
pub mod events;
pub mod provider;
pub mod relay;
pub mod session;

// Public API exports (only high-level relay types)
pub use relay::{Relay, RelayBuilder, RelayConfig, RelayManager, RelayStats};
pub use session::{SessionSnapshot, SessionState};
pub use conversation::{
    Conversation, Message, MessageDirection, MessageOrigin, MessageStatus,
};
pub use events::{
    AuthenticatedInfo, DisconnectInfo, EventFilter, EventPriority, EventSubscription,
    HeartbeatInfo, PairingInfo, RelayEvent, RelayEventHandler, RelayEventKind, StatusInfo,
};
pub use relay::AutoResponder;
pub use error::{RelayError, RelayResult};

/// Chatrelay-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
