//! High-level relay manager implementation
//!
//! This module provides the session lifecycle coordinator for CRM messaging
//! integrations.
//!
//! # Architecture Overview
//!
//! The relay module is organized into several sub-modules:
//!
//! - **`manager`** - The main RelayManager that coordinates all operations
//! - **`polling`** - The status and message polling loops
//! - **`send`** - The send path and its credit accounting
//! - **`config`** - Cadence, retry, and timeout configuration
//! - **`builder`** - Fluent construction of a manager around a provider
//!
//! # Usage Guide
//!
//! ## Basic Session Flow
//!
//! ```rust,no_run
//! # use chatrelay_core::{RelayBuilder, RelayEvent, SessionState};
//! # use chatrelay_core::provider::SimulatedProvider;
//! # use std::sync::Arc;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // 1. Create the relay around a provider
//! let relay = RelayBuilder::new()
//!     .provider(Arc::new(SimulatedProvider::default()))
//!     .initial_credits(50)
//!     .build()?;
//!
//! // 2. Subscribe to events
//! let mut events = relay.subscribe_events();
//!
//! // 3. Start a session for a provisioned number
//! relay.initialize("num-1").await?;
//!
//! // 4. Handle events
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             RelayEvent::PairingCode { info, .. } => {
//!                 println!("pair the device with code {}", info.pairing_code);
//!             }
//!             RelayEvent::Ready { .. } => {
//!                 println!("session ready for messaging");
//!             }
//!             RelayEvent::MessageReceived { message, .. } => {
//!                 println!("{}: {}", message.peer_id, message.text);
//!             }
//!             RelayEvent::Disconnected { .. } => break,
//!             _ => {}
//!         }
//!     }
//! });
//!
//! // 5. Send once ready, then tear down
//! relay.send_message("+15550001111", "hello from the CRM").await?;
//! relay.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Watching for Faults
//!
//! Poller faults arrive asynchronously as `error` events; the session ends
//! in `Failed` and stays observable until the next `initialize`:
//!
//! ```rust,no_run
//! # use chatrelay_core::{Relay, RelayEvent};
//! # use std::sync::Arc;
//! # async fn example(relay: Arc<Relay>) {
//! let mut events = relay.subscribe_events();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let RelayEvent::Error { error, .. } = event {
//!             eprintln!("relay error ({}): {}", error.category(), error);
//!             if error.is_recoverable() {
//!                 // Schedule a fresh initialize here
//!             }
//!         }
//!     }
//! });
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod manager;
pub mod polling;
pub mod send;

pub use builder::RelayBuilder;
pub use config::RelayConfig;
pub use manager::{RelayManager, RelayStats};
pub use send::AutoResponder;

/// Convenience alias
pub type Relay = RelayManager;
