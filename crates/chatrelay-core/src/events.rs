//! Event handling for relay session operations
//!
//! Events are the entire asynchronous surface of the relay: state changes,
//! pairing codes, inbound messages, send confirmations, heartbeats, and
//! faults all arrive here. Handlers are invoked in registration order and a
//! panicking handler is logged and skipped, so one faulty subscriber can
//! never break dispatch or the polling loop that triggered it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::conversation::Message;
use crate::error::RelayError;
use crate::provider::Telemetry;
use crate::session::SessionState;

/// The canonical event names exposed to the surrounding CRM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayEventKind {
    /// Session state changed
    Status,
    /// A pairing code was issued (emitted under the name `qr`)
    PairingCode,
    /// The session authenticated
    Authenticated,
    /// The session is ready for messaging
    Ready,
    /// The session disconnected
    Disconnected,
    /// An asynchronous fault occurred
    Error,
    /// An inbound message arrived
    Message,
    /// An outbound message was confirmed sent
    MessageSent,
    /// Telemetry arrived with a message poll
    Heartbeat,
}

impl RelayEventKind {
    /// The event name as the CRM sees it
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayEventKind::Status => "status",
            RelayEventKind::PairingCode => "qr",
            RelayEventKind::Authenticated => "authenticated",
            RelayEventKind::Ready => "ready",
            RelayEventKind::Disconnected => "disconnected",
            RelayEventKind::Error => "error",
            RelayEventKind::Message => "message",
            RelayEventKind::MessageSent => "message_sent",
            RelayEventKind::Heartbeat => "heartbeat",
        }
    }
}

/// Information about a session state change
#[derive(Debug, Clone)]
pub struct StatusInfo {
    /// New session state
    pub new_state: SessionState,
    /// Previous session state (if known)
    pub previous_state: Option<SessionState>,
    /// Reason for the state change (if available)
    pub reason: Option<String>,
    /// When the state change occurred
    pub timestamp: DateTime<Utc>,
}

/// Information about an issued pairing code
#[derive(Debug, Clone)]
pub struct PairingInfo {
    /// The code to present for out-of-band device linking
    pub pairing_code: String,
    /// When the code was received
    pub timestamp: DateTime<Utc>,
}

/// Information about a successful authentication
#[derive(Debug, Clone)]
pub struct AuthenticatedInfo {
    /// Identity of the authenticated remote peer
    pub peer_identity: String,
    /// Opaque session payload the provider returned (if any)
    pub session_payload: Option<serde_json::Value>,
    /// When authentication was observed
    pub timestamp: DateTime<Utc>,
}

/// Information about a disconnection
#[derive(Debug, Clone)]
pub struct DisconnectInfo {
    /// Why the session ended (if known)
    pub reason: Option<String>,
    /// When the disconnection was observed
    pub timestamp: DateTime<Utc>,
}

/// Telemetry delivered alongside message polling
#[derive(Debug, Clone)]
pub struct HeartbeatInfo {
    /// Device telemetry payload
    pub telemetry: Telemetry,
    /// When the heartbeat was observed
    pub timestamp: DateTime<Utc>,
}

/// Event filtering options for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only receive specific kinds of events
    pub kinds: Option<HashSet<RelayEventKind>>,
    /// Minimum event priority level
    pub min_priority: Option<EventPriority>,
}

/// Event priority levels for filtering
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Low priority events (heartbeats, routine status)
    Low,
    /// Normal priority events (messages, state changes)
    Normal,
    /// High priority events (pairing codes, disconnections)
    High,
    /// Critical priority events (terminal failures)
    Critical,
}

/// Comprehensive relay event types
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Session state changed
    StatusChanged {
        info: StatusInfo,
        priority: EventPriority,
    },
    /// A pairing code was issued
    PairingCode {
        info: PairingInfo,
        priority: EventPriority,
    },
    /// The session authenticated
    Authenticated {
        info: AuthenticatedInfo,
        priority: EventPriority,
    },
    /// The session is ready for messaging
    Ready {
        timestamp: DateTime<Utc>,
        priority: EventPriority,
    },
    /// The session disconnected
    Disconnected {
        info: DisconnectInfo,
        priority: EventPriority,
    },
    /// An asynchronous fault occurred
    Error {
        error: RelayError,
        context: Option<String>,
        priority: EventPriority,
    },
    /// An inbound message arrived
    MessageReceived {
        message: Message,
        priority: EventPriority,
    },
    /// An outbound message was confirmed sent
    MessageSent {
        message: Message,
        priority: EventPriority,
    },
    /// Telemetry arrived with a message poll
    Heartbeat {
        info: HeartbeatInfo,
        priority: EventPriority,
    },
}

impl RelayEvent {
    /// Get the kind of this event
    pub fn kind(&self) -> RelayEventKind {
        match self {
            RelayEvent::StatusChanged { .. } => RelayEventKind::Status,
            RelayEvent::PairingCode { .. } => RelayEventKind::PairingCode,
            RelayEvent::Authenticated { .. } => RelayEventKind::Authenticated,
            RelayEvent::Ready { .. } => RelayEventKind::Ready,
            RelayEvent::Disconnected { .. } => RelayEventKind::Disconnected,
            RelayEvent::Error { .. } => RelayEventKind::Error,
            RelayEvent::MessageReceived { .. } => RelayEventKind::Message,
            RelayEvent::MessageSent { .. } => RelayEventKind::MessageSent,
            RelayEvent::Heartbeat { .. } => RelayEventKind::Heartbeat,
        }
    }

    /// The event name as the CRM sees it
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Get the priority of this event
    pub fn priority(&self) -> EventPriority {
        match self {
            RelayEvent::StatusChanged { priority, .. } => priority.clone(),
            RelayEvent::PairingCode { priority, .. } => priority.clone(),
            RelayEvent::Authenticated { priority, .. } => priority.clone(),
            RelayEvent::Ready { priority, .. } => priority.clone(),
            RelayEvent::Disconnected { priority, .. } => priority.clone(),
            RelayEvent::Error { priority, .. } => priority.clone(),
            RelayEvent::MessageReceived { priority, .. } => priority.clone(),
            RelayEvent::MessageSent { priority, .. } => priority.clone(),
            RelayEvent::Heartbeat { priority, .. } => priority.clone(),
        }
    }

    /// Get the peer ID associated with this event (if any)
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            RelayEvent::MessageReceived { message, .. } => Some(&message.peer_id),
            RelayEvent::MessageSent { message, .. } => Some(&message.peer_id),
            _ => None,
        }
    }

    /// Check if this event passes the given filter
    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        if let Some(min_priority) = &filter.min_priority {
            if self.priority() < *min_priority {
                return false;
            }
        }

        if let Some(kinds) = &filter.kinds {
            if !kinds.contains(&self.kind()) {
                return false;
            }
        }

        true
    }
}

/// Event handler with per-event methods and filtering capabilities
///
/// Every method has a default no-op implementation; a handler overrides only
/// the events it cares about.
#[async_trait]
pub trait RelayEventHandler: Send + Sync {
    /// Handle session state changes
    async fn on_status_changed(&self, _info: StatusInfo) {}

    /// Handle issued pairing codes
    async fn on_pairing_code(&self, _info: PairingInfo) {}

    /// Handle successful authentication
    async fn on_authenticated(&self, _info: AuthenticatedInfo) {}

    /// Handle readiness for messaging
    async fn on_ready(&self, _timestamp: DateTime<Utc>) {}

    /// Handle disconnections
    async fn on_disconnected(&self, _info: DisconnectInfo) {}

    /// Handle asynchronous faults
    async fn on_error(&self, _error: RelayError, _context: Option<String>) {}

    /// Handle inbound messages
    async fn on_message(&self, _message: Message) {}

    /// Handle confirmed outbound sends
    async fn on_message_sent(&self, _message: Message) {}

    /// Handle heartbeats
    async fn on_heartbeat(&self, _info: HeartbeatInfo) {}

    /// Dispatch a relay event to the matching per-event method
    async fn on_relay_event(&self, event: RelayEvent) {
        match event {
            RelayEvent::StatusChanged { info, .. } => {
                self.on_status_changed(info).await;
            }
            RelayEvent::PairingCode { info, .. } => {
                self.on_pairing_code(info).await;
            }
            RelayEvent::Authenticated { info, .. } => {
                self.on_authenticated(info).await;
            }
            RelayEvent::Ready { timestamp, .. } => {
                self.on_ready(timestamp).await;
            }
            RelayEvent::Disconnected { info, .. } => {
                self.on_disconnected(info).await;
            }
            RelayEvent::Error { error, context, .. } => {
                self.on_error(error, context).await;
            }
            RelayEvent::MessageReceived { message, .. } => {
                self.on_message(message).await;
            }
            RelayEvent::MessageSent { message, .. } => {
                self.on_message_sent(message).await;
            }
            RelayEvent::Heartbeat { info, .. } => {
                self.on_heartbeat(info).await;
            }
        }
    }
}

/// Event subscription with filtering capabilities
pub struct EventSubscription {
    handler: Arc<dyn RelayEventHandler>,
    filter: EventFilter,
    id: uuid::Uuid,
}

impl EventSubscription {
    /// Create a new event subscription with filtering
    pub fn new(handler: Arc<dyn RelayEventHandler>, filter: EventFilter) -> Self {
        Self {
            handler,
            filter,
            id: uuid::Uuid::new_v4(),
        }
    }

    /// Create a subscription that receives all events
    pub fn all_events(handler: Arc<dyn RelayEventHandler>) -> Self {
        Self::new(handler, EventFilter::default())
    }

    /// Create a subscription for one kind of event only
    pub fn events_of(kind: RelayEventKind, handler: Arc<dyn RelayEventHandler>) -> Self {
        let mut kinds = HashSet::new();
        kinds.insert(kind);
        let filter = EventFilter {
            kinds: Some(kinds),
            ..Default::default()
        };
        Self::new(handler, filter)
    }

    /// Create a subscription for high priority events only
    pub fn high_priority_events(handler: Arc<dyn RelayEventHandler>) -> Self {
        let filter = EventFilter {
            min_priority: Some(EventPriority::High),
            ..Default::default()
        };
        Self::new(handler, filter)
    }

    /// Get the subscription ID
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Check if this subscription should receive the given event
    pub fn should_receive(&self, event: &RelayEvent) -> bool {
        event.passes_filter(&self.filter)
    }

    /// Deliver an event to this subscription's handler
    pub async fn deliver_event(&self, event: RelayEvent) {
        if self.should_receive(&event) {
            self.handler.on_relay_event(event).await;
        }
    }
}

impl Clone for EventSubscription {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            filter: self.filter.clone(),
            id: self.id,
        }
    }
}

/// Event emission utilities for the RelayManager
pub struct EventEmitter {
    subscriptions: std::sync::RwLock<Vec<EventSubscription>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new() -> Self {
        Self {
            subscriptions: std::sync::RwLock::new(Vec::new()),
        }
    }

    /// Add an event subscription
    pub fn subscribe(&self, subscription: EventSubscription) -> uuid::Uuid {
        let id = subscription.id();
        self.subscriptions.write().unwrap().push(subscription);
        id
    }

    /// Remove an event subscription
    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        let mut subscriptions = self.subscriptions.write().unwrap();
        if let Some(pos) = subscriptions.iter().position(|s| s.id() == subscription_id) {
            subscriptions.remove(pos);
            true
        } else {
            false
        }
    }

    /// Drop every subscription
    pub fn clear(&self) {
        self.subscriptions.write().unwrap().clear();
    }

    /// Emit an event to all matching subscriptions, in registration order.
    ///
    /// Each handler runs inside its own task so a panicking handler is
    /// contained: the panic is logged and dispatch continues with the next
    /// handler.
    pub async fn emit(&self, event: RelayEvent) {
        let subscriptions = self.subscriptions.read().unwrap().clone();

        for subscription in subscriptions {
            let event_clone = event.clone();
            let task = tokio::spawn(async move {
                subscription.deliver_event(event_clone).await;
            });
            if let Err(e) = task.await {
                tracing::error!(event = event.name(), "event handler failed: {}", e);
            }
        }
    }

    /// Get the number of active subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().unwrap().len()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
