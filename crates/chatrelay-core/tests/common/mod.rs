//! Shared test support: a script-driven provider and event helpers
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::timeout;

use chatrelay_core::provider::{
    InboundMessage, MessageBatch, MessagingProvider, ProviderError, ProviderResult,
    SessionStatus, Telemetry,
};
use chatrelay_core::{RelayBuilder, RelayConfig, RelayEvent, RelayManager};

/// One recorded call against the scripted provider
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Initiate { number_id: String },
    PollStatus { session_id: String },
    PollMessages { session_id: String },
    Send { session_id: String, peer_id: String, text: String },
    Terminate { session_id: String },
}

/// Provider whose responses are scripted up front.
///
/// Each operation pops the next scripted result from its queue; an empty
/// queue yields a benign default (a fresh session id, a pending status, an
/// empty batch, a generated message id). Every call is recorded so tests
/// can assert how often, and with what, the relay spoke to the provider.
#[derive(Default)]
pub struct ScriptedProvider {
    initiate: Mutex<VecDeque<ProviderResult<String>>>,
    status: Mutex<VecDeque<ProviderResult<SessionStatus>>>,
    messages: Mutex<VecDeque<ProviderResult<MessageBatch>>>,
    send: Mutex<VecDeque<ProviderResult<String>>>,
    calls: Mutex<Vec<ProviderCall>>,
    send_seq: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_initiate(&self, result: ProviderResult<String>) {
        self.initiate.lock().unwrap().push_back(result);
    }

    pub fn script_status(&self, result: ProviderResult<SessionStatus>) {
        self.status.lock().unwrap().push_back(result);
    }

    pub fn script_messages(&self, result: ProviderResult<MessageBatch>) {
        self.messages.lock().unwrap().push_back(result);
    }

    pub fn script_send(&self, result: ProviderResult<String>) {
        self.send.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_status_polls(&self) -> usize {
        self.count(|c| matches!(c, ProviderCall::PollStatus { .. }))
    }

    pub fn count_message_polls(&self) -> usize {
        self.count(|c| matches!(c, ProviderCall::PollMessages { .. }))
    }

    pub fn count_sends(&self) -> usize {
        self.count(|c| matches!(c, ProviderCall::Send { .. }))
    }

    fn count(&self, predicate: impl Fn(&ProviderCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MessagingProvider for ScriptedProvider {
    async fn initiate_session(&self, number_id: &str) -> ProviderResult<String> {
        self.record(ProviderCall::Initiate { number_id: number_id.to_string() });
        self.initiate
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("scripted-session".to_string()))
    }

    async fn poll_status(&self, session_id: &str) -> ProviderResult<SessionStatus> {
        self.record(ProviderCall::PollStatus { session_id: session_id.to_string() });
        self.status
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SessionStatus::default()))
    }

    async fn poll_messages(&self, session_id: &str) -> ProviderResult<MessageBatch> {
        self.record(ProviderCall::PollMessages { session_id: session_id.to_string() });
        self.messages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(MessageBatch::default()))
    }

    async fn send_message(
        &self,
        session_id: &str,
        peer_id: &str,
        text: &str,
    ) -> ProviderResult<String> {
        self.record(ProviderCall::Send {
            session_id: session_id.to_string(),
            peer_id: peer_id.to_string(),
            text: text.to_string(),
        });
        self.send.lock().unwrap().pop_front().unwrap_or_else(|| {
            let n = self.send_seq.fetch_add(1, Ordering::Relaxed);
            Ok(format!("scripted-msg-{}", n))
        })
    }

    async fn terminate_session(&self, session_id: &str) -> ProviderResult<()> {
        self.record(ProviderCall::Terminate { session_id: session_id.to_string() });
        Ok(())
    }
}

// ===== STATUS / BATCH BUILDERS =====

pub fn pairing_status(code: &str) -> SessionStatus {
    SessionStatus {
        pairing_code: Some(code.to_string()),
        ..SessionStatus::default()
    }
}

pub fn authenticated_status(peer: &str) -> SessionStatus {
    SessionStatus {
        authenticated: true,
        peer_identity: Some(peer.to_string()),
        session_payload: Some(serde_json::json!({ "restored": false })),
        ..SessionStatus::default()
    }
}

pub fn expired_status() -> SessionStatus {
    SessionStatus { expired: true, ..SessionStatus::default() }
}

pub fn disconnected_status() -> SessionStatus {
    SessionStatus { disconnected: true, ..SessionStatus::default() }
}

pub fn inbound(peer: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: Some(format!("in-{}", text)),
        peer_id: peer.to_string(),
        display_name: None,
        text: text.to_string(),
        timestamp: Some(chrono::Utc::now()),
    }
}

pub fn batch(messages: Vec<InboundMessage>, telemetry: Option<Telemetry>) -> MessageBatch {
    MessageBatch { messages, telemetry }
}

pub fn transient_error() -> ProviderError {
    ProviderError::Unavailable { reason: "scripted outage".to_string() }
}

// ===== RELAY HELPERS =====

/// Configuration with tick cadences fast enough for tests
pub fn fast_config() -> RelayConfig {
    RelayConfig::new()
        .with_status_poll_interval(Duration::from_millis(25))
        .with_message_poll_interval(Duration::from_millis(25))
        .with_connection_timeout(Duration::from_secs(30))
}

/// Build a relay over the scripted provider with the fast test config
pub fn build_relay(provider: Arc<ScriptedProvider>, credits: u32) -> Arc<RelayManager> {
    RelayBuilder::new()
        .provider(provider)
        .config(fast_config())
        .initial_credits(credits)
        .build()
        .expect("Failed to build relay")
}

/// Build a relay and drive it straight to `ready` with a scripted
/// authentication (the restored-session path, no pairing step)
pub async fn ready_relay(
    provider: Arc<ScriptedProvider>,
    credits: u32,
) -> (Arc<RelayManager>, broadcast::Receiver<RelayEvent>) {
    provider.script_status(Ok(authenticated_status("+15550001111")));
    let relay = build_relay(provider, credits);
    let mut events = relay.subscribe_events();
    relay.initialize("num-1").await.expect("Failed to initialize");
    wait_for(&mut events, "ready", |e| matches!(e, RelayEvent::Ready { .. })).await;
    (relay, events)
}

/// Wait up to five seconds for the first event matching `predicate`,
/// discarding everything before it
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<RelayEvent>,
    what: &str,
    mut predicate: F,
) -> RelayEvent
where
    F: FnMut(&RelayEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    panic!("event receiver lagged by {} while waiting for {}", skipped, what)
                }
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event channel closed while waiting for {}", what)
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}

/// Drain every event already delivered, without blocking
pub fn drain(events: &mut broadcast::Receiver<RelayEvent>) -> Vec<RelayEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Collect events for `window`, then return them
pub async fn collect_for(
    events: &mut broadcast::Receiver<RelayEvent>,
    window: Duration,
) -> Vec<RelayEvent> {
    tokio::time::sleep(window).await;
    drain(events)
}
