//! Polling loops driving the session lifecycle
//!
//! Two independently scheduled loops run against the provider: the status
//! poller carries a session from initiation through pairing to
//! authentication, then hands over to the message poller, which sweeps
//! inbound messages and telemetry while the session stays authenticated.
//!
//! Each loop is an owned tokio task whose handle lives in a manager slot.
//! A loop that decides to stop releases its own slot first (without abort)
//! and only then tears the session down; `cleanup` aborts whatever is still
//! in the slots. Ticks never overlap: the next tick is not scheduled until
//! the previous one has fully returned.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};

use crate::conversation::Message;
use crate::error::RelayError;
use crate::events::{
    AuthenticatedInfo, EventPriority, HeartbeatInfo, PairingInfo, RelayEvent,
};
use crate::provider::SessionStatus;
use crate::session::SessionState;

/// What a tick tells its loop to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Continue,
    Stop,
}

/// The at-most-one transition a successful status response produces.
/// Decided under the session lock; the matching events are emitted after
/// the lock is released.
enum StatusDecision {
    None,
    Expired,
    Pairing {
        code: String,
        previous: SessionState,
    },
    Authenticated {
        peer_identity: String,
        session_payload: Option<serde_json::Value>,
        previous: SessionState,
    },
    Disconnected {
        reason: String,
    },
}

impl super::manager::RelayManager {
    /// Arm the global connection timeout.
    ///
    /// If it fires before authentication, the whole attempt fails and is
    /// cleaned up. Authentication and teardown both disarm it.
    pub(crate) fn arm_connect_timer(self: &Arc<Self>, epoch: u64) {
        self.clear_connect_timer();
        let manager = Arc::clone(self);
        let timeout = self.config.connection_timeout();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.release_connect_timer();
            manager
                .fail_before_auth(
                    epoch,
                    RelayError::ConnectionTimeout {
                        duration_ms: timeout.as_millis() as u64,
                    },
                    Some("connection timer".into()),
                )
                .await;
        });
        *self.connect_timer.lock().unwrap() = Some(handle);
    }

    /// Start the status poller for the current lifecycle
    pub(crate) fn spawn_status_poller(self: &Arc<Self>, epoch: u64) {
        if let Some(stale) = self.status_poller.lock().unwrap().take() {
            stale.abort();
        }
        let manager = Arc::clone(self);
        let period = self.config.status_poll_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately; the first probe
            // should happen one full period after initiation
            ticker.tick().await;
            let mut probes: u32 = 0;
            loop {
                ticker.tick().await;
                if probes >= manager.config.max_status_polls {
                    tracing::warn!(probes, "status polling window exhausted");
                    manager.release_status_poller();
                    manager
                        .fail_session(
                            epoch,
                            RelayError::PairingTimeout { polls: probes },
                            Some("status poller".into()),
                        )
                        .await;
                    break;
                }
                probes += 1;
                if manager.status_tick(epoch).await == PollOutcome::Stop {
                    break;
                }
            }
        });
        *self.status_poller.lock().unwrap() = Some(handle);
    }

    /// One status probe: call the provider, classify failures, and apply at
    /// most one lifecycle transition.
    pub(crate) async fn status_tick(self: &Arc<Self>, epoch: u64) -> PollOutcome {
        let session_id = {
            let session = self.session.lock().await;
            if session.epoch != epoch || !session.state.is_live() {
                return PollOutcome::Stop;
            }
            match &session.session_id {
                Some(id) => id.clone(),
                None => return PollOutcome::Stop,
            }
        };

        match self.provider.poll_status(&session_id).await {
            Ok(status) => self.apply_status(epoch, status).await,
            Err(e) if e.is_terminal() => {
                tracing::error!(session_id = %session_id, "status poll terminal failure: {}", e);
                self.release_status_poller();
                self.fail_session(epoch, RelayError::Provider(e), Some("status poll".into()))
                    .await;
                PollOutcome::Stop
            }
            Err(e) => {
                let exhausted = {
                    let mut session = self.session.lock().await;
                    if session.epoch != epoch || !session.state.is_live() {
                        return PollOutcome::Stop;
                    }
                    session.retry_count += 1;
                    tracing::warn!(
                        retry = session.retry_count,
                        max = self.config.max_transient_retries,
                        "status poll failed: {}",
                        e
                    );
                    session.retry_count >= self.config.max_transient_retries
                };
                if exhausted {
                    self.release_status_poller();
                    self.fail_session(
                        epoch,
                        RelayError::PollRetriesExhausted {
                            attempts: self.config.max_transient_retries,
                        },
                        Some("status poll".into()),
                    )
                    .await;
                    return PollOutcome::Stop;
                }
                PollOutcome::Continue
            }
        }
    }

    /// Apply a successful status response.
    ///
    /// A successful round trip forgives prior transient failures. At most
    /// one outcome fires per tick, checked in priority order: expiry, then
    /// a fresh pairing code, then authentication, then disconnection.
    pub(crate) async fn apply_status(
        self: &Arc<Self>,
        epoch: u64,
        status: SessionStatus,
    ) -> PollOutcome {
        let decision = {
            let mut session = self.session.lock().await;
            if session.epoch != epoch || !session.state.is_live() {
                return PollOutcome::Stop;
            }
            session.retry_count = 0;

            if status.expired {
                StatusDecision::Expired
            } else if let Some(code) = fresh_pairing_code(&session.state, &status) {
                match session.transition(SessionState::AwaitingPairing {
                    pairing_code: code.clone(),
                }) {
                    Ok(previous) => StatusDecision::Pairing { code, previous },
                    Err(_) => StatusDecision::None,
                }
            } else if status.authenticated && !session.state.is_authenticated() {
                match status.peer_identity.as_deref().filter(|p| !p.is_empty()) {
                    Some(peer) => {
                        match session.transition(SessionState::Authenticated {
                            peer_identity: peer.to_string(),
                        }) {
                            Ok(previous) => {
                                // Authentication beat the global deadline and
                                // ends this loop; the message poller takes
                                // over. Handles swap under the session lock.
                                self.clear_connect_timer();
                                self.release_status_poller();
                                self.spawn_message_poller(epoch);
                                StatusDecision::Authenticated {
                                    peer_identity: peer.to_string(),
                                    session_payload: status.session_payload.clone(),
                                    previous,
                                }
                            }
                            Err(_) => StatusDecision::None,
                        }
                    }
                    None => {
                        // Authenticated with no peer identity is malformed;
                        // treat like a transient fault and keep polling
                        tracing::warn!("status reported authenticated without a peer identity");
                        StatusDecision::None
                    }
                }
            } else if status.disconnected {
                StatusDecision::Disconnected {
                    reason: "provider reported disconnection".to_string(),
                }
            } else {
                StatusDecision::None
            }
        };

        match decision {
            StatusDecision::None => PollOutcome::Continue,
            StatusDecision::Expired => {
                self.release_status_poller();
                self.fail_session(epoch, RelayError::SessionExpired, Some("status poll".into()))
                    .await;
                PollOutcome::Stop
            }
            StatusDecision::Pairing { code, previous } => {
                tracing::info!("pairing code received");
                self.emit(RelayEvent::PairingCode {
                    info: PairingInfo { pairing_code: code.clone(), timestamp: Utc::now() },
                    priority: EventPriority::High,
                })
                .await;
                self.emit_status(
                    SessionState::AwaitingPairing { pairing_code: code },
                    previous,
                    Some("pairing code received".into()),
                )
                .await;
                PollOutcome::Continue
            }
            StatusDecision::Authenticated { peer_identity, session_payload, previous } => {
                tracing::info!(peer_identity = %peer_identity, "session authenticated");
                self.emit_status(
                    SessionState::Authenticated { peer_identity: peer_identity.clone() },
                    previous,
                    Some("authenticated".into()),
                )
                .await;
                self.emit(RelayEvent::Authenticated {
                    info: AuthenticatedInfo {
                        peer_identity,
                        session_payload,
                        timestamp: Utc::now(),
                    },
                    priority: EventPriority::High,
                })
                .await;
                self.emit(RelayEvent::Ready {
                    timestamp: Utc::now(),
                    priority: EventPriority::High,
                })
                .await;
                PollOutcome::Stop
            }
            StatusDecision::Disconnected { reason } => {
                self.release_status_poller();
                self.disconnect_session(Some(epoch), Some(reason)).await;
                PollOutcome::Stop
            }
        }
    }

    /// Start the message poller once the session is authenticated
    pub(crate) fn spawn_message_poller(self: &Arc<Self>, epoch: u64) {
        if let Some(stale) = self.message_poller.lock().unwrap().take() {
            stale.abort();
        }
        let manager = Arc::clone(self);
        let period = self.config.message_poll_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if manager.message_tick(epoch).await == PollOutcome::Stop {
                    break;
                }
            }
        });
        *self.message_poller.lock().unwrap() = Some(handle);
    }

    /// One message sweep: fetch the batch, store and announce each message
    /// in response order, then announce telemetry.
    ///
    /// Transient failures skip the tick; there is no retry budget here
    /// because a missed sweep has no lifecycle consequence. A terminal
    /// failure ends the session as a disconnection, and no automatic
    /// reconnection is attempted.
    pub(crate) async fn message_tick(self: &Arc<Self>, epoch: u64) -> PollOutcome {
        let session_id = {
            let session = self.session.lock().await;
            if session.epoch != epoch || !session.state.is_authenticated() {
                return PollOutcome::Stop;
            }
            match &session.session_id {
                Some(id) => id.clone(),
                None => return PollOutcome::Stop,
            }
        };

        let batch = match self.provider.poll_messages(&session_id).await {
            Ok(batch) => batch,
            Err(e) if e.is_terminal() => {
                tracing::warn!(session_id = %session_id, "message poll terminal failure: {}", e);
                self.release_message_poller();
                self.disconnect_session(Some(epoch), Some(e.to_string())).await;
                return PollOutcome::Stop;
            }
            Err(e) => {
                tracing::warn!("message poll failed, skipping tick: {}", e);
                return PollOutcome::Continue;
            }
        };

        let mut inbound = Vec::with_capacity(batch.messages.len());
        for raw in &batch.messages {
            let id = raw
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let timestamp = raw.timestamp.unwrap_or_else(Utc::now);
            let message = Message::inbound(id, raw.peer_id.clone(), raw.text.clone(), timestamp);
            self.conversations.upsert(message.clone(), raw.display_name.as_deref());
            inbound.push(message);
        }

        if !inbound.is_empty() {
            let mut stats = self.stats.lock().await;
            stats.messages_received += inbound.len() as u64;
        }

        // Message events preserve batch order; the heartbeat always follows
        for message in &inbound {
            self.emit(RelayEvent::MessageReceived {
                message: message.clone(),
                priority: EventPriority::Normal,
            })
            .await;
        }
        if let Some(telemetry) = batch.telemetry {
            self.emit(RelayEvent::Heartbeat {
                info: HeartbeatInfo { telemetry, timestamp: Utc::now() },
                priority: EventPriority::Low,
            })
            .await;
        }

        if let Some(responder) = &self.auto_responder {
            for message in &inbound {
                if let Some(reply) = responder.reply_to(message).await {
                    match self.send_automated(&message.peer_id, &reply).await {
                        Ok(message_id) => {
                            tracing::debug!(message_id = %message_id, "automated reply sent");
                        }
                        Err(e) => {
                            tracing::warn!(peer_id = %message.peer_id, "automated reply failed: {}", e);
                        }
                    }
                }
            }
        }

        PollOutcome::Continue
    }
}

/// A pairing code counts only when present, non-empty, and different from
/// the one already on the session.
fn fresh_pairing_code(state: &SessionState, status: &SessionStatus) -> Option<String> {
    let code = status.pairing_code.as_deref()?;
    if code.is_empty() || state.pairing_code() == Some(code) {
        return None;
    }
    Some(code.to_string())
}
