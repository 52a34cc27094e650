//! Relay manager: session lifecycle coordination
//!
//! The manager owns exactly one session lifecycle at a time, the credit
//! ledger, the conversation table, and the event surface. Polling loops and
//! the send path live in sibling modules and attach to the manager through
//! `impl` blocks.
//!
//! All session mutation funnels through the single `session` mutex.
//! Decisions are made while holding it; events are emitted only after it is
//! released, so a slow or re-entrant subscriber can never deadlock the
//! lifecycle.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::conversation::{Conversation, ConversationStore};
use crate::credits::CreditLedger;
use crate::error::{RelayError, RelayResult};
use crate::events::{
    DisconnectInfo, EventEmitter, EventPriority, EventSubscription, RelayEvent, StatusInfo,
};
use crate::provider::MessagingProvider;
use crate::relay::config::RelayConfig;
use crate::relay::send::AutoResponder;
use crate::session::{Session, SessionSnapshot, SessionState};

/// Broadcast buffer for the channel-based event surface. Slow receivers
/// observe `Lagged` rather than blocking the pollers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Statistics about the relay
#[derive(Debug, Clone)]
pub struct RelayStats {
    pub state: SessionState,
    pub credit_balance: u32,
    pub conversations: usize,
    pub sessions_initiated: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub automated_replies: u64,
}

/// Counters guarded by the stats mutex; live values are read at snapshot time
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub sessions_initiated: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub automated_replies: u64,
}

/// Main relay manager coordinating one provider session
pub struct RelayManager {
    pub(crate) config: RelayConfig,
    pub(crate) provider: Arc<dyn MessagingProvider>,
    pub(crate) auto_responder: Option<Arc<dyn AutoResponder>>,
    pub(crate) session: Mutex<Session>,
    pub(crate) credits: CreditLedger,
    pub(crate) conversations: ConversationStore,
    pub(crate) emitter: EventEmitter,
    pub(crate) event_tx: broadcast::Sender<RelayEvent>,
    pub(crate) stats: Mutex<StatsCounters>,
    pub(crate) status_poller: std::sync::Mutex<Option<JoinHandle<()>>>,
    pub(crate) message_poller: std::sync::Mutex<Option<JoinHandle<()>>>,
    pub(crate) connect_timer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RelayManager {
    /// Create a new relay manager around a provider
    pub(crate) fn new(
        config: RelayConfig,
        provider: Arc<dyn MessagingProvider>,
        auto_responder: Option<Arc<dyn AutoResponder>>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let initial_credits = config.initial_credits;
        Arc::new(Self {
            config,
            provider,
            auto_responder,
            session: Mutex::new(Session::new()),
            credits: CreditLedger::new(initial_credits),
            conversations: ConversationStore::new(),
            emitter: EventEmitter::new(),
            event_tx,
            stats: Mutex::new(StatsCounters::default()),
            status_poller: std::sync::Mutex::new(None),
            message_poller: std::sync::Mutex::new(None),
            connect_timer: std::sync::Mutex::new(None),
        })
    }

    /// Start a session lifecycle for `number_id`.
    ///
    /// Obtains a session handle from the provider, arms the connection
    /// timeout, and starts the status poller. Returns the session snapshot
    /// once the handle exists; pairing and authentication progress arrives
    /// through events.
    ///
    /// Fails with [`RelayError::SessionAlreadyActive`] while a previous
    /// lifecycle is still live, and with
    /// [`RelayError::SessionInitiationFailed`] when the provider refuses or
    /// returns an unusable handle.
    pub async fn initialize(self: &Arc<Self>, number_id: &str) -> RelayResult<SessionSnapshot> {
        let (epoch, previous) = {
            let mut session = self.session.lock().await;
            if session.state.is_live() {
                return Err(RelayError::SessionAlreadyActive {
                    state: session.state.to_string(),
                });
            }
            let previous = session.begin(number_id)?;
            (session.epoch, previous)
        };

        {
            let mut stats = self.stats.lock().await;
            stats.sessions_initiated += 1;
        }
        self.emit_status(SessionState::Initializing, previous, Some("initialize".into()))
            .await;
        tracing::info!(number_id = %number_id, "initiating session");

        let session_id = match self.provider.initiate_session(number_id).await {
            Ok(id) if !id.is_empty() => id,
            Ok(_) => {
                let error = RelayError::initiation_failed("provider returned an empty session id");
                self.fail_session(epoch, error.clone(), Some("initialize".into())).await;
                return Err(error);
            }
            Err(e) => {
                let error = RelayError::initiation_failed(e.to_string());
                self.fail_session(epoch, error.clone(), Some("initialize".into())).await;
                return Err(error);
            }
        };

        let snapshot = {
            let mut session = self.session.lock().await;
            if session.epoch != epoch || session.state != SessionState::Initializing {
                // Torn down while the provider call was in flight; do not
                // leak the remote session
                drop(session);
                tracing::warn!(session_id = %session_id, "session torn down during initiation");
                if let Err(e) = self.provider.terminate_session(&session_id).await {
                    tracing::warn!(session_id = %session_id, "orphan terminate failed: {}", e);
                }
                return Err(RelayError::initiation_failed(
                    "session was torn down during initiation",
                ));
            }
            session.session_id = Some(session_id.clone());

            // Handles are stored before the session lock is released so a
            // concurrent disconnect cannot miss them
            self.arm_connect_timer(epoch);
            self.spawn_status_poller(epoch);
            session.snapshot()
        };

        tracing::info!(session_id = %session_id, "session initiated, polling for status");
        Ok(snapshot)
    }

    /// Disconnect the current session.
    ///
    /// Remote termination is best effort; local teardown always completes.
    /// Safe to call at any time, including when no session is active.
    pub async fn disconnect(&self) -> RelayResult<()> {
        let session_id = self.session.lock().await.session_id.clone();
        if let Some(id) = &session_id {
            if let Err(e) = self.provider.terminate_session(id).await {
                tracing::warn!(session_id = %id, "remote terminate failed: {}", e);
            }
        }
        self.disconnect_session(None, Some("disconnect requested".into())).await;
        Ok(())
    }

    /// Disconnect and drop every event subscription. The manager is inert
    /// afterwards but can be re-initialized.
    pub async fn destroy(&self) -> RelayResult<()> {
        self.disconnect().await?;
        self.emitter.clear();
        tracing::info!("relay manager destroyed");
        Ok(())
    }

    /// Tear down local session resources: the connection timer, both
    /// pollers, and the session handle. Idempotent.
    pub(crate) async fn cleanup(&self) {
        let mut session = self.session.lock().await;
        self.cleanup_locked(&mut session);
    }

    /// Cleanup body, called with the session lock already held.
    ///
    /// A background task that decided to stop must release its own handle
    /// slot before reaching this, otherwise it aborts itself mid-teardown.
    pub(crate) fn cleanup_locked(&self, session: &mut Session) {
        self.clear_connect_timer();
        if let Some(handle) = self.status_poller.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.message_poller.lock().unwrap().take() {
            handle.abort();
        }
        session.reset();
        tracing::debug!("session resources cleaned up");
    }

    /// Move the session to `Failed`, clean up, and emit status + error.
    ///
    /// No-op when `epoch` is stale or the session is no longer live, so a
    /// task outliving its lifecycle cannot fail the next one.
    pub(crate) async fn fail_session(
        &self,
        epoch: u64,
        error: RelayError,
        context: Option<String>,
    ) {
        self.fail_session_inner(epoch, error, context, false).await;
    }

    /// Like [`fail_session`], but additionally a no-op once the session has
    /// authenticated. Used by the connection timer, whose deadline only
    /// covers the unauthenticated phase; the authenticated-or-not check and
    /// the transition happen under one lock acquisition, so the timer
    /// cannot lose a race against authentication.
    ///
    /// [`fail_session`]: Self::fail_session
    pub(crate) async fn fail_before_auth(
        &self,
        epoch: u64,
        error: RelayError,
        context: Option<String>,
    ) {
        self.fail_session_inner(epoch, error, context, true).await;
    }

    async fn fail_session_inner(
        &self,
        epoch: u64,
        error: RelayError,
        context: Option<String>,
        only_before_auth: bool,
    ) {
        let previous = {
            let mut session = self.session.lock().await;
            if session.epoch != epoch || !session.state.is_live() {
                return;
            }
            if only_before_auth && session.state.is_authenticated() {
                return;
            }
            match session.transition(SessionState::Failed) {
                Ok(previous) => {
                    self.cleanup_locked(&mut session);
                    previous
                }
                Err(_) => return,
            }
        };

        tracing::error!(category = error.category(), "session failed: {}", error);
        self.emit_status(SessionState::Failed, previous, Some(error.to_string())).await;
        self.emit(RelayEvent::Error {
            error,
            context,
            priority: EventPriority::Critical,
        })
        .await;
    }

    /// Move the session to `Disconnected` and clean up. Emits status +
    /// disconnected only when a live session actually ended; cleanup itself
    /// always runs.
    pub(crate) async fn disconnect_session(&self, epoch: Option<u64>, reason: Option<String>) {
        let previous = {
            let mut session = self.session.lock().await;
            if let Some(expected) = epoch {
                if session.epoch != expected {
                    return;
                }
            }
            let previous = if session.state.is_live() {
                session.transition(SessionState::Disconnected).ok()
            } else {
                None
            };
            self.cleanup_locked(&mut session);
            previous
        };

        if let Some(previous) = previous {
            tracing::info!(reason = reason.as_deref().unwrap_or("unspecified"), "session disconnected");
            self.emit_status(SessionState::Disconnected, previous, reason.clone()).await;
            self.emit(RelayEvent::Disconnected {
                info: DisconnectInfo { reason, timestamp: Utc::now() },
                priority: EventPriority::High,
            })
            .await;
        }
    }

    /// Release the status poller's own handle slot without aborting it.
    /// Called by the poller itself before it tears the session down.
    pub(crate) fn release_status_poller(&self) {
        self.status_poller.lock().unwrap().take();
    }

    /// Release the message poller's own handle slot without aborting it.
    pub(crate) fn release_message_poller(&self) {
        self.message_poller.lock().unwrap().take();
    }

    /// Stop and forget the connection timer, if armed
    pub(crate) fn clear_connect_timer(&self) {
        if let Some(handle) = self.connect_timer.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Release the timer's own handle slot without aborting it
    pub(crate) fn release_connect_timer(&self) {
        self.connect_timer.lock().unwrap().take();
    }

    // ===== EVENT SURFACE =====

    /// Send an event to both surfaces: the broadcast channel and the
    /// registered handlers, in that order.
    pub(crate) async fn emit(&self, event: RelayEvent) {
        let _ = self.event_tx.send(event.clone());
        self.emitter.emit(event).await;
    }

    /// Emit a status event for an applied transition
    pub(crate) async fn emit_status(
        &self,
        new_state: SessionState,
        previous_state: SessionState,
        reason: Option<String>,
    ) {
        self.emit(RelayEvent::StatusChanged {
            info: StatusInfo {
                new_state,
                previous_state: Some(previous_state),
                reason,
                timestamp: Utc::now(),
            },
            priority: EventPriority::Normal,
        })
        .await;
    }

    /// Subscribe to the broadcast event channel
    pub fn subscribe_events(&self) -> broadcast::Receiver<RelayEvent> {
        self.event_tx.subscribe()
    }

    /// Register a filtered event handler, returning its subscription id
    pub fn subscribe(&self, subscription: EventSubscription) -> uuid::Uuid {
        self.emitter.subscribe(subscription)
    }

    /// Remove a previously registered handler
    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        self.emitter.unsubscribe(subscription_id)
    }

    // ===== ACCESSORS =====

    /// Read-only snapshot of the session record
    pub async fn session_snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Current lifecycle state
    pub async fn current_state(&self) -> SessionState {
        self.session.lock().await.state.clone()
    }

    /// True while the session can send and receive messages
    pub async fn is_authenticated(&self) -> bool {
        self.session.lock().await.state.is_authenticated()
    }

    /// Remaining send credits
    pub fn credit_balance(&self) -> u32 {
        self.credits.balance()
    }

    /// Grant additional send credits, returning the new balance
    pub fn add_credits(&self, amount: u32) -> u32 {
        let balance = self.credits.grant(amount);
        tracing::info!(amount, balance, "credits granted");
        balance
    }

    /// Defensive copies of all conversations, most recently active first
    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.list()
    }

    /// Defensive copy of one conversation
    pub fn conversation(&self, peer_id: &str) -> Option<Conversation> {
        self.conversations.get(peer_id)
    }

    /// Zero the unread counter for a peer
    pub fn mark_conversation_read(&self, peer_id: &str) -> bool {
        self.conversations.mark_read(peer_id)
    }

    /// The configuration this manager runs with
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Statistics snapshot
    pub async fn stats(&self) -> RelayStats {
        // Counters are copied out before the session lock is touched; the
        // two mutexes are never held together
        let (sessions_initiated, messages_received, messages_sent, automated_replies) = {
            let counters = self.stats.lock().await;
            (
                counters.sessions_initiated,
                counters.messages_received,
                counters.messages_sent,
                counters.automated_replies,
            )
        };
        RelayStats {
            state: self.current_state().await,
            credit_balance: self.credits.balance(),
            conversations: self.conversations.len(),
            sessions_initiated,
            messages_received,
            messages_sent,
            automated_replies,
        }
    }
}

impl std::fmt::Debug for RelayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayManager")
            .field("config", &self.config)
            .field("credit_balance", &self.credits.balance())
            .field("conversations", &self.conversations.len())
            .finish()
    }
}
