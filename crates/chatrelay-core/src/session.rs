//! Session lifecycle types for the relay manager
//!
//! This module provides the session state machine and lightweight session
//! tracking. All remote operations are delegated to the provider boundary.
//!
//! A session walks a closed set of states:
//!
//! ```text
//! Idle -> Initializing -> AwaitingPairing -> Authenticated -> Disconnected
//!                     \________________________|_________/
//!                                    Failed
//! ```
//!
//! `AwaitingPairing` and `Authenticated` carry their pairing code and peer
//! identity inside the variant, so a peer identity can only exist while the
//! session is actually authenticated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Current state of a relay session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has been started yet
    Idle,
    /// `initialize` was called and a session handle is being obtained
    Initializing,
    /// The provider issued a pairing code and is waiting for the device link
    AwaitingPairing { pairing_code: String },
    /// The remote peer authenticated; messages can flow
    Authenticated { peer_identity: String },
    /// The session ended (explicit disconnect or remote-reported disconnect)
    Disconnected,
    /// The session died from exhausted retries, expiry, or a timeout
    Failed,
}

impl SessionState {
    /// Check if the session is authenticated (can send/receive messages)
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    /// Check if the session is live (between `initialize` and teardown)
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionState::Initializing
                | SessionState::AwaitingPairing { .. }
                | SessionState::Authenticated { .. }
        )
    }

    /// Check if the session reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed)
    }

    /// The pairing code, present only while awaiting pairing
    pub fn pairing_code(&self) -> Option<&str> {
        match self {
            SessionState::AwaitingPairing { pairing_code } => Some(pairing_code),
            _ => None,
        }
    }

    /// The remote peer identity, present only while authenticated
    pub fn peer_identity(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { peer_identity } => Some(peer_identity),
            _ => None,
        }
    }

    /// Check whether a transition to `next` is allowed
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Initializing) => true,
            // A restored session may authenticate without a fresh pairing code
            (Initializing, AwaitingPairing { .. })
            | (Initializing, Authenticated { .. })
            | (Initializing, Disconnected)
            | (Initializing, Failed) => true,
            // The provider may rotate the pairing code before the link happens
            (AwaitingPairing { .. }, AwaitingPairing { .. })
            | (AwaitingPairing { .. }, Authenticated { .. })
            | (AwaitingPairing { .. }, Disconnected)
            | (AwaitingPairing { .. }, Failed) => true,
            (Authenticated { .. }, Disconnected) | (Authenticated { .. }, Failed) => true,
            // Terminal states can only be left through a fresh initialize
            (Disconnected, Initializing) | (Failed, Initializing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::AwaitingPairing { .. } => "awaiting_pairing",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Mutable session record owned by the relay manager.
///
/// Exactly one of these exists per manager; callers observe it through
/// [`SessionSnapshot`].
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub session_id: Option<String>,
    pub number_id: Option<String>,
    pub state: SessionState,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    /// Bumped on every `begin`; background tasks carry the epoch they were
    /// spawned under so a task outliving its lifecycle cannot touch the next
    pub epoch: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: None,
            number_id: None,
            state: SessionState::Idle,
            retry_count: 0,
            created_at: Utc::now(),
            epoch: 0,
        }
    }

    /// Apply a validated state transition, returning the previous state.
    pub fn transition(&mut self, next: SessionState) -> RelayResult<SessionState> {
        if !self.state.can_transition_to(&next) {
            tracing::warn!(
                from = %self.state,
                to = %next,
                "rejected invalid session state transition"
            );
            return Err(RelayError::internal(format!(
                "invalid session state transition: {} -> {}",
                self.state, next
            )));
        }
        let previous = std::mem::replace(&mut self.state, next);
        tracing::debug!(from = %previous, to = %self.state, "session state changed");
        Ok(previous)
    }

    /// Start a fresh lifecycle for `number_id`, returning the previous state.
    pub fn begin(&mut self, number_id: &str) -> RelayResult<SessionState> {
        let previous = self.transition(SessionState::Initializing)?;
        self.session_id = None;
        self.number_id = Some(number_id.to_string());
        self.retry_count = 0;
        self.created_at = Utc::now();
        self.epoch += 1;
        Ok(previous)
    }

    /// Reset for teardown: forget the session handle and retry budget, and
    /// demote a live state to Disconnected. Terminal states and Idle are
    /// preserved so callers can still observe why the session ended.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.retry_count = 0;
        if self.state.is_live() {
            let previous = std::mem::replace(&mut self.state, SessionState::Disconnected);
            tracing::debug!(from = %previous, "session demoted to disconnected during cleanup");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            number_id: self.number_id.clone(),
            state: self.state.clone(),
            pairing_code: self.state.pairing_code().map(str::to_string),
            peer_identity: self.state.peer_identity().map(str::to_string),
            retry_count: self.retry_count,
            created_at: self.created_at,
        }
    }
}

/// Read-only view of the session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Provider-issued session handle (if one was obtained)
    pub session_id: Option<String>,
    /// The number this session serves
    pub number_id: Option<String>,
    /// Current lifecycle state
    pub state: SessionState,
    /// Pairing code, present only while awaiting pairing
    pub pairing_code: Option<String>,
    /// Remote peer identity, present only while authenticated
    pub peer_identity: Option<String>,
    /// Consecutive transient status-poll failures so far
    pub retry_count: u32,
    /// When this lifecycle was started
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairing(code: &str) -> SessionState {
        SessionState::AwaitingPairing { pairing_code: code.to_string() }
    }

    fn authenticated(peer: &str) -> SessionState {
        SessionState::Authenticated { peer_identity: peer.to_string() }
    }

    #[test]
    fn happy_path_transitions_are_valid() {
        let mut session = Session::new();
        session.begin("num-1").expect("idle -> initializing");
        session.transition(pairing("AB12-CD34")).expect("pairing");
        session.transition(pairing("EF56-GH78")).expect("rotated pairing code");
        session.transition(authenticated("+15550001111")).expect("authenticated");
        assert!(session.state.is_authenticated());
        session.transition(SessionState::Disconnected).expect("disconnect");
        assert!(session.state.is_terminal());
    }

    #[test]
    fn authenticated_cannot_reauthenticate() {
        let mut session = Session::new();
        session.begin("num-1").unwrap();
        session.transition(authenticated("+15550001111")).unwrap();
        assert!(session.transition(authenticated("+15550002222")).is_err());
    }

    #[test]
    fn idle_cannot_jump_to_authenticated() {
        let mut session = Session::new();
        assert!(session.transition(authenticated("+15550001111")).is_err());
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn terminal_states_allow_reinitialize() {
        let mut session = Session::new();
        session.begin("num-1").unwrap();
        session.transition(SessionState::Failed).unwrap();
        session.begin("num-1").expect("failed -> initializing");
        assert_eq!(session.state, SessionState::Initializing);
        assert_eq!(session.retry_count, 0);
    }

    #[test]
    fn peer_identity_exists_only_while_authenticated() {
        let state = authenticated("+15550001111");
        assert_eq!(state.peer_identity(), Some("+15550001111"));
        assert_eq!(state.pairing_code(), None);

        let state = pairing("AB12-CD34");
        assert_eq!(state.peer_identity(), None);
        assert_eq!(state.pairing_code(), Some("AB12-CD34"));
    }

    #[test]
    fn reset_demotes_live_and_preserves_terminal() {
        let mut session = Session::new();
        session.begin("num-1").unwrap();
        session.session_id = Some("sess-1".into());
        session.retry_count = 2;
        session.reset();
        assert_eq!(session.state, SessionState::Disconnected);
        assert_eq!(session.session_id, None);
        assert_eq!(session.retry_count, 0);

        let mut failed = Session::new();
        failed.begin("num-1").unwrap();
        failed.transition(SessionState::Failed).unwrap();
        failed.reset();
        assert_eq!(failed.state, SessionState::Failed);

        let mut idle = Session::new();
        idle.reset();
        assert_eq!(idle.state, SessionState::Idle);
    }

    #[test]
    fn snapshot_reflects_state_payloads() {
        let mut session = Session::new();
        session.begin("num-1").unwrap();
        session.session_id = Some("sess-1".into());
        session.transition(pairing("AB12-CD34")).unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.number_id.as_deref(), Some("num-1"));
        assert_eq!(snapshot.pairing_code.as_deref(), Some("AB12-CD34"));
        assert_eq!(snapshot.peer_identity, None);
    }
}
