//! Deterministic in-memory provider
//!
//! Walks each session through pairing and authentication on a fixed poll
//! schedule, with an inbound queue the caller can feed. Useful for tests,
//! examples, and development without a gateway.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::Mutex;

use async_trait::async_trait;

use super::{
    InboundMessage, MessageBatch, MessagingProvider, ProviderError, ProviderResult,
    SessionStatus, Telemetry,
};

/// Schedule knobs for the simulated pairing walk
#[derive(Debug, Clone)]
pub struct SimulatedProviderConfig {
    /// Status polls before a pairing code appears
    pub polls_until_pairing: u32,
    /// Status polls before the session authenticates
    pub polls_until_authenticated: u32,
    /// Peer identity reported on authentication
    pub peer_identity: String,
    /// Attach telemetry to every message poll
    pub report_telemetry: bool,
}

impl Default for SimulatedProviderConfig {
    fn default() -> Self {
        Self {
            polls_until_pairing: 1,
            polls_until_authenticated: 3,
            peer_identity: "+15550000001".to_string(),
            report_telemetry: true,
        }
    }
}

#[derive(Debug)]
struct SimSession {
    number_id: String,
    status_polls: u32,
    pairing_code: Option<String>,
    authenticated: bool,
    inbound: VecDeque<InboundMessage>,
}

/// A message accepted by [`SimulatedProvider::send_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub session_id: String,
    pub peer_id: String,
    pub text: String,
}

/// Deterministic in-memory implementation of [`MessagingProvider`]
pub struct SimulatedProvider {
    config: SimulatedProviderConfig,
    sessions: Mutex<HashMap<String, SimSession>>,
    sent: Mutex<Vec<SentMessage>>,
}

impl SimulatedProvider {
    /// Create a provider with the given schedule
    pub fn new(config: SimulatedProviderConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queue an inbound message for the next message poll. Returns false if
    /// the session is unknown.
    pub async fn queue_inbound(&self, session_id: &str, message: InboundMessage) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.inbound.push_back(message);
                true
            }
            None => false,
        }
    }

    /// Convenience wrapper around [`queue_inbound`](Self::queue_inbound) for
    /// a plain text message.
    pub async fn queue_inbound_text(&self, session_id: &str, peer_id: &str, text: &str) -> bool {
        let message = InboundMessage {
            id: Some(format!("sim-msg-{}", random_token(10))),
            peer_id: peer_id.to_string(),
            display_name: None,
            text: text.to_string(),
            timestamp: Some(Utc::now()),
        };
        self.queue_inbound(session_id, message).await
    }

    /// Everything accepted through `send_message`, in order
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new(SimulatedProviderConfig::default())
    }
}

#[async_trait]
impl MessagingProvider for SimulatedProvider {
    async fn initiate_session(&self, number_id: &str) -> ProviderResult<String> {
        let session_id = format!("sim-{}", random_token(12).to_ascii_lowercase());
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            session_id.clone(),
            SimSession {
                number_id: number_id.to_string(),
                status_polls: 0,
                pairing_code: None,
                authenticated: false,
                inbound: VecDeque::new(),
            },
        );
        tracing::debug!(number_id, session_id = %session_id, "simulated session created");
        Ok(session_id)
    }

    async fn poll_status(&self, session_id: &str) -> ProviderResult<SessionStatus> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ProviderError::SessionNotFound { session_id: session_id.to_string() })?;

        session.status_polls += 1;
        let mut status = SessionStatus::default();

        if session.status_polls >= self.config.polls_until_authenticated {
            session.authenticated = true;
            status.authenticated = true;
            status.peer_identity = Some(self.config.peer_identity.clone());
            status.session_payload = Some(serde_json::json!({
                "numberId": session.number_id,
                "restored": false,
            }));
        } else if session.status_polls >= self.config.polls_until_pairing {
            let code = session
                .pairing_code
                .get_or_insert_with(generate_pairing_code)
                .clone();
            status.pairing_code = Some(code);
        }

        Ok(status)
    }

    async fn poll_messages(&self, session_id: &str) -> ProviderResult<MessageBatch> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ProviderError::SessionNotFound { session_id: session_id.to_string() })?;
        if !session.authenticated {
            return Err(ProviderError::NotAuthenticated);
        }

        let messages: Vec<InboundMessage> = session.inbound.drain(..).collect();
        let telemetry = if self.config.report_telemetry {
            Some(Telemetry { battery: Some(93), plugged: Some(true) })
        } else {
            None
        };
        Ok(MessageBatch { messages, telemetry })
    }

    async fn send_message(
        &self,
        session_id: &str,
        peer_id: &str,
        text: &str,
    ) -> ProviderResult<String> {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| ProviderError::SessionNotFound { session_id: session_id.to_string() })?;
        if !session.authenticated {
            return Err(ProviderError::NotAuthenticated);
        }
        drop(sessions);

        let message_id = format!("sim-msg-{}", random_token(10));
        self.sent.lock().await.push(SentMessage {
            session_id: session_id.to_string(),
            peer_id: peer_id.to_string(),
            text: text.to_string(),
        });
        Ok(message_id)
    }

    async fn terminate_session(&self, session_id: &str) -> ProviderResult<()> {
        let removed = self.sessions.lock().await.remove(session_id).is_some();
        tracing::debug!(session_id, removed, "simulated session terminated");
        Ok(())
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn generate_pairing_code() -> String {
    let raw = random_token(8).to_ascii_uppercase();
    format!("{}-{}", &raw[..4], &raw[4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn walks_pairing_then_authentication() {
        let provider = SimulatedProvider::new(SimulatedProviderConfig {
            polls_until_pairing: 1,
            polls_until_authenticated: 2,
            ..Default::default()
        });
        let session_id = provider.initiate_session("num-1").await.unwrap();

        let first = provider.poll_status(&session_id).await.unwrap();
        assert!(first.pairing_code.is_some());
        assert!(!first.authenticated);

        let second = provider.poll_status(&session_id).await.unwrap();
        assert!(second.authenticated);
        assert_eq!(second.peer_identity.as_deref(), Some("+15550000001"));
    }

    #[tokio::test]
    async fn messages_require_authentication_and_drain_once() {
        let provider = SimulatedProvider::new(SimulatedProviderConfig {
            polls_until_authenticated: 1,
            ..Default::default()
        });
        let session_id = provider.initiate_session("num-1").await.unwrap();

        assert!(matches!(
            provider.poll_messages(&session_id).await,
            Err(ProviderError::NotAuthenticated)
        ));

        provider.poll_status(&session_id).await.unwrap();
        provider.queue_inbound_text(&session_id, "+1555", "hi").await;

        let batch = provider.poll_messages(&session_id).await.unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert!(batch.telemetry.is_some());

        let again = provider.poll_messages(&session_id).await.unwrap();
        assert!(again.messages.is_empty());
    }

    #[tokio::test]
    async fn terminate_forgets_the_session() {
        let provider = SimulatedProvider::default();
        let session_id = provider.initiate_session("num-1").await.unwrap();
        provider.terminate_session(&session_id).await.unwrap();
        assert!(matches!(
            provider.poll_status(&session_id).await,
            Err(ProviderError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn pairing_codes_have_the_linking_shape() {
        let code = generate_pairing_code();
        assert_eq!(code.len(), 9);
        assert_eq!(&code[4..5], "-");
    }
}
