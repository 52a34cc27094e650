//! Send path and credit accounting
//!
//! Credits are a proxy for confirmed deliveries, not attempts: the balance
//! is checked before the provider is contacted and decremented exactly once
//! per confirmed send. A refused precondition or a failed remote call never
//! touches the ledger or the conversation table.

use async_trait::async_trait;

use crate::conversation::{Message, MessageOrigin};
use crate::error::{RelayError, RelayResult};
use crate::events::{EventPriority, RelayEvent};

/// External collaborator that may answer inbound messages.
///
/// Consulted by the message poller for every inbound message; a `Some`
/// reply is sent back through the regular send path with automated origin,
/// subject to the same preconditions and credit accounting.
#[async_trait]
pub trait AutoResponder: Send + Sync {
    /// A reply to send back, or `None` to stay silent
    async fn reply_to(&self, message: &Message) -> Option<String>;
}

impl super::manager::RelayManager {
    /// Send a message to a peer, spending one credit on confirmed success.
    ///
    /// Preconditions are checked in order before any remote attempt:
    /// an authenticated session with a handle ([`RelayError::NotConnected`]
    /// otherwise), then a positive credit balance
    /// ([`RelayError::InsufficientCredit`] otherwise).
    ///
    /// Returns the provider-issued message identifier.
    pub async fn send_message(&self, peer_id: &str, text: &str) -> RelayResult<String> {
        self.send_with_origin(peer_id, text, MessageOrigin::Human).await
    }

    /// Send an automated reply through the same path and preconditions
    pub(crate) async fn send_automated(&self, peer_id: &str, text: &str) -> RelayResult<String> {
        self.send_with_origin(peer_id, text, MessageOrigin::Automated).await
    }

    async fn send_with_origin(
        &self,
        peer_id: &str,
        text: &str,
        origin: MessageOrigin,
    ) -> RelayResult<String> {
        // The session lock spans the precondition checks, the remote call,
        // and the ledger commit, so concurrent sends cannot slip past the
        // credit gate together
        let session = self.session.lock().await;
        if !session.state.is_authenticated() {
            return Err(RelayError::NotConnected);
        }
        let session_id = match &session.session_id {
            Some(id) => id.clone(),
            None => return Err(RelayError::NotConnected),
        };
        if !self.credits.has_credit() {
            return Err(RelayError::InsufficientCredit);
        }

        let message_id = self.provider.send_message(&session_id, peer_id, text).await?;

        // Confirmed success: record, spend exactly one credit, announce
        let message = Message::outbound(message_id.clone(), peer_id, text, origin);
        self.conversations.upsert(message.clone(), None);
        let balance = self.credits.commit_spend();
        drop(session);

        {
            let mut stats = self.stats.lock().await;
            stats.messages_sent += 1;
            if origin == MessageOrigin::Automated {
                stats.automated_replies += 1;
            }
        }

        tracing::info!(peer_id = %peer_id, message_id = %message_id, balance, "message sent");
        self.emit(RelayEvent::MessageSent {
            message,
            priority: EventPriority::Normal,
        })
        .await;

        Ok(message_id)
    }
}
