//! Conversation and message tracking
//!
//! In-memory table of conversations keyed by the remote peer identifier.
//! Each conversation holds an ordered message list, an unread counter, and a
//! last-activity timestamp. Read accessors return defensive copies; mutating
//! a returned value never affects the store.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Direction of a message (from the CRM's perspective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDirection {
    /// Received from the remote peer
    Inbound,
    /// Sent by this manager
    Outbound,
}

/// Who produced an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageOrigin {
    /// A person typed it (or it arrived from a person)
    Human,
    /// An attached auto-responder generated it
    Automated,
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Outbound, confirmed accepted by the provider
    Sent,
    /// Outbound, confirmed delivered to the peer (receipt-driven)
    Delivered,
    /// Inbound, received from the peer
    Received,
}

/// A single immutable message record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Provider-issued or locally generated identifier
    pub id: String,
    /// Remote peer this message belongs to
    pub peer_id: String,
    /// Message body
    pub text: String,
    /// When the message was sent/received
    pub timestamp: DateTime<Utc>,
    /// Inbound or outbound
    pub direction: MessageDirection,
    /// Human or automated origin
    pub origin: MessageOrigin,
    /// Delivery status
    pub status: MessageStatus,
}

impl Message {
    /// Build an inbound message record
    pub fn inbound(
        id: impl Into<String>,
        peer_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            peer_id: peer_id.into(),
            text: text.into(),
            timestamp,
            direction: MessageDirection::Inbound,
            origin: MessageOrigin::Human,
            status: MessageStatus::Received,
        }
    }

    /// Build an outbound message record with confirmed-sent status
    pub fn outbound(
        id: impl Into<String>,
        peer_id: impl Into<String>,
        text: impl Into<String>,
        origin: MessageOrigin,
    ) -> Self {
        Self {
            id: id.into(),
            peer_id: peer_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
            direction: MessageDirection::Outbound,
            origin,
            status: MessageStatus::Sent,
        }
    }
}

/// A conversation with one remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Remote peer identifier
    pub peer_id: String,
    /// Display name of the peer (if the provider supplied one)
    pub display_name: Option<String>,
    /// Messages in arrival/send order
    pub messages: Vec<Message>,
    /// Inbound messages not yet marked read
    pub unread_count: u32,
    /// Timestamp of the most recent message
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    fn new(peer_id: &str) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            display_name: None,
            messages: Vec::new(),
            unread_count: 0,
            last_activity_at: Utc::now(),
        }
    }

    /// The most recent message, if any
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// In-memory conversation table, safe for concurrent use
pub struct ConversationStore {
    conversations: DashMap<String, Conversation>,
}

impl ConversationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self { conversations: DashMap::new() }
    }

    /// Append a message to its conversation, creating the conversation on
    /// first contact. Inbound messages bump the unread counter.
    pub fn upsert(&self, message: Message, display_name: Option<&str>) {
        let mut conversation = self
            .conversations
            .entry(message.peer_id.clone())
            .or_insert_with(|| Conversation::new(&message.peer_id));

        if conversation.display_name.is_none() {
            if let Some(name) = display_name {
                conversation.display_name = Some(name.to_string());
            }
        }
        if message.direction == MessageDirection::Inbound {
            conversation.unread_count += 1;
        }
        conversation.last_activity_at = message.timestamp;
        conversation.messages.push(message);
    }

    /// Zero the unread counter for a peer. Returns false if the peer is
    /// unknown.
    pub fn mark_read(&self, peer_id: &str) -> bool {
        match self.conversations.get_mut(peer_id) {
            Some(mut conversation) => {
                conversation.unread_count = 0;
                true
            }
            None => false,
        }
    }

    /// A copy of one conversation
    pub fn get(&self, peer_id: &str) -> Option<Conversation> {
        self.conversations.get(peer_id).map(|entry| entry.value().clone())
    }

    /// Copies of all conversations, most recently active first
    pub fn list(&self) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        conversations.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        conversations
    }

    /// Number of conversations tracked
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// True when no conversation exists yet
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
