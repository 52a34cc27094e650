//! Integration tests for outbound sending and the credit ledger
//!
//! Covers precondition ordering, spend-on-confirmation, top-ups, and
//! concurrent sends against a shared balance.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::provider::ProviderError;
use chatrelay_core::{MessageDirection, MessageOrigin, RelayError, RelayEvent};

use common::*;

const PEER: &str = "+15550004444";

#[tokio::test]
async fn test_each_confirmed_send_spends_exactly_one_credit() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("chatrelay_core=debug")
        .with_test_writer()
        .try_init();

    let provider = Arc::new(ScriptedProvider::new());
    let (relay, mut events) = ready_relay(provider.clone(), 3).await;

    relay.send_message(PEER, "hi1").await.expect("Failed to send hi1");
    relay.send_message(PEER, "hi2").await.expect("Failed to send hi2");
    assert_eq!(relay.credit_balance(), 1);

    let window = collect_for(&mut events, Duration::from_millis(150)).await;
    let sent: Vec<&str> = window
        .iter()
        .filter_map(|e| match e {
            RelayEvent::MessageSent { message, .. } => Some(message.text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec!["hi1", "hi2"]);

    let conversation = relay.conversation(PEER).expect("Failed to find the conversation");
    assert_eq!(conversation.messages.len(), 2);
    assert!(conversation
        .messages
        .iter()
        .all(|m| m.direction == MessageDirection::Outbound && m.origin == MessageOrigin::Human));
    assert_eq!(conversation.unread_count, 0, "outbound messages are not unread");

    let stats = relay.stats().await;
    assert_eq!(stats.messages_sent, 2);
    assert_eq!(stats.credit_balance, 1);
    assert_eq!(provider.count_sends(), 2);

    relay.disconnect().await.expect("Failed to disconnect");
}

#[tokio::test]
async fn test_a_rejected_send_spends_nothing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("chatrelay_core=debug")
        .with_test_writer()
        .try_init();

    let provider = Arc::new(ScriptedProvider::new());
    let (relay, mut events) = ready_relay(provider.clone(), 2).await;

    provider.script_send(Err(ProviderError::Rejected {
        reason: "recipient opted out".to_string(),
    }));

    let result = relay.send_message(PEER, "nope").await;
    assert!(matches!(result, Err(RelayError::Provider(ProviderError::Rejected { .. }))));

    // No spend, no record, no event for the failed attempt
    assert_eq!(relay.credit_balance(), 2);
    assert!(relay.conversation(PEER).is_none());
    let window = collect_for(&mut events, Duration::from_millis(150)).await;
    assert!(!window.iter().any(|e| matches!(e, RelayEvent::MessageSent { .. })));
    assert_eq!(provider.count_sends(), 1);
    assert_eq!(relay.stats().await.messages_sent, 0);

    relay.disconnect().await.expect("Failed to disconnect");
}

#[tokio::test]
async fn test_an_empty_ledger_refuses_before_the_provider_is_contacted() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("chatrelay_core=debug")
        .with_test_writer()
        .try_init();

    let provider = Arc::new(ScriptedProvider::new());
    let (relay, _events) = ready_relay(provider.clone(), 0).await;

    let result = relay.send_message(PEER, "hello").await;
    assert!(matches!(result, Err(RelayError::InsufficientCredit)));
    assert_eq!(provider.count_sends(), 0);
    assert!(relay.conversation(PEER).is_none());

    relay.disconnect().await.expect("Failed to disconnect");
}

#[tokio::test]
async fn test_connectivity_is_checked_before_credit() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("chatrelay_core=debug")
        .with_test_writer()
        .try_init();

    // Never initialized, and also broke: the connectivity refusal wins
    let provider = Arc::new(ScriptedProvider::new());
    let relay = build_relay(provider.clone(), 0);

    let result = relay.send_message(PEER, "hello").await;
    assert!(matches!(result, Err(RelayError::NotConnected)));
    assert_eq!(provider.count_sends(), 0);

    // Same refusal once a live session has ended
    let (relay, _events) = ready_relay(Arc::new(ScriptedProvider::new()), 5).await;
    relay.disconnect().await.expect("Failed to disconnect");
    let result = relay.send_message(PEER, "hello").await;
    assert!(matches!(result, Err(RelayError::NotConnected)));
    assert_eq!(relay.credit_balance(), 5);
}

#[tokio::test]
async fn test_granting_credit_unblocks_sending() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("chatrelay_core=debug")
        .with_test_writer()
        .try_init();

    let provider = Arc::new(ScriptedProvider::new());
    let (relay, _events) = ready_relay(provider.clone(), 0).await;

    let result = relay.send_message(PEER, "hello").await;
    assert!(matches!(result, Err(RelayError::InsufficientCredit)));

    assert_eq!(relay.add_credits(2), 2);
    relay.send_message(PEER, "hello").await.expect("Failed to send after top-up");
    assert_eq!(relay.credit_balance(), 1);
    assert_eq!(provider.count_sends(), 1);

    relay.disconnect().await.expect("Failed to disconnect");
}

#[tokio::test]
async fn test_concurrent_sends_never_overspend() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("chatrelay_core=debug")
        .with_test_writer()
        .try_init();

    let provider = Arc::new(ScriptedProvider::new());
    let (relay, _events) = ready_relay(provider.clone(), 2).await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let relay = relay.clone();
        handles.push(tokio::spawn(async move {
            relay.send_message(PEER, &format!("c{}", i)).await
        }));
    }

    let mut accepted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.expect("Failed to join send task") {
            Ok(_) => accepted += 1,
            Err(RelayError::InsufficientCredit) => refused += 1,
            Err(e) => panic!("unexpected send error: {}", e),
        }
    }

    assert_eq!(accepted, 2);
    assert_eq!(refused, 2);
    assert_eq!(relay.credit_balance(), 0);
    assert_eq!(provider.count_sends(), 2);
    assert_eq!(relay.stats().await.messages_sent, 2);

    relay.disconnect().await.expect("Failed to disconnect");
}
