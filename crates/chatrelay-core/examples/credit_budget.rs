//! Credit budget example
//!
//! This example demonstrates:
//! - Prepaid credits gating outbound messages
//! - The auto-responder drawing from the same budget
//! - Topping the ledger up to resume sending
//!
//! Run with: cargo run --example credit_budget

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chatrelay_core::provider::SimulatedProvider;
use chatrelay_core::{AutoResponder, Message, RelayBuilder, RelayConfig, RelayError};

struct Greeter;

#[async_trait]
impl AutoResponder for Greeter {
    async fn reply_to(&self, message: &Message) -> Option<String> {
        Some(format!("auto-reply: got \"{}\"", message.text))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let provider = Arc::new(SimulatedProvider::default());
    let relay = RelayBuilder::new()
        .provider(provider.clone())
        .config(
            RelayConfig::new()
                .with_status_poll_interval(Duration::from_millis(200))
                .with_message_poll_interval(Duration::from_millis(400)),
        )
        .initial_credits(2)
        .auto_responder(Arc::new(Greeter))
        .build()?;

    println!("🚀 Starting a session with 2 credits...");
    let snapshot = relay.initialize("demo-number").await?;
    let session_id = snapshot
        .session_id
        .ok_or_else(|| anyhow::anyhow!("no session id assigned"))?;

    tokio::time::timeout(Duration::from_secs(10), async {
        while !relay.is_authenticated().await {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await?;
    println!("✅ Authenticated ({} credits)", relay.credit_balance());

    // Three inbound messages against a two-credit budget: the responder
    // answers the first two and runs dry on the third
    println!("\n📨 Burst of three inbound messages...");
    for text in ["first", "second", "third"] {
        provider.queue_inbound_text(&session_id, "+15551112222", text).await;
    }
    tokio::time::sleep(Duration::from_millis(900)).await;

    let stats = relay.stats().await;
    println!("   Automated replies: {}", stats.automated_replies);
    println!("   Credits left: {}", stats.credit_balance);

    // A manual send hits the same empty ledger
    match relay.send_message("+15551112222", "manual follow-up").await {
        Err(RelayError::InsufficientCredit) => {
            println!("🛑 Manual send refused: the ledger is empty");
        }
        other => println!("Unexpected outcome: {:?}", other),
    }

    // Top up and try again
    let balance = relay.add_credits(5);
    println!("\n💰 Topped up to {} credits", balance);
    let message_id = relay.send_message("+15551112222", "manual follow-up").await?;
    println!("📤 Sent {} ({} credits left)", message_id, relay.credit_balance());

    provider.queue_inbound_text(&session_id, "+15551112222", "one more").await;
    tokio::time::sleep(Duration::from_millis(900)).await;
    println!("🤖 Automated replies so far: {}", relay.stats().await.automated_replies);

    relay.disconnect().await?;
    println!("\n✨ Done");
    Ok(())
}
