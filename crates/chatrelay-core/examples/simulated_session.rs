//! Simulated Session Example
//!
//! This example walks a relay through its full lifecycle against the
//! in-memory simulated provider: initialization, pairing, authentication,
//! inbound message relay, an outbound send, and teardown.
//!
//! Run with: cargo run --example simulated_session

use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::provider::SimulatedProvider;
use chatrelay_core::{MessageDirection, RelayBuilder, RelayConfig, RelayEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for better output
    tracing_subscriber::fmt::init();

    println!("📡 Simulated Session Example");
    println!("============================\n");

    // The simulated provider issues a pairing code on the first status
    // poll and authenticates on the third
    let provider = Arc::new(SimulatedProvider::default());

    let config = RelayConfig::new()
        .with_status_poll_interval(Duration::from_millis(250))
        .with_message_poll_interval(Duration::from_millis(500));

    let relay = RelayBuilder::new()
        .provider(provider.clone())
        .config(config)
        .initial_credits(3)
        .build()?;

    // Print every event as it happens
    let mut events = relay.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RelayEvent::StatusChanged { info, .. } => {
                    println!("🔄 status: {}", info.new_state);
                }
                RelayEvent::PairingCode { info, .. } => {
                    println!("📱 pairing code: {} (scan to link)", info.pairing_code);
                }
                RelayEvent::Authenticated { info, .. } => {
                    println!("✅ authenticated as {}", info.peer_identity);
                }
                RelayEvent::Ready { .. } => println!("🚀 relay is ready"),
                RelayEvent::MessageReceived { message, .. } => {
                    println!("💬 {} says: {}", message.peer_id, message.text);
                }
                RelayEvent::MessageSent { message, .. } => {
                    println!("📤 sent to {}: {}", message.peer_id, message.text);
                }
                RelayEvent::Heartbeat { info, .. } => {
                    if let Some(battery) = info.telemetry.battery {
                        println!("🔋 device battery at {}%", battery);
                    }
                }
                RelayEvent::Disconnected { .. } => println!("👋 session ended"),
                RelayEvent::Error { error, .. } => println!("❌ error: {}", error),
            }
        }
    });

    println!("🚀 Initializing session...");
    let snapshot = relay.initialize("demo-number").await?;
    let session_id = snapshot.session_id.ok_or("no session id assigned")?;
    println!("   Session ID: {}\n", session_id);

    // Let the status poller walk the session to authenticated
    tokio::time::timeout(Duration::from_secs(10), async {
        while !relay.is_authenticated().await {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await?;

    // Drop two messages into the provider; the message poller relays them
    println!("\n📨 Queueing inbound messages on the provider...");
    provider.queue_inbound_text(&session_id, "+15557654321", "hello there").await;
    provider.queue_inbound_text(&session_id, "+15557654321", "anyone home?").await;
    tokio::time::sleep(Duration::from_millis(800)).await;

    // Reply, spending one credit
    println!("\n✍️  Sending a reply ({} credits available)...", relay.credit_balance());
    let message_id = relay.send_message("+15557654321", "hi! loud and clear").await?;
    println!("   Confirmed as {} ({} credits left)", message_id, relay.credit_balance());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Show the transcript the relay has accumulated
    println!("\n📒 CONVERSATIONS:");
    for conversation in relay.conversations() {
        println!("  {} ({} unread)", conversation.peer_id, conversation.unread_count);
        for message in &conversation.messages {
            let tag = match message.direction {
                MessageDirection::Inbound => "in ",
                MessageDirection::Outbound => "out",
            };
            println!("     [{}] {}", tag, message.text);
        }
    }

    let stats = relay.stats().await;
    println!("\n📊 STATS:");
    println!("   State: {}", stats.state);
    println!("   Messages received: {}", stats.messages_received);
    println!("   Messages sent: {}", stats.messages_sent);
    println!("   Credits left: {}", stats.credit_balance);

    println!("\n🔌 Disconnecting...");
    relay.disconnect().await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("\n✨ Done!");
    Ok(())
}
