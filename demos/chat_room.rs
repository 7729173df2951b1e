//! Chat room demonstration.
//!
//! Demonstrates:
//! - Joining a room and printing its history
//! - Posting a message
//! - Printing live messages until Ctrl+C
//! - Leaving and disposing with a subscriber guard
//!
//! Usage:
//!   cargo run --example chat_room -- <video_id> [username]

mod common;

// ============================================================================
// Imports
// ============================================================================

use aitube_client::{ChatMessage, Disposal, Engine, Result};
use tokio::sync::broadcast::error::RecvError;

use common::Args;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Chat Room ===\n");

    let video_id = args.rest.first().cloned().unwrap_or_else(|| "demo".to_string());
    let username = args.rest.get(1).cloned().unwrap_or_else(|| "rustacean".to_string());

    let engine = Engine::builder().endpoint(&args.endpoint).build()?;
    let guard = engine.subscribe("chat_room");

    let mut feed = engine.chat_messages();

    println!("[1] Joining room {video_id}...");
    let history = engine.join_room(&video_id).await?;
    println!("    ✓ Joined, {} messages of history", history.len());
    for message in &history {
        println!("    <{}> {}", message.username, message.content);
        // History is also delivered on the feed
        let _ = feed.recv().await;
    }

    println!("\n[2] Posting a message...");
    let stored = engine
        .send_chat_message(ChatMessage::new(&username, &username, "hello from Rust", &video_id))
        .await?;
    println!("    ✓ Stored at {}", stored.timestamp);

    println!("\n[3] Live messages (Ctrl+C to exit)...");
    loop {
        tokio::select! {
            message = feed.recv() => match message {
                Ok(message) => println!("    <{}> {}", message.username, message.content),
                Err(RecvError::Lagged(skipped)) => println!("    ({skipped} messages skipped)"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.leave_room(&video_id).await;

    assert!(matches!(engine.dispose().await, Disposal::Deferred { .. }));
    drop(guard);
    assert_eq!(engine.dispose().await, Disposal::Completed);

    println!("\n=== Done ===");
    Ok(())
}
