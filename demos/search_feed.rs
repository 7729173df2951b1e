//! Continuous search demonstration.
//!
//! Demonstrates:
//! - Building an engine
//! - Watching connection status
//! - Streaming search results until the session ends
//!
//! Usage:
//!   cargo run --example search_feed -- "cats in the snow"
//!   cargo run --example search_feed -- --endpoint wss://host/ws --debug "query"

mod common;

// ============================================================================
// Imports
// ============================================================================

use aitube_client::{Engine, Result, SearchConfig, SearchEvent};

use common::Args;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_QUERY: &str = "a cat playing piano";
const MAX_RESULTS: u32 = 5;

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
    println!("=== Search Feed ===\n");

    let query = args
        .rest
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());

    let engine = Engine::builder()
        .endpoint(&args.endpoint)
        .search(SearchConfig::default().with_max_results(MAX_RESULTS))
        .build()?;

    let mut status = engine.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            println!("    [status] {}", *status.borrow_and_update());
        }
    });

    println!("[1] Connecting to {}...", args.endpoint);
    engine.connect().await?;
    println!("    ✓ Connected\n");

    println!("[2] Searching for \"{query}\"...");
    let mut events = engine.search_events();
    engine.start_search(query.as_str());

    while let Ok(event) = events.recv().await {
        match event {
            SearchEvent::Result { index, result, .. } => {
                println!("    #{index} {} ({})", result.title, result.id);
            }
            SearchEvent::Finished {
                reason,
                result_count,
                ..
            } => {
                println!("    ✓ Finished: {reason:?}, {result_count} results\n");
                break;
            }
        }
    }

    engine.dispose().await;
    println!("=== Done ===");
    Ok(())
}
