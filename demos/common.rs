//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Endpoint used when `--endpoint` is not given.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8080/ws";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub endpoint: String,
    /// Positional arguments after the flags.
    pub rest: Vec<String>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let mut debug = false;
        let mut endpoint = DEFAULT_ENDPOINT.to_string();
        let mut rest = Vec::new();

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--debug" => debug = true,
                "--endpoint" => {
                    if let Some(value) = args.next() {
                        endpoint = value;
                    }
                }
                _ => rest.push(arg),
            }
        }

        Self {
            debug,
            endpoint,
            rest,
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "aitube_client=debug"
    } else {
        "aitube_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
