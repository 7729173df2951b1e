//! AI Tube client - connection engine for the AI Tube generation service.
//!
//! This library keeps one persistent WebSocket connection to the service and
//! multiplexes searches, generation requests and chat over it.
//!
//! # Architecture
//!
//! The engine is layered, leaves first:
//!
//! - **Transport**: one socket, one event-loop task, heartbeat and
//!   exponential reconnection
//! - **Correlator**: request ids, pending map, timeouts, throttling
//! - **Operations**: chat rooms, continuous search, generation
//! - **Engine**: service object with a subscriber-gated teardown
//!
//! Key design principles:
//!
//! - Every request resolves exactly once (response, timeout, or bulk failure)
//! - Malformed inbound messages are logged and dropped, never fatal
//! - Results and chat messages are pushed through broadcast streams
//!
//! # Quick Start
//!
//! ```no_run
//! use aitube_client::{Engine, Result, SearchEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = Engine::builder()
//!         .endpoint("wss://aitube.example/ws")
//!         .build()?;
//!
//!     let mut events = engine.search_events();
//!     engine.start_search("cats playing in the snow");
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             SearchEvent::Result { result, .. } => println!("{}", result.title),
//!             SearchEvent::Finished { .. } => break,
//!         }
//!     }
//!
//!     engine.dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Engine`], configuration and operations |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket message types |
//! | [`transport`] | Connection lifecycle |

// ============================================================================
// Modules
// ============================================================================

/// Engine, configuration and remote operations.
///
/// Use [`Engine::builder()`] to create a configured engine.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers keep request and subscriber ids apart.
pub mod identifiers;

/// WebSocket protocol message types.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connection state machine, heartbeat and reconnection.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Engine types
pub use client::{
    ChatFeed, Disposal, Engine, EngineBuilder, EngineConfig, MemoryCache, ReconnectConfig,
    RequestTimeouts, RetryConfig, SearchConfig, SearchEvent, StopReason, SubscriberGuard,
    ThumbnailCache,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, SubscriberId};

// Protocol types
pub use protocol::{
    Action, ChatMessage, InboundMessage, OutboundRequest, SearchResult, VideoOptions,
    VideoRequest,
};

// Transport types
pub use transport::ConnectionState;
