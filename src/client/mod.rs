//! Engine and remote operations.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Engine`] | Service object owning the connection |
//! | [`EngineBuilder`] | Fluent configuration builder |
//! | [`EngineConfig`] | Timings, limits and endpoint |
//! | [`Correlator`] | Request/response matching and throttling |
//! | [`ChatFeed`] | Chat message fan-out |
//! | [`SearchEvent`] | Continuous search stream item |
//! | [`SubscriberGuard`] | RAII consumer registration |
//! | [`ThumbnailCache`] | Thumbnail cache boundary |
//!
//! # Operations
//!
//! | Module | Operations |
//! |--------|------------|
//! | `chat` | `join_room`, `leave_room`, `send_chat_message`, `chat_messages` |
//! | `search` | `start_search`, `stop_search`, `search_events`, `active_searches` |
//! | `generation` | `generate_video`, `generate_caption`, `generate_thumbnail` |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for engine configuration.
pub mod builder;

/// Thumbnail cache boundary.
pub mod cache;

/// Chat membership and chat feed.
pub mod chat;

/// Engine configuration.
pub mod config;

/// Engine service object.
pub mod core;

/// Request/response correlation.
pub mod correlator;

/// Subscriber reference counting.
pub mod gate;

/// Generation operations.
pub mod generation;

/// Continuous search sessions.
pub mod search;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::EngineBuilder;
pub use cache::{MemoryCache, ThumbnailCache, thumbnail_key};
pub use chat::ChatFeed;
pub use config::{EngineConfig, ReconnectConfig, RequestTimeouts, RetryConfig, SearchConfig};
pub use core::{Disposal, Engine};
pub use correlator::Correlator;
pub use gate::{SubscriberGate, SubscriberGuard};
pub use search::{SearchEvent, SearchSessions, StopReason};
