//! WebSocket protocol message types.
//!
//! This module defines the JSON frames exchanged with the generation service.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `OutboundRequest` | Client → Service | Action request |
//! | `InboundMessage` | Service → Client | Response or broadcast |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Action tags |
//! | `chat` | Chat message payload |
//! | `request` | Envelope types |
//! | `search` | Search result payload |
//! | `video` | Video generation payload |

// ============================================================================
// Submodules
// ============================================================================

/// Action tags.
pub mod action;

/// Chat message payload and validation.
pub mod chat;

/// Outbound request and inbound message envelopes.
pub mod request;

/// Search result payload.
pub mod search;

/// Video generation payload.
pub mod video;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::Action;
pub use chat::ChatMessage;
pub use request::{InboundMessage, OutboundRequest};
pub use search::SearchResult;
pub use video::{VideoOptions, VideoRequest};
