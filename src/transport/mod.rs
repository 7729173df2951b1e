//! WebSocket transport layer.
//!
//! This module owns the single shared connection to the generation service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐                          ┌─────────────────┐
//! │  Engine (Rust)      │                          │  Generation     │
//! │                     │        WebSocket         │  Service        │
//! │  ConnectionManager  │◄────────────────────────►│                 │
//! │  → TransportSession │      ws:// or wss://     │                 │
//! └─────────────────────┘                          └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionManager::connect` - Open a session, start the heartbeat
//! 2. `TransportSession` - Send frames, hand inbound frames upward
//! 3. Session closes - State moves to `Disconnected` or `Error`
//! 4. `ReconnectPolicy` - Exponential backoff until success or exhaustion
//! 5. `ConnectionManager::shutdown` - Tear everything down
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `manager` | State machine, heartbeat, reconnection |
//! | `policy` | Backoff computation |
//! | `session` | WebSocket socket and event loop |
//! | `state` | Connection states and legal transitions |

// ============================================================================
// Submodules
// ============================================================================

/// Connection lifecycle management.
pub mod manager;

/// Reconnection backoff.
pub mod policy;

/// WebSocket session and event loop.
pub mod session;

/// Connection state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use manager::{Channel, ConnectionManager, ConnectionSettings, ManagerHooks};
pub use policy::ReconnectPolicy;
pub use session::{CloseReason, MessageHandler, TransportSession};
pub use state::ConnectionState;
