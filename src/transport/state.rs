//! Connection state machine.
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ Disconnected │◄───────────────┐
//!                 └──────┬───────┘                │ socket closed
//!                        │ connect()              │
//!                 ┌──────▼───────┐  success ┌─────┴─────┐
//!        ┌───────►│  Connecting  ├─────────►│ Connected │
//!        │        └──────┬───────┘          └─────┬─────┘
//!        │               │ failure                │ socket error
//!        │        ┌──────▼───────┐                │
//!        │        │    Error     │◄───────────────┘
//!        │        └──────┬───────┘
//!        │               │ policy allows another attempt
//!        │        ┌──────▼───────┐
//!        └────────┤ Reconnecting ├──► Error (attempts exhausted, terminal)
//!                 └──────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Current state of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket, nothing scheduled.
    #[default]
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// Socket open, heartbeat running.
    Connected,
    /// Waiting out the backoff before the next attempt.
    Reconnecting,
    /// Last attempt failed, or reconnection gave up.
    Error,
}

impl ConnectionState {
    /// Returns `true` if `next` is a legal successor of `self`.
    ///
    /// Any state may fall back to `Disconnected` on teardown.
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::{Connected, Connecting, Disconnected, Error, Reconnecting};

        if self == next {
            return false;
        }

        match (self, next) {
            (_, Disconnected) => true,
            (Disconnected | Error | Reconnecting, Connecting) => true,
            (Connecting, Connected | Error) => true,
            (Connected, Error) => true,
            (Disconnected | Error, Reconnecting) => true,
            (Reconnecting, Error) => true,
            _ => false,
        }
    }

    /// Returns the lowercase name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
