//! Error types for the generation service client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use aitube_client::{Engine, Result};
//!
//! async fn example(engine: &Engine) -> Result<()> {
//!     let caption = engine.generate_caption("Title", "Description").await?;
//!     println!("{caption}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::ReconnectExhausted`] |
//! | Lifecycle | [`Error::Disposed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Server`] |
//! | Requests | [`Error::RequestTimeout`], [`Error::DuplicateRequest`], [`Error::RetryExhausted`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by [`EngineBuilder::build`](crate::EngineBuilder::build) when a
    /// setting is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed while a request was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Automatic reconnection gave up.
    #[error("Max reconnection attempts reached ({attempts})")]
    ReconnectExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The engine has been disposed.
    #[error("Engine disposed")]
    Disposed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed message or missing required field.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The server answered with `success: false`.
    #[error("Server error: {message}")]
    Server {
        /// Message supplied by the server.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Request timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A request with the same ID is already in flight.
    #[error("Duplicate request: {request_id}")]
    DuplicateRequest {
        /// The conflicting request ID.
        request_id: RequestId,
    },

    /// Every attempt of a retried operation failed.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Operation name.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error of the final attempt.
        #[source]
        source: Box<Error>,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket handshake or protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a reconnect exhausted error.
    #[inline]
    pub fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted { attempts }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a server-reported error.
    #[inline]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a duplicate request error.
    #[inline]
    pub fn duplicate_request(request_id: RequestId) -> Self {
        Self::DuplicateRequest { request_id }
    }

    /// Creates a retry exhausted error wrapping the final attempt's error.
    #[inline]
    pub fn retry_exhausted(operation: impl Into<String>, attempts: u32, source: Error) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
            source: Box::new(source),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::ReconnectExhausted { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
                | Self::RequestTimeout { .. }
                | Self::Server { .. }
                | Self::Protocol { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_reconnect_exhausted_display() {
        let err = Error::reconnect_exhausted(5);
        assert!(
            err.to_string()
                .to_lowercase()
                .contains("max reconnection attempts reached")
        );
    }

    #[test]
    fn test_server_error_is_verbatim() {
        let err = Error::server("No search query provided");
        assert_eq!(err.to_string(), "Server error: No search query provided");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(RequestId::new("abc"), 100);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::reconnect_exhausted(3).is_connection_error());
        assert!(!Error::Disposed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::server("busy").is_recoverable());
        assert!(!Error::Disposed.is_recoverable());
        assert!(!Error::duplicate_request(RequestId::new("x")).is_recoverable());
    }

    #[test]
    fn test_retry_exhausted_keeps_source() {
        let err = Error::retry_exhausted("generate_thumbnail", 3, Error::server("boom"));
        assert_eq!(
            err.to_string(),
            "generate_thumbnail failed after 3 attempts: Server error: boom"
        );
        let Error::RetryExhausted { source, .. } = err else {
            panic!("expected RetryExhausted");
        };
        assert!(matches!(*source, Error::Server { .. }));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_websocket_error() {
        let err: Error = WsError::ConnectionClosed.into();
        assert!(matches!(err, Error::WebSocket(_)));
        assert!(err.is_connection_error());
        assert!(err.is_recoverable());
    }
}
