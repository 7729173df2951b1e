//! Engine configuration.
//!
//! Every value has a default built from the constants below, and each
//! group can be adjusted with `with_*` methods.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use aitube_client::{EngineConfig, SearchConfig};
//!
//! let config = EngineConfig::new(url)
//!     .with_heartbeat_interval(Duration::from_secs(15))
//!     .with_search(SearchConfig::default().with_max_results(4));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::protocol::Action;
use crate::transport::ConnectionSettings;

// ============================================================================
// Constants
// ============================================================================

/// Keepalive period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum spacing between transmitted requests.
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// WebSocket handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnect backoff base.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Results per search session.
pub const DEFAULT_SEARCH_MAX_RESULTS: u32 = 10;

/// Consecutive search failures before giving up.
pub const DEFAULT_SEARCH_MAX_FAILURES: u32 = 3;

/// Pause after a failed search request.
pub const DEFAULT_SEARCH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Thumbnail attempts.
pub const DEFAULT_THUMBNAIL_ATTEMPTS: u32 = 3;

/// Thumbnail backoff base.
pub const DEFAULT_THUMBNAIL_BASE_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// RequestTimeouts
// ============================================================================

/// Default timeout per action family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    /// `search`.
    pub search: Duration,
    /// `join_chat`, `leave_chat`, `chat_message`.
    pub chat: Duration,
    /// `generate_caption`.
    pub caption: Duration,
    /// `generate_thumbnail`, per attempt.
    pub thumbnail: Duration,
    /// `generate_video`.
    pub video: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(45),
            chat: Duration::from_secs(10),
            caption: Duration::from_secs(30),
            thumbnail: Duration::from_secs(60),
            video: Duration::from_secs(120),
        }
    }
}

impl RequestTimeouts {
    /// Timeout used for `action`.
    ///
    /// Heartbeats are never awaited; the chat timeout is returned for them.
    #[must_use]
    pub const fn for_action(&self, action: Action) -> Duration {
        match action {
            Action::Search => self.search,
            Action::GenerateCaption => self.caption,
            Action::GenerateThumbnail => self.thumbnail,
            Action::GenerateVideo => self.video,
            Action::Heartbeat | Action::JoinChat | Action::LeaveChat | Action::ChatMessage => {
                self.chat
            }
        }
    }

    /// Applies one timeout to every action.
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            search: timeout,
            chat: timeout,
            caption: timeout,
            thumbnail: timeout,
            video: timeout,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_search(mut self, timeout: Duration) -> Self {
        self.search = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_chat(mut self, timeout: Duration) -> Self {
        self.chat = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_caption(mut self, timeout: Duration) -> Self {
        self.caption = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_thumbnail(mut self, timeout: Duration) -> Self {
        self.thumbnail = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_video(mut self, timeout: Duration) -> Self {
        self.video = timeout;
        self
    }

    fn all(&self) -> [Duration; 5] {
        [self.search, self.chat, self.caption, self.thumbnail, self.video]
    }
}

// ============================================================================
// ReconnectConfig
// ============================================================================

/// Automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay of the first attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Attempts before the connection is declared lost.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

// ============================================================================
// SearchConfig
// ============================================================================

/// Continuous search sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Session ends after this many results.
    pub max_results: u32,
    /// Session ends after this many consecutive failures.
    pub max_failures: u32,
    /// Pause after a failure.
    pub retry_delay: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_SEARCH_MAX_RESULTS,
            max_failures: DEFAULT_SEARCH_MAX_FAILURES,
            retry_delay: DEFAULT_SEARCH_RETRY_DELAY,
        }
    }
}

impl SearchConfig {
    #[inline]
    #[must_use]
    pub fn with_max_results(mut self, max: u32) -> Self {
        self.max_results = max;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_failures(mut self, max: u32) -> Self {
        self.max_failures = max;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

// ============================================================================
// RetryConfig
// ============================================================================

/// Linear retry for thumbnail generation.
///
/// The pause after attempt `n` (1-indexed) is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Backoff base.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_THUMBNAIL_ATTEMPTS,
            base_delay: DEFAULT_THUMBNAIL_BASE_DELAY,
        }
    }
}

impl RetryConfig {
    /// Pause after 1-indexed `attempt`.
    #[inline]
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    #[inline]
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
}

// ============================================================================
// EngineConfig
// ============================================================================

/// Everything the engine needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Service endpoint (`ws://` or `wss://`).
    pub endpoint: Url,

    /// Keepalive period.
    pub heartbeat_interval: Duration,

    /// Minimum spacing between transmitted requests.
    pub min_request_interval: Duration,

    /// WebSocket handshake timeout.
    pub connect_timeout: Duration,

    /// Per-action request timeouts.
    pub timeouts: RequestTimeouts,

    /// Reconnection.
    pub reconnect: ReconnectConfig,

    /// Search sessions.
    pub search: SearchConfig,

    /// Thumbnail retries.
    pub thumbnail_retry: RetryConfig,
}

// ============================================================================
// Constructors
// ============================================================================

impl EngineConfig {
    /// Creates a configuration with default values for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            min_request_interval: DEFAULT_MIN_REQUEST_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeouts: RequestTimeouts::default(),
            reconnect: ReconnectConfig::default(),
            search: SearchConfig::default(),
            thumbnail_retry: RetryConfig::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl EngineConfig {
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_thumbnail_retry(mut self, retry: RetryConfig) -> Self {
        self.thumbnail_retry = retry;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl EngineConfig {
    /// Settings handed to the connection manager.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: self.endpoint.clone(),
            connect_timeout: self.connect_timeout,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_base_delay: self.reconnect.base_delay,
            max_reconnect_attempts: self.reconnect.max_attempts,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        match self.endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(format!(
                    "Endpoint scheme must be ws or wss, got '{other}'"
                ));
            }
        }

        if self.heartbeat_interval.is_zero() {
            return Err("Heartbeat interval must be greater than zero".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than zero".to_string());
        }
        if self.timeouts.all().iter().any(Duration::is_zero) {
            return Err("Request timeouts must be greater than zero".to_string());
        }
        if self.search.max_results == 0 {
            return Err("Search max results must be greater than zero".to_string());
        }
        if self.search.max_failures == 0 {
            return Err("Search max failures must be greater than zero".to_string());
        }
        if self.thumbnail_retry.attempts == 0 {
            return Err("Thumbnail attempts must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("ws://localhost:8080/ws").expect("url")
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(endpoint());

        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.min_request_interval, Duration::from_millis(100));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.search.max_results, 10);
        assert_eq!(config.search.max_failures, 3);
        assert_eq!(config.thumbnail_retry.attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_per_action() {
        let timeouts = RequestTimeouts::default();

        assert_eq!(timeouts.for_action(Action::Search), Duration::from_secs(45));
        assert_eq!(timeouts.for_action(Action::JoinChat), Duration::from_secs(10));
        assert_eq!(timeouts.for_action(Action::GenerateVideo), Duration::from_secs(120));
    }

    #[test]
    fn test_linear_retry_delay() {
        let retry = RetryConfig::default().with_base_delay(Duration::from_millis(500));

        assert_eq!(retry.delay_after(1), Duration::from_millis(500));
        assert_eq!(retry.delay_after(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_validate_rejects_http_scheme() {
        let config = EngineConfig::new(Url::parse("http://localhost").expect("url"));
        assert!(config.validate().unwrap_err().contains("scheme"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = EngineConfig::new(endpoint()).with_heartbeat_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = EngineConfig::new(endpoint())
            .with_search(SearchConfig::default().with_max_results(0));
        assert!(config.validate().is_err());

        let config = EngineConfig::new(endpoint())
            .with_timeouts(RequestTimeouts::default().with_video(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_settings_carry_reconnect() {
        let config = EngineConfig::new(endpoint()).with_reconnect(
            ReconnectConfig::default()
                .with_base_delay(Duration::from_millis(250))
                .with_max_attempts(2),
        );
        let settings = config.connection_settings();

        assert_eq!(settings.reconnect_base_delay, Duration::from_millis(250));
        assert_eq!(settings.max_reconnect_attempts, 2);
    }
}
