//! Builder pattern for engine configuration.
//!
//! Provides a fluent API for configuring and creating [`Engine`] instances.
//!
//! # Example
//!
//! ```no_run
//! use aitube_client::Engine;
//!
//! # fn example() -> aitube_client::Result<()> {
//! let engine = Engine::builder()
//!     .endpoint("wss://aitube.example/ws")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::cache::ThumbnailCache;
use super::config::{EngineConfig, ReconnectConfig, RequestTimeouts, RetryConfig, SearchConfig};
use super::core::Engine;

// ============================================================================
// EngineBuilder
// ============================================================================

/// Builder for configuring an [`Engine`] instance.
///
/// Use [`Engine::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct EngineBuilder {
    /// Service endpoint, unparsed.
    endpoint: Option<String>,
    heartbeat_interval: Option<Duration>,
    min_request_interval: Option<Duration>,
    connect_timeout: Option<Duration>,
    timeouts: Option<RequestTimeouts>,
    reconnect: Option<ReconnectConfig>,
    search: Option<SearchConfig>,
    thumbnail_retry: Option<RetryConfig>,
    /// Optional thumbnail cache.
    cache: Option<Arc<dyn ThumbnailCache>>,
}

// ============================================================================
// EngineBuilder Implementation
// ============================================================================

impl EngineBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service endpoint.
    ///
    /// # Arguments
    ///
    /// * `url` - WebSocket URL (e.g., "wss://host/ws")
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Seeds every setting from an existing configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.endpoint = Some(config.endpoint.to_string());
        self.heartbeat_interval = Some(config.heartbeat_interval);
        self.min_request_interval = Some(config.min_request_interval);
        self.connect_timeout = Some(config.connect_timeout);
        self.timeouts = Some(config.timeouts);
        self.reconnect = Some(config.reconnect);
        self.search = Some(config.search);
        self.thumbnail_retry = Some(config.thumbnail_retry);
        self
    }

    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    #[inline]
    #[must_use]
    pub fn min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = Some(interval);
        self
    }

    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    #[inline]
    #[must_use]
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    #[inline]
    #[must_use]
    pub fn search(mut self, search: SearchConfig) -> Self {
        self.search = Some(search);
        self
    }

    #[inline]
    #[must_use]
    pub fn thumbnail_retry(mut self, retry: RetryConfig) -> Self {
        self.thumbnail_retry = Some(retry);
        self
    }

    /// Sets the cache consulted by [`Engine::generate_thumbnail`].
    #[inline]
    #[must_use]
    pub fn thumbnail_cache(mut self, cache: Arc<dyn ThumbnailCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builds the engine with validation. No connection is opened.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is missing or unparsable
    /// - [`Error::Config`] if any setting is invalid
    pub fn build(self) -> Result<Engine> {
        let config = self.validate()?;
        Ok(Engine::new(config, self.cache))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl EngineBuilder {
    /// Assembles and validates the configuration.
    fn validate(&self) -> Result<EngineConfig> {
        let raw = self.endpoint.as_deref().ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: Engine::builder().endpoint(\"wss://host/ws\")",
            )
        })?;

        let endpoint = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid endpoint '{raw}': {e}")))?;

        let mut config = EngineConfig::new(endpoint);
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        if let Some(interval) = self.min_request_interval {
            config.min_request_interval = interval;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(timeouts) = self.timeouts {
            config.timeouts = timeouts;
        }
        if let Some(reconnect) = self.reconnect {
            config.reconnect = reconnect;
        }
        if let Some(search) = self.search {
            config.search = search;
        }
        if let Some(retry) = self.thumbnail_retry {
            config.thumbnail_retry = retry;
        }

        config.validate().map_err(Error::config)?;
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
