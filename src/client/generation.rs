//! Video, caption and thumbnail generation.

// ============================================================================
// Imports
// ============================================================================

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{OutboundRequest, VideoRequest};

use super::cache::thumbnail_key;
use super::core::Engine;

// ============================================================================
// Engine - Generation
// ============================================================================

impl Engine {
    /// Generates a clip. Returns the `video` field (usually a data URI).
    ///
    /// Not retried.
    ///
    /// # Errors
    ///
    /// Returns the request error, or [`Error::Protocol`] if `video` is missing.
    pub async fn generate_video(&self, request: &VideoRequest) -> Result<String> {
        let response = self
            .send(OutboundRequest::generate_video(request)?, None)
            .await?;
        response.require_str("video")
    }

    /// Generates a caption for a title and description.
    ///
    /// Not retried.
    ///
    /// # Errors
    ///
    /// Returns the request error, or [`Error::Protocol`] if `caption` is missing.
    pub async fn generate_caption(&self, title: &str, description: &str) -> Result<String> {
        let response = self
            .send(OutboundRequest::generate_caption(title, description), None)
            .await?;
        response.require_str("caption")
    }

    /// Generates a thumbnail, consulting the cache first.
    ///
    /// Failed attempts are retried with a pause of `base_delay * attempt`.
    /// Each attempt is a separate request.
    ///
    /// # Errors
    ///
    /// - [`Error::RetryExhausted`] wrapping the last error if every attempt fails
    /// - [`Error::Disposed`] if the engine is disposed while retrying
    pub async fn generate_thumbnail(&self, title: &str, description: &str) -> Result<String> {
        let key = thumbnail_key(title, description);

        if let Some(cache) = &self.inner.cache
            && let Some(hit) = cache.get(&key).await
        {
            debug!(title, "Thumbnail cache hit");
            return Ok(hit);
        }

        let retry = self.inner.config.thumbnail_retry;
        let mut attempt = 1;

        let thumbnail = loop {
            let outcome = self
                .send(OutboundRequest::generate_thumbnail(title, description), None)
                .await
                .and_then(|response| response.require_str("thumbnailUrl"));

            match outcome {
                Ok(thumbnail) => break thumbnail,
                Err(Error::Disposed) => return Err(Error::Disposed),
                Err(e) if attempt >= retry.attempts => {
                    warn!(title, attempts = attempt, error = %e, "Thumbnail generation failed");
                    return Err(Error::retry_exhausted("generate_thumbnail", attempt, e));
                }
                Err(e) => {
                    let delay = retry.delay_after(attempt);
                    warn!(
                        title,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Thumbnail attempt failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        if let Some(cache) = &self.inner.cache {
            cache.put(&key, thumbnail.clone()).await;
        }
        Ok(thumbnail)
    }
}

// ============================================================================
// Tests
// ============================================================================
