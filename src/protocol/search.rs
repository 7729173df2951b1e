//! Search result payload.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::InboundMessage;

// ============================================================================
// SearchResult
// ============================================================================

/// One generated search result (a "latent" video description).
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "title": "Cats at the beach",
///   "description": "wide shot of ...",
///   "thumbnailUrl": "",
///   "videoUrl": "",
///   "isLatent": true,
///   "useFixedSeed": false,
///   "seed": 123456,
///   "views": 0,
///   "tags": ["cats", "beach"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Result ID.
    pub id: String,

    /// Short title.
    pub title: String,

    /// Visual description, used as the generation prompt.
    pub description: String,

    /// Thumbnail (usually a data URI, may be empty).
    #[serde(default)]
    pub thumbnail_url: String,

    /// Video URL (empty for latent results).
    #[serde(default)]
    pub video_url: String,

    /// Whether the video still has to be generated.
    #[serde(default)]
    pub is_latent: bool,

    /// Whether clips should reuse `seed`.
    #[serde(default)]
    pub use_fixed_seed: bool,

    /// Generation seed.
    #[serde(default)]
    pub seed: u64,

    /// View count.
    #[serde(default)]
    pub views: u64,

    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SearchResult {
    /// Extracts the `result` object of a successful search response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `result` is missing or malformed.
    pub fn from_response(message: &InboundMessage) -> Result<Self> {
        let value = message
            .get("result")
            .ok_or_else(|| Error::protocol("search response is missing 'result'"))?;

        serde_json::from_value(value.clone())
            .map_err(|e| Error::protocol(format!("malformed search result: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
