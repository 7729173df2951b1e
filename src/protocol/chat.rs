//! Chat message payload and validation.
//!
//! Historical messages (join response), live broadcasts and the echo of a
//! posted message all go through [`ChatMessage::parse`].

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// ChatMessage
// ============================================================================

/// A chat message in a video's room.
///
/// `userId`, `username`, `content` and `videoId` are required. A message
/// missing any of them, or carrying `null`, is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Author's user ID.
    pub user_id: String,

    /// Author's display name.
    pub username: String,

    /// Message text.
    pub content: String,

    /// Video whose room the message belongs to.
    pub video_id: String,

    /// Send time.
    pub timestamp: DateTime<Utc>,

    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ChatMessage {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
        video_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            content: content.into(),
            video_id: video_id.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Attaches metadata.
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Parses and validates a message from a JSON value.
    ///
    /// A missing or unparsable `timestamp` falls back to the receive time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the value is not an object or a required
    /// field is missing, `null` or not a string.
    pub fn parse(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::protocol("chat message is not an object"))?;

        let timestamp = object
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or_else(Utc::now, |ts| ts.with_timezone(&Utc));

        let metadata = object.get("metadata").and_then(Value::as_object).cloned();

        Ok(Self {
            user_id: required(object, "userId")?,
            username: required(object, "username")?,
            content: required(object, "content")?,
            video_id: required(object, "videoId")?,
            timestamp,
            metadata,
        })
    }
}

fn required(object: &Map<String, Value>, key: &str) -> Result<String> {
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(Error::protocol(format!(
            "chat message is missing '{key}'"
        ))),
        Some(other) => Err(Error::protocol(format!(
            "chat message field '{key}' is not a string: {other}"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
