//! Outbound request and inbound message types.
//!
//! Every frame in both directions is a single JSON object. Action specific
//! fields sit next to the envelope fields rather than under a nested key.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::{Action, ChatMessage, VideoRequest};

// ============================================================================
// OutboundRequest
// ============================================================================

/// A request from the client to the service.
///
/// # Format
///
/// ```json
/// {
///   "requestId": "uuid",
///   "action": "search",
///   "query": "cats",
///   "searchCount": 0,
///   "attemptCount": 0
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundRequest {
    /// Unique identifier for request/response correlation.
    #[serde(rename = "requestId")]
    request_id: RequestId,

    /// Action tag.
    action: Action,

    /// Action specific parameters, flattened into the envelope.
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl OutboundRequest {
    /// Creates a request with an auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(action: Action, params: Map<String, Value>) -> Self {
        Self::with_id(RequestId::generate(), action, params)
    }

    /// Creates a request with a specific ID.
    ///
    /// Envelope keys inside `params` are discarded so they cannot shadow the
    /// real `requestId` and `action`.
    #[must_use]
    pub fn with_id(request_id: RequestId, action: Action, mut params: Map<String, Value>) -> Self {
        params.remove("requestId");
        params.remove("action");
        Self {
            request_id,
            action,
            params,
        }
    }

    /// Returns the request ID.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the action tag.
    #[inline]
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Returns the parameters.
    #[inline]
    #[must_use]
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Serializes the request into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// OutboundRequest - Action Constructors
// ============================================================================

impl OutboundRequest {
    /// Keepalive frame.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(Action::Heartbeat, Map::new())
    }

    /// One step of an incremental search.
    #[must_use]
    pub fn search(query: &str, search_count: u32, attempt_count: u32) -> Self {
        Self::new(
            Action::Search,
            object(json!({
                "query": query,
                "searchCount": search_count,
                "attemptCount": attempt_count,
            })),
        )
    }

    /// Join the chat room of a video.
    #[must_use]
    pub fn join_chat(video_id: &str) -> Self {
        Self::new(Action::JoinChat, object(json!({ "videoId": video_id })))
    }

    /// Leave the chat room of a video.
    #[must_use]
    pub fn leave_chat(video_id: &str) -> Self {
        Self::new(Action::LeaveChat, object(json!({ "videoId": video_id })))
    }

    /// Post a chat message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the message cannot be serialized.
    pub fn chat_message(message: &ChatMessage) -> Result<Self> {
        let params = object(serde_json::to_value(message)?);
        Ok(Self::new(Action::ChatMessage, params))
    }

    /// Generate a caption for a title and description.
    #[must_use]
    pub fn generate_caption(title: &str, description: &str) -> Self {
        Self::new(Action::GenerateCaption, title_params(title, description))
    }

    /// Generate a thumbnail for a title and description.
    #[must_use]
    pub fn generate_thumbnail(title: &str, description: &str) -> Self {
        Self::new(Action::GenerateThumbnail, title_params(title, description))
    }

    /// Generate a video clip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the request cannot be serialized.
    pub fn generate_video(request: &VideoRequest) -> Result<Self> {
        let params = object(serde_json::to_value(request)?);
        Ok(Self::new(Action::GenerateVideo, params))
    }
}

/// Caption and thumbnail requests nest their inputs under `params`.
fn title_params(title: &str, description: &str) -> Map<String, Value> {
    object(json!({
        "params": {
            "title": title,
            "description": description,
        }
    }))
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ============================================================================
// InboundMessage
// ============================================================================

/// A frame received from the service.
///
/// Either a response (carries `requestId` and `success`) or an unsolicited
/// broadcast (no `requestId`, `broadcast: true`).
///
/// # Format
///
/// Response:
/// ```json
/// { "requestId": "uuid", "action": "join_chat", "success": true, "messages": [] }
/// ```
///
/// Broadcast:
/// ```json
/// { "action": "chat_message", "broadcast": true, "userId": "u1", "username": "ann",
///   "content": "hi", "videoId": "v1" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Matches the request `requestId`, absent for broadcasts.
    #[serde(rename = "requestId", default)]
    pub request_id: Option<RequestId>,

    /// Raw action tag.
    #[serde(default)]
    pub action: Option<String>,

    /// Whether the request succeeded.
    #[serde(default)]
    pub success: bool,

    /// Server supplied error message.
    #[serde(default)]
    pub error: Option<String>,

    /// Set on unsolicited broadcasts.
    #[serde(default)]
    pub broadcast: bool,

    /// All remaining fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is not a JSON object.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::protocol(format!("malformed frame: {e}")))
    }

    /// Returns the recognised action, if any.
    #[inline]
    #[must_use]
    pub fn action(&self) -> Option<Action> {
        self.action.as_deref().and_then(Action::from_wire)
    }

    /// Returns `true` for an unsolicited chat broadcast.
    #[inline]
    #[must_use]
    pub fn is_chat_broadcast(&self) -> bool {
        self.broadcast && self.action() == Some(Action::ChatMessage)
    }

    /// Returns a payload field.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Returns a payload field as a string slice.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Returns a required string field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the field is missing or not a string.
    pub fn require_str(&self, key: &str) -> Result<String> {
        self.get_str(key)
            .map(str::to_owned)
            .ok_or_else(|| Error::protocol(format!("response is missing '{key}'")))
    }

    /// Converts a `success: false` response into [`Error::Server`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] carrying the server message verbatim.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            let message = self.error.unwrap_or_else(|| "unknown error".to_string());
            Err(Error::server(message))
        }
    }

    /// Returns the payload as a JSON object (used by the chat parser).
    #[must_use]
    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
