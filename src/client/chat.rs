//! Chat room membership and the chat message feed.
//!
//! History returned by `join_chat`, the stored echo of `chat_message`, and
//! live broadcasts all go through the same validation and end up on one
//! [`ChatFeed`]. Malformed messages are logged and dropped.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::protocol::{ChatMessage, OutboundRequest};

use super::core::Engine;

// ============================================================================
// ChatFeed
// ============================================================================

/// Fan-out of validated chat messages to any number of receivers.
#[derive(Debug, Clone)]
pub struct ChatFeed {
    tx: broadcast::Sender<ChatMessage>,
}

impl ChatFeed {
    /// Creates a feed that buffers up to `capacity` messages per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns a receiver for messages published from now on.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.tx.subscribe()
    }

    /// Publishes a message. Having no receivers is not an error.
    pub fn publish(&self, message: ChatMessage) {
        trace!(video_id = %message.video_id, user_id = %message.user_id, "Chat message delivered");
        let _ = self.tx.send(message);
    }

    /// Validates and publishes a raw message.
    ///
    /// Returns `false` if the message was malformed and dropped.
    pub fn publish_value(&self, value: &Value) -> bool {
        match ChatMessage::parse(value) {
            Ok(message) => {
                self.publish(message);
                true
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed chat message");
                false
            }
        }
    }
}

// ============================================================================
// Engine - Chat
// ============================================================================

impl Engine {
    /// Returns a receiver for chat messages across all joined rooms.
    #[must_use]
    pub fn chat_messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.inner.chat.subscribe()
    }

    /// Joins the chat room of `video_id`.
    ///
    /// Returns the valid history messages in the order received. They are
    /// also published on the chat feed. A response without history, or with
    /// an empty list, yields no messages.
    ///
    /// # Errors
    ///
    /// Returns the request error if the join fails.
    pub async fn join_room(&self, video_id: &str) -> Result<Vec<ChatMessage>> {
        let response = self
            .send(OutboundRequest::join_chat(video_id), None)
            .await?;

        self.inner.rooms.lock().insert(video_id.to_string());

        let history: Vec<ChatMessage> = match response.get("messages") {
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(|entry| match ChatMessage::parse(entry) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!(video_id, error = %e, "Dropping malformed history message");
                        None
                    }
                })
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                warn!(video_id, "Ignoring non-array chat history");
                Vec::new()
            }
        };

        for message in &history {
            self.inner.chat.publish(message.clone());
        }

        info!(video_id, history = history.len(), "Joined chat room");
        Ok(history)
    }

    /// Leaves the chat room of `video_id`.
    ///
    /// Best effort: failures are logged, not returned.
    pub async fn leave_room(&self, video_id: &str) {
        self.inner.rooms.lock().remove(video_id);

        match self.send(OutboundRequest::leave_chat(video_id), None).await {
            Ok(_) => info!(video_id, "Left chat room"),
            Err(e) => warn!(video_id, error = %e, "Leave chat failed"),
        }
    }

    /// Posts a message to its room.
    ///
    /// Returns the message as stored by the service, or `message` itself if
    /// the response carries no copy.
    ///
    /// # Errors
    ///
    /// Returns the request error, or [`Error::Protocol`](crate::Error::Protocol)
    /// if the stored copy is malformed.
    pub async fn send_chat_message(&self, message: ChatMessage) -> Result<ChatMessage> {
        let request = OutboundRequest::chat_message(&message)?;
        let response = self.send(request, None).await?;

        match response.get("message") {
            Some(stored) => ChatMessage::parse(stored),
            None => Ok(message),
        }
    }

    /// Rooms currently joined, sorted.
    #[must_use]
    pub fn joined_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.inner.rooms.lock().iter().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Re-issues `join_chat` for every remembered room.
    pub(crate) async fn rejoin_rooms(&self) {
        let rooms = self.joined_rooms();
        if rooms.is_empty() {
            return;
        }

        debug!(count = rooms.len(), "Rejoining chat rooms");
        for video_id in rooms {
            if let Err(e) = self.join_room(&video_id).await {
                warn!(video_id = %video_id, error = %e, "Rejoin failed");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
