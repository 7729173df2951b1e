//! Action tags recognised by the generation service.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Action
// ============================================================================

/// Action tag carried by every wire message.
///
/// | Action | Response expected |
/// |--------|-------------------|
/// | `heartbeat` | no |
/// | `join_chat`, `leave_chat`, `chat_message` | yes |
/// | `search` | yes |
/// | `generate_video`, `generate_caption`, `generate_thumbnail` | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Keepalive, sent while connected.
    Heartbeat,
    /// Join a video's chat room.
    JoinChat,
    /// Leave a video's chat room.
    LeaveChat,
    /// Chat message (request, response or broadcast).
    ChatMessage,
    /// Incremental search step.
    Search,
    /// Video clip generation.
    GenerateVideo,
    /// Caption generation.
    GenerateCaption,
    /// Thumbnail generation.
    GenerateThumbnail,
}

impl Action {
    /// All recognised actions.
    pub const ALL: [Action; 8] = [
        Action::Heartbeat,
        Action::JoinChat,
        Action::LeaveChat,
        Action::ChatMessage,
        Action::Search,
        Action::GenerateVideo,
        Action::GenerateCaption,
        Action::GenerateThumbnail,
    ];

    /// Returns the wire tag.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::JoinChat => "join_chat",
            Self::LeaveChat => "leave_chat",
            Self::ChatMessage => "chat_message",
            Self::Search => "search",
            Self::GenerateVideo => "generate_video",
            Self::GenerateCaption => "generate_caption",
            Self::GenerateThumbnail => "generate_thumbnail",
        }
    }

    /// Parses a wire tag, returning `None` for unknown actions.
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == tag)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags_match_serde() {
        for action in Action::ALL {
            let json = serde_json::to_string(&action).expect("serialize");
            assert_eq!(json, format!("\"{}\"", action.as_str()));
        }
    }

    #[test]
    fn test_from_wire() {
        assert_eq!(Action::from_wire("join_chat"), Some(Action::JoinChat));
        assert_eq!(Action::from_wire("generate_thumbnail"), Some(Action::GenerateThumbnail));
        assert_eq!(Action::from_wire("unknown"), None);
    }
}
