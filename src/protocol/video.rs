//! Video generation request payload.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// VideoRequest
// ============================================================================

/// Inputs of a `generate_video` request.
///
/// Field names follow the service's snake_case convention for this action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoRequest {
    /// Video title.
    pub title: String,

    /// Visual description.
    pub description: String,

    /// Prompt prefix prepended by the service (style, camera, ...).
    #[serde(default)]
    pub video_prompt_prefix: String,

    /// Generation options.
    #[serde(default)]
    pub options: VideoOptions,
}

impl VideoRequest {
    /// Creates a request with default options.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// Sets the prompt prefix.
    #[inline]
    #[must_use]
    pub fn with_prompt_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.video_prompt_prefix = prefix.into();
        self
    }

    /// Sets the generation options.
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: VideoOptions) -> Self {
        self.options = options;
        self
    }
}

// ============================================================================
// VideoOptions
// ============================================================================

/// Optional generation settings. Unset fields use the service defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoOptions {
    /// Video the clip belongs to (keeps the service's event history together).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,

    /// Negative prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Frame width in pixels (multiple of 32).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Frame height in pixels (multiple of 32).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Frame count (multiple of 8, plus one).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_frames: Option<u32>,

    /// Diffusion steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_inference_steps: Option<u32>,

    /// Guidance scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f32>,

    /// Seed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Frames per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
}

impl VideoOptions {
    /// Sets the video ID.
    #[inline]
    #[must_use]
    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    /// Sets the frame size.
    #[inline]
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Sets the seed.
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the frame count.
    #[inline]
    #[must_use]
    pub fn with_num_frames(mut self, num_frames: u32) -> Self {
        self.num_frames = Some(num_frames);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_options_are_omitted() {
        let request = VideoRequest::new("T", "D")
            .with_options(VideoOptions::default().with_size(640, 416).with_seed(42));
        let value = serde_json::to_value(&request).expect("json");

        assert_eq!(value["title"], "T");
        assert_eq!(value["video_prompt_prefix"], "");
        assert_eq!(value["options"]["width"], 640);
        assert_eq!(value["options"]["seed"], 42);
        assert!(value["options"].get("negative_prompt").is_none());
    }
}
