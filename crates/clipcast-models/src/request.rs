//! Submission payloads for the two job kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visibility of an uploaded video on the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Public,
    Unlisted,
    #[default]
    Private,
}

/// Input for a `process-video` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Source video URL
    pub source_url: String,
    /// Download quality selector (e.g. "720p", "best")
    #[serde(default = "default_quality")]
    pub quality: String,
    /// Length of each produced clip in seconds
    #[serde(default = "default_clip_duration")]
    pub clip_duration_secs: u32,
    /// Offset into the source before the first clip starts
    #[serde(default)]
    pub start_offset_secs: u32,
    /// Upper bound on the number of clips to produce
    #[serde(default = "default_max_clips")]
    pub max_clips: u32,
}

fn default_quality() -> String {
    "720p".to_string()
}

fn default_clip_duration() -> u32 {
    60
}

fn default_max_clips() -> u32 {
    10
}

impl ProcessRequest {
    /// Create a request with default options for a source URL.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            quality: default_quality(),
            clip_duration_secs: default_clip_duration(),
            start_offset_secs: 0,
            max_clips: default_max_clips(),
        }
    }

    /// Set the clip duration.
    pub fn with_clip_duration(mut self, secs: u32) -> Self {
        self.clip_duration_secs = secs;
        self
    }

    /// Set the maximum number of clips.
    pub fn with_max_clips(mut self, max: u32) -> Self {
        self.max_clips = max;
        self
    }
}

/// Input for an `upload-video` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Local path of the file to publish
    pub file_path: String,
    /// Video title
    pub title: String,
    /// Video description
    #[serde(default)]
    pub description: String,
    /// Tags attached to the upload
    #[serde(default)]
    pub tags: Vec<String>,
    /// Visibility on the remote platform
    #[serde(default)]
    pub privacy: Privacy,
    /// Optional platform-side publish time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_at: Option<DateTime<Utc>>,
}

impl UploadRequest {
    /// Create a request with default metadata for a local file.
    pub fn new(file_path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            privacy: Privacy::default(),
            publish_at: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the platform-side publish time.
    pub fn with_publish_at(mut self, at: DateTime<Utc>) -> Self {
        self.publish_at = Some(at);
        self
    }
}
