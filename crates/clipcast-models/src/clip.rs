//! Metadata types produced by the pipeline stages.

use serde::{Deserialize, Serialize};

/// Metadata of the downloaded source video, as reported by the downloader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Original video title
    pub title: String,
    /// Original video description
    #[serde(default)]
    pub description: String,
    /// Original tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Source duration in seconds
    pub duration_secs: f64,
}

/// One clip cut from the source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipInfo {
    /// Clip index within the source, starting at 0
    pub id: u32,
    /// Local path of the rendered clip
    pub path: String,
    /// Start offset within the source, in seconds
    pub start_secs: f64,
    /// Clip duration in seconds
    pub duration_secs: f64,
}

/// Generated title and description for one clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// Clip this content belongs to
    pub clip_id: u32,
    /// Generated title
    pub title: String,
    /// Generated description
    pub description: String,
}

/// Identity of a published video on the remote platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteVideo {
    /// Platform-assigned video id
    pub id: String,
    /// Public URL of the published video
    pub url: String,
}
