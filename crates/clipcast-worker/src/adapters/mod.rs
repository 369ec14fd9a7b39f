//! Stage adapter contracts.
//!
//! Each pipeline stage is performed by an external collaborator behind one
//! of these traits: fetching the source video, cutting it into clips,
//! generating per-clip text, and publishing to the remote platform. The
//! orchestration core only depends on these shapes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use clipcast_models::{ClipInfo, GeneratedContent, ProcessRequest, RemoteVideo, SourceMetadata, UploadRequest};

use crate::error::WorkerResult;

pub mod noop;

/// Progress capability handed into adapter calls. Implementations must be
/// cheap and non-blocking; percent is local to the adapter (0-100).
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percent: u8, detail: &str);
}

/// A sink that discards everything, for callers without progress needs.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _percent: u8, _detail: &str) {}
}

/// Downloaded source file plus the metadata the platform reported for it.
#[derive(Debug, Clone)]
pub struct DownloadedSource {
    pub path: PathBuf,
    pub metadata: SourceMetadata,
}

/// Fetches the source video to local disk.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(
        &self,
        request: &ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<DownloadedSource>;
}

/// Splits the source into fixed-duration segments and resizes each into
/// the target aspect ratio.
#[async_trait]
pub trait ClipProcessor: Send + Sync {
    async fn split_resize(
        &self,
        source: &Path,
        request: &ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<Vec<ClipInfo>>;
}

/// Produces a title and description for one clip. Callers treat any error
/// as non-fatal and substitute deterministic fallback text.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        source: &SourceMetadata,
        clip: &ClipInfo,
    ) -> WorkerResult<GeneratedContent>;
}

/// Publishes one file to the remote platform. Progress is byte-based.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn publish(
        &self,
        request: &UploadRequest,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<RemoteVideo>;
}
