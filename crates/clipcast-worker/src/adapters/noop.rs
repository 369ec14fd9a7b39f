//! No-op adapter implementations.
//!
//! Used by the worker binary for deployment smoke-checks until real
//! integrations are wired in, and convenient as harmless defaults in
//! local development.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use clipcast_models::{ClipInfo, GeneratedContent, ProcessRequest, RemoteVideo, SourceMetadata, UploadRequest};

use crate::error::WorkerResult;

use super::{ClipProcessor, ContentGenerator, DownloadedSource, Downloader, ProgressSink, Uploader};

pub struct NoopDownloader;

#[async_trait]
impl Downloader for NoopDownloader {
    async fn fetch(
        &self,
        request: &ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<DownloadedSource> {
        debug!(url = %request.source_url, "noop download");
        progress.on_progress(100, "downloaded (noop)");
        Ok(DownloadedSource {
            path: "/tmp/clipcast-noop/source.mp4".into(),
            metadata: SourceMetadata {
                title: format!("Source at {}", request.source_url),
                description: String::new(),
                tags: Vec::new(),
                duration_secs: 0.0,
            },
        })
    }
}

pub struct NoopClipProcessor;

#[async_trait]
impl ClipProcessor for NoopClipProcessor {
    async fn split_resize(
        &self,
        source: &Path,
        request: &ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<Vec<ClipInfo>> {
        debug!(source = %source.display(), "noop split/resize");
        progress.on_progress(100, "processed (noop)");
        Ok(vec![ClipInfo {
            id: 0,
            path: source.display().to_string(),
            start_secs: request.start_offset_secs as f64,
            duration_secs: request.clip_duration_secs as f64,
        }])
    }
}

pub struct NoopContentGenerator;

#[async_trait]
impl ContentGenerator for NoopContentGenerator {
    async fn generate(
        &self,
        source: &SourceMetadata,
        clip: &ClipInfo,
    ) -> WorkerResult<GeneratedContent> {
        Ok(GeneratedContent {
            clip_id: clip.id,
            title: format!("{} - Part {}", source.title, clip.id + 1),
            description: source.description.clone(),
        })
    }
}

pub struct NoopUploader;

#[async_trait]
impl Uploader for NoopUploader {
    async fn publish(
        &self,
        request: &UploadRequest,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<RemoteVideo> {
        debug!(file = %request.file_path, "noop upload");
        progress.on_progress(100, "uploaded (noop)");
        Ok(RemoteVideo {
            id: "noop".to_string(),
            url: "noop://video/noop".to_string(),
        })
    }
}
