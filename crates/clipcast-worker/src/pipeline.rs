//! Stage sequencing and weighted progress mapping.
//!
//! A `process-video` job runs download, split/resize and content
//! generation strictly in order; each stage owns a fixed slice of the
//! overall percent range and adapter-local progress is scaled into it:
//!
//! - download:      10-30
//! - split/resize:  30-70
//! - content:       jump to 70, no intermediate progress
//! - completion:    100 (written by the executor)
//!
//! An `upload-video` job is a single adapter call whose byte percent maps
//! to 0-100 directly.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use clipcast_models::{ClipInfo, GeneratedContent, JobId, JobResult, ProcessRequest, SourceMetadata, UploadRequest};
use clipcast_queue::{ProgressStage, ProgressUpdate};

use crate::adapters::{ClipProcessor, ContentGenerator, Downloader, ProgressSink, Uploader};
use crate::error::WorkerResult;

/// Stage adapter bundle handed to the executor.
#[derive(Clone)]
pub struct Adapters {
    pub downloader: Arc<dyn Downloader>,
    pub clip_processor: Arc<dyn ClipProcessor>,
    pub content_generator: Arc<dyn ContentGenerator>,
    pub uploader: Arc<dyn Uploader>,
}

/// Percent slice of the overall job allotted to one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageBounds {
    pub base: u8,
    pub weight: u8,
}

impl StageBounds {
    pub const DOWNLOAD: StageBounds = StageBounds { base: 10, weight: 20 };
    pub const SPLIT_RESIZE: StageBounds = StageBounds { base: 30, weight: 40 };
    pub const UPLOAD: StageBounds = StageBounds { base: 0, weight: 100 };

    /// Overall percent reached at the start of content generation.
    pub const CONTENT_BASE: u8 = 70;

    /// Map an adapter-local percent into this stage's slice, clamped so a
    /// misbehaving adapter can never report outside its bounds.
    pub fn map(&self, local: u8) -> u8 {
        let local = local.min(100) as u16;
        self.base + (local * self.weight as u16 / 100) as u8
    }
}

/// Sink that scales adapter-local percent into a stage's slice and sends
/// the resulting event down the job's progress channel. Sending never
/// blocks; a closed channel means nobody cares anymore.
pub struct StageSink {
    job_id: JobId,
    stage: ProgressStage,
    bounds: StageBounds,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl StageSink {
    pub fn new(
        job_id: JobId,
        stage: ProgressStage,
        bounds: StageBounds,
        tx: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Self {
        Self {
            job_id,
            stage,
            bounds,
            tx,
        }
    }
}

impl ProgressSink for StageSink {
    fn on_progress(&self, percent: u8, detail: &str) {
        let overall = self.bounds.map(percent);
        let _ = self.tx.send(ProgressUpdate::new(
            self.job_id.clone(),
            self.stage,
            overall,
            detail,
        ));
    }
}

/// Deterministic fallback text for a clip, used whenever the content
/// generator errors. The pipeline must always produce usable metadata.
pub fn fallback_content(source: &SourceMetadata, clip: &ClipInfo) -> GeneratedContent {
    GeneratedContent {
        clip_id: clip.id,
        title: format!("{} - Part {}", source.title, clip.id + 1),
        description: format!(
            "Clip {} of \"{}\" ({}s from {}s).",
            clip.id + 1,
            source.title,
            clip.duration_secs.round() as i64,
            clip.start_secs.round() as i64,
        ),
    }
}

/// Run the full `process-video` stage sequence.
pub async fn run_process(
    adapters: &Adapters,
    job_id: &JobId,
    request: &ProcessRequest,
    tx: &mpsc::UnboundedSender<ProgressUpdate>,
) -> WorkerResult<JobResult> {
    // Stage 1: download (10-30)
    let sink = StageSink::new(
        job_id.clone(),
        ProgressStage::Download,
        StageBounds::DOWNLOAD,
        tx.clone(),
    );
    sink.on_progress(0, "starting download");
    let source = adapters.downloader.fetch(request, &sink).await?;
    sink.on_progress(100, "download complete");

    // Stage 2: split + resize (30-70)
    let sink = StageSink::new(
        job_id.clone(),
        ProgressStage::SplitResize,
        StageBounds::SPLIT_RESIZE,
        tx.clone(),
    );
    sink.on_progress(0, "splitting into clips");
    let clips = adapters
        .clip_processor
        .split_resize(&source.path, request, &sink)
        .await?;
    sink.on_progress(100, "clips rendered");

    // Stage 3: content generation, a single jump to 70. One sequential
    // generator call per clip, errors degrade to fallback text.
    let _ = tx.send(ProgressUpdate::new(
        job_id.clone(),
        ProgressStage::Content,
        StageBounds::CONTENT_BASE,
        "generating content",
    ));
    let mut content = Vec::with_capacity(clips.len());
    for clip in &clips {
        let generated = match adapters
            .content_generator
            .generate(&source.metadata, clip)
            .await
        {
            Ok(generated) => generated,
            Err(e) => {
                warn!(job_id = %job_id, clip_id = clip.id, "Content generation degraded to fallback: {e}");
                fallback_content(&source.metadata, clip)
            }
        };
        content.push(generated);
    }

    Ok(JobResult::Processed {
        source: source.metadata,
        clips,
        content,
    })
}

/// Run the single-stage `upload-video` operation.
pub async fn run_upload(
    adapters: &Adapters,
    job_id: &JobId,
    request: &UploadRequest,
    tx: &mpsc::UnboundedSender<ProgressUpdate>,
) -> WorkerResult<JobResult> {
    let sink = StageSink::new(
        job_id.clone(),
        ProgressStage::Upload,
        StageBounds::UPLOAD,
        tx.clone(),
    );
    sink.on_progress(0, "starting upload");
    let remote = adapters.uploader.publish(request, &sink).await?;
    Ok(JobResult::Uploaded { remote })
}
