//! Best-effort progress fan-out.
//!
//! Events are delivered at most once per emission to the listeners
//! subscribed at that moment; nothing is persisted and a slow listener
//! drops events instead of blocking the pipeline. The persisted job record
//! is always the authoritative progress value.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use clipcast_models::JobId;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Queued,
    Download,
    SplitResize,
    Content,
    Upload,
    Completed,
    Failed,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Queued => "queued",
            ProgressStage::Download => "download",
            ProgressStage::SplitResize => "split_resize",
            ProgressStage::Content => "content",
            ProgressStage::Upload => "upload",
            ProgressStage::Completed => "completed",
            ProgressStage::Failed => "failed",
        }
    }
}

/// One progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Job the event belongs to
    pub job_id: JobId,
    /// Pipeline stage
    pub stage: ProgressStage,
    /// Overall job percent (0-100)
    pub percent: u8,
    /// Human-readable detail
    pub detail: String,
}

impl ProgressUpdate {
    pub fn new(
        job_id: JobId,
        stage: ProgressStage,
        percent: u8,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            stage,
            percent: percent.min(100),
            detail: detail.into(),
        }
    }
}

/// Capacity of the fan-out channel; laggards lose the oldest events.
const CHANNEL_CAPACITY: usize = 256;

/// Fan-out hub for progress events.
#[derive(Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressUpdate>,
}

impl ProgressHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Emit an event. Fire-and-forget: an absent listener is not an error.
    pub fn emit(&self, update: ProgressUpdate) {
        let _ = self.tx.send(update);
    }

    /// Subscribe to all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.tx.subscribe()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}
