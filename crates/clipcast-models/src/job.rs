//! Job definitions for queue processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::clip::{ClipInfo, GeneratedContent, RemoteVideo, SourceMetadata};
use crate::request::{ProcessRequest, UploadRequest};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting for a worker slot
    #[default]
    Waiting,
    /// Job is being processed
    Active,
    /// Job completed successfully
    Completed,
    /// Job failed after exhausting its attempt budget
    Failed,
    /// Job must not run before `eligible_at` (scheduled upload or backoff)
    Delayed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Turn a long source video into short clips with generated metadata
    ProcessVideo,
    /// Publish one file to the remote platform
    UploadVideo,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ProcessVideo => "process_video",
            JobKind::UploadVideo => "upload_video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific job input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Process(ProcessRequest),
    Upload(UploadRequest),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Process(_) => JobKind::ProcessVideo,
            JobPayload::Upload(_) => JobKind::UploadVideo,
        }
    }
}

/// Output of a completed job, set exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    /// Clips plus generated and source metadata
    Processed {
        source: SourceMetadata,
        clips: Vec<ClipInfo>,
        content: Vec<GeneratedContent>,
    },
    /// Identity of the published video
    Uploaded { remote: RemoteVideo },
}

/// A job tracked through the durable queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Job kind
    pub kind: JobKind,

    /// Job state
    #[serde(default)]
    pub state: JobState,

    /// Kind-specific input
    pub payload: JobPayload,

    /// Progress (0-100), monotonic within one run, reset on retry
    #[serde(default)]
    pub progress: u8,

    /// Number of execution attempts so far
    #[serde(default)]
    pub attempts: u32,

    /// Maximum attempts allowed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Result (if completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Earliest execution instant for delayed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligible_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp (first transition to active)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp (terminal transition)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_max_attempts() -> u32 {
    3
}

impl Job {
    /// Create a new `process-video` job in the waiting state.
    pub fn new_process(request: ProcessRequest) -> Self {
        Self::new(JobPayload::Process(request))
    }

    /// Create a new `upload-video` job in the waiting state.
    pub fn new_upload(request: UploadRequest) -> Self {
        Self::new(JobPayload::Upload(request))
    }

    fn new(payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind: payload.kind(),
            state: JobState::Waiting,
            payload,
            progress: 0,
            attempts: 0,
            max_attempts: default_max_attempts(),
            result: None,
            failure_reason: None,
            eligible_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Delay the job until the given instant.
    pub fn delayed_until(mut self, at: DateTime<Utc>) -> Self {
        self.state = JobState::Delayed;
        self.eligible_at = Some(at);
        self
    }

    /// Check whether the job may start at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Waiting => true,
            JobState::Delayed => self.eligible_at.map(|at| at <= now).unwrap_or(true),
            _ => false,
        }
    }

    /// Begin an execution attempt.
    pub fn start(&mut self) {
        let now = Utc::now();
        self.state = JobState::Active;
        self.attempts += 1;
        self.eligible_at = None;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Record a progress value. Values never move backwards within a run.
    pub fn set_progress(&mut self, progress: u8) {
        let clamped = progress.min(100);
        if clamped > self.progress {
            self.progress = clamped;
            self.updated_at = Utc::now();
        }
    }

    /// Mark the job as completed with its result.
    pub fn complete(&mut self, result: JobResult) {
        let now = Utc::now();
        self.state = JobState::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the job as failed, recording the triggering error verbatim.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.state = JobState::Failed;
        self.failure_reason = Some(error.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Requeue a failed attempt with a backoff deadline. Progress resets.
    pub fn requeue(&mut self, eligible_at: DateTime<Utc>) {
        self.state = JobState::Delayed;
        self.eligible_at = Some(eligible_at);
        self.progress = 0;
        self.updated_at = Utc::now();
    }

    /// Reset a failed job for forced re-execution with a fresh attempt budget.
    pub fn reset_for_retry(&mut self) {
        self.state = JobState::Waiting;
        self.attempts = 0;
        self.progress = 0;
        self.failure_reason = None;
        self.eligible_at = None;
        self.completed_at = None;
        self.updated_at = Utc::now();
    }

    /// Check if the job has attempts left.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process_job() -> Job {
        Job::new_process(ProcessRequest::new("https://example.com/watch?v=abc"))
    }

    #[test]
    fn test_job_creation() {
        let job = process_job();
        assert_eq!(job.kind, JobKind::ProcessVideo);
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts, 0);
        assert!(job.is_eligible(Utc::now()));
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = process_job();

        job.start();
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts, 1);
        assert!(job.started_at.is_some());

        job.complete(JobResult::Uploaded {
            remote: RemoteVideo {
                id: "r1".into(),
                url: "https://platform/v/r1".into(),
            },
        });
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = process_job();
        job.start();

        job.set_progress(40);
        job.set_progress(25);
        assert_eq!(job.progress, 40);

        job.set_progress(250);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_requeue_resets_progress() {
        let mut job = process_job();
        job.start();
        job.set_progress(55);

        let later = Utc::now() + chrono::Duration::seconds(5);
        job.requeue(later);
        assert_eq!(job.state, JobState::Delayed);
        assert_eq!(job.progress, 0);
        assert!(!job.is_eligible(Utc::now()));
        assert!(job.is_eligible(later));
    }

    #[test]
    fn test_delayed_job_eligibility() {
        let at = Utc::now() + chrono::Duration::hours(1);
        let job = process_job().delayed_until(at);
        assert_eq!(job.state, JobState::Delayed);
        assert!(!job.is_eligible(Utc::now()));
        assert!(job.is_eligible(at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_attempt_budget() {
        let mut job = process_job();
        for _ in 0..3 {
            job.start();
        }
        assert_eq!(job.attempts, 3);
        assert!(!job.can_retry());

        job.fail("boom");
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("boom"));

        job.reset_for_retry();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts, 0);
        assert!(job.failure_reason.is_none());
    }

    #[test]
    fn test_job_serde_roundtrip() {
        let job = process_job();
        let json = serde_json::to_string(&job).expect("serialize Job");
        let decoded: Job = serde_json::from_str(&json).expect("deserialize Job");
        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.kind, job.kind);
        assert_eq!(decoded.state, job.state);
    }
}
