//! Shared data models for the ClipCast backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, payloads and results tracked through the queue
//! - Clip and source metadata produced by the pipeline stages
//! - Upload schedules and their lifecycle

pub mod clip;
pub mod job;
pub mod request;
pub mod schedule;

// Re-export common types
pub use clip::{ClipInfo, GeneratedContent, RemoteVideo, SourceMetadata};
pub use job::{Job, JobId, JobKind, JobPayload, JobResult, JobState};
pub use request::{Privacy, ProcessRequest, UploadRequest};
pub use schedule::{Schedule, ScheduleId, ScheduleStatus};
