//! Upload schedule records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::job::JobId;
use crate::request::UploadRequest;

/// Unique identifier for a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub String);

impl ScheduleId {
    /// Generate a new random schedule ID.
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

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Schedule lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Waiting for its fire time
    #[default]
    Scheduled,
    /// Fire time reached, hand-off to the queue in progress
    Executing,
    /// Upload job submitted
    Completed,
    /// Hand-off failed; terminal for this schedule only
    Failed,
    /// Explicitly cancelled before firing
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Executing => "executing",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted record describing a future upload job submission.
///
/// The field set is the durable at-rest contract; restart recovery depends
/// on it deserializing unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique schedule ID
    pub id: ScheduleId,

    /// The deferred upload job's input
    pub upload: UploadRequest,

    /// Fire time, normalized to UTC
    pub scheduled_time: DateTime<Utc>,

    /// IANA timezone the caller specified the time in, for display
    pub timezone: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: ScheduleStatus,

    /// Job id recorded on successful hand-off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,

    /// Hand-off error recorded on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Set when the hand-off succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Set when the hand-off failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    /// Set on explicit cancellation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Create a new scheduled record.
    pub fn new(
        upload: UploadRequest,
        scheduled_time: DateTime<Utc>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            id: ScheduleId::new(),
            upload,
            scheduled_time,
            timezone: timezone.into(),
            status: ScheduleStatus::Scheduled,
            job_id: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
        }
    }

    /// Check whether the schedule is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Scheduled && self.scheduled_time <= now
    }

    /// Mark the hand-off as in progress.
    pub fn mark_executing(&mut self) {
        self.status = ScheduleStatus::Executing;
    }

    /// Record a successful hand-off.
    pub fn complete(&mut self, job_id: JobId) {
        self.status = ScheduleStatus::Completed;
        self.job_id = Some(job_id);
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed hand-off.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ScheduleStatus::Failed;
        self.error = Some(error.into());
        self.failed_at = Some(Utc::now());
    }

    /// Cancel before firing.
    pub fn cancel(&mut self) {
        self.status = ScheduleStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
    }

    /// Replace the pending fire time and return to the scheduled status.
    pub fn reschedule(&mut self, scheduled_time: DateTime<Utc>, timezone: impl Into<String>) {
        self.scheduled_time = scheduled_time;
        self.timezone = timezone.into();
        self.status = ScheduleStatus::Scheduled;
    }

    /// Timestamp of the terminal transition, falling back to creation time.
    pub fn settled_at(&self) -> DateTime<Utc> {
        self.completed_at
            .or(self.failed_at)
            .or(self.cancelled_at)
            .unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule_in(minutes: i64) -> Schedule {
        Schedule::new(
            UploadRequest::new("/tmp/clip_0.mp4", "Clip 0"),
            Utc::now() + chrono::Duration::minutes(minutes),
            "UTC",
        )
    }

    #[test]
    fn test_schedule_due() {
        let sched = schedule_in(-1);
        assert!(sched.is_due(Utc::now()));

        let sched = schedule_in(10);
        assert!(!sched.is_due(Utc::now()));
    }

    #[test]
    fn test_cancelled_schedule_is_never_due() {
        let mut sched = schedule_in(-1);
        sched.cancel();
        assert_eq!(sched.status, ScheduleStatus::Cancelled);
        assert!(!sched.is_due(Utc::now()));
        assert!(sched.cancelled_at.is_some());
    }

    #[test]
    fn test_hand_off_outcomes() {
        let mut sched = schedule_in(-1);
        sched.mark_executing();
        assert_eq!(sched.status, ScheduleStatus::Executing);

        let job_id = JobId::new();
        sched.complete(job_id.clone());
        assert_eq!(sched.status, ScheduleStatus::Completed);
        assert_eq!(sched.job_id, Some(job_id));

        let mut sched = schedule_in(-1);
        sched.mark_executing();
        sched.fail("queue unavailable");
        assert_eq!(sched.status, ScheduleStatus::Failed);
        assert_eq!(sched.error.as_deref(), Some("queue unavailable"));
    }

    #[test]
    fn test_schedule_serde_roundtrip() {
        let sched = schedule_in(5);
        let json = serde_json::to_string(&sched).expect("serialize Schedule");
        let decoded: Schedule = serde_json::from_str(&json).expect("deserialize Schedule");
        assert_eq!(decoded.id, sched.id);
        assert_eq!(decoded.scheduled_time, sched.scheduled_time);
        assert_eq!(decoded.status, ScheduleStatus::Scheduled);
    }
}
