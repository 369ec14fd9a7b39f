//! Timezone-aware upload scheduling.
//!
//! The scheduler owns schedule records and their firing. There are no
//! in-process one-shot timers to lose: a periodic due-scan (`tick`) claims
//! due records from the store and hands their upload payloads to the
//! injected `JobSubmitter`. Restart recovery is therefore just reopening
//! the store: future schedules fire on time, and schedules whose time
//! elapsed while the process was down fire on the first tick.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{error, info, warn};

use clipcast_models::{JobId, Schedule, ScheduleId, ScheduleStatus, UploadRequest};

use crate::clock::Clock;
use crate::error::{SchedulerError, SchedulerResult};
use crate::pattern::DistributionPattern;
use crate::store::ScheduleStore;

/// Narrow capability for handing an upload job to the queue. Keeps the
/// dependency one-directional: the orchestrator never sees the scheduler.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit_upload(&self, request: UploadRequest) -> Result<JobId, String>;
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Due-scan interval
    pub poll_interval: StdDuration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: StdDuration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            poll_interval: StdDuration::from_millis(
                std::env::var("SCHEDULER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn ScheduleStore>,
    submitter: Arc<dyn JobSubmitter>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        submitter: Arc<dyn JobSubmitter>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            submitter,
            clock,
            config,
        }
    }

    /// Interpret a local wall-clock time in an IANA timezone and normalize
    /// to UTC.
    fn to_utc(local: NaiveDateTime, timezone: &str) -> SchedulerResult<DateTime<Utc>> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(timezone.to_string()))?;
        match tz.from_local_datetime(&local) {
            chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            // DST fall-back repeats an hour; take the earlier instant.
            chrono::LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
            chrono::LocalResult::None => Err(SchedulerError::invalid_time(format!(
                "{local} does not exist in {timezone}"
            ))),
        }
    }

    fn validate_future(&self, at: DateTime<Utc>) -> SchedulerResult<()> {
        if at <= self.clock.now() {
            return Err(SchedulerError::invalid_time(format!(
                "scheduled time {at} is not in the future"
            )));
        }
        Ok(())
    }

    /// Schedule one upload. The time is interpreted in `timezone` and must
    /// be strictly in the future.
    pub async fn schedule_upload(
        &self,
        upload: UploadRequest,
        local_time: NaiveDateTime,
        timezone: &str,
    ) -> SchedulerResult<Schedule> {
        let at = Self::to_utc(local_time, timezone)?;
        self.validate_future(at)?;

        let schedule = Schedule::new(upload, at, timezone);
        self.store.put(schedule.clone()).await?;
        info!(
            schedule_id = %schedule.id,
            scheduled_time = %schedule.scheduled_time,
            timezone = %schedule.timezone,
            "Scheduled upload"
        );
        Ok(schedule)
    }

    /// Schedule a batch of uploads spread by a distribution pattern.
    ///
    /// All computed times are validated before anything is persisted, so a
    /// single bad entry aborts the whole batch and leaves no records.
    pub async fn schedule_bulk(
        &self,
        uploads: Vec<UploadRequest>,
        pattern: DistributionPattern,
        timezone: &str,
    ) -> SchedulerResult<Vec<Schedule>> {
        let local_times = pattern.compute_times(uploads.len())?;

        let mut times = Vec::with_capacity(local_times.len());
        for local in local_times {
            let at = Self::to_utc(local, timezone)?;
            self.validate_future(at)?;
            times.push(at);
        }

        let mut schedules = Vec::with_capacity(uploads.len());
        for (upload, at) in uploads.into_iter().zip(times) {
            let schedule = Schedule::new(upload, at, timezone);
            self.store.put(schedule.clone()).await?;
            schedules.push(schedule);
        }
        info!(count = schedules.len(), "Scheduled bulk uploads");
        Ok(schedules)
    }

    /// Cancel a pending schedule. Only valid while `scheduled`; a cancelled
    /// record never fires, even after its original time elapses.
    pub async fn cancel_schedule(&self, id: &ScheduleId) -> SchedulerResult<Schedule> {
        let mut schedule = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::not_found(id))?;

        if schedule.status != ScheduleStatus::Scheduled {
            return Err(SchedulerError::invalid_status(format!(
                "schedule {id} is {}, only scheduled records can be cancelled",
                schedule.status
            )));
        }
        schedule.cancel();
        self.store.put(schedule.clone()).await?;
        info!(schedule_id = %id, "Cancelled schedule");
        Ok(schedule)
    }

    /// Replace the pending fire time of a schedule.
    pub async fn reschedule(
        &self,
        id: &ScheduleId,
        local_time: NaiveDateTime,
        timezone: &str,
    ) -> SchedulerResult<Schedule> {
        let mut schedule = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::not_found(id))?;

        if schedule.status != ScheduleStatus::Scheduled {
            return Err(SchedulerError::invalid_status(format!(
                "schedule {id} is {}, only scheduled records can be rescheduled",
                schedule.status
            )));
        }

        let at = Self::to_utc(local_time, timezone)?;
        self.validate_future(at)?;
        schedule.reschedule(at, timezone);
        self.store.put(schedule.clone()).await?;
        info!(schedule_id = %id, scheduled_time = %at, "Rescheduled upload");
        Ok(schedule)
    }

    /// The `limit` soonest still-future scheduled records, ascending.
    pub async fn get_upcoming(&self, limit: usize) -> SchedulerResult<Vec<Schedule>> {
        let now = self.clock.now();
        let mut upcoming: Vec<Schedule> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|s| s.status == ScheduleStatus::Scheduled && s.scheduled_time > now)
            .collect();
        upcoming.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        upcoming.truncate(limit);
        Ok(upcoming)
    }

    /// Permanently delete settled (non-`scheduled`) records older than the
    /// cutoff. Returns the number removed.
    pub async fn cleanup(&self, max_age_days: i64) -> SchedulerResult<usize> {
        let cutoff = self.clock.now() - Duration::days(max_age_days);
        let mut removed = 0;
        for schedule in self.store.list().await? {
            if schedule.status != ScheduleStatus::Scheduled
                && schedule.settled_at() < cutoff
                && self.store.delete(&schedule.id).await?
            {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Cleaned up settled schedules");
        }
        Ok(removed)
    }

    /// One due-scan pass: claim due schedules and hand each to the queue.
    /// Hand-off failures are terminal for that schedule only and never
    /// propagate to the caller. Returns how many schedules fired.
    pub async fn tick(&self) -> SchedulerResult<usize> {
        let now = self.clock.now();
        let due = self.store.claim_due(now).await?;
        let fired = due.len();

        for mut schedule in due {
            let overdue = now - schedule.scheduled_time;
            if overdue > Duration::seconds(30) {
                warn!(
                    schedule_id = %schedule.id,
                    scheduled_time = %schedule.scheduled_time,
                    "Firing overdue schedule (missed while down?)"
                );
            }

            match self.submitter.submit_upload(schedule.upload.clone()).await {
                Ok(job_id) => {
                    info!(schedule_id = %schedule.id, job_id = %job_id, "Schedule fired");
                    schedule.complete(job_id);
                }
                Err(e) => {
                    error!(schedule_id = %schedule.id, "Schedule hand-off failed: {e}");
                    schedule.fail(e);
                }
            }
            if let Err(e) = self.store.put(schedule).await {
                error!("Failed to persist schedule outcome: {e}");
            }
        }
        Ok(fired)
    }

    /// Periodic due-scan loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.config.poll_interval, "Starting schedule due-scan loop");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received, stopping scheduler");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.tick().await {
                        error!("Due-scan failed: {e}");
                    }
                }
            }
        }
    }
}
