//! Submission and query API over the durable queue.
//!
//! The orchestrator owns job records end to end: submission, status
//! queries, cancellation, forced retry and the retention sweep. Execution
//! is driven by workers claiming jobs from the same store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use clipcast_models::{Job, JobId, JobState, ProcessRequest, UploadRequest};

use crate::error::{QueueError, QueueResult};
use crate::progress::{ProgressHub, ProgressStage, ProgressUpdate};
use crate::store::JobStore;

pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    hub: ProgressHub,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>, hub: ProgressHub) -> Self {
        Self { store, hub }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    /// Enqueue a `process-video` job.
    pub async fn submit_processing(&self, request: ProcessRequest) -> QueueResult<JobId> {
        let job = Job::new_process(request);
        let id = job.id.clone();
        self.store.insert(job).await?;

        info!(job_id = %id, "Submitted process-video job");
        self.hub.emit(ProgressUpdate::new(
            id.clone(),
            ProgressStage::Queued,
            0,
            "queued",
        ));
        Ok(id)
    }

    /// Enqueue an `upload-video` job, optionally delayed until `scheduled_time`.
    pub async fn submit_upload(
        &self,
        request: UploadRequest,
        scheduled_time: Option<DateTime<Utc>>,
    ) -> QueueResult<JobId> {
        let mut job = Job::new_upload(request);
        if let Some(at) = scheduled_time {
            job = job.delayed_until(at);
        }
        let id = job.id.clone();
        let state = job.state;
        self.store.insert(job).await?;

        info!(job_id = %id, state = %state, "Submitted upload-video job");
        self.hub.emit(ProgressUpdate::new(
            id.clone(),
            ProgressStage::Queued,
            0,
            "queued",
        ));
        Ok(id)
    }

    /// Fetch a job by id.
    pub async fn get_status(&self, id: &JobId) -> QueueResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::job_not_found(id))
    }

    /// List jobs matching a state filter; an empty filter lists all.
    pub async fn list_jobs(&self, states: &[JobState]) -> QueueResult<Vec<Job>> {
        self.store.list(states).await
    }

    /// Remove a job record. An adapter call already in flight is not
    /// interrupted; its eventual result is discarded because the record
    /// is gone.
    pub async fn cancel(&self, id: &JobId) -> QueueResult<()> {
        if !self.store.remove(id).await? {
            return Err(QueueError::job_not_found(id));
        }
        info!(job_id = %id, "Cancelled job");
        Ok(())
    }

    /// Force re-execution of a failed job with a fresh attempt budget.
    pub async fn retry(&self, id: &JobId) -> QueueResult<()> {
        let mut job = self.get_status(id).await?;
        if job.state != JobState::Failed {
            return Err(QueueError::invalid_state(format!(
                "job {id} is {}, only failed jobs can be retried",
                job.state
            )));
        }
        job.reset_for_retry();
        self.store.update(&job).await?;

        info!(job_id = %id, "Requeued failed job for retry");
        self.hub
            .emit(ProgressUpdate::new(id.clone(), ProgressStage::Queued, 0, "retry"));
        Ok(())
    }

    /// Retention sweep: remove terminal jobs settled before the cutoff.
    /// Returns the number of records removed.
    pub async fn sweep(&self, max_age: Duration) -> QueueResult<usize> {
        let cutoff = Utc::now() - max_age;
        let terminal = self
            .store
            .list(&[JobState::Completed, JobState::Failed])
            .await?;

        let mut removed = 0;
        for job in terminal {
            let settled = job.completed_at.unwrap_or(job.updated_at);
            if settled < cutoff && self.store.remove(&job.id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Swept terminal jobs");
        }
        Ok(removed)
    }
}
