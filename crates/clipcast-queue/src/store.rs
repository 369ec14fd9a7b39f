//! Durable job store abstraction and in-memory implementation.
//!
//! Workers coordinate exclusively through a `JobStore`; the `claim`
//! operation is the worker-slot hand-off point and must be atomic so that
//! any number of consumers can share one queue.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use clipcast_models::{Job, JobId, JobKind, JobState};

use crate::error::{QueueError, QueueResult};

/// Concurrency-safe persistence for jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn insert(&self, job: Job) -> QueueResult<()>;

    /// Fetch a job by id.
    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>>;

    /// Overwrite an existing job. Fails with `JobNotFound` if the record
    /// was removed (e.g. cancelled) in the meantime.
    async fn update(&self, job: &Job) -> QueueResult<()>;

    /// Remove a job outright. Returns whether a record existed.
    async fn remove(&self, id: &JobId) -> QueueResult<bool>;

    /// List jobs whose state matches the filter; an empty filter lists all.
    async fn list(&self, states: &[JobState]) -> QueueResult<Vec<Job>>;

    /// Atomically take the oldest eligible job of a kind and mark it
    /// active. Exactly one concurrent caller wins a given job.
    async fn claim(&self, kind: JobKind, now: DateTime<Utc>) -> QueueResult<Option<Job>>;
}

/// In-memory job store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    jobs: HashMap<JobId, Job>,
    /// Submission order, used to claim the oldest eligible job first.
    order: Vec<JobId>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner.order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(id).cloned())
    }

    async fn update(&self, job: &Job) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.jobs.contains_key(&job.id) {
            return Err(QueueError::job_not_found(&job.id));
        }
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn remove(&self, id: &JobId) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.order.retain(|j| j != id);
        Ok(inner.jobs.remove(id).is_some())
    }

    async fn list(&self, states: &[JobState]) -> QueueResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| states.is_empty() || states.contains(&j.state))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn claim(&self, kind: JobKind, now: DateTime<Utc>) -> QueueResult<Option<Job>> {
        let mut inner = self.inner.lock().await;
        let candidate = inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .find(|j| j.kind == kind && j.is_eligible(now))
            .map(|j| j.id.clone());

        let Some(id) = candidate else {
            return Ok(None);
        };

        let job = inner.jobs.get_mut(&id).expect("claimed id present");
        job.start();
        Ok(Some(job.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipcast_models::{ProcessRequest, UploadRequest};

    fn process_job() -> Job {
        Job::new_process(ProcessRequest::new("https://example.com/v"))
    }

    #[tokio::test]
    async fn claim_takes_oldest_eligible_job() {
        let store = MemoryJobStore::new();
        let first = process_job();
        let second = process_job();
        let first_id = first.id.clone();

        store.insert(first).await.unwrap();
        store.insert(second).await.unwrap();

        let claimed = store
            .claim(JobKind::ProcessVideo, Utc::now())
            .await
            .unwrap()
            .expect("a job is eligible");
        assert_eq!(claimed.id, first_id);
        assert_eq!(claimed.state, JobState::Active);
        assert_eq!(claimed.attempts, 1);
    }

    #[tokio::test]
    async fn claim_skips_delayed_jobs_until_due() {
        let store = MemoryJobStore::new();
        let due_at = Utc::now() + chrono::Duration::minutes(10);
        let job = Job::new_upload(UploadRequest::new("/tmp/a.mp4", "a")).delayed_until(due_at);
        store.insert(job).await.unwrap();

        assert!(store
            .claim(JobKind::UploadVideo, Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .claim(JobKind::UploadVideo, due_at)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn claim_respects_kind() {
        let store = MemoryJobStore::new();
        store.insert(process_job()).await.unwrap();

        assert!(store
            .claim(JobKind::UploadVideo, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_win_distinct_jobs() {
        let store = MemoryJobStore::shared();
        store.insert(process_job()).await.unwrap();
        store.insert(process_job()).await.unwrap();

        let (a, b) = tokio::join!(
            store.claim(JobKind::ProcessVideo, Utc::now()),
            store.claim(JobKind::ProcessVideo, Utc::now()),
        );
        let a = a.unwrap().expect("first claim");
        let b = b.unwrap().expect("second claim");
        assert_ne!(a.id, b.id);

        assert!(store
            .claim(JobKind::ProcessVideo, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_after_remove_reports_not_found() {
        let store = MemoryJobStore::new();
        let mut job = process_job();
        store.insert(job.clone()).await.unwrap();
        assert!(store.remove(&job.id).await.unwrap());

        job.set_progress(50);
        let err = store.update(&job).await.unwrap_err();
        assert!(matches!(err, QueueError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_state() {
        let store = MemoryJobStore::new();
        let mut done = process_job();
        done.start();
        done.fail("x");
        store.insert(done).await.unwrap();
        store.insert(process_job()).await.unwrap();

        let failed = store.list(&[JobState::Failed]).await.unwrap();
        assert_eq!(failed.len(), 1);
        let all = store.list(&[]).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
