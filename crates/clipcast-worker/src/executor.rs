//! Semaphore-bounded job executor.
//!
//! The executor polls the store for eligible jobs, claims them up to the
//! per-kind concurrency limit and runs each claimed job on its own task.
//! Progress events flow through an unbounded channel into a forwarder that
//! persists the monotonic percent and fans the event out to listeners; the
//! pipeline itself never touches the store.
//!
//! Cancellation is detected through the store: a job removed while its
//! pipeline is in flight simply has its result discarded when the attempt
//! finishes.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use clipcast_models::{Job, JobKind, JobPayload, JobState};
use clipcast_queue::{JobStore, ProgressHub, ProgressStage, ProgressUpdate};

use crate::adapters::noop::{NoopClipProcessor, NoopContentGenerator, NoopDownloader, NoopUploader};
use crate::config::WorkerConfig;
use crate::pipeline::{run_process, run_upload, Adapters};

/// Runs claimed jobs with bounded concurrency per job kind.
pub struct Executor {
    store: Arc<dyn JobStore>,
    hub: ProgressHub,
    adapters: Adapters,
    config: WorkerConfig,
    process_slots: Arc<Semaphore>,
    upload_slots: Arc<Semaphore>,
}

impl Executor {
    pub fn new(
        store: Arc<dyn JobStore>,
        hub: ProgressHub,
        adapters: Adapters,
        config: WorkerConfig,
    ) -> Self {
        let process_slots = Arc::new(Semaphore::new(config.max_concurrent_process));
        let upload_slots = Arc::new(Semaphore::new(config.max_concurrent_upload));
        Self {
            store,
            hub,
            adapters,
            config,
            process_slots,
            upload_slots,
        }
    }

    /// Convenience constructor wiring the no-op adapter set.
    pub fn with_noop_adapters(
        store: Arc<dyn JobStore>,
        hub: ProgressHub,
        config: WorkerConfig,
    ) -> Self {
        let adapters = Adapters {
            downloader: Arc::new(NoopDownloader),
            clip_processor: Arc::new(NoopClipProcessor),
            content_generator: Arc::new(NoopContentGenerator),
            uploader: Arc::new(NoopUploader),
        };
        Self::new(store, hub, adapters, config)
    }

    /// Poll-claim-spawn loop. Returns once `shutdown` flips to true and
    /// in-flight jobs have drained (or the shutdown timeout elapsed).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            process_slots = self.config.max_concurrent_process,
            upload_slots = self.config.max_concurrent_upload,
            "Executor started"
        );

        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            while tasks.try_join_next().is_some() {}

            self.dispatch(JobKind::ProcessVideo, &self.process_slots, &mut tasks)
                .await;
            self.dispatch(JobKind::UploadVideo, &self.upload_slots, &mut tasks)
                .await;
        }

        info!(in_flight = tasks.len(), "Executor draining");
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if timeout(self.config.shutdown_timeout, drain).await.is_err() {
            warn!("Shutdown timeout elapsed with jobs still in flight");
        }
        info!("Executor stopped");
    }

    /// Claim eligible jobs of one kind while free slots remain.
    async fn dispatch(&self, kind: JobKind, slots: &Arc<Semaphore>, tasks: &mut JoinSet<()>) {
        loop {
            let Ok(permit) = Arc::clone(slots).try_acquire_owned() else {
                return;
            };
            let job = match self.store.claim(kind, Utc::now()).await {
                Ok(Some(job)) => job,
                Ok(None) => return,
                Err(e) => {
                    warn!(kind = %kind, "Claim failed: {e}");
                    return;
                }
            };

            let store = Arc::clone(&self.store);
            let hub = self.hub.clone();
            let adapters = self.adapters.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let _permit = permit;
                execute_job(store, hub, adapters, config, job).await;
            });
        }
    }
}

/// Run one claimed job to an outcome and persist the transition.
async fn execute_job(
    store: Arc<dyn JobStore>,
    hub: ProgressHub,
    adapters: Adapters,
    config: WorkerConfig,
    job: Job,
) {
    let job_id = job.id.clone();
    info!(job_id = %job_id, kind = %job.kind, attempt = job.attempts, "Job started");

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
    let forwarder = {
        let store = Arc::clone(&store);
        let hub = hub.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                hub.emit(update.clone());
                match store.get(&id).await {
                    Ok(Some(mut current)) if current.state == JobState::Active => {
                        current.set_progress(update.percent);
                        if let Err(e) = store.update(&current).await {
                            debug!(job_id = %id, "Progress write skipped: {e}");
                        }
                    }
                    // Removed or no longer active; keep draining events.
                    _ => {}
                }
            }
        })
    };

    let outcome = match &job.payload {
        JobPayload::Process(request) => run_process(&adapters, &job_id, request, &tx).await,
        JobPayload::Upload(request) => run_upload(&adapters, &job_id, request, &tx).await,
    };

    // Close the channel and let the forwarder drain before the terminal
    // write, so a stale progress value can never overwrite it.
    drop(tx);
    let _ = forwarder.await;

    let current = match store.get(&job_id).await {
        Ok(current) => current,
        Err(e) => {
            warn!(job_id = %job_id, "Lost the job record after execution: {e}");
            return;
        }
    };
    let Some(mut current) = current else {
        info!(job_id = %job_id, "Job cancelled mid-flight; result discarded");
        return;
    };
    if current.state != JobState::Active {
        debug!(job_id = %job_id, state = %current.state, "Job no longer active; result discarded");
        return;
    }

    match outcome {
        Ok(result) => {
            current.complete(result);
            if let Err(e) = store.update(&current).await {
                warn!(job_id = %job_id, "Completion write failed: {e}");
                return;
            }
            hub.emit(ProgressUpdate::new(
                job_id.clone(),
                ProgressStage::Completed,
                100,
                "completed",
            ));
            info!(job_id = %job_id, "Job completed");
        }
        Err(e) if e.is_retryable() && current.can_retry() => {
            let delay = config.backoff_delay(current.attempts);
            let at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
            current.requeue(at);
            if let Err(write_err) = store.update(&current).await {
                warn!(job_id = %job_id, "Requeue write failed: {write_err}");
                return;
            }
            hub.emit(ProgressUpdate::new(
                job_id.clone(),
                ProgressStage::Queued,
                0,
                format!("retrying: {e}"),
            ));
            warn!(
                job_id = %job_id,
                attempt = current.attempts,
                delay_ms = delay.as_millis() as u64,
                "Job attempt failed, requeued: {e}"
            );
        }
        Err(e) => {
            current.fail(e.to_string());
            if let Err(write_err) = store.update(&current).await {
                warn!(job_id = %job_id, "Failure write failed: {write_err}");
                return;
            }
            hub.emit(ProgressUpdate::new(
                job_id.clone(),
                ProgressStage::Failed,
                current.progress,
                e.to_string(),
            ));
            error!(job_id = %job_id, attempts = current.attempts, "Job failed terminally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{DownloadedSource, Downloader, ProgressSink};
    use crate::error::{WorkerError, WorkerResult};
    use async_trait::async_trait;
    use clipcast_models::{JobResult, ProcessRequest, SourceMetadata};
    use clipcast_queue::MemoryJobStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            retry_base_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            shutdown_timeout: Duration::from_secs(1),
            ..WorkerConfig::default()
        }
    }

    struct CountingFailingDownloader {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Downloader for CountingFailingDownloader {
        async fn fetch(
            &self,
            _request: &ProcessRequest,
            _progress: &dyn ProgressSink,
        ) -> WorkerResult<DownloadedSource> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(WorkerError::download_failed("origin returned 403"))
        }
    }

    struct SlowDownloader {
        delay: Duration,
    }

    #[async_trait]
    impl Downloader for SlowDownloader {
        async fn fetch(
            &self,
            _request: &ProcessRequest,
            progress: &dyn ProgressSink,
        ) -> WorkerResult<DownloadedSource> {
            progress.on_progress(10, "downloading");
            tokio::time::sleep(self.delay).await;
            Ok(DownloadedSource {
                path: "/tmp/slow.mp4".into(),
                metadata: SourceMetadata {
                    title: "slow".into(),
                    description: String::new(),
                    tags: Vec::new(),
                    duration_secs: 10.0,
                },
            })
        }
    }

    fn noop_adapters() -> Adapters {
        Adapters {
            downloader: Arc::new(NoopDownloader),
            clip_processor: Arc::new(NoopClipProcessor),
            content_generator: Arc::new(NoopContentGenerator),
            uploader: Arc::new(NoopUploader),
        }
    }

    fn spawn_executor(
        store: Arc<dyn JobStore>,
        hub: ProgressHub,
        adapters: Adapters,
        config: WorkerConfig,
    ) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            Executor::new(store, hub, adapters, config)
                .run(shutdown_rx)
                .await;
        });
        shutdown_tx
    }

    #[tokio::test]
    async fn completes_process_job_end_to_end() {
        let store: Arc<dyn JobStore> = MemoryJobStore::shared();
        let hub = ProgressHub::new();
        let mut events = hub.subscribe();

        let job = Job::new_process(ProcessRequest::new("https://example.com/v"));
        let job_id = job.id.clone();
        store.insert(job).await.unwrap();

        let shutdown = spawn_executor(
            Arc::clone(&store),
            hub.clone(),
            noop_adapters(),
            fast_config(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = shutdown.send(true);

        let job = store.get(&job_id).await.unwrap().expect("job persists");
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert!(matches!(job.result, Some(JobResult::Processed { .. })));

        let mut saw_completed = false;
        while let Ok(event) = events.try_recv() {
            if event.stage == ProgressStage::Completed {
                assert_eq!(event.percent, 100);
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_fails_terminally() {
        let store: Arc<dyn JobStore> = MemoryJobStore::shared();
        let calls = Arc::new(AtomicU32::new(0));
        let mut adapters = noop_adapters();
        adapters.downloader = Arc::new(CountingFailingDownloader {
            calls: Arc::clone(&calls),
        });

        let job = Job::new_process(ProcessRequest::new("https://example.com/v"));
        let job_id = job.id.clone();
        store.insert(job).await.unwrap();

        let shutdown = spawn_executor(
            Arc::clone(&store),
            ProgressHub::new(),
            adapters,
            fast_config(),
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        let _ = shutdown.send(true);

        let job = store.get(&job_id).await.unwrap().expect("job persists");
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 3);
        assert!(job
            .failure_reason
            .as_deref()
            .unwrap_or_default()
            .contains("403"));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "no fourth attempt");
    }

    #[tokio::test]
    async fn first_failure_requeues_with_backoff() {
        let store: Arc<dyn JobStore> = MemoryJobStore::shared();
        let calls = Arc::new(AtomicU32::new(0));
        let mut adapters = noop_adapters();
        adapters.downloader = Arc::new(CountingFailingDownloader {
            calls: Arc::clone(&calls),
        });

        // A large base delay parks the job in the delayed state after the
        // first failure so the intermediate transition is observable.
        let config = WorkerConfig {
            retry_base_delay: Duration::from_secs(30),
            poll_interval: Duration::from_millis(5),
            ..WorkerConfig::default()
        };

        let job = Job::new_process(ProcessRequest::new("https://example.com/v"));
        let job_id = job.id.clone();
        store.insert(job).await.unwrap();

        let shutdown = spawn_executor(Arc::clone(&store), ProgressHub::new(), adapters, config);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = shutdown.send(true);

        let job = store.get(&job_id).await.unwrap().expect("job persists");
        assert_eq!(job.state, JobState::Delayed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.progress, 0, "progress resets on requeue");
        let eligible_at = job.eligible_at.expect("backoff deadline set");
        assert!(eligible_at > Utc::now() + chrono::Duration::seconds(20));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_job_result_is_discarded() {
        let store: Arc<dyn JobStore> = MemoryJobStore::shared();
        let mut adapters = noop_adapters();
        adapters.downloader = Arc::new(SlowDownloader {
            delay: Duration::from_millis(200),
        });

        let job = Job::new_process(ProcessRequest::new("https://example.com/v"));
        let job_id = job.id.clone();
        store.insert(job).await.unwrap();

        let shutdown = spawn_executor(
            Arc::clone(&store),
            ProgressHub::new(),
            adapters,
            fast_config(),
        );

        // Let the job go active, then cancel it mid-download.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.remove(&job_id).await.unwrap());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let _ = shutdown.send(true);

        assert!(
            store.get(&job_id).await.unwrap().is_none(),
            "finished attempt must not resurrect a cancelled job"
        );
    }

    #[tokio::test]
    async fn persists_intermediate_progress() {
        let store: Arc<dyn JobStore> = MemoryJobStore::shared();
        let mut adapters = noop_adapters();
        adapters.downloader = Arc::new(SlowDownloader {
            delay: Duration::from_millis(150),
        });

        let job = Job::new_process(ProcessRequest::new("https://example.com/v"));
        let job_id = job.id.clone();
        store.insert(job).await.unwrap();

        let shutdown = spawn_executor(
            Arc::clone(&store),
            ProgressHub::new(),
            adapters,
            fast_config(),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        let mid = store.get(&job_id).await.unwrap().expect("job persists");
        assert_eq!(mid.state, JobState::Active);
        assert!(mid.progress >= 10, "download start persisted");
        assert!(mid.progress < 100);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = shutdown.send(true);
        let done = store.get(&job_id).await.unwrap().expect("job persists");
        assert_eq!(done.state, JobState::Completed);
    }
}
