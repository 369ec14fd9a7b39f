//! Bridge from the scheduler's hand-off capability to the queue.

use std::sync::Arc;

use async_trait::async_trait;

use clipcast_models::{JobId, UploadRequest};
use clipcast_queue::Orchestrator;
use clipcast_scheduler::JobSubmitter;

/// Hands fired schedules to the queue as immediately-eligible upload jobs.
pub struct QueueSubmitter {
    orchestrator: Arc<Orchestrator>,
}

impl QueueSubmitter {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobSubmitter for QueueSubmitter {
    async fn submit_upload(&self, request: UploadRequest) -> Result<JobId, String> {
        self.orchestrator
            .submit_upload(request, None)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipcast_models::JobState;

    #[tokio::test]
    async fn submits_an_immediately_eligible_upload_job() {
        let orchestrator = Arc::new(Orchestrator::new(
            clipcast_queue::MemoryJobStore::shared(),
            clipcast_queue::ProgressHub::new(),
        ));
        let submitter = QueueSubmitter::new(Arc::clone(&orchestrator));

        let job_id = submitter
            .submit_upload(UploadRequest::new("/tmp/clip_0.mp4", "Clip 0"))
            .await
            .unwrap();

        let job = orchestrator.get_status(&job_id).await.unwrap();
        assert_eq!(job.state, JobState::Waiting);
    }
}
