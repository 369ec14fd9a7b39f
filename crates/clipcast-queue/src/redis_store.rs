//! Redis-backed job store.
//!
//! Layout: one JSON string per job under `clipcast:job:{id}`, an index set
//! `clipcast:jobs`, and one ready ZSET per job kind scored by the epoch
//! millisecond at which the job becomes eligible. Claims are settled by
//! ZREM: the caller whose removal succeeds owns the job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::{debug, warn};

use clipcast_models::{Job, JobId, JobKind, JobState};

use crate::error::{QueueError, QueueResult};
use crate::store::JobStore;

const JOB_KEY_PREFIX: &str = "clipcast:job:";
const INDEX_KEY: &str = "clipcast:jobs";
const READY_KEY_PREFIX: &str = "clipcast:ready:";

/// How many contested candidates to step past before giving up a claim pass.
const CLAIM_ATTEMPTS: usize = 8;

pub struct RedisJobStore {
    client: redis::Client,
}

impl RedisJobStore {
    /// Create a store against a Redis URL.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from the `REDIS_URL` environment variable.
    pub fn from_env() -> QueueResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    fn job_key(id: &JobId) -> String {
        format!("{JOB_KEY_PREFIX}{id}")
    }

    fn ready_key(kind: JobKind) -> String {
        format!("{READY_KEY_PREFIX}{kind}")
    }

    fn ready_score(job: &Job) -> i64 {
        job.eligible_at.unwrap_or(job.created_at).timestamp_millis()
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert(&self, job: Job) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job)?;

        redis::pipe()
            .atomic()
            .set(Self::job_key(&job.id), &payload)
            .ignore()
            .sadd(INDEX_KEY, job.id.as_str())
            .ignore()
            .zadd(Self::ready_key(job.kind), job.id.as_str(), Self::ready_score(&job))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job_id = %job.id, kind = %job.kind, "Inserted job");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(Self::job_key(id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(job)?;

        // SET XX so a record removed by cancellation is not resurrected.
        let written: Option<String> = redis::cmd("SET")
            .arg(Self::job_key(&job.id))
            .arg(&payload)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        if written.is_none() {
            return Err(QueueError::job_not_found(&job.id));
        }

        // Keep the ready ZSET in step with the new state.
        match job.state {
            JobState::Waiting | JobState::Delayed => {
                conn.zadd::<_, _, _, ()>(
                    Self::ready_key(job.kind),
                    job.id.as_str(),
                    Self::ready_score(job),
                )
                .await?;
            }
            _ => {
                conn.zrem::<_, _, ()>(Self::ready_key(job.kind), job.id.as_str())
                    .await?;
            }
        }
        Ok(())
    }

    async fn remove(&self, id: &JobId) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let (deleted,): (u32,) = redis::pipe()
            .atomic()
            .del(Self::job_key(id))
            .srem(INDEX_KEY, id.as_str())
            .ignore()
            .zrem(Self::ready_key(JobKind::ProcessVideo), id.as_str())
            .ignore()
            .zrem(Self::ready_key(JobKind::UploadVideo), id.as_str())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn list(&self, states: &[JobState]) -> QueueResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(INDEX_KEY).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<String> = conn.get(format!("{JOB_KEY_PREFIX}{id}")).await?;
            if let Some(json) = payload {
                match serde_json::from_str::<Job>(&json) {
                    Ok(job) => {
                        if states.is_empty() || states.contains(&job.state) {
                            jobs.push(job);
                        }
                    }
                    Err(e) => warn!(job_id = %id, "Skipping unreadable job record: {e}"),
                }
            }
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn claim(&self, kind: JobKind, now: DateTime<Utc>) -> QueueResult<Option<Job>> {
        let mut conn = self.conn().await?;
        let ready_key = Self::ready_key(kind);
        let now_ms = now.timestamp_millis();

        for _ in 0..CLAIM_ATTEMPTS {
            let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
                .arg(&ready_key)
                .arg("-inf")
                .arg(now_ms)
                .arg("LIMIT")
                .arg(0)
                .arg(1)
                .query_async(&mut conn)
                .await?;
            let Some(id) = due.into_iter().next() else {
                return Ok(None);
            };

            // Only the worker whose ZREM succeeds owns the job.
            let removed: u32 = conn.zrem(&ready_key, &id).await?;
            if removed == 0 {
                continue;
            }

            let payload: Option<String> = conn.get(format!("{JOB_KEY_PREFIX}{id}")).await?;
            let Some(json) = payload else {
                // Record was cancelled while queued; drop the stale index entry.
                conn.srem::<_, _, ()>(INDEX_KEY, &id).await?;
                continue;
            };

            let mut job: Job = serde_json::from_str(&json)?;
            job.start();
            let updated = serde_json::to_string(&job)?;
            // SET XX: cancellation can delete the record between the GET
            // above and this write; a cancelled job must not come back
            // as active.
            let written: Option<String> = redis::cmd("SET")
                .arg(format!("{JOB_KEY_PREFIX}{id}"))
                .arg(updated)
                .arg("XX")
                .query_async(&mut conn)
                .await?;
            if written.is_none() {
                conn.srem::<_, _, ()>(INDEX_KEY, &id).await?;
                continue;
            }
            debug!(job_id = %job.id, kind = %kind, "Claimed job");
            return Ok(Some(job));
        }

        Ok(None)
    }
}
