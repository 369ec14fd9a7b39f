//! Schedule persistence.
//!
//! The store is the only shared mutable state between scheduler instances,
//! so `claim_due` must hand each due schedule to exactly one caller; two
//! workers never race on the same schedule's firing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use clipcast_models::{Schedule, ScheduleId, ScheduleStatus};

use crate::error::{SchedulerError, SchedulerResult};

/// Concurrency-safe persistence for schedules.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Fetch a schedule by id.
    async fn get(&self, id: &ScheduleId) -> SchedulerResult<Option<Schedule>>;

    /// Insert or overwrite a schedule.
    async fn put(&self, schedule: Schedule) -> SchedulerResult<()>;

    /// Delete a schedule. Returns whether a record existed.
    async fn delete(&self, id: &ScheduleId) -> SchedulerResult<bool>;

    /// List all persisted schedules.
    async fn list(&self) -> SchedulerResult<Vec<Schedule>>;

    /// Atomically flip every due `scheduled` record to `executing` and
    /// return them. Exactly one concurrent caller receives a given record.
    async fn claim_due(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Schedule>>;
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryScheduleStore {
    inner: Mutex<HashMap<ScheduleId, Schedule>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn get(&self, id: &ScheduleId) -> SchedulerResult<Option<Schedule>> {
        Ok(self.inner.lock().await.get(id).cloned())
    }

    async fn put(&self, schedule: Schedule) -> SchedulerResult<()> {
        self.inner.lock().await.insert(schedule.id.clone(), schedule);
        Ok(())
    }

    async fn delete(&self, id: &ScheduleId) -> SchedulerResult<bool> {
        Ok(self.inner.lock().await.remove(id).is_some())
    }

    async fn list(&self) -> SchedulerResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self.inner.lock().await.values().cloned().collect();
        schedules.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        Ok(schedules)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Schedule>> {
        let mut inner = self.inner.lock().await;
        let mut due = Vec::new();
        for schedule in inner.values_mut() {
            if schedule.is_due(now) {
                schedule.mark_executing();
                due.push(schedule.clone());
            }
        }
        due.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        Ok(due)
    }
}

/// File-backed store: one JSON document holding every record, rewritten
/// atomically (write-to-temp then rename) on each mutation. Survives
/// process restarts, which is what schedule recovery depends on.
pub struct JsonFileScheduleStore {
    path: PathBuf,
    inner: Mutex<HashMap<ScheduleId, Schedule>>,
}

impl JsonFileScheduleStore {
    /// Open a store at `path`, loading any existing records.
    pub async fn open(path: impl Into<PathBuf>) -> SchedulerResult<Self> {
        let path = path.into();
        let records = Self::load(&path).await?;
        Ok(Self {
            path,
            inner: Mutex::new(records),
        })
    }

    async fn load(path: &Path) -> SchedulerResult<HashMap<ScheduleId, Schedule>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let schedules: Vec<Schedule> = serde_json::from_slice(&bytes)?;
                Ok(schedules.into_iter().map(|s| (s.id.clone(), s)).collect())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the whole file; the rename makes the swap atomic so a crash
    /// mid-write never corrupts the previous contents.
    async fn persist(&self, records: &HashMap<ScheduleId, Schedule>) -> SchedulerResult<()> {
        let mut schedules: Vec<&Schedule> = records.values().collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let json = serde_json::to_vec_pretty(&schedules)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for JsonFileScheduleStore {
    async fn get(&self, id: &ScheduleId) -> SchedulerResult<Option<Schedule>> {
        Ok(self.inner.lock().await.get(id).cloned())
    }

    async fn put(&self, schedule: Schedule) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.insert(schedule.id.clone(), schedule);
        self.persist(&inner).await
    }

    async fn delete(&self, id: &ScheduleId) -> SchedulerResult<bool> {
        let mut inner = self.inner.lock().await;
        let existed = inner.remove(id).is_some();
        if existed {
            self.persist(&inner).await?;
        }
        Ok(existed)
    }

    async fn list(&self) -> SchedulerResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self.inner.lock().await.values().cloned().collect();
        schedules.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        Ok(schedules)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Schedule>> {
        let mut inner = self.inner.lock().await;
        let mut due = Vec::new();
        for schedule in inner.values_mut() {
            if schedule.is_due(now) {
                schedule.mark_executing();
                due.push(schedule.clone());
            }
        }
        if !due.is_empty() {
            if let Err(e) = self.persist(&inner).await {
                warn!("Failed to persist claimed schedules: {e}");
                return Err(e);
            }
            due.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        }
        Ok(due)
    }
}
