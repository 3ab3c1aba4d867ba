//! In-memory job queue for tests and single-process development runs.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::job::{Job, JobState};
use super::queue::JobQueue;

/// Same claim and lease rules as the Postgres queue, held in a `HashMap`.
pub struct MemoryJobQueue {
    jobs: RwLock<HashMap<Uuid, Job>>,
    lease: chrono::Duration,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::with_lease_duration(Duration::from_secs(60))
    }

    pub fn with_lease_duration(lease: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            lease: chrono::Duration::from_std(lease)
                .unwrap_or_else(|_| chrono::Duration::minutes(1)),
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// The job, if it is active and still owned by `worker_id`.
    fn owned_mut<'a>(
        jobs: &'a mut HashMap<Uuid, Job>,
        job_id: Uuid,
        worker_id: &str,
    ) -> Option<&'a mut Job> {
        jobs.get_mut(&job_id).filter(|job| {
            job.state() == JobState::Active && job.worker_id.as_deref() == Some(worker_id)
        })
    }

    fn is_runnable(job: &Job, now: DateTime<Utc>) -> bool {
        match job.state() {
            JobState::Waiting => job.run_at <= now,
            JobState::Active => {
                job.lease_expires_at.is_some_and(|lease| lease < now)
                    && job.attempts_made < job.max_attempts
            }
            _ => false,
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn enqueue(&self, job: Job) -> Result<Uuid> {
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        Ok(id)
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;

        let mut runnable: Vec<&mut Job> = jobs
            .values_mut()
            .filter(|job| Self::is_runnable(job, now))
            .collect();
        runnable.sort_by_key(|job| (job.run_at, job.created_at));

        Ok(runnable
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|job| {
                job.state = JobState::Active.to_string();
                job.attempts_made += 1;
                job.lease_expires_at = Some(now + self.lease);
                job.worker_id = Some(worker_id.to_string());
                job.updated_at = now;
                job.clone()
            })
            .collect())
    }

    async fn set_progress(&self, job_id: Uuid, worker_id: &str, progress: i32) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = Self::owned_mut(&mut jobs, job_id, worker_id) else {
            return Ok(false);
        };

        job.progress = job.progress.max(progress.clamp(0, 100));
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = Self::owned_mut(&mut jobs, job_id, worker_id) else {
            return Ok(false);
        };

        let now = Utc::now();
        job.lease_expires_at = Some(now + self.lease);
        job.updated_at = now;
        Ok(true)
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = Self::owned_mut(&mut jobs, job_id, worker_id) else {
            return Ok(false);
        };

        let now = Utc::now();
        job.state = JobState::Completed.to_string();
        job.progress = 100;
        job.result = Some(Json(result));
        job.failure_reason = None;
        job.lease_expires_at = None;
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        reason: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = Self::owned_mut(&mut jobs, job_id, worker_id) else {
            return Ok(false);
        };

        let now = Utc::now();
        job.failure_reason = Some(reason.to_string());
        job.lease_expires_at = None;
        job.updated_at = now;
        match retry_at {
            Some(run_at) => {
                job.state = JobState::Waiting.to_string();
                job.run_at = run_at;
                job.worker_id = None;
            }
            None => {
                job.state = JobState::Failed.to_string();
                job.finished_at = Some(now);
            }
        }
        Ok(true)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.created_at >= cutoff);
        Ok((before - jobs.len()) as u64)
    }

    async fn fail_stale(&self) -> Result<u64> {
        let now = Utc::now();
        let mut failed = 0;
        for job in self.jobs.write().await.values_mut() {
            let expired = job.lease_expires_at.is_some_and(|lease| lease < now);
            if job.state() == JobState::Active && expired && job.attempts_made >= job.max_attempts {
                job.state = JobState::Failed.to_string();
                job.failure_reason
                    .get_or_insert_with(|| "worker lease expired on final attempt".to_string());
                job.lease_expires_at = None;
                job.finished_at = Some(now);
                job.updated_at = now;
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
