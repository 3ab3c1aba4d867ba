//! Job worker service for processing ingestion jobs.
//!
//! The `JobWorker` is a long-running task that:
//! - Polls the queue for runnable jobs (claim under a lease)
//! - Hands each job to a `JobHandler`
//! - Extends the lease by heartbeat while the handler runs
//! - Records completion, or schedules a retry with backoff, or fails the job
//!   once its attempt budget is spent
//!
//! # Architecture
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► Claim jobs (JobQueue::claim)
//!     ├─► JobHandler::handle(job, progress)
//!     │       └─► strategy → normalize → upsert
//!     └─► mark_completed / mark_failed(retry_at)
//! ```
//!
//! Shutdown only stops claiming. Jobs already claimed run to completion.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::Job;
use super::queue::JobQueue;
use super::retry::RetryPolicy;
use crate::common::IngestResult;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// How often to send heartbeats for running jobs
    pub heartbeat_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(30),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Progress writer handed to a running job.
///
/// Progress is advisory: a failed write is logged and never fails the job.
pub struct JobProgress {
    queue: Arc<dyn JobQueue>,
    job_id: Uuid,
    worker_id: String,
}

impl JobProgress {
    pub fn new(queue: Arc<dyn JobQueue>, job_id: Uuid, worker_id: impl Into<String>) -> Self {
        Self {
            queue,
            job_id,
            worker_id: worker_id.into(),
        }
    }

    pub async fn set(&self, progress: i32) {
        match self.queue.set_progress(self.job_id, &self.worker_id, progress).await {
            Ok(true) => {}
            Ok(false) => warn!(
                job_id = %self.job_id,
                worker_id = %self.worker_id,
                progress,
                "progress dropped, job no longer owned by this worker"
            ),
            Err(e) => {
                warn!(job_id = %self.job_id, progress, error = %e, "failed to record progress")
            }
        }
    }
}

/// Executes one claimed job and returns its result payload.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job, progress: &JobProgress) -> IngestResult<serde_json::Value>;
}

/// A job worker that processes jobs from a queue.
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    retry: RetryPolicy,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        retry: RetryPolicy,
        config: JobWorkerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            retry,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Process a single claimed job.
    pub async fn process_job(&self, job: Job) {
        let job_id = job.id;
        let job_type = job.job_type.clone();
        let worker_id = self.config.worker_id.as_str();
        let progress = JobProgress::new(self.queue.clone(), job_id, worker_id);

        debug!(
            job_id = %job_id,
            job_type = %job_type,
            source = %job.source_id,
            attempt = job.attempts_made,
            "job started"
        );

        match self.execute_with_heartbeat(&job, &progress).await {
            Ok(result) => {
                info!(job_id = %job_id, job_type = %job_type, "job completed");
                match self.queue.mark_completed(job_id, worker_id, result).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        job_id = %job_id,
                        worker_id = %worker_id,
                        "completion dropped, job no longer owned by this worker"
                    ),
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "failed to mark job as completed")
                    }
                }
            }
            Err(e) => {
                let reason = e.to_string();
                let retry_at =
                    self.retry
                        .next_attempt_at(job.attempts_made, job.max_attempts, Utc::now());

                match retry_at {
                    Some(at) => warn!(
                        job_id = %job_id,
                        job_type = %job_type,
                        attempt = job.attempts_made,
                        retry_at = %at,
                        error = %reason,
                        "job failed, retry scheduled"
                    ),
                    None => error!(
                        job_id = %job_id,
                        job_type = %job_type,
                        attempts = job.attempts_made,
                        error = %reason,
                        "job failed permanently"
                    ),
                }

                match self.queue.mark_failed(job_id, worker_id, &reason, retry_at).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        job_id = %job_id,
                        worker_id = %worker_id,
                        "failure dropped, job no longer owned by this worker"
                    ),
                    Err(e) => error!(job_id = %job_id, error = %e, "failed to mark job as failed"),
                }
            }
        }
    }

    /// Execute a job with periodic heartbeats.
    async fn execute_with_heartbeat(
        &self,
        job: &Job,
        progress: &JobProgress,
    ) -> IngestResult<serde_json::Value> {
        let queue = self.queue.clone();
        let job_id = job.id;
        let worker_id = self.config.worker_id.clone();
        let heartbeat_interval = self.config.heartbeat_interval;

        // Spawn heartbeat task
        let heartbeat_cancel = CancellationToken::new();
        let heartbeat_token = heartbeat_cancel.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = heartbeat_token.cancelled() => break,
                    _ = interval.tick() => {
                        match queue.heartbeat(job_id, &worker_id).await {
                            Ok(true) => {}
                            Ok(false) => {
                                warn!(job_id = %job_id, worker_id = %worker_id, "lease lost");
                                break;
                            }
                            Err(e) => warn!(job_id = %job_id, error = %e, "heartbeat failed"),
                        }
                    }
                }
            }
        });

        let result = self.handler.handle(job, progress).await;

        // Stop heartbeat
        heartbeat_cancel.cancel();
        let _ = heartbeat_handle.await;

        result
    }

    /// Claim and process one batch. Returns how many jobs were processed.
    pub async fn run_once(&self) -> Result<usize> {
        let jobs = self
            .queue
            .claim(&self.config.worker_id, self.config.batch_size)
            .await?;

        if jobs.is_empty() {
            return Ok(0);
        }

        let count = jobs.len();
        debug!(count, worker_id = %self.config.worker_id, "claimed jobs");

        // Process jobs concurrently
        futures::future::join_all(jobs.into_iter().map(|job| self.process_job(job))).await;

        Ok(count)
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            "job worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(0) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job worker stopped");
        Ok(())
    }
}

/// Spawn `count` independent workers sharing one queue and handler.
pub fn spawn_workers(
    count: usize,
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    retry: RetryPolicy,
    config: JobWorkerConfig,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<Result<()>>> {
    (0..count.max(1))
        .map(|index| {
            let config = JobWorkerConfig {
                worker_id: format!("{}-{}", config.worker_id, index),
                ..config.clone()
            };
            let worker = JobWorker::new(queue.clone(), handler.clone(), retry, config);
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}
