//! Durable job queue, retry policy, and workers.

pub mod job;
pub mod memory;
pub mod queue;
pub mod retry;
pub mod worker;

use anyhow::Result;
use chrono::Utc;
use tracing::info;

pub use job::{
    Job, JobData, JobOptions, JobState, JobStatusView, SCRAPE_BILL_DETAILS, SCRAPE_SOURCE,
};
pub use memory::MemoryJobQueue;
pub use queue::{JobQueue, PostgresJobQueue};
pub use retry::RetryPolicy;
pub use worker::{spawn_workers, JobHandler, JobProgress, JobWorker, JobWorkerConfig};

/// Housekeeping pass: fail stale exhausted jobs, then purge anything older
/// than `retention`. Returns the number of purged jobs.
pub async fn housekeeping(queue: &dyn JobQueue, retention: chrono::Duration) -> Result<u64> {
    let stale = queue.fail_stale().await?;
    let purged = queue.purge_older_than(Utc::now() - retention).await?;

    info!(stale, purged, "job housekeeping finished");
    Ok(purged)
}
