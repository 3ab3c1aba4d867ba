//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! - Job housekeeping (fail stale jobs, purge expired ones) on `PURGE_SCHEDULE`
//! - Optional periodic scrape of every registered source on `SCRAPE_SCHEDULE`
//!
//! # Architecture
//!
//! Scheduled tasks run independently of the job workers.
//! They only enqueue jobs or prune the queue; they never scrape directly.
//!
//! ```text
//! Scheduler (cron)
//!     │
//!     ├─► housekeeping() → fail_stale + purge_older_than(now - retention)
//!     └─► enqueue_all()  → one scrape-source job per registered source
//! ```

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::ingestion;
use crate::kernel::jobs::housekeeping;
use crate::kernel::ServerDeps;

/// Start all scheduled tasks
pub async fn start_scheduler(
    deps: ServerDeps,
    purge_schedule: &str,
    scrape_schedule: Option<&str>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let purge_deps = deps.clone();
    let purge_job = Job::new_async(purge_schedule, move |_uuid, _lock| {
        let deps = purge_deps.clone();
        Box::pin(async move {
            if let Err(e) = housekeeping(deps.queue.as_ref(), deps.settings.job_retention).await {
                tracing::error!("Job housekeeping task failed: {}", e);
            }
        })
    })?;

    scheduler.add(purge_job).await?;

    if let Some(schedule) = scrape_schedule {
        let scrape_deps = deps.clone();
        let scrape_job = Job::new_async(schedule, move |_uuid, _lock| {
            let deps = scrape_deps.clone();
            Box::pin(async move {
                if let Err(e) = run_periodic_scrape(&deps).await {
                    tracing::error!("Periodic scrape task failed: {}", e);
                }
            })
        })?;

        scheduler.add(scrape_job).await?;
    }

    scheduler.start().await?;

    tracing::info!(
        purge_schedule,
        scrape_schedule = scrape_schedule.unwrap_or("disabled"),
        "Scheduled tasks started"
    );
    Ok(scheduler)
}

/// Enqueue a scrape of every registered source.
async fn run_periodic_scrape(deps: &ServerDeps) -> Result<()> {
    tracing::info!("Running periodic scrape task");

    let jobs = ingestion::enqueue_all(deps, false).await?;

    tracing::info!("Queued {} periodic scrape jobs", jobs.len());
    Ok(())
}
