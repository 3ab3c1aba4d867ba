//! Ingestion actions - enqueueing and job execution.
//!
//! Enqueue functions validate the request against the source registry and
//! write a waiting job; they never do extraction work themselves. The
//! `IngestJobHandler` runs claimed jobs.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::details::scrape_bill_details;
use super::strategy;
use crate::common::{IngestError, IngestResult};
use crate::domains::bills::normalize::normalize_bills;
use crate::kernel::jobs::{Job, JobHandler, JobProgress, SCRAPE_BILL_DETAILS, SCRAPE_SOURCE};
use crate::kernel::ServerDeps;

/// Job created by a fan-out enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueuedJob {
    pub source_id: String,
    pub job_id: Uuid,
}

fn max_attempts(deps: &ServerDeps) -> i32 {
    i32::try_from(deps.retry.max_attempts).unwrap_or(i32::MAX)
}

/// Enqueue a scrape of one source. Returns as soon as the job row exists.
pub async fn enqueue_scrape(
    deps: &ServerDeps,
    source_id: &str,
    force_refresh: bool,
) -> IngestResult<Uuid> {
    if !deps.registry.accepts(source_id) {
        return Err(IngestError::InvalidSource(source_id.to_string()));
    }

    let job = Job::scrape_source(source_id, force_refresh, max_attempts(deps));
    let job_id = deps.queue.enqueue(job).await?;

    info!(job_id = %job_id, source = %source_id, force_refresh, "Scrape job enqueued");
    Ok(job_id)
}

/// Enqueue a scrape of every registered source, in registry order.
pub async fn enqueue_all(deps: &ServerDeps, force_refresh: bool) -> IngestResult<Vec<EnqueuedJob>> {
    let mut jobs = Vec::with_capacity(deps.registry.sources().len());

    for source_id in deps.registry.ids() {
        let job_id = enqueue_scrape(deps, source_id, force_refresh).await?;
        jobs.push(EnqueuedJob {
            source_id: source_id.to_string(),
            job_id,
        });
    }

    info!(count = jobs.len(), "Enqueued scrape jobs for all sources");
    Ok(jobs)
}

/// Enqueue a details enrichment run for one source.
pub async fn enqueue_details(
    deps: &ServerDeps,
    source_id: &str,
    limit: Option<i64>,
) -> IngestResult<Uuid> {
    if !deps.registry.accepts(source_id) {
        return Err(IngestError::InvalidSource(source_id.to_string()));
    }

    let limit = limit
        .filter(|l| *l > 0)
        .unwrap_or(deps.settings.default_detail_limit);
    let job = Job::bill_details(source_id, limit, max_attempts(deps));
    let job_id = deps.queue.enqueue(job).await?;

    info!(job_id = %job_id, source = %source_id, limit, "Details job enqueued");
    Ok(job_id)
}

/// Scrape one source end to end and describe the outcome.
pub async fn scrape_source(
    deps: &ServerDeps,
    job: &Job,
    progress: &JobProgress,
) -> IngestResult<Value> {
    let source = deps
        .registry
        .resolve(&job.source_id)
        .ok_or_else(|| IngestError::InvalidSource(job.source_id.clone()))?;
    progress.set(20).await;

    let extraction = strategy::extract(deps, &source, job.options.force_refresh).await;
    progress.set(50).await;
    let extraction = extraction?;
    let strategy = extraction.strategy();

    let now = Utc::now();
    let records = normalize_bills(extraction.into_records(), source.id(), now);
    let bills_found = records.len();
    if bills_found == 0 {
        return Err(IngestError::NoRecordsFound {
            source_id: source.id().to_string(),
        });
    }
    progress.set(70).await;

    let save_result = deps.bills.batch_upsert(records).await;
    if save_result.saved() == 0 {
        return Err(IngestError::Backend(anyhow::anyhow!(
            "failed to save any of {} bills for {}",
            save_result.failed,
            source.id()
        )));
    }
    if save_result.failed > 0 {
        warn!(source = %source.id(), failed = save_result.failed, "Some bills were not saved");
    }
    progress.set(100).await;

    info!(
        source = %source.id(),
        strategy,
        bills_found,
        created = save_result.created,
        updated = save_result.updated,
        "Source scrape finished"
    );

    Ok(json!({
        "source": source.id(),
        "bills_found": bills_found,
        "save_result": save_result,
        "strategy": strategy,
        "timestamp": now,
    }))
}

/// Runs claimed ingestion jobs, dispatching on job type.
pub struct IngestJobHandler {
    deps: ServerDeps,
}

impl IngestJobHandler {
    pub fn new(deps: ServerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for IngestJobHandler {
    async fn handle(&self, job: &Job, progress: &JobProgress) -> IngestResult<Value> {
        match job.job_type.as_str() {
            SCRAPE_SOURCE => scrape_source(&self.deps, job, progress).await,
            SCRAPE_BILL_DETAILS => {
                let limit = job
                    .options
                    .detail_limit
                    .unwrap_or(self.deps.settings.default_detail_limit);
                let summary =
                    scrape_bill_details(&self.deps, &job.source_id, limit, progress).await?;
                progress.set(100).await;

                Ok(json!({
                    "source": job.source_id,
                    "details": summary,
                    "timestamp": Utc::now(),
                }))
            }
            other => Err(IngestError::Backend(anyhow::anyhow!("unknown job type: {}", other))),
        }
    }
}
