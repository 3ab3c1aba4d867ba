//! Inbound service surface.
//!
//! Every operation passes admission control first, then delegates to the
//! ingestion actions, the job queue, or the bill repository. Nothing here
//! blocks on extraction work: enqueue returns once the job row exists.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::{IngestError, IngestResult};
use crate::domains::bills::{Bill, BillStatistics, ListOptions, SearchQuery};
use crate::domains::ingestion::{self, EnqueuedJob};
use crate::kernel::admission::AdmissionControl;
use crate::kernel::jobs::{self, JobStatusView};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub store_reachable: bool,
    pub queue_reachable: bool,
    pub remote_configured: bool,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.store_reachable && self.queue_reachable
    }
}

#[derive(Clone)]
pub struct IngestService {
    deps: ServerDeps,
    admission: AdmissionControl,
}

impl IngestService {
    pub fn new(deps: ServerDeps, admission: AdmissionControl) -> Self {
        Self { deps, admission }
    }

    pub fn deps(&self) -> &ServerDeps {
        &self.deps
    }

    pub async fn enqueue_job(
        &self,
        source_id: &str,
        options: EnqueueOptions,
    ) -> IngestResult<Uuid> {
        self.admission.check()?;
        ingestion::enqueue_scrape(&self.deps, source_id, options.force_refresh).await
    }

    pub async fn enqueue_all(&self, options: EnqueueOptions) -> IngestResult<Vec<EnqueuedJob>> {
        self.admission.check()?;
        ingestion::enqueue_all(&self.deps, options.force_refresh).await
    }

    pub async fn enqueue_bill_details(
        &self,
        source_id: &str,
        limit: Option<i64>,
    ) -> IngestResult<Uuid> {
        self.admission.check()?;
        ingestion::enqueue_details(&self.deps, source_id, limit).await
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> IngestResult<JobStatusView> {
        self.admission.check()?;
        self.deps
            .queue
            .find(job_id)
            .await?
            .map(|job| job.status_view())
            .ok_or_else(|| IngestError::NotFound(format!("job {}", job_id)))
    }

    pub async fn list_bills(
        &self,
        source_id: &str,
        options: ListOptions,
    ) -> IngestResult<Vec<Bill>> {
        self.admission.check()?;
        self.deps.bills.list(source_id, &options).await
    }

    pub async fn get_bill(&self, source_id: &str, bill_number: &str) -> IngestResult<Bill> {
        self.admission.check()?;
        self.deps.bills.get(source_id, bill_number).await
    }

    pub async fn search_bills(&self, query: SearchQuery) -> IngestResult<Vec<Bill>> {
        self.admission.check()?;
        self.deps.bills.search(&query).await
    }

    pub async fn get_statistics(&self) -> IngestResult<BillStatistics> {
        self.admission.check()?;
        self.deps.bills.statistics().await
    }

    /// Fail stale jobs and delete everything past the retention window.
    pub async fn purge_expired(&self) -> IngestResult<u64> {
        self.admission.check()?;
        let purged =
            jobs::housekeeping(self.deps.queue.as_ref(), self.deps.settings.job_retention).await?;
        info!(purged, "Expired jobs purged");
        Ok(purged)
    }

    pub async fn health(&self) -> IngestResult<HealthSnapshot> {
        self.admission.check()?;

        let store_reachable = match self.deps.bills.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Bill store unreachable");
                false
            }
        };
        let queue_reachable = match self.deps.queue.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Job queue unreachable");
                false
            }
        };

        Ok(HealthSnapshot {
            store_reachable,
            queue_reachable,
            remote_configured: self.deps.has_remote(),
        })
    }
}
