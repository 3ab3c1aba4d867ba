//! Server dependencies for ingestion (using traits for testability)
//!
//! This module provides the central dependency container used by the job
//! handler and the service surface. All external services use trait
//! abstractions so tests can swap in in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use crate::domains::bills::BillRepository;
use crate::domains::sources::SourceRegistry;
use crate::kernel::jobs::{JobQueue, RetryPolicy};
use crate::kernel::{BasePageFetcher, BaseRemoteExtractor};

/// Tunables that are not tied to a single backend.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Concurrent requests per remote extraction batch
    pub remote_batch_size: usize,
    /// Pause between remote extraction batches
    pub remote_batch_delay: Duration,
    /// Jobs older than this are purged regardless of state
    pub job_retention: chrono::Duration,
    /// Upper bound on bills a details job visits when the caller gives none
    pub default_detail_limit: i64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            remote_batch_size: 5,
            remote_batch_delay: Duration::from_secs(1),
            job_retention: chrono::Duration::hours(24),
            default_detail_limit: 50,
        }
    }
}

/// Server dependencies accessible to job handlers and services
#[derive(Clone)]
pub struct ServerDeps {
    pub bills: Arc<BillRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub registry: Arc<SourceRegistry>,
    /// Remote extraction (optional; without it every scrape uses the fallback path)
    pub remote: Option<Arc<dyn BaseRemoteExtractor>>,
    pub fetcher: Arc<dyn BasePageFetcher>,
    pub retry: RetryPolicy,
    pub settings: IngestSettings,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    pub fn new(
        bills: Arc<BillRepository>,
        queue: Arc<dyn JobQueue>,
        registry: Arc<SourceRegistry>,
        remote: Option<Arc<dyn BaseRemoteExtractor>>,
        fetcher: Arc<dyn BasePageFetcher>,
        retry: RetryPolicy,
        settings: IngestSettings,
    ) -> Self {
        Self {
            bills,
            queue,
            registry,
            remote,
            fetcher,
            retry,
            settings,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}
