//! Wiring: build the production `ServerDeps` from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::domains::bills::{BillRepository, PostgresBillStore};
use crate::domains::sources::SourceRegistry;
use crate::kernel::admission::AdmissionControl;
use crate::kernel::jobs::{JobQueue, PostgresJobQueue};
use crate::kernel::{
    BasePageFetcher, BaseRemoteExtractor, FirecrawlExtractor, ServerDeps, SimpleScraper,
};
use crate::server::service::IngestService;

/// Build dependencies over Postgres, creating tables when missing.
pub async fn build_deps(pool: PgPool, config: &Config) -> Result<ServerDeps> {
    let registry = SourceRegistry::load(config.source_registry_path.as_deref())
        .context("Failed to load source registry")?;
    info!(sources = registry.sources().len(), "Source registry loaded");

    let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(pool.clone()));
    queue
        .ensure_schema()
        .await
        .context("Failed to create job queue schema")?;

    let bills = Arc::new(BillRepository::new(Arc::new(PostgresBillStore::new(pool))));

    // Use Firecrawl if API key is provided, otherwise fallback fetch only
    let remote: Option<Arc<dyn BaseRemoteExtractor>> = match config.firecrawl_api_key.clone() {
        Some(key) => {
            let extractor = match config.firecrawl_base_url.as_deref() {
                Some(base_url) => FirecrawlExtractor::with_base_url(key, base_url),
                None => FirecrawlExtractor::new(key),
            };
            Some(Arc::new(extractor) as Arc<dyn BaseRemoteExtractor>)
        }
        None => {
            warn!("FIRECRAWL_API_KEY not set, remote extraction disabled");
            None
        }
    };

    let fetcher: Arc<dyn BasePageFetcher> = Arc::new(SimpleScraper::new()?);

    Ok(ServerDeps::new(
        bills,
        queue,
        Arc::new(registry),
        remote,
        fetcher,
        config.retry_policy(),
        config.ingest_settings(),
    ))
}

/// Service surface with admission control from configuration.
pub fn build_service(deps: ServerDeps, config: &Config) -> IngestService {
    let admission = AdmissionControl::new(config.rate_limit_max_requests, config.rate_limit_window);
    IngestService::new(deps, admission)
}
