// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Which URL to extract, with which prompt, and what to do with the result
// belongs to the ingestion domain.
//
// Naming convention: Base* for trait names (e.g., BaseRemoteExtractor, BasePageFetcher)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Remote extraction (Infrastructure - AI-assisted structured scraping)
// =============================================================================

/// One structured-extraction call against a remote scraping service.
#[derive(Debug, Clone)]
pub struct RemoteExtractRequest {
    pub url: String,
    pub prompt: String,
    pub schema: serde_json::Value,
    /// Milliseconds the service waits for client-side rendering
    pub wait_for_ms: u64,
    pub only_main_content: bool,
    pub timeout: Duration,
    /// Bypass any cached copy held by the service
    pub force_refresh: bool,
}

impl RemoteExtractRequest {
    pub fn new(
        url: impl Into<String>,
        prompt: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            url: url.into(),
            prompt: prompt.into(),
            schema,
            wait_for_ms: 2_000,
            only_main_content: true,
            timeout: Duration::from_secs(30),
            force_refresh: false,
        }
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }
}

#[async_trait]
pub trait BaseRemoteExtractor: Send + Sync {
    /// Extract structured JSON from a page (returns the raw extraction payload)
    async fn extract(&self, request: &RemoteExtractRequest) -> Result<serde_json::Value>;

    /// Extract many pages, `batch_size` concurrently, pausing `delay` between batches.
    /// Results come back in request order.
    async fn extract_batch(
        &self,
        requests: &[RemoteExtractRequest],
        batch_size: usize,
        delay: Duration,
    ) -> Vec<Result<serde_json::Value>> {
        let mut results = Vec::with_capacity(requests.len());
        for (index, batch) in requests.chunks(batch_size.max(1)).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcomes =
                futures::future::join_all(batch.iter().map(|request| self.extract(request))).await;
            results.extend(outcomes);
        }
        results
    }
}

// =============================================================================
// Raw page fetch (Infrastructure - plain HTTP)
// =============================================================================

#[async_trait]
pub trait BasePageFetcher: Send + Sync {
    /// Fetch raw markup for a URL
    async fn fetch(&self, url: &str, force_refresh: bool) -> Result<String>;
}
