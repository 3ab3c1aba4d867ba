//! Pure Firecrawl REST API client.
//!
//! Covers the single-page `/scrape` endpoint with LLM-backed structured
//! extraction, plus a throttled batch helper for scraping many pages without
//! tripping the service's rate limits.
//!
//! # Example
//!
//! ```rust,ignore
//! use firecrawl_client::{FirecrawlClient, ScrapeRequest};
//!
//! let client = FirecrawlClient::new("fc-...".into());
//! let request = ScrapeRequest::extract("https://www.ola.org/en/legislative-business/bills", "List every bill")
//!     .with_schema(schema);
//! let json = client.extract_json(&request).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{FirecrawlError, Result};
pub use types::{JsonOptions, PageMetadata, ScrapeData, ScrapeFormat, ScrapeRequest, ScrapeResponse};

use std::time::Duration;

const BASE_URL: &str = "https://api.firecrawl.dev/v1";

/// Extra client-side allowance on top of the server-side scrape timeout.
const TIMEOUT_SLACK: Duration = Duration::from_secs(5);

pub struct FirecrawlClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FirecrawlClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a self-hosted instance or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Scrape one page. Returns the `data` block of a successful response.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeData> {
        let url = format!("{}/scrape", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_millis(request.timeout) + TIMEOUT_SLACK)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: ScrapeResponse = resp.json().await?;
        if !body.success {
            return Err(FirecrawlError::Unsuccessful(
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        body.data
            .ok_or_else(|| FirecrawlError::MissingData(request.url.clone()))
    }

    /// Scrape one page and return only its structured extraction output.
    pub async fn extract_json(&self, request: &ScrapeRequest) -> Result<serde_json::Value> {
        let data = self.scrape(request).await?;
        data.json
            .ok_or_else(|| FirecrawlError::MissingData(request.url.clone()))
    }

    /// Extract many pages, `batch_size` at a time, sleeping `delay` between batches.
    ///
    /// Results are returned in request order; one failed page does not affect the others.
    pub async fn batch_extract(
        &self,
        requests: &[ScrapeRequest],
        batch_size: usize,
        delay: Duration,
    ) -> Vec<Result<serde_json::Value>> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(requests.len());

        for (index, batch) in requests.chunks(batch_size).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            tracing::debug!(batch = index, size = batch.len(), "Extracting Firecrawl batch");
            let outcomes =
                futures::future::join_all(batch.iter().map(|request| self.extract_json(request)))
                    .await;
            results.extend(outcomes);
        }

        results
    }
}
