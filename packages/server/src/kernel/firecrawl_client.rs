use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use firecrawl_client::{FirecrawlClient, ScrapeRequest};

use super::{BaseRemoteExtractor, RemoteExtractRequest};

/// Firecrawl implementation of BaseRemoteExtractor
pub struct FirecrawlExtractor {
    client: FirecrawlClient,
}

impl FirecrawlExtractor {
    pub fn new(api_key: String) -> Self {
        Self {
            client: FirecrawlClient::new(api_key),
        }
    }

    /// Use a non-default API endpoint (self-hosted Firecrawl)
    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            client: FirecrawlClient::new(api_key).with_base_url(base_url),
        }
    }

    fn to_scrape_request(request: &RemoteExtractRequest) -> ScrapeRequest {
        let mut scrape = ScrapeRequest::extract(&request.url, &request.prompt)
            .with_schema(request.schema.clone())
            .force_refresh(request.force_refresh);
        scrape.wait_for = request.wait_for_ms;
        scrape.only_main_content = request.only_main_content;
        scrape.timeout = request.timeout.as_millis() as u64;
        scrape
    }
}

#[async_trait]
impl BaseRemoteExtractor for FirecrawlExtractor {
    async fn extract(&self, request: &RemoteExtractRequest) -> Result<serde_json::Value> {
        let scrape = Self::to_scrape_request(request);
        let json = self.client.extract_json(&scrape).await?;
        Ok(json)
    }

    async fn extract_batch(
        &self,
        requests: &[RemoteExtractRequest],
        batch_size: usize,
        delay: Duration,
    ) -> Vec<Result<serde_json::Value>> {
        let scrapes: Vec<ScrapeRequest> = requests.iter().map(Self::to_scrape_request).collect();

        self.client
            .batch_extract(&scrapes, batch_size, delay)
            .await
            .into_iter()
            .map(|outcome| outcome.map_err(anyhow::Error::from))
            .collect()
    }
}
