//! Plain HTTP page fetcher used when remote extraction is unavailable.
//!
//! No JavaScript rendering: selector rules only see the server-rendered markup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA};
use std::time::Duration;
use tracing::debug;

use super::BasePageFetcher;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; ProvincialBillsTracker/1.0; +https://github.com/provincial-bills-tracker)";

/// Request timeout for a single page
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Simple page fetcher using reqwest
pub struct SimpleScraper {
    client: reqwest::Client,
}

impl SimpleScraper {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-CA,en;q=0.8,fr-CA;q=0.6"));

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    fn refresh_headers(force_refresh: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if force_refresh {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        headers
    }
}

#[async_trait]
impl BasePageFetcher for SimpleScraper {
    async fn fetch(&self, url: &str, force_refresh: bool) -> Result<String> {
        debug!(url = %url, force_refresh, "Fetching page");

        let response = self
            .client
            .get(url)
            .headers(Self::refresh_headers(force_refresh))
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        response
            .text()
            .await
            .context("Failed to read response body")
    }
}
