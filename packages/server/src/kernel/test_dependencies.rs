// TestDependencies - mock implementations for testing
//
// Provides mock outbound services and in-memory backends that can be
// bundled into ServerDeps for tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::deps::{IngestSettings, ServerDeps};
use super::jobs::{MemoryJobQueue, RetryPolicy};
use super::{BasePageFetcher, BaseRemoteExtractor, RemoteExtractRequest};
use crate::domains::bills::{BillRepository, MemoryBillStore};
use crate::domains::sources::SourceRegistry;

// =============================================================================
// Mock Remote Extractor
// =============================================================================

/// Canned outcome for one remote call
#[derive(Debug, Clone)]
enum MockOutcome {
    Json(serde_json::Value),
    Error(String),
}

impl MockOutcome {
    fn into_result(self) -> Result<serde_json::Value> {
        match self {
            MockOutcome::Json(value) => Ok(value),
            MockOutcome::Error(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

pub struct MockRemoteExtractor {
    by_url: Arc<Mutex<HashMap<String, MockOutcome>>>,
    responses: Arc<Mutex<Vec<MockOutcome>>>,
    calls: Arc<Mutex<Vec<RemoteExtractRequest>>>,
}

impl MockRemoteExtractor {
    pub fn new() -> Self {
        Self {
            by_url: Arc::new(Mutex::new(HashMap::new())),
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a JSON payload, returned by the next call with no URL-specific response
    pub fn with_response(self, json: serde_json::Value) -> Self {
        self.responses.lock().unwrap().push(MockOutcome::Json(json));
        self
    }

    /// Queue a failure
    pub fn with_error(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(MockOutcome::Error(message.to_string()));
        self
    }

    /// Always answer `url` with this payload
    pub fn with_response_for(self, url: &str, json: serde_json::Value) -> Self {
        self.by_url
            .lock()
            .unwrap()
            .insert(url.to_string(), MockOutcome::Json(json));
        self
    }

    /// Always fail for `url`
    pub fn with_error_for(self, url: &str, message: &str) -> Self {
        self.by_url
            .lock()
            .unwrap()
            .insert(url.to_string(), MockOutcome::Error(message.to_string()));
        self
    }

    /// Get all requests that were made
    pub fn calls(&self) -> Vec<RemoteExtractRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a URL was requested
    pub fn was_called_for(&self, url: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c.url == url)
    }
}

impl Default for MockRemoteExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseRemoteExtractor for MockRemoteExtractor {
    async fn extract(&self, request: &RemoteExtractRequest) -> Result<serde_json::Value> {
        // Record the call
        self.calls.lock().unwrap().push(request.clone());

        if let Some(outcome) = self.by_url.lock().unwrap().get(&request.url) {
            return outcome.clone().into_result();
        }

        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            responses.remove(0).into_result()
        } else {
            Err(anyhow::anyhow!("remote service unavailable for {}", request.url))
        }
    }
}

// =============================================================================
// Mock Page Fetcher
// =============================================================================

/// Arguments captured from a fetch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub url: String,
    pub force_refresh: bool,
}

pub struct MockPageFetcher {
    pages: Arc<Mutex<HashMap<String, String>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<FetchCall>>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self {
            pages: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve `markup` for `url`
    pub fn with_page(self, url: &str, markup: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), markup.to_string());
        self
    }

    /// Fail every fetch of `url`
    pub fn with_failure(self, url: &str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_fetched(&self, url: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c.url == url)
    }
}

impl Default for MockPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePageFetcher for MockPageFetcher {
    async fn fetch(&self, url: &str, force_refresh: bool) -> Result<String> {
        self.calls.lock().unwrap().push(FetchCall {
            url: url.to_string(),
            force_refresh,
        });

        if let Some(message) = self.failures.lock().unwrap().get(url) {
            anyhow::bail!("{}", message);
        }

        // Unknown pages render as an empty document
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub remote: Option<Arc<MockRemoteExtractor>>,
    pub fetcher: Arc<MockPageFetcher>,
    pub queue: Arc<MemoryJobQueue>,
    pub store: Arc<MemoryBillStore>,
    pub registry: Arc<SourceRegistry>,
    pub retry: RetryPolicy,
    pub settings: IngestSettings,
}

impl TestDependencies {
    /// In-memory backends, the embedded registry, a remote extractor with no
    /// queued responses, and retries without backoff.
    pub fn new() -> Self {
        Self {
            remote: Some(Arc::new(MockRemoteExtractor::new())),
            fetcher: Arc::new(MockPageFetcher::new()),
            queue: Arc::new(MemoryJobQueue::new()),
            store: Arc::new(MemoryBillStore::new()),
            registry: Arc::new(SourceRegistry::embedded().unwrap()),
            retry: RetryPolicy::new(3, Duration::ZERO),
            settings: IngestSettings {
                remote_batch_delay: Duration::ZERO,
                ..IngestSettings::default()
            },
        }
    }

    /// Set a mock remote extractor
    pub fn mock_remote(mut self, remote: MockRemoteExtractor) -> Self {
        self.remote = Some(Arc::new(remote));
        self
    }

    /// Run without remote extraction
    pub fn without_remote(mut self) -> Self {
        self.remote = None;
        self
    }

    /// Set a mock page fetcher
    pub fn mock_fetcher(mut self, fetcher: MockPageFetcher) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Set the bill store
    pub fn bill_store(mut self, store: MemoryBillStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Set the source registry
    pub fn registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Convert into ServerDeps for testing
    pub fn into_deps(self) -> ServerDeps {
        let remote: Option<Arc<dyn BaseRemoteExtractor>> = self
            .remote
            .map(|remote| remote as Arc<dyn BaseRemoteExtractor>);

        ServerDeps::new(
            Arc::new(BillRepository::new(self.store)),
            self.queue,
            self.registry,
            remote,
            self.fetcher,
            self.retry,
            self.settings,
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
