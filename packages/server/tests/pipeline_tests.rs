//! End-to-end ingestion pipeline tests over in-memory backends.
//!
//! Covers enqueue → worker → strategy → normalize → upsert, the retry chain
//! for sources that yield nothing, and details enrichment.

mod common;

use crate::common::{remote_bill, remote_payload, TestHarness, ONTARIO_PAGE, ONTARIO_URL};
use bills_core::domains::bills::MemoryBillStore;
use bills_core::kernel::jobs::{JobState, RetryPolicy};
use bills_core::kernel::test_dependencies::{MockPageFetcher, MockRemoteExtractor};
use bills_core::kernel::TestDependencies;
use bills_core::server::EnqueueOptions;
use serde_json::json;
use std::time::Duration;
use test_context::test_context;

// =============================================================================
// Enqueue
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_enqueue_then_status_is_waiting_at_zero(ctx: &TestHarness) {
    let job_id = ctx
        .service
        .enqueue_job("ontario", EnqueueOptions::default())
        .await
        .unwrap();

    let status = ctx.status(job_id).await;

    assert_eq!(status.state, JobState::Waiting);
    assert_eq!(status.progress, 0);
    assert_eq!(status.attempts_made, 0);
    assert_eq!(status.data.source_id, "ontario");
    assert!(!status.data.options.force_refresh);
    assert!(status.result.is_none());
    // Nothing ran: enqueue never touches the network
    assert!(ctx.mocks.fetcher.calls().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_enqueue_all_creates_one_job_per_source(ctx: &TestHarness) {
    let jobs = ctx
        .service
        .enqueue_all(EnqueueOptions { force_refresh: true })
        .await
        .unwrap();

    let ids: Vec<&str> = jobs.iter().map(|j| j.source_id.as_str()).collect();
    assert_eq!(ids, ctx.deps.registry.ids());
    assert_eq!(ctx.mocks.queue.len().await, jobs.len());

    for job in &jobs {
        let status = ctx.status(job.job_id).await;
        assert_eq!(status.state, JobState::Waiting);
        assert!(status.data.options.force_refresh);
    }
}

// =============================================================================
// Worker execution
// =============================================================================

#[tokio::test]
async fn test_remote_extraction_completes_job() {
    let ctx = TestHarness::new(
        TestDependencies::new().mock_remote(MockRemoteExtractor::new().with_response(json!({
            "bills": [
                remote_bill("Bill 12", "Clean Water Act", "Second Reading - carried"),
                remote_bill("Bill 15", "Transit Expansion Act", "Royal Assent"),
            ]
        }))),
    );

    let job_id = ctx
        .service
        .enqueue_job("ontario", EnqueueOptions::default())
        .await
        .unwrap();
    ctx.drain_jobs().await;

    let status = ctx.status(job_id).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.progress, 100);
    assert_eq!(status.attempts_made, 1);

    let result = status.result.unwrap();
    assert_eq!(result["source"], "ontario");
    assert_eq!(result["bills_found"], 2);
    assert_eq!(result["strategy"], "remote");
    assert_eq!(result["save_result"]["created"], 2);
    assert!(result["timestamp"].is_string());

    // Remote records bypass the fallback fetch entirely
    assert!(ctx.mocks.fetcher.calls().is_empty());

    let bill = ctx.service.get_bill("ontario", "Bill 12").await.unwrap();
    assert_eq!(bill.status, "Second Reading");
}

#[tokio::test]
async fn test_fallback_parser_completes_job_when_remote_fails() {
    let ctx = TestHarness::new(
        TestDependencies::new()
            .mock_remote(MockRemoteExtractor::new().with_error("upstream timeout"))
            .mock_fetcher(MockPageFetcher::new().with_page(ONTARIO_URL, ONTARIO_PAGE)),
    );

    let job_id = ctx
        .service
        .enqueue_job("ontario", EnqueueOptions { force_refresh: true })
        .await
        .unwrap();
    ctx.drain_jobs().await;

    let status = ctx.status(job_id).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.result.as_ref().unwrap()["strategy"], "parsed");

    let fetches = ctx.mocks.fetcher.calls();
    assert_eq!(fetches.len(), 1);
    assert!(fetches[0].force_refresh);

    let bills = ctx.service.list_bills("ontario", Default::default()).await.unwrap();
    assert_eq!(bills.len(), 2);

    let bill = ctx.service.get_bill("ontario", "Bill 15").await.unwrap();
    assert_eq!(bill.status, "Royal Assent");
    assert_eq!(bill.sponsor, "Raj Patel");
    assert_eq!(bill.source_url.as_deref(), Some(ONTARIO_URL));

    let linked = ctx.service.get_bill("ontario", "Bill 12").await.unwrap();
    assert_eq!(
        linked.related_links.0,
        vec!["https://www.ola.org/en/legislative-business/bills/parliament-43/session-1/bill-12"]
    );
}

#[tokio::test]
async fn test_source_with_nothing_fails_after_three_attempts() {
    let ctx = TestHarness::new(
        TestDependencies::new()
            .without_remote()
            .retry(RetryPolicy::new(3, Duration::ZERO)),
    );

    let job_id = ctx
        .service
        .enqueue_job("ontario", EnqueueOptions::default())
        .await
        .unwrap();
    let attempts = ctx.drain_jobs().await;

    let status = ctx.status(job_id).await;
    assert_eq!(attempts, 3);
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.attempts_made, 3);
    assert!(status
        .failure_reason
        .unwrap()
        .contains("no records found"));
    assert_eq!(ctx.mocks.fetcher.calls().len(), 3);
}

#[tokio::test]
async fn test_failed_attempt_waits_for_backoff() {
    let ctx = TestHarness::new(
        TestDependencies::new()
            .without_remote()
            .retry(RetryPolicy::new(3, Duration::from_secs(60))),
    );

    let job_id = ctx
        .service
        .enqueue_job("ontario", EnqueueOptions::default())
        .await
        .unwrap();

    // First attempt fails; the retry is scheduled two minutes out
    assert_eq!(ctx.drain_jobs().await, 1);

    let status = ctx.status(job_id).await;
    assert_eq!(status.state, JobState::Waiting);
    assert_eq!(status.attempts_made, 1);
    assert!(status.failure_reason.is_some());
}

#[tokio::test]
async fn test_fetch_error_still_records_extraction_checkpoint() {
    let ctx = TestHarness::new(
        TestDependencies::new()
            .without_remote()
            .mock_fetcher(MockPageFetcher::new().with_failure(ONTARIO_URL, "connection reset"))
            .retry(RetryPolicy::new(3, Duration::from_secs(60))),
    );

    let job_id = ctx
        .service
        .enqueue_job("ontario", EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(ctx.drain_jobs().await, 1);

    let status = ctx.status(job_id).await;
    assert_eq!(status.state, JobState::Waiting);
    assert_eq!(status.progress, 50);
    assert!(status.failure_reason.unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_unregistered_source_fails_inside_job() {
    let ctx = TestHarness::new(TestDependencies::new());

    // Accepted because the registry has default rules, but there is no URL to fetch
    let job_id = ctx
        .service
        .enqueue_job("yukon", EnqueueOptions::default())
        .await
        .unwrap();
    ctx.drain_jobs().await;

    let status = ctx.status(job_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.failure_reason.unwrap().contains("no fetch URL"));
}

#[tokio::test]
async fn test_batch_with_missing_identifier_saves_the_rest() {
    let mut payload = remote_payload(5);
    payload["bills"][2]
        .as_object_mut()
        .unwrap()
        .remove("billNumber");

    let ctx = TestHarness::new(
        TestDependencies::new().mock_remote(MockRemoteExtractor::new().with_response(payload)),
    );

    let job_id = ctx
        .service
        .enqueue_job("ontario", EnqueueOptions::default())
        .await
        .unwrap();
    ctx.drain_jobs().await;

    let result = ctx.status(job_id).await.result.unwrap();
    assert_eq!(result["bills_found"], 4);
    assert_eq!(result["save_result"]["created"], 4);
    assert_eq!(result["save_result"]["failed"], 0);
    assert_eq!(ctx.mocks.store.len().await, 4);
}

#[tokio::test]
async fn test_rescrape_updates_instead_of_duplicating() {
    let ctx = TestHarness::new(
        TestDependencies::new().mock_remote(
            MockRemoteExtractor::new()
                .with_response(json!({
                    "bills": [remote_bill("Bill 12", "Clean Water Act", "First Reading")]
                }))
                .with_response(json!({
                    "bills": [remote_bill("Bill 12", "Clean Water Act", "Third Reading")]
                })),
        ),
    );

    for _ in 0..2 {
        ctx.service
            .enqueue_job("ontario", EnqueueOptions::default())
            .await
            .unwrap();
        ctx.drain_jobs().await;
    }

    let all = ctx.mocks.store.all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, "Third Reading");
}

#[tokio::test]
async fn test_job_fails_when_no_bill_can_be_saved() {
    let ctx = TestHarness::new(
        TestDependencies::new()
            .mock_remote(MockRemoteExtractor::new().with_response(json!({
                "bills": [remote_bill("Bill 1", "Budget Measures Act", "First Reading")]
            })))
            .bill_store(MemoryBillStore::new().failing_on("Bill 1"))
            .retry(RetryPolicy::new(1, Duration::ZERO)),
    );

    let job_id = ctx
        .service
        .enqueue_job("ontario", EnqueueOptions::default())
        .await
        .unwrap();
    ctx.drain_jobs().await;

    let status = ctx.status(job_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.failure_reason.unwrap().contains("failed to save"));
}

// =============================================================================
// Details enrichment
// =============================================================================

#[tokio::test]
async fn test_details_job_enriches_stored_bills() {
    let detail_url = "https://www.ola.org/bills/bill-12";
    let remote = MockRemoteExtractor::new()
        .with_response(json!({
            "bills": [remote_bill("Bill 12", "Clean Water Act", "Second Reading")]
        }))
        .with_response_for(
            detail_url,
            json!({
                "description": "Protects drinking water sources",
                "committee": "Standing Committee on Justice Policy",
                "readings": [{"stage": "First Reading", "date": "2024-03-01", "result": "Carried"}],
                "voteResults": {"yeas": 61, "nays": 20, "abstentions": 0}
            }),
        );
    let ctx = TestHarness::new(TestDependencies::new().mock_remote(remote));

    ctx.service
        .enqueue_job("ontario", EnqueueOptions::default())
        .await
        .unwrap();
    ctx.drain_jobs().await;

    let job_id = ctx
        .service
        .enqueue_bill_details("ontario", Some(10))
        .await
        .unwrap();
    ctx.drain_jobs().await;

    let status = ctx.status(job_id).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.result.unwrap()["details"]["enriched"], 1);

    let bill = ctx.service.get_bill("ontario", "Bill 12").await.unwrap();
    assert_eq!(bill.description, "Protects drinking water sources");
    assert_eq!(bill.committee, "Standing Committee on Justice Policy");
    assert_eq!(bill.vote_results.0.yeas, Some(61));
    assert_eq!(bill.status, "Second Reading");
    assert!(bill.details_scraped_at.is_some());

    let detail_calls: Vec<_> = ctx
        .mocks
        .remote
        .as_ref()
        .unwrap()
        .calls()
        .into_iter()
        .filter(|c| c.url == detail_url)
        .collect();
    assert_eq!(detail_calls.len(), 1);
    assert_eq!(detail_calls[0].prompt, ctx.deps.registry.details_prompt());
}

#[tokio::test]
async fn test_details_job_needs_remote_extraction() {
    let ctx = TestHarness::new(TestDependencies::new().without_remote());

    let job_id = ctx
        .service
        .enqueue_bill_details("ontario", None)
        .await
        .unwrap();
    ctx.drain_jobs().await;

    let status = ctx.status(job_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status
        .failure_reason
        .unwrap()
        .contains("remote extraction is not configured"));
}
