//! Postgres backend tests (require Docker).
//!
//! Run with: cargo test --test postgres_tests -- --ignored

mod common;

use crate::common::{bill_fields, PostgresHarness};
use bills_core::domains::bills::{BillRepository, PostgresBillStore, SearchQuery, UpsertOutcome};
use bills_core::kernel::jobs::{Job, JobQueue, JobState, PostgresJobQueue};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use test_context::test_context;
use uuid::Uuid;

/// Source id unique to one test, so tests can share the database.
fn unique_source() -> String {
    format!("test-{}", Uuid::new_v4())
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bill_upsert_converges(ctx: &PostgresHarness) {
    let repo = BillRepository::new(Arc::new(PostgresBillStore::new(ctx.db_pool.clone())));
    let source = unique_source();

    let first = repo.upsert(bill_fields(&source, "Bill 1", "First Reading")).await.unwrap();
    let second = repo.upsert(bill_fields(&source, "Bill 1", "Second Reading")).await.unwrap();

    assert_eq!(first, UpsertOutcome::Created);
    assert_eq!(second, UpsertOutcome::Updated);

    let bills = repo.list(&source, &Default::default()).await.unwrap();
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].status, "Second Reading");
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bill_search_is_case_insensitive(ctx: &PostgresHarness) {
    let repo = BillRepository::new(Arc::new(PostgresBillStore::new(ctx.db_pool.clone())));
    let source = unique_source();

    let mut water = bill_fields(&source, "Bill 12", "Passed");
    water.title = "Clean Water Act".into();
    repo.batch_upsert(vec![water, bill_fields(&source, "Bill 13", "Passed")])
        .await;

    let mut query = SearchQuery::new("WATER");
    query.source_id = Some(source.clone());
    let found = repo.search(&query).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].bill_number, "Bill 12");
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_job_claim_and_complete(ctx: &PostgresHarness) {
    let queue = PostgresJobQueue::new(ctx.db_pool.clone());
    queue.ensure_schema().await.unwrap();

    let source = unique_source();
    let job_id = queue
        .enqueue(Job::scrape_source(&source, false, 3))
        .await
        .unwrap();

    let waiting = queue.find(job_id).await.unwrap().unwrap();
    assert_eq!(waiting.state(), JobState::Waiting);
    assert_eq!(waiting.progress, 0);

    // Claim until our job shows up; other tests may have left jobs behind
    let mut claimed = None;
    for _ in 0..10 {
        let jobs = queue.claim("pg-test", 50).await.unwrap();
        if let Some(job) = jobs.into_iter().find(|j| j.id == job_id) {
            claimed = Some(job);
            break;
        }
    }
    let claimed = claimed.expect("job was never claimed");
    assert_eq!(claimed.state(), JobState::Active);
    assert_eq!(claimed.attempts_made, 1);

    assert!(queue.set_progress(job_id, "pg-test", 50).await.unwrap());
    assert!(queue.set_progress(job_id, "pg-test", 20).await.unwrap());
    assert_eq!(queue.find(job_id).await.unwrap().unwrap().progress, 50);

    // Another worker cannot finish a job it does not own
    assert!(!queue
        .mark_failed(job_id, "pg-other", "lease lost", None)
        .await
        .unwrap());
    assert_eq!(queue.find(job_id).await.unwrap().unwrap().state(), JobState::Active);

    assert!(queue
        .mark_completed(job_id, "pg-test", json!({"bills_found": 2}))
        .await
        .unwrap());
    let done = queue.find(job_id).await.unwrap().unwrap();
    assert_eq!(done.state(), JobState::Completed);
    assert_eq!(done.progress, 100);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_failed_job_waits_for_retry(ctx: &PostgresHarness) {
    let queue = PostgresJobQueue::new(ctx.db_pool.clone());
    queue.ensure_schema().await.unwrap();

    let job_id = queue
        .enqueue(Job::scrape_source(&unique_source(), false, 3))
        .await
        .unwrap();

    // Take ownership of just this job; a broad claim would race other tests
    sqlx::query(
        "UPDATE ingest_jobs SET state = 'active', worker_id = 'pg-retry', attempts_made = 1 WHERE id = $1",
    )
    .bind(job_id)
    .execute(&ctx.db_pool)
    .await
    .unwrap();

    assert!(queue
        .mark_failed(job_id, "pg-retry", "no records found", Some(Utc::now() + Duration::hours(1)))
        .await
        .unwrap());
    let retrying = queue.find(job_id).await.unwrap().unwrap();
    assert_eq!(retrying.state(), JobState::Waiting);
    assert_eq!(retrying.failure_reason.as_deref(), Some("no records found"));

    assert!(retrying.run_at > Utc::now());

    // Retention window keeps a fresh job
    queue
        .purge_older_than(Utc::now() - Duration::hours(24))
        .await
        .unwrap();
    assert!(queue.find(job_id).await.unwrap().is_some());
}
