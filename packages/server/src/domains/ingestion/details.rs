//! Bill details enrichment.
//!
//! Visits the detail page of stored bills that have never been enriched,
//! extracts the full record remotely, and merges it into the stored bill.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::common::{IngestError, IngestResult};
use crate::domains::bills::normalize::normalize_bill;
use crate::domains::bills::{Bill, RawBill};
use crate::kernel::jobs::JobProgress;
use crate::kernel::{RemoteExtractRequest, ServerDeps};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailsSummary {
    pub candidates: usize,
    pub enriched: usize,
    pub failed: usize,
}

/// Detail payloads come back either flat or wrapped in `{"bill": {...}}`.
fn details_record(payload: Value) -> Option<RawBill> {
    let record = match payload {
        Value::Object(mut map) => match map.remove("bill") {
            Some(inner @ Value::Object(_)) => inner,
            _ => Value::Object(map),
        },
        _ => return None,
    };
    serde_json::from_value(record).ok()
}

/// Merge a detail record into `bill` and stamp it as enriched.
///
/// Identity comes from the stored bill. Fields the detail page leaves out
/// keep their stored values, including status and last activity.
pub fn apply_details(bill: &mut Bill, mut raw: RawBill, now: DateTime<Utc>) {
    raw.bill_number = Some(bill.bill_number.clone());
    if raw.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        raw.title = Some(bill.title.clone());
    }
    if raw.status.as_deref().map_or(true, |s| s.trim().is_empty()) {
        raw.status = Some(bill.status.clone());
    }

    if let Some(fields) = normalize_bill(raw, &bill.source, bill.last_activity_date) {
        bill.merge(fields, now);
    }
    bill.details_scraped_at = Some(now);
}

/// Enrich up to `limit` bills of `source_id`.
///
/// Per-bill failures are logged and counted; only a missing remote extractor
/// or a store failure while loading candidates fails the whole run.
pub async fn scrape_bill_details(
    deps: &ServerDeps,
    source_id: &str,
    limit: i64,
    progress: &JobProgress,
) -> IngestResult<DetailsSummary> {
    let remote = deps.remote.as_ref().ok_or(IngestError::RemoteUnavailable)?;

    let candidates: Vec<Bill> = deps
        .bills
        .pending_details(source_id, limit)
        .await?
        .into_iter()
        .filter(|bill| bill.detail_url().is_some())
        .collect();
    progress.set(20).await;

    let mut summary = DetailsSummary {
        candidates: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        info!(source = %source_id, "No bills awaiting details");
        return Ok(summary);
    }

    let requests: Vec<RemoteExtractRequest> = candidates
        .iter()
        .filter_map(|bill| bill.detail_url())
        .map(|url| {
            RemoteExtractRequest::new(
                url,
                deps.registry.details_prompt(),
                deps.registry.details_schema().clone(),
            )
        })
        .collect();

    let outcomes = remote
        .extract_batch(
            &requests,
            deps.settings.remote_batch_size,
            deps.settings.remote_batch_delay,
        )
        .await;
    progress.set(70).await;

    for (mut bill, outcome) in candidates.into_iter().zip(outcomes) {
        let raw = match outcome {
            Ok(payload) => details_record(payload),
            Err(e) => {
                warn!(
                    source = %source_id,
                    bill_number = %bill.bill_number,
                    error = %e,
                    "Detail extraction failed"
                );
                summary.failed += 1;
                continue;
            }
        };

        let Some(raw) = raw else {
            warn!(
                source = %source_id,
                bill_number = %bill.bill_number,
                "Detail payload was not a bill record"
            );
            summary.failed += 1;
            continue;
        };

        apply_details(&mut bill, raw, Utc::now());
        match deps.bills.save(&bill).await {
            Ok(()) => summary.enriched += 1,
            Err(e) => {
                warn!(
                    source = %source_id,
                    bill_number = %bill.bill_number,
                    error = %e,
                    "Failed to save bill details"
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        source = %source_id,
        candidates = summary.candidates,
        enriched = summary.enriched,
        failed = summary.failed,
        "Bill details enrichment finished"
    );
    Ok(summary)
}
