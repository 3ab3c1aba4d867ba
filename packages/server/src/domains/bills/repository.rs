//! Persistence gateway for bills.
//!
//! Wraps a `BillStore` with lazy schema setup, keyed upsert, sequential batch
//! writes, and the read paths (list, get, search, statistics).
//!
//! # Upsert race
//!
//! `upsert` is a lookup followed by a separate insert or update. Two
//! concurrent upserts of the same (source, bill_number) can both miss the
//! lookup and both insert, leaving a duplicate row. Nothing is lost; reads
//! return the oldest row for a key. The bills table has no unique constraint
//! on the key for this reason.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::models::{
    BatchSummary, Bill, BillFields, BillFilter, BillStatistics, ListOptions, SearchQuery,
    UpsertOutcome,
};
use super::store::BillStore;
use crate::common::{IngestError, IngestResult};

/// Row cap for the statistics scan.
pub const STATISTICS_SCAN_LIMIT: usize = 10_000;

/// Largest page `list` and `search` return.
pub const MAX_PAGE_SIZE: i64 = 500;

pub struct BillRepository {
    store: Arc<dyn BillStore>,
    schema: OnceCell<()>,
}

impl BillRepository {
    pub fn new(store: Arc<dyn BillStore>) -> Self {
        Self {
            store,
            schema: OnceCell::new(),
        }
    }

    /// Idempotent; concurrent first callers share one backend call.
    pub async fn ensure_schema(&self) -> IngestResult<()> {
        self.schema
            .get_or_try_init(|| async {
                info!("Ensuring bills schema");
                self.store.ensure_schema().await
            })
            .await?;
        Ok(())
    }

    pub async fn upsert(&self, fields: BillFields) -> IngestResult<UpsertOutcome> {
        self.ensure_schema().await?;
        let now = Utc::now();

        match self
            .store
            .find_by_key(&fields.source, &fields.bill_number)
            .await?
        {
            Some(mut existing) => {
                existing.merge(fields, now);
                self.store.update(&existing).await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let bill = Bill::from_fields(fields, now);
                self.store.insert(&bill).await?;
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Upsert each record in order. Failures are logged and counted, never propagated.
    pub async fn batch_upsert(&self, records: Vec<BillFields>) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for fields in records {
            let source = fields.source.clone();
            let bill_number = fields.bill_number.clone();

            match self.upsert(fields).await {
                Ok(UpsertOutcome::Created) => summary.created += 1,
                Ok(UpsertOutcome::Updated) => summary.updated += 1,
                Err(e) => {
                    warn!(
                        source = %source,
                        bill_number = %bill_number,
                        error = %e,
                        "Failed to save bill"
                    );
                    summary.failed += 1;
                }
            }
        }

        debug!(
            created = summary.created,
            updated = summary.updated,
            failed = summary.failed,
            "Batch upsert finished"
        );
        summary
    }

    /// Write back a bill loaded from this repository.
    pub async fn save(&self, bill: &Bill) -> IngestResult<()> {
        self.ensure_schema().await?;
        self.store.update(bill).await?;
        Ok(())
    }

    pub async fn list(&self, source_id: &str, options: &ListOptions) -> IngestResult<Vec<Bill>> {
        self.ensure_schema().await?;
        let filter = BillFilter {
            source: Some(source_id.to_string()),
            status: options.status.clone(),
            limit: options.limit.clamp(1, MAX_PAGE_SIZE),
            offset: options.offset.max(0),
            ..Default::default()
        };
        Ok(self.store.query(&filter).await?)
    }

    pub async fn get(&self, source_id: &str, bill_number: &str) -> IngestResult<Bill> {
        self.ensure_schema().await?;
        self.store
            .find_by_key(source_id, bill_number)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("bill {bill_number} in {source_id}")))
    }

    pub async fn search(&self, query: &SearchQuery) -> IngestResult<Vec<Bill>> {
        let text = query.query.trim();
        if text.is_empty() {
            return Err(IngestError::InvalidQuery("search text is empty".into()));
        }

        self.ensure_schema().await?;
        let filter = BillFilter {
            source: query.source_id.clone(),
            status: query.status.clone(),
            text: Some(text.to_string()),
            limit: query.limit.clamp(1, MAX_PAGE_SIZE),
            offset: 0,
            needs_details: false,
        };
        Ok(self.store.query(&filter).await?)
    }

    /// Bills of `source_id` with a detail link that the details job has not visited.
    pub async fn pending_details(&self, source_id: &str, limit: i64) -> IngestResult<Vec<Bill>> {
        self.ensure_schema().await?;
        let filter = BillFilter {
            source: Some(source_id.to_string()),
            needs_details: true,
            limit,
            ..Default::default()
        };
        Ok(self.store.query(&filter).await?)
    }

    /// Counts by source and status from one scan of at most `STATISTICS_SCAN_LIMIT` rows.
    ///
    /// Approximate by construction; `truncated` is set when the cap was hit.
    pub async fn statistics(&self) -> IngestResult<BillStatistics> {
        self.ensure_schema().await?;
        let filter = BillFilter {
            limit: STATISTICS_SCAN_LIMIT as i64 + 1,
            ..Default::default()
        };
        let rows = self.store.query(&filter).await?;
        let truncated = rows.len() > STATISTICS_SCAN_LIMIT;

        let mut by_source = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        let mut total = 0;
        for bill in rows.iter().take(STATISTICS_SCAN_LIMIT) {
            *by_source.entry(bill.source.clone()).or_insert(0) += 1;
            *by_status.entry(bill.status.clone()).or_insert(0) += 1;
            total += 1;
        }

        if truncated {
            warn!(limit = STATISTICS_SCAN_LIMIT, "Statistics scan truncated");
        }

        Ok(BillStatistics {
            total,
            by_source,
            by_status,
            generated_at: Utc::now(),
            truncated,
        })
    }

    pub async fn ping(&self) -> IngestResult<()> {
        self.store.ping().await?;
        Ok(())
    }
}
