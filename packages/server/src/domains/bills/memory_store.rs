//! In-memory bill store for tests and local development.

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::{Bill, BillFilter};
use super::store::BillStore;

/// Bills kept in a `Vec` in insertion order. Data is lost on restart.
#[derive(Default)]
pub struct MemoryBillStore {
    bills: RwLock<Vec<Bill>>,
    failing_keys: HashSet<String>,
    schema_calls: RwLock<usize>,
}

impl MemoryBillStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write of `bill_number` fail, to exercise partial-failure paths.
    pub fn failing_on(mut self, bill_number: &str) -> Self {
        self.failing_keys.insert(bill_number.to_string());
        self
    }

    pub async fn len(&self) -> usize {
        self.bills.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bills.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Bill> {
        self.bills.read().await.clone()
    }

    /// How many times `ensure_schema` reached the backend.
    pub async fn schema_calls(&self) -> usize {
        *self.schema_calls.read().await
    }

    fn check_writable(&self, bill: &Bill) -> Result<()> {
        if self.failing_keys.contains(&bill.bill_number) {
            bail!("simulated write failure for {}", bill.bill_number);
        }
        Ok(())
    }
}

fn matches(bill: &Bill, filter: &BillFilter) -> bool {
    if filter.source.as_deref().is_some_and(|s| s != bill.source) {
        return false;
    }
    if filter.status.as_deref().is_some_and(|s| s != bill.status) {
        return false;
    }
    if let Some(text) = &filter.text {
        let needle = text.to_lowercase();
        if !bill.title.to_lowercase().contains(&needle)
            && !bill.description.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    if filter.needs_details && (bill.details_scraped_at.is_some() || bill.detail_url().is_none()) {
        return false;
    }
    true
}

#[async_trait]
impl BillStore for MemoryBillStore {
    async fn ensure_schema(&self) -> Result<()> {
        *self.schema_calls.write().await += 1;
        Ok(())
    }

    async fn find_by_key(&self, source: &str, bill_number: &str) -> Result<Option<Bill>> {
        Ok(self
            .bills
            .read()
            .await
            .iter()
            .find(|b| b.source == source && b.bill_number == bill_number)
            .cloned())
    }

    async fn insert(&self, bill: &Bill) -> Result<()> {
        self.check_writable(bill)?;
        self.bills.write().await.push(bill.clone());
        Ok(())
    }

    async fn update(&self, bill: &Bill) -> Result<()> {
        self.check_writable(bill)?;
        let mut bills = self.bills.write().await;
        match bills.iter_mut().find(|b| b.id == bill.id) {
            Some(existing) => {
                *existing = bill.clone();
                Ok(())
            }
            None => bail!("bill {} not found", bill.id),
        }
    }

    async fn query(&self, filter: &BillFilter) -> Result<Vec<Bill>> {
        let mut found: Vec<Bill> = self
            .bills
            .read()
            .await
            .iter()
            .filter(|b| matches(b, filter))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            b.last_activity_date
                .cmp(&a.last_activity_date)
                .then_with(|| a.bill_number.cmp(&b.bill_number))
        });

        Ok(found
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
