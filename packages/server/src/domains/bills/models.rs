use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::common::lenient;

// =============================================================================
// Raw records (one extraction attempt, loosely typed)
// =============================================================================

/// Field bag produced by either extraction strategy.
///
/// Remote extraction emits the camelCase names of the output schema; the local
/// parser fills the same fields directly. Everything is optional here, the
/// normalizer decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBill {
    #[serde(
        default,
        alias = "bill_number",
        alias = "number",
        deserialize_with = "lenient::opt_string"
    )]
    pub bill_number: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    #[serde(default, alias = "summary", deserialize_with = "lenient::opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub sponsor: Option<String>,
    #[serde(default, alias = "introduced_date", deserialize_with = "lenient::opt_string")]
    pub introduced_date: Option<String>,
    #[serde(
        default,
        alias = "last_activity_date",
        alias = "lastActivity",
        deserialize_with = "lenient::opt_string"
    )]
    pub last_activity_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub readings: Vec<RawReading>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub committee: Option<String>,
    #[serde(default, alias = "vote_results")]
    pub vote_results: Option<RawVoteResults>,
    #[serde(default, alias = "related_links", deserialize_with = "lenient::list")]
    pub related_links: Vec<String>,
    #[serde(default, alias = "source_url", alias = "url", deserialize_with = "lenient::opt_string")]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub stage: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVoteResults {
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub yeas: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub nays: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub abstentions: Option<i64>,
}

// =============================================================================
// Canonical records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub stage: String,
    pub date: Option<DateTime<Utc>>,
    pub result: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResults {
    pub yeas: Option<i64>,
    pub nays: Option<i64>,
    pub abstentions: Option<i64>,
}

impl VoteResults {
    pub fn is_empty(&self) -> bool {
        self.yeas.is_none() && self.nays.is_none() && self.abstentions.is_none()
    }
}

/// Normalized fields for one bill, ready to upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillFields {
    pub source: String,
    pub bill_number: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub sponsor: String,
    pub introduced_date: Option<DateTime<Utc>>,
    pub last_activity_date: DateTime<Utc>,
    pub readings: Vec<Reading>,
    pub committee: String,
    pub vote_results: VoteResults,
    pub source_url: Option<String>,
    pub related_links: Vec<String>,
}

/// A persisted bill, keyed logically by (source, bill_number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bill {
    pub id: Uuid,
    pub source: String,
    pub bill_number: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub sponsor: String,
    pub introduced_date: Option<DateTime<Utc>>,
    pub last_activity_date: DateTime<Utc>,
    pub readings: Json<Vec<Reading>>,
    pub committee: String,
    pub vote_results: Json<VoteResults>,
    pub source_url: Option<String>,
    pub related_links: Json<Vec<String>>,
    pub details_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    /// New record from normalized fields.
    pub fn from_fields(fields: BillFields, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: fields.source,
            bill_number: fields.bill_number,
            title: fields.title,
            description: fields.description,
            status: fields.status,
            sponsor: fields.sponsor,
            introduced_date: fields.introduced_date,
            last_activity_date: fields.last_activity_date,
            readings: Json(fields.readings),
            committee: fields.committee,
            vote_results: Json(fields.vote_results),
            source_url: fields.source_url,
            related_links: Json(fields.related_links),
            details_scraped_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge incoming fields into this record.
    ///
    /// Identity, status, title and recency always take the incoming value.
    /// Descriptive fields only do when the incoming value is non-empty, so a
    /// list-page scrape does not wipe what a details scrape filled in.
    pub fn merge(&mut self, fields: BillFields, now: DateTime<Utc>) {
        self.title = fields.title;
        self.status = fields.status;
        self.last_activity_date = fields.last_activity_date;

        if !fields.description.is_empty() {
            self.description = fields.description;
        }
        if !fields.sponsor.is_empty() {
            self.sponsor = fields.sponsor;
        }
        if !fields.committee.is_empty() {
            self.committee = fields.committee;
        }
        if fields.introduced_date.is_some() {
            self.introduced_date = fields.introduced_date;
        }
        if !fields.readings.is_empty() {
            self.readings = Json(fields.readings);
        }
        if !fields.vote_results.is_empty() {
            self.vote_results = Json(fields.vote_results);
        }
        if fields.source_url.is_some() {
            self.source_url = fields.source_url;
        }
        if !fields.related_links.is_empty() {
            self.related_links = Json(fields.related_links);
        }

        self.updated_at = now;
    }

    /// First related link; the page the details job extracts from.
    pub fn detail_url(&self) -> Option<&str> {
        self.related_links.0.first().map(String::as_str)
    }
}

// =============================================================================
// Gateway inputs and outputs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn saved(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    pub limit: i64,
    pub offset: i64,
    pub status: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub source_id: Option<String>,
    pub status: Option<String>,
    pub limit: i64,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            source_id: None,
            status: None,
            limit: 50,
        }
    }
}

/// Filter understood by every `BillStore` backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillFilter {
    pub source: Option<String>,
    pub status: Option<String>,
    /// Case-insensitive substring of title or description
    pub text: Option<String>,
    /// Only bills never enriched by the details job
    pub needs_details: bool,
    pub limit: i64,
    pub offset: i64,
}

/// Derived counts over the bill store. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillStatistics {
    pub total: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
    /// The scan hit its row cap; counts are a lower bound.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(description: &str) -> BillFields {
        BillFields {
            source: "ontario".into(),
            bill_number: "Bill 12".into(),
            title: "Clean Water Act".into(),
            description: description.into(),
            status: "First Reading".into(),
            sponsor: String::new(),
            introduced_date: None,
            last_activity_date: Utc::now(),
            readings: vec![],
            committee: String::new(),
            vote_results: VoteResults::default(),
            source_url: None,
            related_links: vec![],
        }
    }

    #[test]
    fn test_raw_bill_accepts_remote_shape() {
        let raw: RawBill = serde_json::from_value(json!({
            "billNumber": 12,
            "title": "Clean Water Act",
            "introducedDate": "2024-03-01",
            "voteResults": {"yeas": "61", "nays": 20},
            "readings": [{"stage": "First Reading", "date": "2024-03-01"}],
            "relatedLinks": ["https://example.org/bill-12"]
        }))
        .unwrap();

        assert_eq!(raw.bill_number.as_deref(), Some("12"));
        assert_eq!(raw.vote_results.unwrap().yeas, Some(61));
        assert_eq!(raw.readings.len(), 1);
        assert_eq!(raw.related_links, vec!["https://example.org/bill-12"]);
    }

    #[test]
    fn test_raw_bill_accepts_snake_case_and_nulls() {
        let raw: RawBill = serde_json::from_value(json!({
            "bill_number": "Bill 7",
            "title": null,
            "readings": null,
            "related_links": null
        }))
        .unwrap();

        assert_eq!(raw.bill_number.as_deref(), Some("Bill 7"));
        assert!(raw.title.is_none());
        assert!(raw.readings.is_empty());
    }

    #[test]
    fn test_merge_keeps_enriched_fields_when_incoming_is_blank() {
        let now = Utc::now();
        let mut bill = Bill::from_fields(fields("Protects drinking water sources."), now);
        let id = bill.id;

        let mut update = fields("");
        update.status = "Second Reading".into();
        bill.merge(update, now);

        assert_eq!(bill.id, id);
        assert_eq!(bill.status, "Second Reading");
        assert_eq!(bill.description, "Protects drinking water sources.");
    }
}
