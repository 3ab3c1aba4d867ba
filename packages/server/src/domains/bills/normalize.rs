//! Raw record → canonical fields.
//!
//! Everything here is pure: no I/O, and `now` is passed in so callers (and
//! tests) decide what "current time" means for the last-activity default.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use super::models::{BillFields, RawBill, RawReading, RawVoteResults, Reading, VoteResults};

pub const UNKNOWN_STATUS: &str = "Unknown";

/// (lower-case substring, canonical label), most specific stage first.
const STATUS_PATTERNS: &[(&str, &str)] = &[
    ("royal assent", "Royal Assent"),
    ("sanction royale", "Royal Assent"),
    ("sanctionné", "Royal Assent"),
    ("third reading", "Third Reading"),
    ("3rd reading", "Third Reading"),
    ("troisième lecture", "Third Reading"),
    ("troisieme lecture", "Third Reading"),
    ("report stage", "Report Stage"),
    ("second reading", "Second Reading"),
    ("2nd reading", "Second Reading"),
    ("deuxième lecture", "Second Reading"),
    ("deuxieme lecture", "Second Reading"),
    ("first reading", "First Reading"),
    ("1st reading", "First Reading"),
    ("première lecture", "First Reading"),
    ("premiere lecture", "First Reading"),
    ("committee", "Committee Stage"),
    ("comité", "Committee Stage"),
    ("comite", "Committee Stage"),
    ("passed", "Passed"),
    ("adopté", "Passed"),
    ("adopte", "Passed"),
    ("defeated", "Defeated"),
    ("withdrawn", "Withdrawn"),
    ("retiré", "Withdrawn"),
    ("prorog", "Prorogued"),
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d %B, %Y",
    "%d %b, %Y",
    "%A, %B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Collapse runs of whitespace to single spaces and trim.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical status label for free-form status text.
///
/// No pattern match passes the (trimmed) text through; blank → `"Unknown"`.
/// Every canonical label maps to itself, so this is idempotent.
pub fn normalize_status(raw: Option<&str>) -> String {
    let text = match raw.map(clean_text) {
        Some(text) if !text.is_empty() => text,
        _ => return UNKNOWN_STATUS.to_string(),
    };

    let lowered = text.to_lowercase();
    STATUS_PATTERNS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, label)| (*label).to_string())
        .unwrap_or(text)
}

/// Best-effort parse of a free-text date. Unparseable or blank → `None`.
pub fn parse_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let text = clean_text(raw?);
    if text.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(&text) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    // Ordinal suffixes ("March 1st, 2024") are not understood by chrono
    let text = strip_ordinal_suffixes(&text);
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    debug!(raw = %text, "Unparseable date");
    None
}

fn strip_ordinal_suffixes(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let trimmed = word.trim_end_matches(',');
            let digits = trimmed.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            let suffix = &trimmed[digits.len()..];
            if !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
                && matches!(suffix, "st" | "nd" | "rd" | "th")
            {
                word.replacen(suffix, "", 1)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn text_or_empty(raw: Option<String>) -> String {
    raw.map(|s| clean_text(&s)).unwrap_or_default()
}

fn required(raw: Option<String>) -> Option<String> {
    raw.map(|s| clean_text(&s)).filter(|s| !s.is_empty())
}

fn normalize_reading(raw: RawReading) -> Option<Reading> {
    let stage = required(raw.stage)?;
    Some(Reading {
        stage,
        date: parse_date(raw.date.as_deref()),
        result: text_or_empty(raw.result),
    })
}

fn normalize_votes(raw: Option<RawVoteResults>) -> VoteResults {
    raw.map(|v| VoteResults {
        yeas: v.yeas,
        nays: v.nays,
        abstentions: v.abstentions,
    })
    .unwrap_or_default()
}

/// Normalize one raw record. `None` when the identifier or title is missing.
pub fn normalize_bill(raw: RawBill, source_id: &str, now: DateTime<Utc>) -> Option<BillFields> {
    let bill_number = required(raw.bill_number)?;
    let title = required(raw.title)?;

    let mut related_links: Vec<String> = Vec::with_capacity(raw.related_links.len());
    for link in raw.related_links.into_iter().map(|l| l.trim().to_string()) {
        if !link.is_empty() && !related_links.contains(&link) {
            related_links.push(link);
        }
    }

    Some(BillFields {
        source: source_id.to_string(),
        bill_number,
        title,
        description: text_or_empty(raw.description),
        status: normalize_status(raw.status.as_deref()),
        sponsor: text_or_empty(raw.sponsor),
        introduced_date: parse_date(raw.introduced_date.as_deref()),
        last_activity_date: parse_date(raw.last_activity_date.as_deref()).unwrap_or(now),
        readings: raw.readings.into_iter().filter_map(normalize_reading).collect(),
        committee: text_or_empty(raw.committee),
        vote_results: normalize_votes(raw.vote_results),
        source_url: required(raw.source_url),
        related_links,
    })
}

/// Normalize a batch, dropping records without an identifier or title.
pub fn normalize_bills(raws: Vec<RawBill>, source_id: &str, now: DateTime<Utc>) -> Vec<BillFields> {
    let total = raws.len();
    let bills: Vec<BillFields> = raws
        .into_iter()
        .filter_map(|raw| normalize_bill(raw, source_id, now))
        .collect();

    if bills.len() < total {
        debug!(
            source = %source_id,
            dropped = total - bills.len(),
            "Dropped raw records missing identifier or title"
        );
    }

    bills
}
