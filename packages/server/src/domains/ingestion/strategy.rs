//! Extraction strategy selection.
//!
//! Remote structured extraction is tried first when configured. Anything
//! short of a non-empty record list falls through to a raw fetch of the same
//! page and the local selector engine.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::common::{IngestError, IngestResult};
use crate::domains::bills::RawBill;
use crate::domains::sources::{parse_bills, ResolvedSource};
use crate::kernel::{RemoteExtractRequest, ServerDeps};

/// Records from one successful extraction, tagged with the path that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Already structured by the remote service; the selector engine never ran
    Remote { records: Vec<RawBill>, url: String },
    /// Raw fetch plus local selectors
    Parsed { records: Vec<RawBill>, url: String },
}

impl Extraction {
    pub fn strategy(&self) -> &'static str {
        match self {
            Extraction::Remote { .. } => "remote",
            Extraction::Parsed { .. } => "parsed",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Extraction::Remote { url, .. } | Extraction::Parsed { url, .. } => url,
        }
    }

    pub fn records(&self) -> &[RawBill] {
        match self {
            Extraction::Remote { records, .. } | Extraction::Parsed { records, .. } => records,
        }
    }

    pub fn into_records(self) -> Vec<RawBill> {
        match self {
            Extraction::Remote { records, .. } | Extraction::Parsed { records, .. } => records,
        }
    }
}

/// Result of the remote attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Records(Vec<RawBill>),
    /// The service answered but listed no bills
    Empty,
    /// No remote extractor configured
    Unavailable,
    Failed(String),
}

/// Pull bill records out of a remote extraction payload.
///
/// Accepts `{"bills": [...]}` (the output schema) or a bare array. Entries
/// that are not objects are skipped.
pub fn records_from_json(payload: &Value) -> Vec<RawBill> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("bills") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| match serde_json::from_value::<RawBill>(item.clone()) {
            Ok(raw) => Some(raw),
            Err(e) => {
                debug!(error = %e, "Skipping malformed remote record");
                None
            }
        })
        .collect()
}

/// One remote extraction attempt against `url`.
pub async fn remote_attempt(
    deps: &ServerDeps,
    source: &ResolvedSource,
    url: &str,
    force_refresh: bool,
) -> AttemptOutcome {
    let Some(remote) = deps.remote.as_ref() else {
        return AttemptOutcome::Unavailable;
    };

    let schema = deps.registry.schema().clone();
    let request =
        RemoteExtractRequest::new(url, source.prompt.as_str(), schema).force_refresh(force_refresh);

    match remote.extract(&request).await {
        Ok(payload) => {
            let records = records_from_json(&payload);
            if records.is_empty() {
                AttemptOutcome::Empty
            } else {
                AttemptOutcome::Records(records)
            }
        }
        Err(e) => AttemptOutcome::Failed(e.to_string()),
    }
}

/// Run the remote attempt, then the fallback, for one source.
pub async fn extract(
    deps: &ServerDeps,
    source: &ResolvedSource,
    force_refresh: bool,
) -> IngestResult<Extraction> {
    let url = source
        .primary_url()
        .ok_or_else(|| IngestError::MissingSourceUrl(source.id().to_string()))?
        .to_string();

    match remote_attempt(deps, source, &url, force_refresh).await {
        AttemptOutcome::Records(records) => {
            info!(source = %source.id(), count = records.len(), "Remote extraction succeeded");
            return Ok(Extraction::Remote { records, url });
        }
        AttemptOutcome::Empty => {
            info!(source = %source.id(), "Remote extraction found no bills, falling back");
        }
        AttemptOutcome::Unavailable => {
            debug!(source = %source.id(), "Remote extraction not configured, using fallback");
        }
        AttemptOutcome::Failed(reason) => {
            warn!(source = %source.id(), error = %reason, "Remote extraction failed, falling back");
        }
    }

    let markup = deps
        .fetcher
        .fetch(&url, force_refresh)
        .await
        .map_err(|e| IngestError::Fetch {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    let records = parse_bills(&deps.registry, source.id(), &markup, &url);
    if records.is_empty() {
        return Err(IngestError::NoRecordsFound {
            source_id: source.id().to_string(),
        });
    }

    info!(source = %source.id(), count = records.len(), "Fallback parser extracted bills");
    Ok(Extraction::Parsed { records, url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{MockPageFetcher, MockRemoteExtractor, TestDependencies};
    use serde_json::json;

    const ONTARIO_URL: &str = "https://www.ola.org/en/legislative-business/bills";

    const TABLE: &str = r#"
        <table><tbody>
          <tr class="bill-row"><td>Bill 12</td><td>Clean Water Act</td><td>Second Reading</td><td>Smith</td></tr>
        </tbody></table>"#;

    fn ontario(deps: &ServerDeps) -> ResolvedSource {
        deps.registry.resolve("ontario").unwrap()
    }

    #[test]
    fn test_records_from_schema_payload() {
        let records = records_from_json(&json!({
            "bills": [
                {"billNumber": "Bill 1", "title": "A"},
                "garbage",
                {"billNumber": 2, "title": "B"}
            ]
        }));

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].bill_number.as_deref(), Some("2"));
    }

    #[test]
    fn test_records_from_bare_array_and_junk() {
        assert_eq!(records_from_json(&json!([{"title": "A"}])).len(), 1);
        assert!(records_from_json(&json!({"other": []})).is_empty());
        assert!(records_from_json(&json!("text")).is_empty());
    }

    #[tokio::test]
    async fn test_remote_records_skip_fallback() {
        let test_deps = TestDependencies::new().mock_remote(
            MockRemoteExtractor::new().with_response(json!({
                "bills": [{"billNumber": "Bill 7", "title": "Transit Act"}]
            })),
        );
        let fetcher = test_deps.fetcher.clone();
        let deps = test_deps.into_deps();

        let extraction = extract(&deps, &ontario(&deps), true).await.unwrap();

        assert_eq!(extraction.strategy(), "remote");
        assert_eq!(extraction.url(), ONTARIO_URL);
        assert_eq!(extraction.records().len(), 1);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_request_shape() {
        let remote = MockRemoteExtractor::new()
            .with_response(json!({"bills": [{"billNumber": "Bill 7", "title": "Transit Act"}]}));
        let test_deps = TestDependencies::new().mock_remote(remote);
        let remote = test_deps.remote.clone().unwrap();
        let deps = test_deps.into_deps();

        extract(&deps, &ontario(&deps), true).await.unwrap();

        let calls = remote.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, ONTARIO_URL);
        assert!(calls[0].force_refresh);
        assert_eq!(calls[0].wait_for_ms, 2_000);
        assert_eq!(calls[0].timeout.as_secs(), 30);
        assert!(calls[0].schema.get("properties").is_some());
    }

    #[tokio::test]
    async fn test_empty_remote_falls_back_to_parser() {
        let test_deps = TestDependencies::new()
            .mock_remote(MockRemoteExtractor::new().with_response(json!({"bills": []})))
            .mock_fetcher(MockPageFetcher::new().with_page(ONTARIO_URL, TABLE));
        let fetcher = test_deps.fetcher.clone();
        let deps = test_deps.into_deps();

        let extraction = extract(&deps, &ontario(&deps), false).await.unwrap();

        assert_eq!(extraction.strategy(), "parsed");
        assert_eq!(extraction.records()[0].bill_number.as_deref(), Some("Bill 12"));
        assert!(!fetcher.calls()[0].force_refresh);
    }

    #[tokio::test]
    async fn test_failed_remote_falls_back_to_parser() {
        let deps = TestDependencies::new()
            .mock_remote(MockRemoteExtractor::new().with_error("timeout"))
            .mock_fetcher(MockPageFetcher::new().with_page(ONTARIO_URL, TABLE))
            .into_deps();

        let extraction = extract(&deps, &ontario(&deps), false).await.unwrap();
        assert!(matches!(extraction, Extraction::Parsed { .. }));
    }

    #[tokio::test]
    async fn test_both_paths_empty_is_no_records() {
        let deps = TestDependencies::new().without_remote().into_deps();

        let err = extract(&deps, &ontario(&deps), false).await.unwrap_err();

        assert!(matches!(err, IngestError::NoRecordsFound { .. }));
        assert!(err.to_string().contains("no records found"));
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces() {
        let deps = TestDependencies::new()
            .without_remote()
            .mock_fetcher(MockPageFetcher::new().with_failure(ONTARIO_URL, "HTTP 503"))
            .into_deps();

        let err = extract(&deps, &ontario(&deps), false).await.unwrap_err();
        assert!(matches!(err, IngestError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_source_without_url() {
        let deps = TestDependencies::new().into_deps();
        let unknown = deps.registry.resolve("yukon-territory").unwrap();

        let err = extract(&deps, &unknown, false).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingSourceUrl(_)));
    }
}
