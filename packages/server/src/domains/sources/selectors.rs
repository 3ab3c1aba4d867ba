//! Fallback parser: applies a source's CSS selector rules to raw markup.
//!
//! Never fails. Unusable rules degrade to the registry defaults, and
//! containers without an identifier or title are skipped.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::registry::{SelectorRules, SourceRegistry};
use crate::common::{IngestError, IngestResult};
use crate::domains::bills::models::RawBill;
use crate::domains::bills::normalize::clean_text;

/// Selector rules compiled once per parse.
pub struct CompiledRules {
    container: Selector,
    bill_number: Selector,
    title: Selector,
    status: Selector,
    sponsor: Selector,
    link: Selector,
}

fn compile(field: &str, selector: &str) -> IngestResult<Selector> {
    Selector::parse(selector).map_err(|e| {
        IngestError::Backend(anyhow::anyhow!(
            "invalid {} selector {:?}: {}",
            field,
            selector,
            e
        ))
    })
}

impl CompiledRules {
    pub fn compile(rules: &SelectorRules) -> IngestResult<Self> {
        Ok(Self {
            container: compile("container", &rules.container)?,
            bill_number: compile("bill_number", &rules.bill_number)?,
            title: compile("title", &rules.title)?,
            status: compile("status", &rules.status)?,
            sponsor: compile("sponsor", &rules.sponsor)?,
            link: compile("link", "a[href]")?,
        })
    }

    /// Extract candidate records from a parsed document.
    pub fn extract(&self, document: &Html, page_url: &str) -> Vec<RawBill> {
        let base = Url::parse(page_url).ok();
        let mut bills = Vec::new();
        let mut skipped = 0usize;

        for container in document.select(&self.container) {
            match self.extract_one(container, base.as_ref(), page_url) {
                Some(bill) => bills.push(bill),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(
                url = %page_url,
                skipped,
                kept = bills.len(),
                "Skipped containers missing bill number or title"
            );
        }

        bills
    }

    fn extract_one(
        &self,
        container: ElementRef<'_>,
        base: Option<&Url>,
        page_url: &str,
    ) -> Option<RawBill> {
        let bill_number = first_text(container, &self.bill_number)?;
        let title = first_text(container, &self.title)?;

        Some(RawBill {
            bill_number: Some(bill_number),
            title: Some(title),
            status: first_text(container, &self.status),
            sponsor: first_text(container, &self.sponsor),
            related_links: self.links(container, base),
            source_url: Some(page_url.to_string()),
            ..Default::default()
        })
    }

    fn links(&self, container: ElementRef<'_>, base: Option<&Url>) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        for anchor in container.select(&self.link) {
            let Some(href) = anchor.value().attr("href").map(str::trim) else {
                continue;
            };
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }

            let resolved = match base {
                Some(base) => base.join(href).map(|u| u.to_string()).ok(),
                None => Url::parse(href).map(|u| u.to_string()).ok(),
            };
            if let Some(link) = resolved {
                if !links.contains(&link) {
                    links.push(link);
                }
            }
        }
        links
    }
}

/// Whitespace-collapsed text of the first match, if non-empty.
fn first_text(container: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = container.select(selector).next()?;
    let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
    (!text.is_empty()).then_some(text)
}

/// Parse `markup` fetched from `page_url` with the rules registered for `source_id`.
pub fn parse_bills(
    registry: &SourceRegistry,
    source_id: &str,
    markup: &str,
    page_url: &str,
) -> Vec<RawBill> {
    let Some(compiled) = compiled_rules_for(registry, source_id) else {
        warn!(source = %source_id, "No usable selector rules; parser returns nothing");
        return Vec::new();
    };

    let document = Html::parse_document(markup);
    compiled.extract(&document, page_url)
}

fn compiled_rules_for(registry: &SourceRegistry, source_id: &str) -> Option<CompiledRules> {
    let rules = registry.rules_for(source_id)?;
    match CompiledRules::compile(rules) {
        Ok(compiled) => Some(compiled),
        Err(e) => {
            warn!(source = %source_id, error = %e, "Source selector rules invalid, using defaults");
            let defaults = registry.default_rules()?;
            if defaults == rules {
                return None;
            }
            CompiledRules::compile(defaults)
                .map_err(|e| warn!(error = %e, "Default selector rules invalid"))
                .ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::sources::registry::{RegistryDefaults, SourceConfig};

    const ONTARIO_PAGE: &str = r#"
        <html><body>
        <table>
          <thead><tr><th>Bill</th><th>Title</th><th>Status</th><th>Sponsor</th></tr></thead>
          <tbody>
            <tr class="bill-row">
              <td>Bill 12</td>
              <td><a href="/en/legislative-business/bills/parliament-43/session-1/bill-12">Clean   Water
                  Act, 2024</a></td>
              <td>Second Reading - carried</td>
              <td>Jane Smith</td>
            </tr>
            <tr class="bill-row">
              <td>Bill 13</td>
              <td></td>
              <td>First Reading</td>
              <td>John Doe</td>
            </tr>
            <tr class="bill-row">
              <td>Bill 14</td>
              <td>Fair Rent Act</td>
              <td></td>
              <td></td>
            </tr>
          </tbody>
        </table>
        </body></html>
    "#;

    fn registry_with_rules(rules: SelectorRules) -> SourceRegistry {
        let defaults = RegistryDefaults {
            rules: Some(SelectorRules {
                container: "tr".into(),
                bill_number: "td:first-child".into(),
                title: "td:nth-child(2)".into(),
                status: "td:nth-child(3)".into(),
                sponsor: "td:nth-child(4)".into(),
            }),
            prompt: String::new(),
            details_prompt: String::new(),
            schema: serde_json::Value::Null,
            details_schema: serde_json::Value::Null,
        };
        let source = SourceConfig {
            id: "test".into(),
            name: "Test".into(),
            urls: Default::default(),
            rules: Some(rules),
            prompt: None,
        };
        SourceRegistry::new(defaults, vec![source]).unwrap()
    }

    #[test]
    fn test_ontario_rules_extract_exact_text() {
        let registry = SourceRegistry::embedded().unwrap();
        let bills = parse_bills(
            &registry,
            "ontario",
            ONTARIO_PAGE,
            "https://www.ola.org/en/legislative-business/bills",
        );

        assert_eq!(bills.len(), 2);

        let first = &bills[0];
        assert_eq!(first.bill_number.as_deref(), Some("Bill 12"));
        assert_eq!(first.title.as_deref(), Some("Clean Water Act, 2024"));
        assert_eq!(first.status.as_deref(), Some("Second Reading - carried"));
        assert_eq!(first.sponsor.as_deref(), Some("Jane Smith"));
        assert_eq!(
            first.related_links,
            vec!["https://www.ola.org/en/legislative-business/bills/parliament-43/session-1/bill-12"]
        );
        assert_eq!(
            first.source_url.as_deref(),
            Some("https://www.ola.org/en/legislative-business/bills")
        );

        let second = &bills[1];
        assert_eq!(second.bill_number.as_deref(), Some("Bill 14"));
        assert_eq!(second.status, None);
        assert_eq!(second.sponsor, None);
    }

    #[test]
    fn test_container_missing_title_is_excluded() {
        let registry = SourceRegistry::embedded().unwrap();
        let bills = parse_bills(&registry, "ontario", ONTARIO_PAGE, "https://www.ola.org/");

        assert!(bills
            .iter()
            .all(|b| b.bill_number.as_deref() != Some("Bill 13")));
    }

    #[test]
    fn test_unregistered_source_uses_default_rules() {
        let registry = SourceRegistry::embedded().unwrap();
        let page = r#"
            <div class="bill-item">
              <span class="bill-number">Bill 3</span>
              <span class="bill-title">Budget Measures Act</span>
              <span class="bill-status">Royal Assent</span>
            </div>
        "#;

        let bills = parse_bills(&registry, "yukon", page, "https://example.org/bills");
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].title.as_deref(), Some("Budget Measures Act"));
        assert_eq!(bills[0].status.as_deref(), Some("Royal Assent"));
    }

    #[test]
    fn test_invalid_rules_fall_back_to_defaults() {
        let registry = registry_with_rules(SelectorRules {
            container: "tr[[".into(),
            bill_number: "td".into(),
            title: "td".into(),
            status: "td".into(),
            sponsor: "td".into(),
        });

        let bills = parse_bills(&registry, "test", ONTARIO_PAGE, "https://www.ola.org/");
        assert_eq!(bills.len(), 2);
    }

    #[test]
    fn test_no_matches_returns_empty() {
        let registry = SourceRegistry::embedded().unwrap();
        let bills = parse_bills(
            &registry,
            "ontario",
            "<html><body><p>Service unavailable</p></body></html>",
            "https://www.ola.org/",
        );
        assert!(bills.is_empty());
    }
}
