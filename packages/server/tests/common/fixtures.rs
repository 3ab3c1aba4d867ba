//! Test fixtures: legislature pages and remote extraction payloads.

use bills_core::domains::bills::{BillFields, VoteResults};
use chrono::Utc;
use serde_json::{json, Value};

pub const ONTARIO_URL: &str = "https://www.ola.org/en/legislative-business/bills";

/// Ontario bills table as served without JavaScript.
pub const ONTARIO_PAGE: &str = r#"
<html><body>
<table>
  <thead><tr><th>Bill</th><th>Title</th><th>Status</th><th>Sponsor</th></tr></thead>
  <tbody>
    <tr class="bill-row">
      <td>Bill 12</td>
      <td><a href="/en/legislative-business/bills/parliament-43/session-1/bill-12">Clean Water Act, 2024</a></td>
      <td>Second Reading - carried</td>
      <td>Jane Smith</td>
    </tr>
    <tr class="bill-row">
      <td>Bill 15</td>
      <td>Transit Expansion Act</td>
      <td>Royal Assent received</td>
      <td>Raj Patel</td>
    </tr>
  </tbody>
</table>
</body></html>
"#;

pub fn remote_bill(number: &str, title: &str, status: &str) -> Value {
    json!({
        "billNumber": number,
        "title": title,
        "status": status,
        "sponsor": "Hon. Member",
        "introducedDate": "2024-03-01",
        "relatedLinks": [format!("https://www.ola.org/bills/{}", number.to_lowercase().replace(' ', "-"))]
    })
}

/// Remote payload with `count` well-formed bills.
pub fn remote_payload(count: usize) -> Value {
    let bills: Vec<Value> = (1..=count)
        .map(|i| remote_bill(&format!("Bill {}", i), &format!("Act number {}", i), "First Reading"))
        .collect();
    json!({ "bills": bills })
}

pub fn bill_fields(source: &str, number: &str, status: &str) -> BillFields {
    BillFields {
        source: source.to_string(),
        bill_number: number.to_string(),
        title: format!("{} title", number),
        description: String::new(),
        status: status.to_string(),
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
