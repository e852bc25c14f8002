use crate::normalize::to_instant;
use crate::rsvp::FLAT_COLLECTION;
use crate::store::{Filter, Store, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub yes: u32,
    pub maybe: u32,
    pub no: u32,
}

impl StatusCounts {
    /// Unknown strings, and `unanswered`, land in no bucket.
    pub fn record(&mut self, status: &str) {
        match status {
            "yes" | "accepted" => self.yes += 1,
            "maybe" | "tentative" => self.maybe += 1,
            "no" | "declined" => self.no += 1,
            _ => {}
        }
    }
}

async fn flat_records(store: &Store, event_id: &str) -> Result<Vec<Value>, StoreError> {
    Ok(store
        .query(FLAT_COLLECTION, &[Filter::Eq("eventId", event_id.to_string())])
        .await?
        .into_iter()
        .map(|(_, doc)| doc)
        .collect())
}

pub async fn availability_summary(store: &Store, event_id: &str) -> Result<StatusCounts, StoreError> {
    let mut counts = StatusCounts::default();
    for doc in flat_records(store, event_id).await? {
        counts.record(doc.get("status").and_then(Value::as_str).unwrap_or(""));
    }
    Ok(counts)
}

pub async fn availability_csv(store: &Store, event_id: &str) -> Result<String, StoreError> {
    let records = flat_records(store, event_id).await?;
    Ok(render_csv(&records))
}

fn render_csv(records: &[Value]) -> String {
    let mut out = String::from("uid,displayName,role,status,updatedAt\n");
    let mut counts = StatusCounts::default();

    for doc in records {
        let field = |key: &str| doc.get(key).and_then(Value::as_str).unwrap_or("");
        let status = field("status");
        counts.record(status);
        let updated_at = doc
            .get("updatedAt")
            .and_then(to_instant)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let row = [field("uid"), field("displayName"), field("role"), status, updated_at.as_str()]
            .map(escape)
            .join(",");
        out.push_str(&row);
        out.push('\n');
    }

    out.push_str("\nyes,maybe,no\n");
    let _ = writeln!(out, "{},{},{}", counts.yes, counts.maybe, counts.no);
    out
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
