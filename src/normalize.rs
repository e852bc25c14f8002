//! Turns loosely-shaped stored documents into strict values.
//!
//! Stored events and responses were written by several generations of
//! clients, so timestamps show up as ISO strings, epoch milliseconds or
//! `{seconds, nanoseconds}` wrappers, and fields may be missing entirely.
//! Everything is parsed here once; nothing past this point sees raw JSON.

use crate::models::{Event, EventStatus, RoleNeed, Rsvp, RsvpStatus};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

pub const UNTITLED_EVENT: &str = "Untitled Event";

/// Coerces any timestamp-like value into an instant. Returns `None` for
/// null, unparseable or out-of-range input.
pub fn to_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_string(s),
        Value::Number(n) => {
            if let Some(ms) = n.as_i64() {
                DateTime::from_timestamp_millis(ms)
            } else {
                let ms = n.as_f64()?;
                if !ms.is_finite() || ms.abs() > i64::MAX as f64 {
                    return None;
                }
                DateTime::from_timestamp_millis(ms.trunc() as i64)
            }
        }
        Value::Object(map) => {
            let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?.as_i64()?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn text(doc: &Value, key: &str) -> Option<String> {
    match doc.get(key)? {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn role_needs(doc: &Value) -> Vec<RoleNeed> {
    let Some(Value::Array(items)) = doc.get("rolesNeeded") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let role = item.get("role")?.as_str()?.to_string();
            let count = item
                .get("count")
                .or_else(|| item.get("needed"))
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            Some(RoleNeed { role, count })
        })
        .collect()
}

fn string_list(doc: &Value, key: &str) -> Vec<String> {
    let Some(Value::Array(items)) = doc.get(key) else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items.iter().filter_map(Value::as_str) {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

pub fn normalize_event(id: &str, doc: &Value) -> Event {
    let instant = |key: &str| doc.get(key).and_then(to_instant);
    let now = Utc::now();

    Event {
        id: id.to_string(),
        title: text(doc, "title").unwrap_or_else(|| UNTITLED_EVENT.to_string()),
        start: instant("start"),
        end: instant("end"),
        location: text(doc, "location").unwrap_or_default(),
        description: text(doc, "description").unwrap_or_default(),
        status: text(doc, "status")
            .and_then(|s| EventStatus::parse(&s))
            .unwrap_or(EventStatus::Draft),
        roles_needed: role_needs(doc),
        assigned_uids: string_list(doc, "assignedUids"),
        client_id: text(doc, "clientId"),
        created_by: text(doc, "createdBy"),
        created_at: instant("createdAt").unwrap_or(now),
        updated_at: instant("updatedAt").unwrap_or(now),
        published_at: instant("publishedAt"),
    }
}

pub fn normalize_rsvp(uid: &str, doc: &Value) -> Rsvp {
    Rsvp {
        uid: text(doc, "uid").unwrap_or_else(|| uid.to_string()),
        display_name: text(doc, "displayName"),
        role: text(doc, "role"),
        status: text(doc, "status")
            .and_then(|s| RsvpStatus::parse(&s))
            .unwrap_or(RsvpStatus::Unanswered),
        updated_at: doc.get("updatedAt").and_then(to_instant),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn missing_status_defaults_to_draft() {
        let event = normalize_event(
            "E1",
            &json!({"title": "Rehearsal", "start": "2025-09-01T18:00:00.000Z"}),
        );
        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(
            event.start,
            Some(Utc.with_ymd_and_hms(2025, 9, 1, 18, 0, 0).unwrap())
        );
    }

    #[test]
    fn unparseable_start_is_absent() {
        let event = normalize_event("E2", &json!({"start": "next tuesday", "end": null}));
        assert_eq!(event.start, None);
        assert_eq!(event.end, None);
    }

    #[test]
    fn empty_document_gets_every_default() {
        let before = Utc::now();
        let event = normalize_event("E3", &json!({}));
        assert_eq!(event.title, UNTITLED_EVENT);
        assert_eq!(event.status, EventStatus::Draft);
        assert!(event.roles_needed.is_empty());
        assert!(event.assigned_uids.is_empty());
        assert!(event.created_at >= before);
        assert!(event.updated_at >= before);
    }

    #[test]
    fn non_object_document_still_normalizes() {
        let event = normalize_event("E4", &json!("garbage"));
        assert_eq!(event.title, UNTITLED_EVENT);
        assert!(event.assigned_uids.is_empty());
    }

    #[test]
    fn timestamp_shapes_all_coerce() {
        let expected = Utc.with_ymd_and_hms(2025, 9, 1, 18, 0, 0).unwrap();
        let ms = expected.timestamp_millis();

        assert_eq!(to_instant(&json!(ms)), Some(expected));
        assert_eq!(to_instant(&json!(ms as f64)), Some(expected));
        assert_eq!(
            to_instant(&json!({"seconds": expected.timestamp(), "nanoseconds": 0})),
            Some(expected)
        );
        assert_eq!(
            to_instant(&json!({"_seconds": expected.timestamp(), "_nanoseconds": 0})),
            Some(expected)
        );
        assert_eq!(to_instant(&json!("2025-09-01T20:00:00+02:00")), Some(expected));
        assert_eq!(to_instant(&json!("2025-09-01T18:00:00")), Some(expected));
        assert_eq!(
            to_instant(&json!("2025-09-01")),
            Some(Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn junk_timestamps_are_absent() {
        for value in [
            json!(null),
            json!(true),
            json!(""),
            json!([1, 2]),
            json!({"seconds": "soon"}),
            json!(1e300),
        ] {
            assert_eq!(to_instant(&value), None, "{value}");
        }
    }

    #[test]
    fn role_needs_skip_malformed_entries() {
        let event = normalize_event(
            "E5",
            &json!({
                "rolesNeeded": [
                    {"role": "tenor", "count": 4},
                    {"role": "bass", "needed": 2},
                    {"count": 3},
                    "soprano"
                ],
                "assignedUids": ["u1", 7, "u2", "u1"]
            }),
        );
        assert_eq!(
            event.roles_needed,
            vec![
                RoleNeed { role: "tenor".into(), count: 4 },
                RoleNeed { role: "bass".into(), count: 2 },
            ]
        );
        assert_eq!(event.assigned_uids, vec!["u1", "u2"]);
    }

    #[test]
    fn legacy_status_only_rsvp() {
        let rsvp = normalize_rsvp("u1", &json!({"status": "maybe"}));
        assert_eq!(rsvp.uid, "u1");
        assert_eq!(rsvp.status, RsvpStatus::Tentative);
        assert_eq!(rsvp.updated_at, None);

        let unknown = normalize_rsvp("u2", &json!({"status": "???"}));
        assert_eq!(unknown.status, RsvpStatus::Unanswered);
    }
}
