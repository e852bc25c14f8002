//! A member's response to an event is stored three times: the canonical
//! per-event record, a legacy status-only record, and a flat cross-event
//! record used for reporting. Reads take the first copy found; writes go to
//! all three in order and stop at the first failure without undoing the
//! copies already written.

use crate::models::{Rsvp, RsvpInput};
use crate::normalize::normalize_rsvp;
use crate::store::{Store, StoreError};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

pub const FLAT_COLLECTION: &str = "availability";
pub const FLAT_SOURCE: &str = "events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    Canonical,
    Legacy,
    Flat,
}

impl Mirror {
    /// Read priority order.
    pub const ALL: [Mirror; 3] = [Mirror::Canonical, Mirror::Legacy, Mirror::Flat];

    pub fn location(&self, event_id: &str, uid: &str) -> (String, String) {
        match self {
            Mirror::Canonical => (format!("events/{event_id}/availability"), uid.to_string()),
            Mirror::Legacy => (format!("events/{event_id}/rsvps"), uid.to_string()),
            Mirror::Flat => (FLAT_COLLECTION.to_string(), flat_id(event_id, uid)),
        }
    }
}

pub fn flat_id(event_id: &str, uid: &str) -> String {
    format!("{event_id}_{uid}")
}

pub async fn get_my_rsvp(
    store: &Store,
    event_id: &str,
    uid: &str,
) -> Result<Option<Rsvp>, StoreError> {
    for mirror in Mirror::ALL {
        let (collection, id) = mirror.location(event_id, uid);
        if let Some(doc) = store.get(&collection, &id).await? {
            return Ok(Some(normalize_rsvp(uid, &doc)));
        }
    }
    Ok(None)
}

pub async fn set_rsvp(store: &Store, event_id: &str, input: RsvpInput) -> Result<Rsvp, StoreError> {
    let rsvp = Rsvp {
        uid: input.uid,
        display_name: input.display_name,
        role: input.role,
        status: input.status,
        updated_at: Some(input.updated_at.unwrap_or_else(Utc::now)),
    };

    for mirror in Mirror::ALL {
        let (collection, id) = mirror.location(event_id, &rsvp.uid);
        let body = mirror_body(mirror, event_id, &rsvp);
        if let Err(e) = store.set_merge(&collection, &id, body).await {
            warn!(
                event_id,
                uid = %rsvp.uid,
                mirror = ?mirror,
                error = %e,
                "rsvp write failed, earlier mirrors keep the new value"
            );
            return Err(e);
        }
    }

    info!(event_id, uid = %rsvp.uid, status = rsvp.status.as_str(), "rsvp saved");
    Ok(rsvp)
}

fn mirror_body(mirror: Mirror, event_id: &str, rsvp: &Rsvp) -> Value {
    let updated_at = rsvp.updated_at.map(|t| t.to_rfc3339());
    let mut body = match mirror {
        Mirror::Legacy => {
            return json!({
                "status": rsvp.status.as_str(),
                "updatedAt": updated_at,
            });
        }
        Mirror::Canonical | Mirror::Flat => json!({
            "uid": rsvp.uid,
            "status": rsvp.status.as_str(),
            "updatedAt": updated_at,
        }),
    };
    // Optional fields are only written when known so a merge never blanks them.
    if let Some(name) = &rsvp.display_name {
        body["displayName"] = json!(name);
    }
    if let Some(role) = &rsvp.role {
        body["role"] = json!(role);
    }
    if mirror == Mirror::Flat {
        let (canonical_collection, canonical_id) = Mirror::Canonical.location(event_id, &rsvp.uid);
        body["eventId"] = json!(event_id);
        body["source"] = json!(FLAT_SOURCE);
        body["ref"] = json!(format!("{canonical_collection}/{canonical_id}"));
    }
    body
}
