use crate::error::AppError;
use crate::models::{Event, EventStatus, RoleNeed};
use crate::normalize::{normalize_event, to_instant};
use crate::store::{Filter, Store, StoreError};
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

pub const COLLECTION: &str = "events";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub roles_needed: Vec<RoleNeed>,
    #[serde(default)]
    pub assigned_uids: Vec<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub roles_needed: Option<Vec<RoleNeed>>,
    pub assigned_uids: Option<Vec<String>>,
    pub client_id: Option<String>,
}

impl EventPatch {
    fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                fields.insert(key.to_string(), value);
            }
        };
        put("title", self.title.map(Value::from));
        put("start", self.start.map(|t| Value::from(t.to_rfc3339())));
        put("end", self.end.map(|t| Value::from(t.to_rfc3339())));
        put("location", self.location.map(Value::from));
        put("description", self.description.map(Value::from));
        put("rolesNeeded", self.roles_needed.map(|r| json!(r)));
        put("assignedUids", self.assigned_uids.map(|u| json!(u)));
        put("clientId", self.client_id.map(Value::from));
        fields
    }
}

pub async fn create_event(store: &Store, new: NewEvent, creator: &str) -> Result<Event, AppError> {
    if new.title.trim().is_empty() {
        return Err(AppError::BadRequest("event title cannot be empty".to_string()));
    }
    if let (Some(start), Some(end)) = (new.start, new.end) {
        if end < start {
            return Err(AppError::BadRequest("event ends before it starts".to_string()));
        }
    }

    let id = nanoid!(10);
    let now = Utc::now().to_rfc3339();
    let doc = json!({
        "title": new.title,
        "start": new.start.map(|t| t.to_rfc3339()),
        "end": new.end.map(|t| t.to_rfc3339()),
        "location": new.location,
        "description": new.description,
        "status": EventStatus::Draft.as_str(),
        "rolesNeeded": new.roles_needed,
        "assignedUids": new.assigned_uids,
        "clientId": new.client_id,
        "createdBy": creator,
        "createdAt": now,
        "updatedAt": now,
    });
    store.set_merge(COLLECTION, &id, doc.clone()).await?;
    info!(event_id = %id, creator, "event created");
    Ok(normalize_event(&id, &doc))
}

pub async fn get_event(store: &Store, id: &str) -> Result<Event, AppError> {
    find_event(store, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no event with id {id}")))
}

async fn find_event(store: &Store, id: &str) -> Result<Option<Event>, StoreError> {
    Ok(store
        .get(COLLECTION, id)
        .await?
        .map(|doc| normalize_event(id, &doc)))
}

/// Events with any of `statuses`, ordered by start; unscheduled ones last.
pub async fn list_events(store: &Store, statuses: &[EventStatus]) -> Result<Vec<Event>, StoreError> {
    let mut events = query_by_status(store, statuses).await?;
    events.sort_by_key(|e| (e.start.is_none(), e.start));
    Ok(events)
}

pub(crate) async fn query_by_status(
    store: &Store,
    statuses: &[EventStatus],
) -> Result<Vec<Event>, StoreError> {
    let wanted = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let docs = store
        .query(COLLECTION, &[Filter::In("status", wanted)])
        .await?;
    Ok(docs
        .iter()
        .map(|(id, doc)| normalize_event(id, doc))
        .collect())
}

pub async fn update_event(store: &Store, id: &str, patch: EventPatch) -> Result<Event, AppError> {
    let current = get_event(store, id).await?;
    if current.status == EventStatus::Cancelled {
        return Err(AppError::Conflict(format!("event {id} is cancelled")));
    }

    let mut fields = patch.into_fields();
    let start = fields.get("start").and_then(to_instant).or(current.start);
    let end = fields.get("end").and_then(to_instant).or(current.end);
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::BadRequest("event ends before it starts".to_string()));
        }
    }
    fields.insert("updatedAt".to_string(), Value::from(Utc::now().to_rfc3339()));

    store.set_merge(COLLECTION, id, Value::Object(fields)).await?;
    info!(event_id = id, "event updated");
    get_event(store, id).await
}

pub async fn publish_event(store: &Store, id: &str) -> Result<Event, AppError> {
    transition(store, id, EventStatus::Published).await
}

pub async fn cancel_event(store: &Store, id: &str) -> Result<Event, AppError> {
    transition(store, id, EventStatus::Cancelled).await
}

async fn transition(store: &Store, id: &str, next: EventStatus) -> Result<Event, AppError> {
    let current = get_event(store, id).await?;
    if !current.status.can_become(next) {
        return Err(AppError::Conflict(format!(
            "event {id} cannot go from {} to {next}",
            current.status
        )));
    }

    let now = Utc::now().to_rfc3339();
    let mut fields = json!({"status": next.as_str(), "updatedAt": now});
    if next == EventStatus::Published {
        fields["publishedAt"] = json!(now);
    }
    store.set_merge(COLLECTION, id, fields).await?;
    info!(event_id = id, from = %current.status, to = %next, "event status changed");
    get_event(store, id).await
}

/// Removes the event document only; responses stored under it are left
/// in place.
pub async fn delete_event(store: &Store, id: &str) -> Result<(), AppError> {
    if !store.delete(COLLECTION, id).await? {
        return Err(AppError::NotFound(format!("no event with id {id}")));
    }
    info!(event_id = id, "event deleted");
    Ok(())
}
