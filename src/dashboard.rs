use crate::events::COLLECTION;
use crate::feed::upcoming_events;
use crate::models::{Event, EventStatus, MemberRole};
use crate::normalize::normalize_event;
use crate::session::Session;
use crate::store::{Store, StoreError};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum Dashboard {
    Admin { counts: BTreeMap<&'static str, usize> },
    Performer { assigned: Vec<Event> },
    Member { upcoming: Vec<Event> },
}

pub async fn dashboard(store: &Store, session: &Session) -> Result<Dashboard, StoreError> {
    match session.role() {
        MemberRole::Admin => {
            let mut counts: BTreeMap<&'static str, usize> = [
                EventStatus::Draft,
                EventStatus::Published,
                EventStatus::Cancelled,
            ]
            .iter()
            .map(|s| (s.as_str(), 0))
            .collect();
            for (id, doc) in store.query(COLLECTION, &[]).await? {
                *counts.entry(normalize_event(&id, &doc).status.as_str()).or_default() += 1;
            }
            Ok(Dashboard::Admin { counts })
        }
        MemberRole::Performer => {
            let assigned = upcoming(store)
                .await?
                .into_iter()
                .filter(|e| e.assigned_uids.contains(&session.uid))
                .collect();
            Ok(Dashboard::Performer { assigned })
        }
        MemberRole::Member => Ok(Dashboard::Member {
            upcoming: upcoming(store).await?,
        }),
    }
}

async fn upcoming(store: &Store) -> Result<Vec<Event>, StoreError> {
    let now = Utc::now();
    Ok(upcoming_events(store, &[EventStatus::Published])
        .await?
        .into_iter()
        .filter(|e| e.start.is_some_and(|start| start >= now))
        .collect())
}
