use crate::models::{MemberRole, UserProfile};
use crate::normalize::to_instant;
use crate::store::{ChangeKind, Store, StoreError};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const COLLECTION: &str = "users";
pub const CLAIMS_COLLECTION: &str = "claims";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub section: Option<String>,
    pub role: Option<MemberRole>,
}

fn text(doc: &Value, key: &str) -> Option<String> {
    doc.get(key).and_then(Value::as_str).map(str::to_string)
}

fn profile_from_doc(uid: &str, doc: &Value) -> UserProfile {
    UserProfile {
        uid: uid.to_string(),
        display_name: text(doc, "displayName"),
        email: text(doc, "email"),
        phone: text(doc, "phone"),
        section: text(doc, "section"),
        role: text(doc, "role")
            .and_then(|r| MemberRole::parse(&r))
            .unwrap_or_default(),
        updated_at: doc.get("updatedAt").and_then(to_instant),
    }
}

pub async fn get_profile(store: &Store, uid: &str) -> Result<Option<UserProfile>, StoreError> {
    Ok(store
        .get(COLLECTION, uid)
        .await?
        .map(|doc| profile_from_doc(uid, &doc)))
}

pub async fn save_profile(
    store: &Store,
    uid: &str,
    patch: ProfilePatch,
) -> Result<UserProfile, StoreError> {
    let mut fields = Map::new();
    for (key, value) in [
        ("displayName", patch.display_name),
        ("email", patch.email),
        ("phone", patch.phone),
        ("section", patch.section),
    ] {
        if let Some(value) = value {
            fields.insert(key.to_string(), Value::from(value));
        }
    }
    if let Some(role) = patch.role {
        fields.insert("role".to_string(), json!(role));
    }
    fields.insert("updatedAt".to_string(), Value::from(Utc::now().to_rfc3339()));

    store.set_merge(COLLECTION, uid, Value::Object(fields)).await?;
    let doc = store.get(COLLECTION, uid).await?.unwrap_or_default();
    Ok(profile_from_doc(uid, &doc))
}

/// Mirrors the profile's role into the `admin` claim. Returns the claim
/// written, or `None` when the profile no longer exists.
pub async fn sync_role_claim(store: &Store, uid: &str) -> Result<Option<bool>, StoreError> {
    let Some(doc) = store.get(COLLECTION, uid).await? else {
        return Ok(None);
    };
    let admin = doc.get("role").and_then(Value::as_str) == Some("admin");
    store
        .set_merge(CLAIMS_COLLECTION, uid, json!({ "admin": admin }))
        .await?;
    info!(uid, admin, "role claim synced");
    Ok(Some(admin))
}

pub async fn is_admin(store: &Store, uid: &str) -> Result<bool, StoreError> {
    Ok(store
        .get(CLAIMS_COLLECTION, uid)
        .await?
        .and_then(|claims| claims.get("admin").and_then(Value::as_bool))
        .unwrap_or(false))
}

/// Keeps claims in step with profile writes for as long as the store lives.
pub fn spawn_role_sync(store: &Store) -> JoinHandle<()> {
    let mut changes = store.watch();
    let store = store.clone();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) if change.collection == COLLECTION && change.kind == ChangeKind::Written => {
                    if let Err(e) = sync_role_claim(&store, &change.id).await {
                        warn!(uid = %change.id, error = %e, "role claim sync failed");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "role sync lagged, some profile updates were not synced");
                }
                Err(RecvError::Closed) => return,
            }
        }
    })
}
