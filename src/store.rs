//! JSON document store on top of SQLite.
//!
//! Documents live in a single table keyed by `(collection, id)`, where
//! `collection` is a slash-separated path such as `events/abc/availability`.
//! Every committed write or delete is announced on a broadcast channel so
//! that live queries can refresh.

use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("document {collection}/{id} is not valid JSON: {source}")]
    Corrupt {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("document bodies must be JSON objects")]
    NotAnObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Written,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, String),
    In(&'static str, Vec<String>),
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    changes: broadcast::Sender<Change>,
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (collection, id)
        );",
    )
    .execute(pool)
    .await?;
    Ok(())
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Store { pool, changes }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn watch(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(data,)| parse_body(collection, id, &data))
            .transpose()
    }

    /// Creates the document if it is absent, otherwise overlays `fields` on
    /// top of it. Nested objects are merged key by key.
    ///
    /// The transaction takes the write lock before reading, so concurrent
    /// writers queue on the busy timeout instead of failing the upgrade
    /// from a read lock.
    pub async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), StoreError> {
        let Value::Object(fields) = fields else {
            return Err(StoreError::NotAnObject);
        };

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let mut doc = match existing {
            Some((data,)) => match parse_body(collection, id, &data)? {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            None => Map::new(),
        };
        merge_into(&mut doc, fields);

        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)
             ON CONFLICT (collection, id) DO UPDATE SET data = excluded.data, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(collection)
        .bind(id)
        .bind(Value::Object(doc).to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(collection, id, "document written");
        self.announce(collection, id, ChangeKind::Written);
        Ok(())
    }

    /// Returns whether a document was removed.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let removed = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 {
            debug!(collection, id, "document deleted");
            self.announce(collection, id, ChangeKind::Deleted);
        }
        Ok(removed > 0)
    }

    /// Documents lacking a filtered field never match.
    pub async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
        qb.push_bind(collection);

        for filter in filters {
            match filter {
                Filter::Eq(field, value) => {
                    qb.push(" AND json_extract(data, ")
                        .push_bind(json_path(field))
                        .push(") = ")
                        .push_bind(value.clone());
                }
                Filter::In(field, values) => {
                    if values.is_empty() {
                        return Ok(Vec::new());
                    }
                    qb.push(" AND json_extract(data, ")
                        .push_bind(json_path(field))
                        .push(") IN (");
                    let mut list = qb.separated(", ");
                    for value in values {
                        list.push_bind(value.clone());
                    }
                    list.push_unseparated(")");
                }
            }
        }
        qb.push(" ORDER BY id");

        let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(id, data)| {
                let body = parse_body(collection, &id, &data)?;
                Ok((id, body))
            })
            .collect()
    }

    fn announce(&self, collection: &str, id: &str, kind: ChangeKind) {
        // No receivers is the normal state when nothing is subscribed.
        let _ = self.changes.send(Change {
            collection: collection.to_string(),
            id: id.to_string(),
            kind,
        });
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn parse_body(collection: &str, id: &str, data: &str) -> Result<Value, StoreError> {
    serde_json::from_str(data).map_err(|source| StoreError::Corrupt {
        collection: collection.to_string(),
        id: id.to_string(),
        source,
    })
}

fn merge_into(target: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (key, value) in fields {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_unrelated_fields_and_descends_into_objects() {
        let Value::Object(mut doc) = json!({
            "title": "Fall concert",
            "venue": {"name": "Hall A", "capacity": 300},
        }) else {
            unreachable!()
        };
        let Value::Object(patch) = json!({
            "status": "published",
            "venue": {"capacity": 250},
        }) else {
            unreachable!()
        };

        merge_into(&mut doc, patch);

        assert_eq!(
            Value::Object(doc),
            json!({
                "title": "Fall concert",
                "status": "published",
                "venue": {"name": "Hall A", "capacity": 250},
            })
        );
    }

    #[test]
    fn merge_replaces_scalars_with_objects() {
        let Value::Object(mut doc) = json!({"start": "2025-09-01"}) else {
            unreachable!()
        };
        let Value::Object(patch) = json!({"start": {"seconds": 1, "nanoseconds": 0}}) else {
            unreachable!()
        };
        merge_into(&mut doc, patch);
        assert_eq!(doc["start"], json!({"seconds": 1, "nanoseconds": 0}));
    }
}
