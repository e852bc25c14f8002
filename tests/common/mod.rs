#![allow(dead_code)]

use ensemble::store::{self, Store};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Fresh in-memory store. A single connection keeps every query on the
/// same database.
pub async fn memory_store() -> anyhow::Result<Store> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    store::init_schema(&pool).await?;
    Ok(Store::new(pool))
}

/// File-backed store with several pooled connections, as the server runs.
pub async fn file_store(dir: &Path) -> anyhow::Result<Store> {
    let options = SqliteConnectOptions::new()
        .filename(dir.join("ensemble.db"))
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    store::init_schema(&pool).await?;
    Ok(Store::new(pool))
}

/// Makes every insert into the given collection pattern fail, the way a
/// permission-denied write would.
pub async fn reject_writes_to(store: &Store, collection_like: &str) -> anyhow::Result<()> {
    let sql = format!(
        "CREATE TRIGGER reject_writes BEFORE INSERT ON documents
         WHEN NEW.collection LIKE '{collection_like}'
         BEGIN SELECT RAISE(ABORT, 'permission denied'); END;"
    );
    sqlx::query(&sql).execute(store.pool()).await?;
    Ok(())
}
