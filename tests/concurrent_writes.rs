mod common;

use ensemble::models::{RsvpInput, RsvpStatus};
use ensemble::report::availability_summary;
use ensemble::rsvp::{get_my_rsvp, set_rsvp};
use serde_json::{Map, Value, json};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_rsvps_from_many_members_all_land() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = common::file_store(dir.path()).await?;

    let mut writers = JoinSet::new();
    for i in 0..40 {
        let store = store.clone();
        writers.spawn(async move {
            let input = RsvpInput {
                uid: format!("u{i}"),
                display_name: None,
                role: None,
                status: RsvpStatus::Accepted,
                updated_at: None,
            };
            set_rsvp(&store, "E1", input).await
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = writers.join_next().await {
        if let Err(e) = joined? {
            failures.push(e.to_string());
        }
    }
    assert!(failures.is_empty(), "{} writes failed: {:?}", failures.len(), failures.first());

    for i in 0..40 {
        let rsvp = get_my_rsvp(&store, "E1", &format!("u{i}")).await?.expect("rsvp stored");
        assert_eq!(rsvp.status, RsvpStatus::Accepted);
        assert!(store.get("events/E1/rsvps", &format!("u{i}")).await?.is_some());
    }
    assert_eq!(availability_summary(&store, "E1").await?.yes, 40);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_merges_into_one_document_keep_every_field() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = common::file_store(dir.path()).await?;

    let mut writers = JoinSet::new();
    for i in 0..20 {
        let store = store.clone();
        writers.spawn(async move {
            let mut fields = Map::new();
            fields.insert(format!("section{i}"), json!(i));
            store.set_merge("events", "E1", Value::Object(fields)).await
        });
    }
    while let Some(joined) = writers.join_next().await {
        joined??;
    }

    let doc = store.get("events", "E1").await?.expect("document");
    for i in 0..20 {
        assert_eq!(doc[format!("section{i}")], i, "section{i} lost");
    }
    Ok(())
}
