mod common;

use chrono::{TimeZone, Utc};
use ensemble::models::{RsvpInput, RsvpStatus};
use ensemble::rsvp::{get_my_rsvp, set_rsvp};
use serde_json::json;

fn input(uid: &str, status: RsvpStatus) -> RsvpInput {
    RsvpInput {
        uid: uid.to_string(),
        display_name: Some("Ada".to_string()),
        role: Some("alto".to_string()),
        status,
        updated_at: None,
    }
}

#[tokio::test]
async fn written_rsvp_reads_back() -> anyhow::Result<()> {
    let store = common::memory_store().await?;

    set_rsvp(&store, "E1", input("u1", RsvpStatus::Accepted)).await?;
    let rsvp = get_my_rsvp(&store, "E1", "u1").await?.expect("rsvp stored");

    assert_eq!(rsvp.status, RsvpStatus::Accepted);
    assert_eq!(rsvp.display_name.as_deref(), Some("Ada"));
    assert_eq!(rsvp.role.as_deref(), Some("alto"));
    assert!(rsvp.updated_at.is_some());
    Ok(())
}

#[tokio::test]
async fn all_three_mirrors_are_written() -> anyhow::Result<()> {
    let store = common::memory_store().await?;
    set_rsvp(&store, "E1", input("u1", RsvpStatus::Tentative)).await?;

    let canonical = store.get("events/E1/availability", "u1").await?.expect("canonical");
    assert_eq!(canonical["status"], "tentative");
    assert_eq!(canonical["uid"], "u1");

    let legacy = store.get("events/E1/rsvps", "u1").await?.expect("legacy");
    assert_eq!(legacy["status"], "tentative");
    assert!(legacy.get("displayName").is_none());

    let flat = store.get("availability", "E1_u1").await?.expect("flat");
    assert_eq!(flat["status"], "tentative");
    assert_eq!(flat["eventId"], "E1");
    assert_eq!(flat["source"], "events");
    assert_eq!(flat["ref"], "events/E1/availability/u1");
    Ok(())
}

#[tokio::test]
async fn failed_legacy_write_leaves_canonical_committed() -> anyhow::Result<()> {
    let store = common::memory_store().await?;
    common::reject_writes_to(&store, "events/%/rsvps").await?;

    let mut declined = input("u1", RsvpStatus::Declined);
    declined.updated_at = Utc.timestamp_millis_opt(123).single();
    let result = set_rsvp(&store, "E1", declined).await;
    assert!(result.is_err());

    let canonical = store.get("events/E1/availability", "u1").await?.expect("canonical");
    assert_eq!(canonical["status"], "declined");
    assert!(store.get("events/E1/rsvps", "u1").await?.is_none());
    assert!(store.get("availability", "E1_u1").await?.is_none());

    let rsvp = get_my_rsvp(&store, "E1", "u1").await?.expect("canonical still readable");
    assert_eq!(rsvp.status, RsvpStatus::Declined);
    assert_eq!(rsvp.updated_at, Utc.timestamp_millis_opt(123).single());
    Ok(())
}

#[tokio::test]
async fn reads_fall_back_through_mirrors_in_order() -> anyhow::Result<()> {
    let store = common::memory_store().await?;
    assert!(get_my_rsvp(&store, "E1", "u1").await?.is_none());

    store
        .set_merge("availability", "E1_u1", json!({"uid": "u1", "status": "no"}))
        .await?;
    let flat_only = get_my_rsvp(&store, "E1", "u1").await?.expect("flat");
    assert_eq!(flat_only.status, RsvpStatus::Declined);

    store
        .set_merge("events/E1/rsvps", "u1", json!({"status": "yes"}))
        .await?;
    let legacy = get_my_rsvp(&store, "E1", "u1").await?.expect("legacy");
    assert_eq!(legacy.status, RsvpStatus::Accepted);
    assert_eq!(legacy.uid, "u1");

    store
        .set_merge("events/E1/availability", "u1", json!({"status": "tentative"}))
        .await?;
    let canonical = get_my_rsvp(&store, "E1", "u1").await?.expect("canonical");
    assert_eq!(canonical.status, RsvpStatus::Tentative);
    Ok(())
}

#[tokio::test]
async fn rewrites_merge_over_existing_fields() -> anyhow::Result<()> {
    let store = common::memory_store().await?;
    store
        .set_merge(
            "events/E1/availability",
            "u1",
            json!({"note": "arrives late", "displayName": "Ada L."}),
        )
        .await?;

    let mut change = input("u1", RsvpStatus::Accepted);
    change.display_name = None;
    set_rsvp(&store, "E1", change).await?;
    set_rsvp(&store, "E1", input("u1", RsvpStatus::Declined)).await?;

    let canonical = store.get("events/E1/availability", "u1").await?.expect("canonical");
    assert_eq!(canonical["note"], "arrives late");
    assert_eq!(canonical["status"], "declined");
    assert_eq!(canonical["displayName"], "Ada");
    Ok(())
}
