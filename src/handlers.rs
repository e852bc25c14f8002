use crate::{
    dashboard::{self, Dashboard},
    error::AppError,
    events::{self, EventPatch, NewEvent},
    models::{Event, EventStatus, Rsvp, RsvpInput, RsvpStatus, UserProfile},
    report, rsvp,
    session::Session,
    state::AppState,
    users::{self, ProfilePatch},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "ensemble"}))
}

#[derive(Deserialize)]
pub struct EventListQuery {
    status: Option<String>,
}

/// `?status=draft,published`; published only when absent.
fn parse_statuses(raw: Option<&str>) -> Result<Vec<EventStatus>, AppError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(vec![EventStatus::Published]);
    };
    raw.split(',')
        .map(str::trim)
        .map(|s| {
            EventStatus::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("unknown event status '{s}'")))
        })
        .collect()
}

pub async fn get_events(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let statuses = parse_statuses(query.status.as_deref())?;
    if statuses.iter().any(|s| *s != EventStatus::Published) {
        session.require_admin()?;
    }
    Ok(Json(events::list_events(&app_state.store, &statuses).await?))
}

pub async fn create_event_handler(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    session.require_admin()?;
    let event = events::create_event(&app_state.store, payload, &session.uid).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event_details(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, AppError> {
    let event = events::get_event(&app_state.store, &event_id).await?;
    if event.status != EventStatus::Published && !session.admin {
        return Err(AppError::NotFound(format!("no event with id {event_id}")));
    }
    Ok(Json(event))
}

pub async fn update_event_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<Event>, AppError> {
    session.require_admin()?;
    events::update_event(&app_state.store, &event_id, patch)
        .await
        .map(Json)
}

pub async fn publish_event_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, AppError> {
    session.require_admin()?;
    events::publish_event(&app_state.store, &event_id).await.map(Json)
}

pub async fn cancel_event_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, AppError> {
    session.require_admin()?;
    events::cancel_event(&app_state.store, &event_id).await.map(Json)
}

pub async fn delete_event_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<StatusCode, AppError> {
    session.require_admin()?;
    events::delete_event(&app_state.store, &event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_my_rsvp_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<Json<Rsvp>, AppError> {
    rsvp::get_my_rsvp(&app_state.store, &event_id, &session.uid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no response recorded for this event".to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpPayload {
    status: RsvpStatus,
    role: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

pub async fn set_rsvp_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
    Json(payload): Json<RsvpPayload>,
) -> Result<Json<Rsvp>, AppError> {
    let event = events::get_event(&app_state.store, &event_id).await?;
    if event.status != EventStatus::Published {
        return Err(AppError::Conflict(format!(
            "event {event_id} is {} and not open for responses",
            event.status
        )));
    }

    let role = payload
        .role
        .or_else(|| session.profile.as_ref().and_then(|p| p.section.clone()));
    let input = RsvpInput {
        uid: session.uid.clone(),
        display_name: session.display_name(),
        role,
        status: payload.status,
        updated_at: payload.updated_at,
    };
    Ok(Json(rsvp::set_rsvp(&app_state.store, &event_id, input).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySummary {
    event_id: String,
    counts: report::StatusCounts,
}

pub async fn availability_summary_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<Json<AvailabilitySummary>, AppError> {
    session.require_admin()?;
    let counts = report::availability_summary(&app_state.store, &event_id).await?;
    Ok(Json(AvailabilitySummary { event_id, counts }))
}

pub async fn availability_csv_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    session.require_admin()?;
    let csv = report::availability_csv(&app_state.store, &event_id).await?;
    let disposition = format!("attachment; filename=\"availability-{event_id}.csv\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

pub async fn get_me(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Json<UserProfile>, AppError> {
    users::get_profile(&app_state.store, &session.uid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no profile yet".to_string()))
}

pub async fn update_me(
    State(app_state): State<AppState>,
    session: Session,
    Json(mut patch): Json<ProfilePatch>,
) -> Result<Json<UserProfile>, AppError> {
    // Members cannot promote themselves.
    if patch.role.is_some() && !session.admin {
        patch.role = None;
    }
    Ok(Json(users::save_profile(&app_state.store, &session.uid, patch).await?))
}

pub async fn update_member_handler(
    State(app_state): State<AppState>,
    session: Session,
    Path(uid): Path<String>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<UserProfile>, AppError> {
    session.require_admin()?;
    Ok(Json(users::save_profile(&app_state.store, &uid, patch).await?))
}

pub async fn get_dashboard(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(dashboard::dashboard(&app_state.store, &session).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_default_to_published() {
        assert_eq!(parse_statuses(None).unwrap(), vec![EventStatus::Published]);
        assert_eq!(parse_statuses(Some(" ")).unwrap(), vec![EventStatus::Published]);
    }

    #[test]
    fn statuses_are_comma_separated() {
        assert_eq!(
            parse_statuses(Some("draft, published")).unwrap(),
            vec![EventStatus::Draft, EventStatus::Published]
        );
        assert!(parse_statuses(Some("draft,archived")).is_err());
    }
}
