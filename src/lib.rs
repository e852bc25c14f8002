pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod feed;
pub mod handlers;
pub mod models;
pub mod normalize;
pub mod report;
pub mod rsvp;
pub mod session;
pub mod state;
pub mod store;
pub mod users;

use axum::{
    Router,
    routing::{get, post, put},
};
use state::AppState;
use tower_http::trace::TraceLayer;

pub fn api_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/events",
            get(handlers::get_events).post(handlers::create_event_handler),
        )
        .route(
            "/api/events/{event_id}",
            get(handlers::get_event_details)
                .patch(handlers::update_event_handler)
                .delete(handlers::delete_event_handler),
        )
        .route("/api/events/{event_id}/publish", post(handlers::publish_event_handler))
        .route("/api/events/{event_id}/cancel", post(handlers::cancel_event_handler))
        .route(
            "/api/events/{event_id}/rsvp",
            get(handlers::get_my_rsvp_handler).put(handlers::set_rsvp_handler),
        )
        .route(
            "/api/events/{event_id}/availability",
            get(handlers::availability_summary_handler),
        )
        .route(
            "/api/events/{event_id}/availability.csv",
            get(handlers::availability_csv_handler),
        )
        .route("/api/me", get(handlers::get_me).put(handlers::update_me))
        .route("/api/members/{uid}", put(handlers::update_member_handler))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
