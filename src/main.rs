use chrono::{Duration, Utc};
use ensemble::{
    api_router,
    config::Config,
    events::{self, NewEvent},
    models::{EventStatus, RoleNeed},
    state::AppState,
    store::{self, Store},
    users,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

async fn seed_database_if_empty(store: &Store) {
    let existing = match events::list_events(
        store,
        &[EventStatus::Draft, EventStatus::Published, EventStatus::Cancelled],
    )
    .await
    {
        Ok(existing) => existing,
        Err(e) => {
            tracing::error!(error = %e, "failed to check event count");
            return;
        }
    };
    if !existing.is_empty() {
        return;
    }

    tracing::info!("no events stored yet, adding a demo rehearsal");
    let start = Utc::now() + Duration::days(7);
    let demo = NewEvent {
        title: "Open rehearsal".to_string(),
        start: Some(start),
        end: Some(start + Duration::hours(2)),
        location: "Music Building, Room 101".to_string(),
        description: "Bring your folder.".to_string(),
        roles_needed: vec![RoleNeed {
            role: "tenor".to_string(),
            count: 4,
        }],
        assigned_uids: Vec::new(),
        client_id: None,
    };

    match events::create_event(store, demo, "seed").await {
        Ok(event) => match events::publish_event(store, &event.id).await {
            Ok(_) => tracing::info!(event_id = %event.id, "demo event published"),
            Err(e) => tracing::error!(error = %e, "failed to publish demo event"),
        },
        Err(e) => tracing::error!(error = %e, "failed to add demo event"),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ensemble=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .expect("failed to parse DATABASE_URL")
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await
        .expect("failed to connect to db");

    store::init_schema(&pool)
        .await
        .expect("failed to create documents table");

    let store = Store::new(pool);
    let _role_sync = users::spawn_role_sync(&store);

    if config.seed_demo_event {
        seed_database_if_empty(&store).await;
    }

    let app_state = AppState { store };
    let app = api_router(app_state).fallback_service(ServeDir::new(&config.public_dir));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    tracing::info!(%addr, public_dir = %config.public_dir, "listening");
    axum::serve(listener, app).await.expect("server failed");
}
