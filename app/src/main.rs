use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_embed::ServeEmbed;
use clap::Parser;
use common::{AppState, Config};
use database::Database;
use movements::store::MovementStore;
use rust_embed::RustEmbed;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(RustEmbed, Clone)]
#[folder = "public/"]
struct Assets;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize Logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Load Config from .env, environment and CLI args
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }
    let config = Config::parse();
    tracing::info!(
        "Policies: total spent = {}, payment date = {}",
        config.total_spent,
        config.payment_date
    );

    // 3. Initialize Database
    let db = Database::new(&config.database_url).await?;
    db.run_migrations().await?;

    // 4. Load the movement list
    let store = MovementStore::load(db, &config.storage_key, config.payment_date).await;
    let state = Arc::new(AppState::new(store, config.clone()));

    // 5. Routing
    let serve_assets = ServeEmbed::<Assets>::new();

    for file in Assets::iter() {
        tracing::debug!("Embedded file: {}", file);
    }

    let app = Router::<Arc<AppState>>::new()
        // The worker must be served from the root to control the whole site.
        .route("/service-worker.js", get(service_worker))
        .nest_service("/public", serve_assets)
        .merge(dashboard::handler::dashboard_router(state.clone()))
        .nest("/api", dashboard::handler::api_router(state.clone()))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // 6. Start Server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn service_worker() -> Response {
    match Assets::get("service-worker.js") {
        Some(file) => (
            [
                (header::CONTENT_TYPE, "application/javascript"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            file.data.into_owned(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "service worker not bundled").into_response(),
    }
}
