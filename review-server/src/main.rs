use anyhow::{Context, Result};
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use review_core::IdGenerator;
use review_server::config::Config;
use review_server::http::review_router;
use review_server::search::ElasticsearchIndex;
use review_server::store::SqliteStore;
use review_server::{AppState, ReviewWorkflow};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "review-service"
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting review service");

    let config =
        Config::from_env().context("Failed to load configuration from environment variables")?;

    let ids =
        IdGenerator::new(config.node_id).context("Failed to initialize identifier generator")?;
    info!(node_id = ids.node(), "Identifier generator ready");

    let db_path = config.database_path();
    info!("Using review database: {}", db_path.display());
    let store = SqliteStore::new(&db_path).context("Failed to initialize SQLite database")?;

    let search = ElasticsearchIndex::new(&config.elasticsearch_url, &config.elasticsearch_index)
        .context("Failed to create search client")?;
    info!(
        url = %config.elasticsearch_url,
        index = %config.elasticsearch_index,
        "Using search index"
    );

    let app_state = Arc::new(AppState {
        workflow: ReviewWorkflow::new(Arc::new(store), Arc::new(search), Arc::new(ids)),
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(review_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                )),
        )
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
