// Server module - builds the HTTP router and runs the serve loop

use axum::Router;
use axum::http::HeaderValue;
use sea_orm::DatabaseConnection;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::infrastructure::AppState;
use crate::infrastructure::config::Config;

fn cors_layer(config: &Config) -> CorsLayer {
    let mut origins = Vec::new();
    for origin in &config.cors_allowed_origins {
        match origin.parse::<HeaderValue>() {
            Ok(v) => origins.push(v),
            Err(e) => tracing::error!("Failed to parse CORS origin '{}': {}", origin, e),
        }
    }

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Build the API router with database connection
pub fn build_router(db: DatabaseConnection, config: &Config) -> Router {
    let state = AppState::new(db, config);
    let api_router = api::api_router_with_state(state);

    Router::new()
        .nest("/api", api_router)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
}

/// Bind to the configured port and serve until the process stops
pub async fn serve(db: DatabaseConnection, config: &Config) -> Result<(), String> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = build_router(db, config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("HTTP server error: {}", e))
}
