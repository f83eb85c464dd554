//! API routes and handlers

mod health;
mod infer;
mod info;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use musetalk_core::ServerConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(info::root))
        .route("/health", get(health::health_check))
        .route("/infer", post(infer::infer))
        .layer(DefaultBodyLimit::max(config.max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
