//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
    pub gpu_available: bool,
    pub gpu_name: Option<String>,
}

/// Reports model residency and probes the accelerator. Never loads models.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gpu = state.service.gpu_status().await;

    Json(HealthResponse {
        status: "healthy",
        version: musetalk_core::VERSION,
        model_loaded: state.service.is_model_loaded(),
        gpu_available: gpu.available,
        gpu_name: gpu.name,
    })
}
