use axum::Json;
use serde_json::{json, Value};

/// Static descriptor of the API
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "MuseTalk Inference Server",
        "version": musetalk_core::VERSION,
        "endpoints": {
            "/health": "Health check",
            "/infer": "POST - Run lip-sync inference"
        }
    }))
}
