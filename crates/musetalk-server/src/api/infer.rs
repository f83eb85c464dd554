//! Lip-sync inference endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use base64::Engine;
use musetalk_core::{Frame, JobRequest};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Inference request. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct InferenceRequest {
    /// Base64-encoded still image
    pub image: String,
    /// Base64-encoded WAV
    pub audio: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Mouth openness adjustment
    #[serde(default)]
    pub bbox_shift: i32,
}

fn default_fps() -> u32 {
    25
}

#[derive(Debug, Serialize)]
pub struct FrameData {
    pub index: usize,
    /// Base64-encoded PNG
    pub data: String,
}

impl From<Frame> for FrameData {
    fn from(frame: Frame) -> Self {
        Self {
            index: frame.index,
            data: base64::engine::general_purpose::STANDARD.encode(frame.data),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InferenceResponse {
    pub status: &'static str,
    pub total_frames: usize,
    pub fps: u32,
    pub frames: Vec<FrameData>,
    pub processing_time_secs: f64,
}

pub async fn infer(
    State(state): State<AppState>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<Json<InferenceResponse>, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        warn!("Rejected inference request: {}", rejection.body_text());
        ApiError::from(rejection)
    })?;

    info!(
        "Inference request: fps={}, bbox_shift={}",
        req.fps, req.bbox_shift
    );

    let fps = req.fps;
    let job = JobRequest {
        image: req.image,
        audio: req.audio,
        fps: req.fps,
        bbox_shift: req.bbox_shift,
    };

    let output = state.service.infer(job).await.map_err(|e| {
        if e.is_client_error() {
            warn!("Invalid inference input: {}", e);
        } else {
            error!("Inference failed: {}", e);
        }
        ApiError::from(e)
    })?;

    let processing_time_secs = output.processing_time.as_secs_f64();
    info!(
        "Generated {} frames in {:.2}s",
        output.frames.len(),
        processing_time_secs
    );

    let frames: Vec<FrameData> = output.frames.into_iter().map(FrameData::from).collect();

    Ok(Json(InferenceResponse {
        status: "success",
        total_frames: frames.len(),
        fps,
        frames,
        processing_time_secs,
    }))
}
