//! HTTP client for the MuseTalk server

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{CliError, Result};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET /health` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHealth {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub gpu_available: bool,
    #[serde(default)]
    pub gpu_name: Option<String>,
}

/// `POST /infer` body.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub image: String,
    pub audio: String,
    pub fps: u32,
    pub bbox_shift: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameData {
    pub index: usize,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceResponse {
    pub status: String,
    pub total_frames: usize,
    pub fps: u32,
    pub frames: Vec<FrameData>,
    #[serde(default)]
    pub processing_time_secs: f64,
}

impl InferenceResponse {
    /// Decoded frame images in index order. The indices must be exactly
    /// `0..total_frames`.
    pub fn into_frames(self) -> Result<Vec<Vec<u8>>> {
        if self.status != "success" {
            return Err(CliError::InvalidResponse(format!("status is '{}'", self.status)));
        }
        if self.frames.len() != self.total_frames {
            return Err(CliError::InvalidResponse(format!(
                "total_frames is {} but {} frames were sent",
                self.total_frames,
                self.frames.len()
            )));
        }

        let mut frames = self.frames;
        frames.sort_by_key(|f| f.index);
        frames
            .into_iter()
            .enumerate()
            .map(|(expected, frame)| {
                if frame.index != expected {
                    return Err(CliError::InvalidResponse(format!(
                        "frame {} is missing",
                        expected
                    )));
                }
                base64::engine::general_purpose::STANDARD
                    .decode(&frame.data)
                    .map_err(|e| {
                        CliError::InvalidResponse(format!("frame {} is not base64: {}", expected, e))
                    })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

pub struct MuseTalkClient {
    base_url: String,
    client: reqwest::Client,
    infer_timeout: Duration,
}

impl MuseTalkClient {
    pub fn new(base_url: &str, infer_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            infer_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<ServerHealth> {
        let url = format!("{}/health", self.base_url);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| CliError::InvalidResponse(format!("health: {}", e)))
    }

    pub async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let url = format!("{}/infer", self.base_url);
        let payload_bytes = request.image.len() + request.audio.len();
        info!(
            "Sending inference request: {:.2} MB, fps={}, bbox_shift={}",
            payload_bytes as f64 / 1_000_000.0,
            request.fps,
            request.bbox_shift
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(self.infer_timeout)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| CliError::InvalidResponse(format!("infer: {}", e)))
    }

    fn unavailable(&self, err: reqwest::Error) -> CliError {
        CliError::ServerUnavailable {
            url: self.base_url.clone(),
            message: err.to_string(),
        }
    }
}

/// Non-2xx response. The server puts its message in `detail`.
async fn error_from(response: reqwest::Response) -> CliError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.detail)
        .unwrap_or(body);
    CliError::Server { status, detail }
}
