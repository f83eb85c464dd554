//! Decoding and validation of job payloads

use base64::Engine;
use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Encoded payloads as they arrive over the wire.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Base64-encoded still image (PNG, JPEG)
    pub image: String,
    /// Base64-encoded WAV
    pub audio: String,
    pub fps: u32,
    pub bbox_shift: i32,
}

/// A validated job, ready to be staged into a sandbox.
#[derive(Debug, Clone)]
pub struct InferenceJob {
    pub id: Uuid,
    /// Reference frame re-encoded as RGB PNG
    pub image_png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Audio bytes exactly as received
    pub audio_wav: Vec<u8>,
    pub audio_duration_secs: f32,
    pub fps: u32,
    pub bbox_shift: i32,
}

impl InferenceJob {
    /// Decode both payloads. Every failure here is the caller's fault and
    /// happens before any model load or filesystem work.
    pub fn decode(request: &JobRequest) -> Result<Self> {
        if request.fps == 0 {
            return Err(Error::InvalidInput("fps must be a positive integer".to_string()));
        }

        let image_bytes = decode_base64("image", &request.image)?;
        let audio_wav = decode_base64("audio", &request.audio)?;

        let (image_png, width, height) = decode_image(&image_bytes)?;
        let audio_duration_secs = decode_audio(&audio_wav)?;

        let job = Self {
            id: Uuid::new_v4(),
            image_png,
            width,
            height,
            audio_wav,
            audio_duration_secs,
            fps: request.fps,
            bbox_shift: request.bbox_shift,
        };

        debug!(
            "Job {}: {}x{} image, {:.2}s audio",
            job.id, job.width, job.height, job.audio_duration_secs
        );
        Ok(job)
    }
}

fn decode_base64(field: &str, encoded: &str) -> Result<Vec<u8>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::InvalidInput(format!("{} is not valid base64: {}", field, e)))?;

    if bytes.is_empty() {
        return Err(Error::InvalidInput(format!("{} payload is empty", field)));
    }
    Ok(bytes)
}

fn decode_image(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidInput(format!("image could not be decoded: {}", e)))?;

    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut png = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| Error::InferenceError(format!("Failed to encode PNG: {}", e)))?;

    Ok((png, width, height))
}

fn decode_audio(bytes: &[u8]) -> Result<f32> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::InvalidInput(format!("audio is not a valid WAV file: {}", e)))?;

    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(Error::InvalidInput(
            "audio declares zero sample rate or channels".to_string(),
        ));
    }

    Ok(reader.duration() as f32 / spec.sample_rate as f32)
}
