//! Local input checks and loading
//!
//! The server takes a still image and a WAV clip, so those are the only
//! formats accepted here. Both are checked before any network traffic.

use base64::Engine;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CliError, Result};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const AUDIO_EXTENSIONS: &[&str] = &["wav"];

/// Reference portrait, re-encoded as PNG for the wire.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub width: u32,
    pub height: u32,
    pub base64_png: String,
}

/// Voice track, sent exactly as read.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f32,
    pub base64_wav: String,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn check_file(path: &Path, kind: &'static str, allowed: &[&str], expected: &'static str) -> Result<()> {
    if !path.is_file() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    let ext = extension(path);
    if !allowed.contains(&ext.as_str()) {
        return Err(CliError::UnsupportedFormat { kind, ext, expected });
    }
    Ok(())
}

pub fn validate_image_path(path: &Path) -> Result<()> {
    check_file(path, "image", IMAGE_EXTENSIONS, "PNG or JPEG")
}

pub fn validate_audio_path(path: &Path) -> Result<()> {
    check_file(path, "audio", AUDIO_EXTENSIONS, "WAV")
}

/// The output file may not exist yet, but its directory must.
pub fn validate_output_path(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if !parent.is_dir() {
        return Err(CliError::InvalidOutputPath(path.to_path_buf()));
    }
    Ok(())
}

pub fn validate_inputs(image: &Path, audio: &Path, output: &Path) -> Result<()> {
    validate_image_path(image)?;
    validate_audio_path(audio)?;
    validate_output_path(output)
}

pub fn load_image(path: &Path) -> Result<ImageInput> {
    debug!("Loading image from {}", path.display());

    let img = image::open(path)
        .map_err(|e| CliError::InvalidInput(format!("{}: {}", path.display(), e)))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut png = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| CliError::InvalidInput(format!("Failed to encode PNG: {}", e)))?;
    let base64_png = base64::engine::general_purpose::STANDARD.encode(&png);

    info!("Loaded image: {}x{} ({} base64 chars)", width, height, base64_png.len());
    Ok(ImageInput {
        width,
        height,
        base64_png,
    })
}

pub fn load_audio(path: &Path) -> Result<AudioInput> {
    debug!("Loading audio from {}", path.display());

    let bytes = std::fs::read(path)?;
    let reader = hound::WavReader::new(Cursor::new(&bytes))
        .map_err(|e| CliError::InvalidInput(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(CliError::InvalidInput(format!(
            "{}: zero sample rate or channels",
            path.display()
        )));
    }
    let duration_secs = reader.duration() as f32 / spec.sample_rate as f32;
    let base64_wav = base64::engine::general_purpose::STANDARD.encode(&bytes);

    info!(
        "Loaded audio: {:.2}s, {} Hz, {} ch",
        duration_secs, spec.sample_rate, spec.channels
    );
    Ok(AudioInput {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_secs,
        base64_wav,
    })
}

/// Absolute form of `path` for messages and child processes.
pub fn display_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
