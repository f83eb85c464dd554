//! Error types for the MuseTalk CLI

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported {kind} format '{ext}', expected {expected}")]
    UnsupportedFormat {
        kind: &'static str,
        ext: String,
        expected: &'static str,
    },

    #[error("Output directory does not exist for {0}")]
    InvalidOutputPath(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("MuseTalk server unavailable at {url}: {message}")]
    ServerUnavailable { url: String, message: String },

    #[error("Server returned {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    #[error("Video assembly failed: {0}")]
    Video(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
