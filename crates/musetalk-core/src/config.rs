//! Configuration types for the MuseTalk inference server
//!
//! Settings are layered: built-in defaults, then an optional `musetalk.toml`
//! in the working directory, then the process environment (`HOST`, `PORT`,
//! `MODEL_VERSION`, `PRELOAD_MODELS`, ...). They are read once at startup
//! and fixed for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Name of the optional configuration file, without extension.
const CONFIG_FILE: &str = "musetalk";

/// Weight set selector for the MuseTalk UNet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelVersion {
    V1,
    #[default]
    V15,
}

impl ModelVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVersion::V1 => "v1",
            ModelVersion::V15 => "v1.5",
        }
    }

    /// Version tag understood by the inference library's `--version` flag.
    pub fn library_tag(&self) -> &'static str {
        match self {
            ModelVersion::V1 => "v1",
            ModelVersion::V15 => "v15",
        }
    }

    /// UNet weights relative to the MuseTalk checkout.
    pub fn unet_model_path(&self) -> &'static str {
        match self {
            ModelVersion::V1 => "models/musetalk/unet.pth",
            ModelVersion::V15 => "models/musetalkV15/unet.pth",
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" | "1.0" | "v1.0" => Ok(ModelVersion::V1),
            "v1.5" | "1.5" | "v15" => Ok(ModelVersion::V15),
            other => Err(Error::ConfigError(format!(
                "Unknown model version '{}', expected v1 or v1.5",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ModelVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelVersion> for String {
    fn from(version: ModelVersion) -> Self {
        version.as_str().to_string()
    }
}

/// Inference library parameters that are operational constants rather than
/// per-request inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeParams {
    #[serde(default)]
    pub gpu_id: u32,

    #[serde(default = "default_vae_type")]
    pub vae_type: String,

    #[serde(default = "default_extra_margin")]
    pub extra_margin: u32,

    #[serde(default = "default_audio_padding")]
    pub audio_padding_length_left: u32,

    #[serde(default = "default_audio_padding")]
    pub audio_padding_length_right: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_use_float16")]
    pub use_float16: bool,

    /// Face-parsing mode (`jaw` or `raw`)
    #[serde(default = "default_parsing_mode")]
    pub parsing_mode: String,

    #[serde(default = "default_cheek_width")]
    pub left_cheek_width: u32,

    #[serde(default = "default_cheek_width")]
    pub right_cheek_width: u32,

    /// Static ffmpeg build, relative to the MuseTalk checkout
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self {
            gpu_id: 0,
            vae_type: default_vae_type(),
            extra_margin: default_extra_margin(),
            audio_padding_length_left: default_audio_padding(),
            audio_padding_length_right: default_audio_padding(),
            batch_size: default_batch_size(),
            use_float16: default_use_float16(),
            parsing_mode: default_parsing_mode(),
            left_cheek_width: default_cheek_width(),
            right_cheek_width: default_cheek_width(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

fn default_vae_type() -> String {
    "sd-vae".to_string()
}

fn default_extra_margin() -> u32 {
    10
}

fn default_audio_padding() -> u32 {
    2
}

fn default_batch_size() -> u32 {
    8
}

fn default_use_float16() -> bool {
    true
}

fn default_parsing_mode() -> String {
    "jaw".to_string()
}

fn default_cheek_width() -> u32 {
    90
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("./ffmpeg-4.4-amd64-static/")
}

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// MuseTalk checkout containing `scripts/` and `models/`
    #[serde(default = "default_musetalk_dir")]
    pub musetalk_dir: PathBuf,

    #[serde(default)]
    pub model_version: ModelVersion,

    /// Python interpreter used for both invocation strategies
    #[serde(default = "default_python_cmd")]
    pub python_cmd: String,

    /// Bridge script, relative paths resolve against the working directory
    #[serde(default = "default_bridge_script")]
    pub bridge_script: PathBuf,

    /// Upper bound on jobs sharing the accelerator at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Root for per-job sandboxes (system temp dir when unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    #[serde(default)]
    pub runtime: RuntimeParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            musetalk_dir: default_musetalk_dir(),
            model_version: ModelVersion::default(),
            python_cmd: default_python_cmd(),
            bridge_script: default_bridge_script(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            temp_dir: None,
            runtime: RuntimeParams::default(),
        }
    }
}

impl EngineConfig {
    /// Absolute path of the bridge script.
    pub fn bridge_script_path(&self) -> PathBuf {
        absolute(&self.bridge_script)
    }

    /// Absolute MuseTalk checkout. Child processes run inside it, so every
    /// path handed to them must not depend on our working directory.
    pub fn musetalk_root(&self) -> PathBuf {
        absolute(&self.musetalk_dir)
    }

    /// Sandbox root with the same treatment, if one is configured.
    pub fn temp_root(&self) -> Option<PathBuf> {
        self.temp_dir.as_deref().map(absolute)
    }

    /// Inference script of the library, used by the command-line fallback.
    pub fn inference_script(&self) -> &Path {
        Path::new("scripts/inference.py")
    }

    /// Weight locations for the configured model version.
    pub fn weight_paths(&self) -> WeightPaths {
        WeightPaths::resolve(&self.musetalk_root(), self.model_version, &self.runtime)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(Error::ConfigError(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.python_cmd.trim().is_empty() {
            return Err(Error::ConfigError("python_cmd must not be empty".to_string()));
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn default_musetalk_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_python_cmd() -> String {
    "python3".to_string()
}

fn default_bridge_script() -> PathBuf {
    PathBuf::from("scripts/musetalk_bridge.py")
}

fn default_max_concurrent_jobs() -> usize {
    1
}

/// Model artifacts the inference library reads, resolved against the checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightPaths {
    pub unet_config: PathBuf,
    pub unet_model: PathBuf,
    pub whisper_dir: PathBuf,
    pub vae_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
}

impl WeightPaths {
    pub fn resolve(root: &Path, version: ModelVersion, runtime: &RuntimeParams) -> Self {
        Self {
            unet_config: root.join("models/musetalk/config.json"),
            unet_model: root.join(version.unet_model_path()),
            whisper_dir: root.join("models/whisper"),
            vae_dir: root.join("models").join(&runtime.vae_type),
            ffmpeg_path: root.join(&runtime.ffmpeg_path),
        }
    }

    /// Paths that must exist before the models count as loadable.
    pub fn required(&self) -> [(&'static str, &Path); 4] {
        [
            ("UNet config", self.unet_config.as_path()),
            ("UNet weights", self.unet_model.as_path()),
            ("Whisper model", self.whisper_dir.as_path()),
            ("VAE model", self.vae_dir.as_path()),
        ]
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Load models before accepting requests
    #[serde(default)]
    pub preload_models: bool,

    /// Largest accepted request body; base64 payloads are large
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            preload_models: false,
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_request_bytes() -> usize {
    256 * 1024 * 1024
}

/// Process-wide settings resolved at startup.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

impl Settings {
    /// Read settings from `musetalk.toml` (optional) and the environment.
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;
        Self::from_config(source)
    }

    /// Both sections share one flat key space, unknown keys are ignored.
    pub fn from_config(source: config::Config) -> Result<Self> {
        let server: ServerConfig = source.clone().try_deserialize()?;
        let engine: EngineConfig = source.try_deserialize()?;
        engine.validate()?;
        Ok(Self { server, engine })
    }
}
