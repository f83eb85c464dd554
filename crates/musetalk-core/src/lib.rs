//! MuseTalk Core - job isolation around the MuseTalk lip-sync model
//!
//! The model itself is an external Python library. This crate owns
//! everything around it:
//! - a lifecycle guard that loads the models at most once per process
//! - a job runner that stages each request into its own temporary directory
//! - two invocation strategies (Python bridge, command-line script) with
//!   fallback between them
//!
//! # Example
//!
//! ```ignore
//! use musetalk_core::{EngineConfig, JobRequest, LipSyncService};
//!
//! let service = LipSyncService::new(&EngineConfig::default());
//! let output = service.infer(JobRequest { image, audio, fps: 25, bbox_shift: 0 }).await?;
//! println!("{} frames", output.frames.len());
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod inference;
pub mod job;
pub mod model;
pub mod service;

pub use config::{EngineConfig, ModelVersion, RuntimeParams, ServerConfig, Settings};
pub use device::{DeviceProbe, GpuStatus, NvidiaSmiProbe};
pub use error::{Error, Result};
pub use inference::{FallbackInvoker, InferenceArgs, Invoker, Strategy};
pub use job::{Frame, InferenceJob, JobRequest, JobRunner};
pub use model::{ModelGuard, ModelLoader, ModelState, Pipeline};
pub use service::{JobOutput, LipSyncService};

/// Server version reported by `/health` and `/`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
