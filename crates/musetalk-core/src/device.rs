//! Host accelerator detection

use serde::Serialize;
use std::process::{Command, Stdio};
use tracing::debug;

/// Result of probing the host for a CUDA device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GpuStatus {
    pub available: bool,
    pub name: Option<String>,
}

impl GpuStatus {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn device(name: impl Into<String>) -> Self {
        Self {
            available: true,
            name: Some(name.into()),
        }
    }
}

/// Reports accelerator presence. Called on every health check, so
/// implementations must not cache.
pub trait DeviceProbe: Send + Sync {
    fn probe(&self) -> GpuStatus;
}

/// Queries `nvidia-smi` for the name of device 0.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    program: String,
}

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self {
            program: "nvidia-smi".to_string(),
        }
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for NvidiaSmiProbe {
    fn probe(&self) -> GpuStatus {
        let output = Command::new(&self.program)
            .args(["--query-gpu=name", "--format=csv,noheader"])
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                parse_device_name(&String::from_utf8_lossy(&output.stdout))
                    .map(GpuStatus::device)
                    .unwrap_or_default()
            }
            Ok(output) => {
                debug!("{} exited with {}", self.program, output.status);
                GpuStatus::unavailable()
            }
            Err(e) => {
                debug!("{} not available: {}", self.program, e);
                GpuStatus::unavailable()
            }
        }
    }
}

fn parse_device_name(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
