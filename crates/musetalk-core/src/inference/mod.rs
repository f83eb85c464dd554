//! Invocation of the external MuseTalk entry point
//!
//! Two strategies reach the same entry point: the Python bridge, which calls
//! the library's `main` with a keyword namespace, and the library's own
//! command-line script. [`FallbackInvoker`] runs the first and falls back to
//! the second.

mod args;
mod command;
mod python_bridge;

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};

pub use args::InferenceArgs;
pub use command::CommandLineInvoker;
pub use python_bridge::PythonBridge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Bridge,
    CommandLine,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Bridge => f.write_str("bridge"),
            Strategy::CommandLine => f.write_str("command-line"),
        }
    }
}

/// One way of running the inference entry point. Blocking.
pub trait Invoker: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Run one job. On success the result directory holds the frames.
    fn invoke(&self, args: &InferenceArgs) -> Result<()>;
}

/// Primary strategy with a single fallback attempt.
#[derive(Clone)]
pub struct FallbackInvoker {
    primary: Arc<dyn Invoker>,
    fallback: Arc<dyn Invoker>,
}

impl FallbackInvoker {
    pub fn new(primary: Arc<dyn Invoker>, fallback: Arc<dyn Invoker>) -> Self {
        Self { primary, fallback }
    }

    /// Returns the strategy that produced the frames.
    pub fn invoke(&self, args: &InferenceArgs) -> Result<Strategy> {
        let primary_err = match self.primary.invoke(args) {
            Ok(()) => return Ok(self.primary.strategy()),
            Err(e) => e,
        };

        warn!(
            "{} invocation failed, retrying with {}: {}",
            self.primary.strategy(),
            self.fallback.strategy(),
            primary_err
        );

        match self.fallback.invoke(args) {
            Ok(()) => {
                info!("{} fallback succeeded", self.fallback.strategy());
                Ok(self.fallback.strategy())
            }
            Err(fallback_err) => Err(Error::InferenceError(format!(
                "{} invocation failed: {}; {} fallback failed: {}",
                self.primary.strategy(),
                primary_err,
                self.fallback.strategy(),
                fallback_err
            ))),
        }
    }
}

/// Python command running inside the MuseTalk checkout with the checkout on
/// `PYTHONPATH`.
pub(crate) fn python_command(python_cmd: &str, working_dir: &Path) -> Command {
    let mut cmd = Command::new(python_cmd);
    cmd.current_dir(working_dir);

    let mut paths = vec![working_dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PYTHONPATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    match std::env::join_paths(paths) {
        Ok(joined) => {
            cmd.env("PYTHONPATH", joined);
        }
        Err(e) => warn!("Leaving PYTHONPATH untouched: {}", e),
    }
    cmd
}

/// Captured output of a failed child process, stderr first.
pub(crate) fn diagnostics(stderr: &[u8], stdout: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stdout = String::from_utf8_lossy(stdout);
    format!("{}\n{}", stderr.trim_end(), stdout.trim_end())
        .trim()
        .to_string()
}
