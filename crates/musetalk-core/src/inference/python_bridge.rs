//! Python bridge for MuseTalk inference
//! Calls the library's `scripts.inference.main` with a keyword namespace

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

use super::{diagnostics, python_command, InferenceArgs, Invoker, Strategy};
use crate::error::{Error, Result};

/// Request to the bridge script
#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a InferenceArgs>,
}

/// Response from the bridge script
#[derive(Debug, Deserialize)]
struct BridgeResponse {
    status: Option<String>,
    error: Option<String>,
}

/// Bridge to the MuseTalk Python package
#[derive(Debug, Clone)]
pub struct PythonBridge {
    script_path: PathBuf,
    python_cmd: String,
    working_dir: PathBuf,
}

impl PythonBridge {
    pub fn new(
        python_cmd: impl Into<String>,
        script_path: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            script_path: script_path.into(),
            python_cmd: python_cmd.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Import the inference modules without running a job.
    pub fn check_dependencies(&self) -> Result<()> {
        let request = BridgeRequest {
            command: "check",
            args: None,
        };
        let response = self.call_python(&request)?;
        expect_ok(response, "dependency check")
    }

    /// Call the bridge script with a JSON request on stdin
    fn call_python(&self, request: &BridgeRequest<'_>) -> Result<BridgeResponse> {
        let request_json = serde_json::to_vec(request)?;

        let mut child = python_command(&self.python_cmd, &self.working_dir)
            .arg(&self.script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::InferenceError(format!("Failed to start Python: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&request_json)
                .map_err(|e| Error::InferenceError(format!("Failed to write to Python: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::InferenceError(format!("Python process failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            return Err(Error::InferenceError(format!(
                "Python bridge exited with {}: {}",
                output.status,
                diagnostics(&output.stderr, &output.stdout)
            )));
        }

        let mut response = parse_response(&stdout)?;
        if let Some(err) = response.error.take() {
            response.error = Some(with_stderr(err, &output.stderr));
        }
        Ok(response)
    }
}

impl Invoker for PythonBridge {
    fn strategy(&self) -> Strategy {
        Strategy::Bridge
    }

    fn invoke(&self, args: &InferenceArgs) -> Result<()> {
        info!(
            "Calling MuseTalk bridge: fps={}, bbox_shift={}",
            args.fps, args.bbox_shift
        );
        let request = BridgeRequest {
            command: "infer",
            args: Some(args),
        };
        let response = self.call_python(&request)?;
        expect_ok(response, "inference")
    }
}

fn expect_ok(response: BridgeResponse, what: &str) -> Result<()> {
    if let Some(err) = response.error {
        return Err(Error::InferenceError(format!("Python {} error: {}", what, err)));
    }
    match response.status.as_deref() {
        Some("ok") => Ok(()),
        other => Err(Error::InferenceError(format!(
            "Unexpected {} status from Python bridge: {:?}",
            what, other
        ))),
    }
}

/// The bridge reports exceptions in its JSON; the traceback is on stderr.
fn with_stderr(err: String, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        err
    } else {
        format!("{}\n{}", err, stderr)
    }
}

/// The library prints progress to stdout, so only the last JSON line counts.
fn parse_response(stdout: &str) -> Result<BridgeResponse> {
    let json_str = stdout
        .lines()
        .rev()
        .find(|line| line.trim().starts_with('{'))
        .unwrap_or(stdout);

    debug!("Python bridge response: {}", json_str);

    serde_json::from_str(json_str).map_err(|e| {
        Error::InferenceError(format!(
            "Failed to parse Python response: {} - {}",
            e, json_str
        ))
    })
}
