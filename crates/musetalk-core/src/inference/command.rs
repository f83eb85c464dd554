//! Out-of-process fallback through the library's command-line script

use std::path::PathBuf;
use std::process::Stdio;
use tracing::info;

use super::{diagnostics, python_command, InferenceArgs, Invoker, Strategy};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CommandLineInvoker {
    python_cmd: String,
    script: PathBuf,
    working_dir: PathBuf,
}

impl CommandLineInvoker {
    /// `script` resolves against `working_dir`.
    pub fn new(
        python_cmd: impl Into<String>,
        script: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            python_cmd: python_cmd.into(),
            script: script.into(),
            working_dir: working_dir.into(),
        }
    }
}

impl Invoker for CommandLineInvoker {
    fn strategy(&self) -> Strategy {
        Strategy::CommandLine
    }

    fn invoke(&self, args: &InferenceArgs) -> Result<()> {
        info!(
            "Running {} {} in {:?}",
            self.python_cmd,
            self.script.display(),
            self.working_dir
        );

        let output = python_command(&self.python_cmd, &self.working_dir)
            .arg(&self.script)
            .args(args.to_cli_args())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::InferenceError(format!("Failed to start {}: {}", self.python_cmd, e))
            })?;

        if !output.status.success() {
            return Err(Error::InferenceError(format!(
                "Inference failed ({}): {}",
                output.status,
                diagnostics(&output.stderr, &output.stdout)
            )));
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{ModelVersion, RuntimeParams, WeightPaths};
    use crate::model::Pipeline;
    use std::path::Path;
    use std::time::Duration;

    fn args(result_dir: &Path) -> InferenceArgs {
        let pipeline = Pipeline {
            version: ModelVersion::V1,
            weights: WeightPaths::resolve(
                Path::new("/srv/musetalk"),
                ModelVersion::V1,
                &RuntimeParams::default(),
            ),
            load_time: Duration::ZERO,
        };
        InferenceArgs::for_job(
            &pipeline,
            &RuntimeParams::default(),
            Path::new("/tmp/cfg.yaml"),
            result_dir,
            25,
            3,
        )
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("inference.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn flags_reach_the_script_inside_the_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "pwd > invoked.txt\necho \"$@\" >> invoked.txt\n",
        );
        let invoker = CommandLineInvoker::new("sh", &script, dir.path());

        invoker.invoke(&args(Path::new("/tmp/out"))).unwrap();

        let recorded = std::fs::read_to_string(dir.path().join("invoked.txt")).unwrap();
        assert!(recorded.contains("--result_dir /tmp/out"));
        assert!(recorded.contains("--bbox_shift 3"));
        assert!(recorded.contains("--version v1"));
    }

    #[test]
    fn non_zero_exit_carries_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "echo 'RuntimeError: no face detected' >&2\necho 'processing task_0'\nexit 3\n",
        );
        let invoker = CommandLineInvoker::new("sh", &script, dir.path());

        let err = invoker.invoke(&args(Path::new("/tmp/out"))).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no face detected"));
        assert!(msg.contains("processing task_0"));
    }
}
