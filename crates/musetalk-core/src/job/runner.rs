//! Runs one inference job inside its own temporary directory

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::input::InferenceJob;
use crate::config::RuntimeParams;
use crate::error::{Error, Result};
use crate::inference::{FallbackInvoker, InferenceArgs};
use crate::model::Pipeline;

const IMAGE_FILE: &str = "input.png";
const AUDIO_FILE: &str = "input.wav";
const CONFIG_FILE: &str = "inference_config.yaml";
const OUTPUT_DIR: &str = "output";
const TASK_NAME: &str = "task_0";

/// One generated frame, in sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: usize,
    /// Encoded image exactly as the library wrote it
    pub data: Vec<u8>,
}

/// Entry of the job manifest read by the inference library.
#[derive(Debug, Serialize)]
struct TaskEntry<'a> {
    video_path: &'a Path,
    audio_path: &'a Path,
}

/// File layout inside a job sandbox.
struct Sandbox {
    dir: TempDir,
    image: PathBuf,
    audio: PathBuf,
    config: PathBuf,
    output: PathBuf,
}

impl Sandbox {
    fn create(root: Option<&Path>, job: &InferenceJob) -> Result<Self> {
        let prefix = format!("musetalk-{}-", job.id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let base = dir.path().to_path_buf();
        Ok(Self {
            image: base.join(IMAGE_FILE),
            audio: base.join(AUDIO_FILE),
            config: base.join(CONFIG_FILE),
            output: base.join(OUTPUT_DIR),
            dir,
        })
    }

    /// Write the inputs and the manifest the library expects.
    fn stage(&self, job: &InferenceJob) -> Result<()> {
        std::fs::write(&self.image, &job.image_png)?;
        std::fs::write(&self.audio, &job.audio_wav)?;
        std::fs::create_dir(&self.output)?;

        let mut manifest = BTreeMap::new();
        manifest.insert(
            TASK_NAME,
            TaskEntry {
                video_path: &self.image,
                audio_path: &self.audio,
            },
        );
        // JSON is a subset of YAML, which is what the library parses.
        std::fs::write(&self.config, serde_json::to_vec_pretty(&manifest)?)?;
        Ok(())
    }

    /// Remove the sandbox. A removal failure is logged, never returned.
    fn close(self, job: &InferenceJob) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Job {}: failed to remove sandbox {:?}: {}", job.id, path, e);
        }
    }
}

/// Stages a job, invokes the library and collects the frames.
pub struct JobRunner {
    invoker: FallbackInvoker,
    runtime: RuntimeParams,
    temp_root: Option<PathBuf>,
}

impl JobRunner {
    pub fn new(invoker: FallbackInvoker, runtime: RuntimeParams, temp_root: Option<PathBuf>) -> Self {
        Self {
            invoker,
            runtime,
            temp_root,
        }
    }

    /// Blocking. The sandbox is gone when this returns, whatever the outcome.
    pub fn run(&self, pipeline: &Pipeline, job: &InferenceJob) -> Result<Vec<Frame>> {
        let sandbox = Sandbox::create(self.temp_root.as_deref(), job)?;
        debug!("Job {}: sandbox at {:?}", job.id, sandbox.dir.path());

        let result = self.run_in(&sandbox, pipeline, job);
        sandbox.close(job);
        result
    }

    fn run_in(&self, sandbox: &Sandbox, pipeline: &Pipeline, job: &InferenceJob) -> Result<Vec<Frame>> {
        sandbox.stage(job)?;

        let args = InferenceArgs::for_job(
            pipeline,
            &self.runtime,
            &sandbox.config,
            &sandbox.output,
            job.fps,
            job.bbox_shift,
        );

        let start = Instant::now();
        let strategy = self.invoker.invoke(&args)?;
        info!(
            "Job {}: {} invocation finished in {:.2}s",
            job.id,
            strategy,
            start.elapsed().as_secs_f64()
        );

        let frames = collect_frames(&sandbox.output)?;
        if frames.is_empty() {
            warn!("Job {}: inference produced no frames", job.id);
        }
        Ok(frames)
    }
}

/// PNG files directly inside `dir`, ordered by file name.
fn collect_frames(dir: &Path) -> Result<Vec<Frame>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if is_png && entry.file_type()?.is_file() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| {
            let data = std::fs::read(&path).map_err(|e| {
                Error::InferenceError(format!("Failed to read frame {:?}: {}", path, e))
            })?;
            Ok(Frame { index, data })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelVersion, WeightPaths};
    use crate::inference::{Invoker, Strategy};
    use crate::job::input::fixtures::{png_base64, silent_wav_base64};
    use crate::job::JobRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Writes the named frames after checking the staged inputs.
    struct FakeLibrary {
        frames: Vec<&'static str>,
        fail: bool,
        calls: AtomicUsize,
        seen_sandboxes: Mutex<Vec<PathBuf>>,
    }

    impl FakeLibrary {
        fn writing(frames: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                frames: frames.to_vec(),
                fail: false,
                calls: AtomicUsize::new(0),
                seen_sandboxes: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                frames: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
                seen_sandboxes: Mutex::new(Vec::new()),
            })
        }
    }

    impl Invoker for FakeLibrary {
        fn strategy(&self) -> Strategy {
            Strategy::Bridge
        }

        fn invoke(&self, args: &InferenceArgs) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let sandbox = args.inference_config.parent().unwrap().to_path_buf();
            self.seen_sandboxes.lock().unwrap().push(sandbox);

            let manifest: serde_json::Value =
                serde_json::from_slice(&std::fs::read(&args.inference_config)?)?;
            let task = &manifest["task_0"];
            let image = PathBuf::from(task["video_path"].as_str().unwrap());
            let audio = PathBuf::from(task["audio_path"].as_str().unwrap());
            assert!(image.is_file() && audio.is_file());

            if self.fail {
                return Err(Error::InferenceError("no face detected".to_string()));
            }
            for (i, name) in self.frames.iter().enumerate() {
                std::fs::write(args.result_dir.join(name), format!("frame-{}", name))?;
                // Non-frame artifacts must be ignored
                std::fs::write(args.result_dir.join(format!("log-{}.txt", i)), "x")?;
            }
            Ok(())
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline {
            version: ModelVersion::V15,
            weights: WeightPaths::resolve(
                Path::new("/srv/musetalk"),
                ModelVersion::V15,
                &RuntimeParams::default(),
            ),
            load_time: Duration::ZERO,
        }
    }

    fn job() -> InferenceJob {
        InferenceJob::decode(&JobRequest {
            image: png_base64(16, 16),
            audio: silent_wav_base64(16000, 0.5),
            fps: 25,
            bbox_shift: 4,
        })
        .unwrap()
    }

    fn runner(primary: Arc<FakeLibrary>, fallback: Arc<FakeLibrary>, root: &Path) -> JobRunner {
        JobRunner::new(
            FallbackInvoker::new(primary, fallback),
            RuntimeParams::default(),
            Some(root.to_path_buf()),
        )
    }

    fn leftover(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn frames_follow_file_name_order() {
        let root = tempfile::tempdir().unwrap();
        let library = FakeLibrary::writing(&["00000002.png", "00000000.png", "00000001.png"]);
        let runner = runner(library.clone(), FakeLibrary::writing(&[]), root.path());

        let frames = runner.run(&pipeline(), &job()).unwrap();

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.data, format!("frame-0000000{}.png", i).into_bytes());
        }
    }

    #[test]
    fn sandbox_is_removed_after_success() {
        let root = tempfile::tempdir().unwrap();
        let library = FakeLibrary::writing(&["0.png"]);
        let runner = runner(library.clone(), FakeLibrary::writing(&[]), root.path());

        runner.run(&pipeline(), &job()).unwrap();

        assert_eq!(leftover(root.path()), 0);
        let seen = library.seen_sandboxes.lock().unwrap();
        assert!(seen[0].starts_with(root.path()));
        assert!(!seen[0].exists());
    }

    #[test]
    fn sandbox_is_removed_after_failure() {
        let root = tempfile::tempdir().unwrap();
        let primary = FakeLibrary::failing();
        let fallback = FakeLibrary::failing();
        let runner = runner(primary.clone(), fallback.clone(), root.path());

        let err = runner.run(&pipeline(), &job()).unwrap_err();

        assert!(matches!(err, Error::InferenceError(_)));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(leftover(root.path()), 0);
    }

    #[test]
    fn sequential_jobs_get_separate_sandboxes() {
        let root = tempfile::tempdir().unwrap();
        let library = FakeLibrary::writing(&["0.png", "1.png"]);
        let runner = runner(library.clone(), FakeLibrary::writing(&[]), root.path());

        let first = runner.run(&pipeline(), &job()).unwrap();
        let second = runner.run(&pipeline(), &job()).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        let seen = library.seen_sandboxes.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert_eq!(leftover(root.path()), 0);
    }

    #[test]
    fn fallback_output_is_collected() {
        let root = tempfile::tempdir().unwrap();
        let fallback = FakeLibrary::writing(&["a.png", "b.png"]);
        let runner = runner(FakeLibrary::failing(), fallback.clone(), root.path());

        let frames = runner.run(&pipeline(), &job()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_output_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_frames(dir.path()).unwrap().is_empty());
    }

    /// Deletes its own sandbox, then fails.
    struct Vandal;

    impl Invoker for Vandal {
        fn strategy(&self) -> Strategy {
            Strategy::Bridge
        }

        fn invoke(&self, args: &InferenceArgs) -> Result<()> {
            if let Some(sandbox) = args.inference_config.parent() {
                let _ = std::fs::remove_dir_all(sandbox);
            }
            Err(Error::InferenceError("no face detected".to_string()))
        }
    }

    #[test]
    fn failed_removal_does_not_mask_the_job_error() {
        let root = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(
            FallbackInvoker::new(Arc::new(Vandal), Arc::new(Vandal)),
            RuntimeParams::default(),
            Some(root.path().to_path_buf()),
        );

        let err = runner.run(&pipeline(), &job()).unwrap_err();

        assert!(matches!(err, Error::InferenceError(_)));
        assert!(err.to_string().contains("no face detected"));
        assert_eq!(leftover(root.path()), 0);
    }
}
