//! Inference service: lifecycle guard, job runner and device probe behind
//! one async facade

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::device::{DeviceProbe, GpuStatus, NvidiaSmiProbe};
use crate::error::{Error, Result};
use crate::inference::{CommandLineInvoker, FallbackInvoker, PythonBridge};
use crate::job::{Frame, InferenceJob, JobRequest, JobRunner};
use crate::model::{ModelGuard, ModelLoader, ModelState, MuseTalkLoader};

/// Result of one successful job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub frames: Vec<Frame>,
    /// Decoding plus the job run. Model load and queueing are excluded.
    pub processing_time: Duration,
}

pub struct LipSyncService {
    guard: ModelGuard,
    runner: Arc<JobRunner>,
    probe: Arc<dyn DeviceProbe>,
    permits: Arc<Semaphore>,
}

impl LipSyncService {
    /// Production wiring: bridge first, command-line script as fallback.
    pub fn new(config: &EngineConfig) -> Self {
        let root = config.musetalk_root();
        let bridge = PythonBridge::new(
            config.python_cmd.clone(),
            config.bridge_script_path(),
            root.clone(),
        );
        let command = CommandLineInvoker::new(
            config.python_cmd.clone(),
            config.inference_script(),
            root,
        );

        let loader = Arc::new(MuseTalkLoader::new(config, bridge.clone()));
        let runner = JobRunner::new(
            FallbackInvoker::new(Arc::new(bridge), Arc::new(command)),
            config.runtime.clone(),
            config.temp_root(),
        );

        Self::from_parts(
            loader,
            runner,
            Arc::new(NvidiaSmiProbe::new()),
            config.max_concurrent_jobs,
        )
    }

    pub fn from_parts(
        loader: Arc<dyn ModelLoader>,
        runner: JobRunner,
        probe: Arc<dyn DeviceProbe>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            guard: ModelGuard::new(loader),
            runner: Arc::new(runner),
            probe,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn model_state(&self) -> ModelState {
        self.guard.state()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.guard.is_loaded()
    }

    /// Eager load at startup.
    pub async fn preload(&self) -> Result<()> {
        self.guard.ensure_loaded().await.map(|_| ())
    }

    /// Probe the accelerator. Not cached.
    pub async fn gpu_status(&self) -> GpuStatus {
        let probe = self.probe.clone();
        match tokio::task::spawn_blocking(move || probe.probe()).await {
            Ok(status) => status,
            Err(e) => {
                error!("Device probe panicked: {}", e);
                GpuStatus::unavailable()
            }
        }
    }

    /// Validate, make sure the models are resident, then run the job on a
    /// blocking worker. All or nothing. The job keeps its permit until it
    /// finishes, even if the caller stops waiting.
    pub async fn infer(&self, request: JobRequest) -> Result<JobOutput> {
        let (job, decode_time) = tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            InferenceJob::decode(&request).map(|job| (job, start.elapsed()))
        })
        .await
        .map_err(|e| Error::InferenceError(format!("Decode task failed: {}", e)))??;

        let pipeline = self.guard.ensure_loaded().await?;

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::InferenceError("Job queue is closed".to_string()))?;

        info!(
            "Job {}: fps={}, bbox_shift={}",
            job.id, job.fps, job.bbox_shift
        );

        let runner = self.runner.clone();
        let (frames, run_time) = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let start = Instant::now();
            runner
                .run(&pipeline, &job)
                .map(|frames| (frames, start.elapsed()))
        })
        .await
        .map_err(|e| Error::InferenceError(format!("Inference task failed: {}", e)))??;

        Ok(JobOutput {
            frames,
            processing_time: decode_time + run_time,
        })
    }
}
