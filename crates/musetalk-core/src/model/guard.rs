//! Model lifecycle management
//!
//! `UNLOADED → LOADING → LOADED`, with no way back. At most one load runs at a
//! time: the load and the publish of its result happen on a blocking worker
//! under a mutex, so a caller that stops waiting does not release the slot
//! while the load is still running. A failed load leaves the guard
//! `UNLOADED`, and the next caller in line tries again.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, error, info};

use super::loader::{ModelLoader, Pipeline};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded,
}

/// Owns the resident pipeline for the lifetime of the process.
pub struct ModelGuard {
    inner: Arc<Resident>,
}

struct Resident {
    loader: Arc<dyn ModelLoader>,
    pipeline: OnceLock<Arc<Pipeline>>,
    load_lock: Mutex<()>,
    loading: AtomicBool,
}

/// Raised for exactly as long as `ModelLoader::load` runs.
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Resident {
    /// Blocking. Serialized by `load_lock`; later callers find the published
    /// pipeline and return without loading.
    fn load_once(&self) -> Result<Arc<Pipeline>> {
        let _serial = self
            .load_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(pipeline) = self.pipeline.get() {
            debug!("Pipeline already resident");
            return Ok(pipeline.clone());
        }

        let _flag = LoadingFlag::raise(&self.loading);
        match self.loader.load() {
            Ok(pipeline) => {
                info!(
                    "Pipeline {} resident after {:.2}s",
                    pipeline.version,
                    pipeline.load_time.as_secs_f64()
                );
                Ok(self.pipeline.get_or_init(|| Arc::new(pipeline)).clone())
            }
            Err(e) => {
                error!("Failed to load models: {}", e);
                Err(e)
            }
        }
    }
}

impl ModelGuard {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            inner: Arc::new(Resident {
                loader,
                pipeline: OnceLock::new(),
                load_lock: Mutex::new(()),
                loading: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> ModelState {
        if self.inner.pipeline.get().is_some() {
            ModelState::Loaded
        } else if self.inner.loading.load(Ordering::SeqCst) {
            ModelState::Loading
        } else {
            ModelState::Unloaded
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.pipeline.get().is_some()
    }

    /// The resident pipeline, without triggering a load.
    pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.inner.pipeline.get().cloned()
    }

    /// Load the models unless they are already resident. Dropping the
    /// returned future does not abort a load that has started.
    pub async fn ensure_loaded(&self) -> Result<Arc<Pipeline>> {
        if let Some(pipeline) = self.inner.pipeline.get() {
            return Ok(pipeline.clone());
        }

        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.load_once())
            .await
            .map_err(|e| Error::ModelLoadError(e.to_string()))?
    }
}
