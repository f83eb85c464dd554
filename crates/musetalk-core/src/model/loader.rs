//! Model loading for the MuseTalk pipeline

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::{EngineConfig, ModelVersion, WeightPaths};
use crate::error::{Error, Result};
use crate::inference::PythonBridge;

/// Handle to the resident model artifacts, shared by every job.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub version: ModelVersion,
    pub weights: WeightPaths,
    pub load_time: Duration,
}

/// Expensive one-time load of the inference models. Blocking.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Pipeline>;
}

/// Verifies the weight files and imports the library through the bridge.
pub struct MuseTalkLoader {
    version: ModelVersion,
    weights: WeightPaths,
    bridge: PythonBridge,
}

impl MuseTalkLoader {
    pub fn new(config: &EngineConfig, bridge: PythonBridge) -> Self {
        Self {
            version: config.model_version,
            weights: config.weight_paths(),
            bridge,
        }
    }
}

impl ModelLoader for MuseTalkLoader {
    fn load(&self) -> Result<Pipeline> {
        info!("Loading MuseTalk {} models...", self.version);
        let start = Instant::now();

        check_weights(&self.weights)?;

        self.bridge
            .check_dependencies()
            .map_err(|e| Error::ModelLoadError(format!("MuseTalk import failed: {}", e)))?;

        let load_time = start.elapsed();
        info!("Models loaded in {:.2}s", load_time.as_secs_f64());

        Ok(Pipeline {
            version: self.version,
            weights: self.weights.clone(),
            load_time,
        })
    }
}

fn check_weights(weights: &WeightPaths) -> Result<()> {
    let missing: Vec<String> = weights
        .required()
        .iter()
        .filter(|(_, path)| !path.exists())
        .map(|(what, path)| format!("{} ({})", what, path.display()))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::ModelLoadError(format!(
            "Missing model files: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config_for(root: &Path) -> EngineConfig {
        EngineConfig {
            musetalk_dir: root.to_path_buf(),
            ..EngineConfig::default()
        }
    }

    fn install_weights(root: &Path, version: ModelVersion) {
        let weights = WeightPaths::resolve(root, version, &Default::default());
        for dir in [&weights.whisper_dir, &weights.vae_dir] {
            std::fs::create_dir_all(dir).unwrap();
        }
        for file in [&weights.unet_config, &weights.unet_model] {
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, b"weights").unwrap();
        }
    }

    #[test]
    fn missing_weights_are_a_load_error() {
        let root = tempfile::tempdir().unwrap();
        let loader = MuseTalkLoader::new(
            &config_for(root.path()),
            PythonBridge::new("python3", "unused.py", root.path()),
        );

        let err = loader.load().unwrap_err();
        assert!(matches!(err, Error::ModelLoadError(_)));
        assert!(err.to_string().contains("UNet weights"));
    }

    #[test]
    fn v1_weights_do_not_satisfy_v15() {
        let root = tempfile::tempdir().unwrap();
        install_weights(root.path(), ModelVersion::V1);

        let err = check_weights(&config_for(root.path()).weight_paths()).unwrap_err();
        assert!(err.to_string().contains("musetalkV15"));
    }

    #[test]
    fn failed_import_is_a_load_error() {
        let root = tempfile::tempdir().unwrap();
        install_weights(root.path(), ModelVersion::V15);
        let loader = MuseTalkLoader::new(
            &config_for(root.path()),
            PythonBridge::new("definitely-not-python", "unused.py", root.path()),
        );

        assert!(matches!(loader.load(), Err(Error::ModelLoadError(_))));
    }

    #[cfg(unix)]
    #[test]
    fn successful_check_yields_pipeline() {
        let root = tempfile::tempdir().unwrap();
        install_weights(root.path(), ModelVersion::V15);
        let script: PathBuf = root.path().join("bridge.sh");
        std::fs::write(&script, "cat > /dev/null\necho '{\"status\": \"ok\"}'\n").unwrap();

        let loader = MuseTalkLoader::new(
            &config_for(root.path()),
            PythonBridge::new("sh", &script, root.path()),
        );

        let pipeline = loader.load().unwrap();
        assert_eq!(pipeline.version, ModelVersion::V15);
        assert_eq!(pipeline.weights, config_for(root.path()).weight_paths());
    }
}
