use std::path::{Path, PathBuf};
use std::fs;
use directories::ProjectDirs;
use crate::common::config::StorageConfig;
use crate::common::error::{FaceGateError, Result};

/// Decides where samples, the trained model and debug captures live.
///
/// In dev mode everything goes under `./dev_data`; otherwise relative storage
/// paths from the config are resolved against the per-user data directory.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        let base_dir = if enabled {
            PathBuf::from("./dev_data")
        } else {
            ProjectDirs::from("com", "facegate", "FaceGate")
                .ok_or_else(|| FaceGateError::Storage("Failed to get project dirs".into()))?
                .data_dir()
                .to_path_buf()
        };

        if enabled {
            fs::create_dir_all(base_dir.join("debug"))?;

            tracing::info!("Development mode enabled - data will be saved to: {}",
                     base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    /// Rooted at an explicit directory; used by tests and library callers.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self { enabled: true, base_dir: base_dir.into() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn dataset_dir(&self, storage: &StorageConfig) -> PathBuf {
        self.resolve(&storage.dataset_dir)
    }

    pub fn model_path(&self, storage: &StorageConfig) -> PathBuf {
        self.resolve(&storage.model_path)
    }

    pub fn get_debug_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S%.3f");
        self.base_dir.join("debug").join(format!("{}_{}.png", prefix, timestamp))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}
