use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::common::error::{FaceGateError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/facegate.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_warmup_frames() -> u32 { 3 }
fn default_warmup_delay() -> u64 { 50 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_detector_input")]
    pub input_width: u32,
    #[serde(default = "default_detector_input")]
    pub input_height: u32,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_detector_path() -> PathBuf { PathBuf::from("models/face_detector.onnx") }
fn default_detector_input() -> u32 { 640 }
fn default_confidence() -> f32 { 0.5 }
fn default_iou() -> f32 { 0.45 }
fn default_max_faces() -> usize { 5 }
fn default_optimization_level() -> u32 { 3 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_detector_path(),
            input_width: default_detector_input(),
            input_height: default_detector_input(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou(),
            max_faces: default_max_faces(),
            optimization_level: default_optimization_level(),
        }
    }
}

/// Local binary pattern histogram parameters.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RecognizerConfig {
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_neighbors")]
    pub neighbors: u32,
    #[serde(default = "default_grid")]
    pub grid_x: u32,
    #[serde(default = "default_grid")]
    pub grid_y: u32,
}

fn default_radius() -> u32 { 1 }
fn default_neighbors() -> u32 { 8 }
fn default_grid() -> u32 { 8 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            neighbors: default_neighbors(),
            grid_x: default_grid(),
            grid_y: default_grid(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
}

fn default_dataset_dir() -> PathBuf { PathBuf::from("dataset") }
fn default_model_path() -> PathBuf { PathBuf::from("face_model.bin") }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dataset_dir: default_dataset_dir(),
            model_path: default_model_path(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    /// Samples, not frames.
    #[serde(default = "default_quota")]
    pub quota: usize,
}

fn default_quota() -> usize { 30 }

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self { quota: default_quota() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_accept_distance")]
    pub accept_distance: f64,
    #[serde(default = "default_near_distance")]
    pub near_distance: f64,
}

fn default_timeout() -> u32 { 20 }
fn default_accept_distance() -> f64 { 25.0 }
fn default_near_distance() -> f64 { 100.0 }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            accept_distance: default_accept_distance(),
            near_distance: default_near_distance(),
        }
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds as u64)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreviewConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
}

fn default_true() -> bool { true }

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: None,
            height: None,
        }
    }
}

impl Config {
    /// Loads `configs/facegate.toml`, falling back to defaults when it is absent.
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceGateError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceGateError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceGateError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceGateError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceGateError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FaceGateError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(FaceGateError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(FaceGateError::Config(format!(
                "IoU threshold must be between 0.0 and 1.0, got {}",
                self.detector.iou_threshold
            )));
        }

        if self.recognizer.radius == 0 {
            return Err(FaceGateError::Config("LBP radius must be at least 1".into()));
        }
        if self.recognizer.neighbors == 0 || self.recognizer.neighbors > 16 {
            return Err(FaceGateError::Config(format!(
                "LBP neighbors must be between 1 and 16, got {}",
                self.recognizer.neighbors
            )));
        }
        if self.recognizer.grid_x == 0 || self.recognizer.grid_y == 0 {
            return Err(FaceGateError::Config("LBP grid must be at least 1x1".into()));
        }

        if self.enrollment.quota == 0 {
            return Err(FaceGateError::Config("Enrollment quota must be at least 1".into()));
        }

        if self.auth.timeout_seconds == 0 {
            return Err(FaceGateError::Config("Authentication timeout must be at least 1 second".into()));
        }
        if self.auth.accept_distance.is_nan() || self.auth.accept_distance < 0.0 {
            return Err(FaceGateError::Config(format!(
                "Accept distance must be non-negative, got {}", self.auth.accept_distance
            )));
        }
        if self.auth.accept_distance > self.auth.near_distance {
            return Err(FaceGateError::Config(format!(
                "Accept distance {} exceeds near distance {}",
                self.auth.accept_distance, self.auth.near_distance
            )));
        }

        Ok(())
    }
}
