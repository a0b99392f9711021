use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceGateError {
    #[error("Camera error: {0}")]
    Camera(String),

    /// Frame source failed during enrollment. Samples already written stay in the store.
    #[error("Capture failed after {samples_written} sample(s): {reason}")]
    Capture {
        samples_written: usize,
        reason: String,
    },

    #[error("No valid training samples found in the sample store")]
    NoTrainingData,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid sample key: {0:?}")]
    InvalidSampleKey(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceGateError>;
