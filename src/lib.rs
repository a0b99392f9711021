// Core modules
pub mod core;
pub mod camera;
pub mod storage;
pub mod cli;
pub mod common;

// Re-export commonly used types
pub use common::{Config, DevMode, FaceGateError, Result};
pub use core::{
    AuthOutcome, AuthPolicy, DefaultFaceGate, EnrollmentOutcome, FaceDetector, FaceGate, FaceModel,
    FaceRect, FaceVerdict, ModelBuilder, ModelRegistry, NoopObserver, Prediction, SessionObserver,
    StopSignal, TrainingReport,
};
pub use camera::{Camera, DirectoryFrameSource, FrameSource};
pub use storage::{FsSampleStore, Identifier, SampleKey, SampleStore};
