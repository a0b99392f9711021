pub mod auth;
pub mod detector;
pub mod enroll;
pub mod gate;
pub mod recognizer;
pub mod registry;
pub mod session;
pub mod trainer;

pub use auth::{AuthOutcome, AuthPolicy, AuthenticationController};
pub use detector::{FaceDetector, FaceRect, OnnxFaceDetector};
pub use enroll::{EnrollmentController, EnrollmentOutcome};
pub use gate::{DefaultFaceGate, FaceGate};
pub use recognizer::{FaceModel, LbphBuilder, LbphModel, ModelBuilder, Prediction};
pub use registry::ModelRegistry;
pub use session::{FaceVerdict, FrameView, NoopObserver, SessionObserver, StopSignal};
pub use trainer::{collect_training_set, ModelTrainer, TrainingReport, TrainingSet};
