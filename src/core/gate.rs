use crate::camera::FrameSource;
use crate::common::{Config, DevMode, Result};
use crate::core::auth::{AuthOutcome, AuthPolicy, AuthenticationController};
use crate::core::detector::{FaceDetector, OnnxFaceDetector};
use crate::core::enroll::{EnrollmentController, EnrollmentOutcome};
use crate::core::recognizer::{LbphBuilder, ModelBuilder};
use crate::core::registry::ModelRegistry;
use crate::core::session::{SessionObserver, StopSignal};
use crate::core::trainer::{ModelTrainer, TrainingReport};
use crate::storage::{FsSampleStore, Identifier, SampleStore};

/// The three entry points a front end calls: enroll, train, authenticate.
pub struct FaceGate<S, D, B: ModelBuilder> {
    store: S,
    detector: D,
    builder: B,
    registry: ModelRegistry<B::Model>,
    quota: usize,
    policy: AuthPolicy,
}

pub type DefaultFaceGate = FaceGate<FsSampleStore, OnnxFaceDetector, LbphBuilder>;

impl DefaultFaceGate {
    /// Filesystem store, ONNX detector and LBPH recognizer, wired from config.
    pub fn from_config(config: &Config, dev_mode: &DevMode) -> Result<Self> {
        let store = FsSampleStore::new(dev_mode.dataset_dir(&config.storage))?;
        let detector = OnnxFaceDetector::new(&config.detector)?;
        let builder = LbphBuilder::new(config.recognizer);
        Self::open(store, detector, builder, config, dev_mode)
    }
}

impl<S, D, B> FaceGate<S, D, B>
where
    S: SampleStore,
    D: FaceDetector,
    B: ModelBuilder,
{
    pub fn new(store: S, detector: D, builder: B, registry: ModelRegistry<B::Model>, config: &Config) -> Self {
        Self {
            store,
            detector,
            builder,
            registry,
            quota: config.enrollment.quota,
            policy: AuthPolicy::from(&config.auth),
        }
    }

    /// Loads the persisted model, if any, into a fresh registry.
    pub fn open(store: S, detector: D, builder: B, config: &Config, dev_mode: &DevMode) -> Result<Self> {
        let registry = ModelRegistry::load(&builder, dev_mode.model_path(&config.storage))?;
        Ok(Self::new(store, detector, builder, registry, config))
    }

    pub fn with_policy(mut self, policy: AuthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &ModelRegistry<B::Model> {
        &self.registry
    }

    pub fn enroll<F, O>(
        &self,
        source: &mut F,
        identifier: Identifier,
        stop: &StopSignal,
        observer: &mut O,
    ) -> Result<EnrollmentOutcome>
    where
        F: FrameSource + ?Sized,
        O: SessionObserver + ?Sized,
    {
        EnrollmentController::new(&self.detector, &self.store, self.quota)
            .with_min_face_size(self.builder.min_face_size())
            .enroll(source, identifier, stop, observer)
    }

    pub fn train(&self) -> Result<TrainingReport> {
        ModelTrainer::new(&self.store, &self.builder).train(&self.registry)
    }

    /// Runs against whichever model is live when the session starts.
    pub fn authenticate<F, O>(
        &self,
        source: &mut F,
        claimed: Identifier,
        stop: &StopSignal,
        observer: &mut O,
    ) -> AuthOutcome
    where
        F: FrameSource + ?Sized,
        O: SessionObserver + ?Sized,
    {
        let model = self.registry.current();
        AuthenticationController::new(&self.detector, self.policy)
            .with_min_face_size(self.builder.min_face_size())
            .authenticate(source, claimed, model.as_deref(), stop, observer)
    }
}
