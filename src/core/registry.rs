use crate::common::Result;
use crate::core::recognizer::{FaceModel, ModelBuilder};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Holds the one live trained model, if any.
///
/// Readers take an `Arc` snapshot, so an authentication that is already
/// running keeps the model it started with while training swaps in a new one.
pub struct ModelRegistry<M> {
    model_path: PathBuf,
    current: RwLock<Option<Arc<M>>>,
}

impl<M: FaceModel> ModelRegistry<M> {
    pub fn empty(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            current: RwLock::new(None),
        }
    }

    /// Loads the persisted model if present. A missing file is not an error:
    /// the registry simply starts with no model.
    pub fn load<B>(builder: &B, model_path: impl Into<PathBuf>) -> Result<Self>
    where
        B: ModelBuilder<Model = M>,
    {
        let registry = Self::empty(model_path);

        if registry.model_path.exists() {
            let model = builder.load(&registry.model_path)?;
            tracing::info!("Loaded trained model from {:?}", registry.model_path);
            registry.replace(model);
        } else {
            tracing::warn!(
                "No trained model at {:?}; authentication will not recognize anyone until training runs",
                registry.model_path
            );
        }

        Ok(registry)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn is_available(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    pub fn current(&self) -> Option<Arc<M>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Single-reference swap.
    pub fn replace(&self, model: M) {
        let model = Arc::new(model);
        let mut slot = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(model);
    }
}
