use crate::common::{FaceGateError, Result};
use crate::core::recognizer::{meets_min_size, FaceModel, ModelBuilder};
use crate::core::registry::ModelRegistry;
use crate::storage::{Identifier, SampleKey, SampleStore};
use image::GrayImage;
use serde::Serialize;
use std::collections::BTreeSet;

/// What a successful training run consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub identities: usize,
    pub skipped: usize,
}

/// Faces and labels in parallel, plus how many stored items were unusable.
pub struct TrainingSet {
    pub faces: Vec<GrayImage>,
    pub labels: Vec<Identifier>,
    pub skipped: usize,
}

/// Scans the whole store. Items with unparseable names or unreadable images
/// are logged and skipped; one bad file never blocks the rest.
pub fn collect_training_set<S: SampleStore + ?Sized>(store: &S) -> Result<TrainingSet> {
    let mut set = TrainingSet { faces: Vec::new(), labels: Vec::new(), skipped: 0 };

    for item in store.list_all()? {
        let sample = match item {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!("Skipping unreadable sample: {}", e);
                set.skipped += 1;
                continue;
            }
        };

        match sample.name.parse::<SampleKey>() {
            Ok(key) => {
                set.faces.push(sample.image);
                set.labels.push(key.identifier);
            }
            Err(_) => {
                tracing::warn!("Skipping sample with malformed name: {}", sample.name);
                set.skipped += 1;
            }
        }
    }

    Ok(set)
}

/// Full retrain from every stored sample, then persist and swap into the registry.
pub struct ModelTrainer<'a, S: ?Sized, B> {
    store: &'a S,
    builder: &'a B,
}

impl<'a, S, B> ModelTrainer<'a, S, B>
where
    S: SampleStore + ?Sized,
    B: ModelBuilder,
{
    pub fn new(store: &'a S, builder: &'a B) -> Self {
        Self { store, builder }
    }

    /// On `NoTrainingData` or any fit/persist failure the registry keeps
    /// whatever model it already had.
    pub fn train(&self, registry: &ModelRegistry<B::Model>) -> Result<TrainingReport> {
        let mut set = collect_training_set(self.store)?;
        let min = self.builder.min_face_size();
        let before = set.faces.len();
        let (faces, labels): (Vec<_>, Vec<_>) = set
            .faces
            .drain(..)
            .zip(set.labels.drain(..))
            .filter(|(face, _)| meets_min_size(face, min))
            .unzip();
        if faces.len() < before {
            tracing::warn!(
                "Skipping {} sample(s) smaller than {}x{}",
                before - faces.len(), min.0, min.1
            );
            set.skipped += before - faces.len();
        }
        set.faces = faces;
        set.labels = labels;

        if set.faces.is_empty() {
            tracing::warn!("No valid samples to train on ({} skipped)", set.skipped);
            return Err(FaceGateError::NoTrainingData);
        }

        let identities = set.labels.iter().collect::<BTreeSet<_>>().len();
        tracing::info!(
            "Training on {} sample(s) across {} identit{}",
            set.faces.len(),
            identities,
            if identities == 1 { "y" } else { "ies" }
        );

        let model = self.builder.fit(&set.faces, &set.labels)?;
        model.save(registry.model_path())?;
        registry.replace(model);

        tracing::info!("Model trained and saved to {:?}", registry.model_path());
        Ok(TrainingReport {
            samples: set.faces.len(),
            identities,
            skipped: set.skipped,
        })
    }
}
