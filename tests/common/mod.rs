#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use facegate::common::{FaceGateError, Result};
use facegate::core::{FaceDetector, FaceModel, FaceRect, ModelBuilder, Prediction};
use facegate::storage::{Identifier, SampleIter, SampleKey, SampleStore, StoredSample};
use image::{DynamicImage, GrayImage, Luma};

pub const FRAME_SIZE: u32 = 64;

pub fn frame() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(FRAME_SIZE, FRAME_SIZE, |x, y| {
        Luma([((x * 5 + y * 3) % 256) as u8])
    }))
}

/// Yields identical frames, optionally failing after `limit` of them.
pub struct ScriptedFrames {
    limit: Option<usize>,
    delay: Duration,
    pub pulled: usize,
}

impl ScriptedFrames {
    pub fn endless() -> Self {
        Self { limit: None, delay: Duration::ZERO, pulled: 0 }
    }

    pub fn failing_after(limit: usize) -> Self {
        Self { limit: Some(limit), delay: Duration::ZERO, pulled: 0 }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl facegate::camera::FrameSource for ScriptedFrames {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(limit) = self.limit {
            if self.pulled >= limit {
                return Err(FaceGateError::Camera("device unplugged".into()));
            }
        }
        self.pulled += 1;
        Ok(frame())
    }
}

/// Returns the same rectangles for every frame.
pub struct FixedDetector {
    faces: Vec<FaceRect>,
    pub calls: Cell<usize>,
}

impl FixedDetector {
    pub fn with_faces(count: usize) -> Self {
        // Distinct widths so crops can be told apart.
        let faces = (0..count as u32)
            .map(|i| FaceRect::new(i * 2, i * 2, 10 + i, 10 + i))
            .collect();
        Self { faces, calls: Cell::new(0) }
    }

    pub fn none() -> Self {
        Self::with_faces(0)
    }

    pub fn rects(rects: Vec<FaceRect>) -> Self {
        Self { faces: rects, calls: Cell::new(0) }
    }
}

impl FaceDetector for FixedDetector {
    fn detect(&self, _frame: &DynamicImage) -> Result<Vec<FaceRect>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.faces.clone())
    }
}

pub struct FailingDetector;

impl FaceDetector for FailingDetector {
    fn detect(&self, _frame: &DynamicImage) -> Result<Vec<FaceRect>> {
        Err(FaceGateError::Detector("inference failed".into()))
    }
}

/// Always predicts the same (label, distance).
pub struct ScriptedModel {
    pub prediction: Prediction,
    pub trained_on: usize,
    pub predictions: AtomicUsize,
}

impl FaceModel for ScriptedModel {
    fn predict(&self, _face: &GrayImage) -> Result<Prediction> {
        self.predictions.fetch_add(1, Ordering::SeqCst);
        Ok(self.prediction)
    }

    fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, format!("{} {}", self.prediction.label, self.prediction.distance))?;
        Ok(())
    }
}

pub struct ScriptedBuilder {
    pub prediction: Prediction,
    pub fits: Cell<usize>,
}

impl ScriptedBuilder {
    pub fn predicting(label: i32, distance: f64) -> Self {
        Self {
            prediction: Prediction { label: Identifier(label), distance },
            fits: Cell::new(0),
        }
    }
}

impl ModelBuilder for ScriptedBuilder {
    type Model = ScriptedModel;

    fn fit(&self, faces: &[GrayImage], labels: &[Identifier]) -> Result<ScriptedModel> {
        assert_eq!(faces.len(), labels.len());
        self.fits.set(self.fits.get() + 1);
        Ok(ScriptedModel {
            prediction: self.prediction,
            trained_on: faces.len(),
            predictions: AtomicUsize::new(0),
        })
    }

    fn load(&self, path: &Path) -> Result<ScriptedModel> {
        fs::read(path)?;
        Ok(ScriptedModel {
            prediction: self.prediction,
            trained_on: 0,
            predictions: AtomicUsize::new(0),
        })
    }
}

/// Labels a face by its crop width, distance 0. Counts calls.
#[derive(Default)]
pub struct WidthModel {
    pub calls: Arc<AtomicUsize>,
}

impl FaceModel for WidthModel {
    fn predict(&self, face: &GrayImage) -> Result<Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Prediction { label: Identifier(face.width() as i32), distance: 0.0 })
    }

    fn save(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// In-memory store keyed by raw name, so tests can plant foreign entries.
#[derive(Default)]
pub struct MemoryStore {
    pub samples: RefCell<BTreeMap<String, GrayImage>>,
}

impl MemoryStore {
    pub fn with_samples(identifier: i32, count: u32) -> Self {
        let store = Self::default();
        store.add_samples(identifier, count);
        store
    }

    pub fn add_samples(&self, identifier: i32, count: u32) {
        for sequence in 0..count {
            self.samples.borrow_mut().insert(
                SampleKey::new(Identifier(identifier), sequence).to_string(),
                GrayImage::from_pixel(8, 8, Luma([sequence as u8])),
            );
        }
    }

    pub fn plant(&self, name: &str) {
        self.samples.borrow_mut().insert(name.to_string(), GrayImage::new(8, 8));
    }

    pub fn len(&self) -> usize {
        self.samples.borrow().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.samples.borrow().keys().cloned().collect()
    }
}

impl SampleStore for MemoryStore {
    fn put(&self, key: SampleKey, image: &GrayImage) -> Result<()> {
        self.samples.borrow_mut().insert(key.to_string(), image.clone());
        Ok(())
    }

    fn list_all(&self) -> Result<SampleIter<'_>> {
        let items: Vec<_> = self
            .samples
            .borrow()
            .iter()
            .map(|(name, image)| Ok(StoredSample { name: name.clone(), image: image.clone() }))
            .collect();
        Ok(Box::new(items.into_iter()))
    }
}
