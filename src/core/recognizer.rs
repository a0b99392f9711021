use crate::common::config::RecognizerConfig;
use crate::common::{FaceGateError, Result};
use crate::storage::Identifier;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

const MODEL_VERSION: u32 = 1;
const LBP_EPSILON: f32 = f32::EPSILON;

/// Recognizer output. `distance` is a dissimilarity: lower means more alike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Identifier,
    pub distance: f64,
}

/// A fitted recognizer. Shared read-only between sessions once trained.
pub trait FaceModel: Send + Sync {
    fn predict(&self, face: &GrayImage) -> Result<Prediction>;
    fn save(&self, path: &Path) -> Result<()>;
}

/// Produces fitted models, either from samples or from a persisted blob.
pub trait ModelBuilder {
    type Model: FaceModel;

    /// One-shot fit on the full sample set; never incremental.
    fn fit(&self, faces: &[GrayImage], labels: &[Identifier]) -> Result<Self::Model>;
    fn load(&self, path: &Path) -> Result<Self::Model>;

    /// Smallest (width, height) crop the model can describe. Smaller faces
    /// are never stored or predicted.
    fn min_face_size(&self) -> (u32, u32) {
        (1, 1)
    }
}

/// True when `face` is at least `min` in both dimensions.
pub fn meets_min_size(face: &GrayImage, (min_width, min_height): (u32, u32)) -> bool {
    face.width() >= min_width && face.height() >= min_height
}

#[derive(Serialize, Deserialize)]
struct ModelEnvelope {
    version: u32,
    digest: Vec<u8>,
    payload: Vec<u8>,
}

/// Local binary pattern histogram recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LbphModel {
    params: RecognizerConfig,
    histograms: Vec<Vec<f32>>,
    labels: Vec<Identifier>,
}

impl LbphModel {
    pub fn train(params: RecognizerConfig, faces: &[GrayImage], labels: &[Identifier]) -> Result<Self> {
        if faces.is_empty() {
            return Err(FaceGateError::NoTrainingData);
        }
        if faces.len() != labels.len() {
            return Err(FaceGateError::Model(format!(
                "{} faces but {} labels", faces.len(), labels.len()
            )));
        }

        let min = min_face_size(&params);
        if let Some(i) = faces.iter().position(|face| !meets_min_size(face, min)) {
            return Err(FaceGateError::Model(format!(
                "Face {} is {}x{}, smaller than the {}x{} minimum",
                i, faces[i].width(), faces[i].height(), min.0, min.1
            )));
        }

        let histograms = faces
            .iter()
            .map(|face| spatial_histogram(&elbp(face, params.radius, params.neighbors), &params))
            .collect();

        Ok(Self {
            params,
            histograms,
            labels: labels.to_vec(),
        })
    }

    pub fn sample_count(&self) -> usize {
        self.labels.len()
    }

    pub fn params(&self) -> &RecognizerConfig {
        &self.params
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let envelope: ModelEnvelope = bincode::deserialize(&data)
            .map_err(|e| FaceGateError::Model(format!("Failed to deserialize model: {}", e)))?;

        if envelope.version != MODEL_VERSION {
            return Err(FaceGateError::Model(format!(
                "Unsupported model version {} (expected {})", envelope.version, MODEL_VERSION
            )));
        }
        if Sha256::digest(&envelope.payload).as_slice() != envelope.digest.as_slice() {
            return Err(FaceGateError::Model(format!("Model checksum mismatch in {:?}", path)));
        }

        let model: LbphModel = bincode::deserialize(&envelope.payload)
            .map_err(|e| FaceGateError::Model(format!("Failed to deserialize model: {}", e)))?;
        if model.histograms.len() != model.labels.len() || model.labels.is_empty() {
            return Err(FaceGateError::Model(format!("Model in {:?} is inconsistent", path)));
        }
        Ok(model)
    }
}

impl FaceModel for LbphModel {
    fn predict(&self, face: &GrayImage) -> Result<Prediction> {
        let min = min_face_size(&self.params);
        if !meets_min_size(face, min) {
            return Err(FaceGateError::Model(format!(
                "Face {}x{} is smaller than the {}x{} minimum",
                face.width(), face.height(), min.0, min.1
            )));
        }

        let query = spatial_histogram(&elbp(face, self.params.radius, self.params.neighbors), &self.params);

        self.histograms
            .iter()
            .zip(&self.labels)
            .map(|(hist, label)| Prediction { label: *label, distance: chi_square_alt(hist, &query) })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .ok_or_else(|| FaceGateError::Model("Model has no training histograms".into()))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let payload = bincode::serialize(self)
            .map_err(|e| FaceGateError::Model(format!("Failed to serialize model: {}", e)))?;
        let envelope = ModelEnvelope {
            version: MODEL_VERSION,
            digest: Sha256::digest(&payload).to_vec(),
            payload,
        };
        let encoded = bincode::serialize(&envelope)
            .map_err(|e| FaceGateError::Model(format!("Failed to serialize model: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Write aside and rename so a crash never leaves a half-written model.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LbphBuilder {
    params: RecognizerConfig,
}

impl LbphBuilder {
    pub fn new(params: RecognizerConfig) -> Self {
        Self { params }
    }
}

impl ModelBuilder for LbphBuilder {
    type Model = LbphModel;

    fn fit(&self, faces: &[GrayImage], labels: &[Identifier]) -> Result<LbphModel> {
        LbphModel::train(self.params, faces, labels)
    }

    fn load(&self, path: &Path) -> Result<LbphModel> {
        let model = LbphModel::load(path)?;
        if model.params != self.params {
            tracing::warn!(
                "Persisted model uses LBP params {:?}, configured {:?}; keeping persisted",
                model.params, self.params
            );
        }
        Ok(model)
    }

    fn min_face_size(&self) -> (u32, u32) {
        min_face_size(&self.params)
    }
}

/// Every grid cell must keep at least one LBP code after the `radius`
/// border is trimmed, otherwise the histogram is all zeros.
fn min_face_size(params: &RecognizerConfig) -> (u32, u32) {
    (2 * params.radius + params.grid_x, 2 * params.radius + params.grid_y)
}

/// Circular extended LBP codes, bilinearly interpolated. Output shrinks by
/// `radius` on every side.
struct LbpImage {
    width: usize,
    height: usize,
    codes: Vec<u32>,
}

fn elbp(src: &GrayImage, radius: u32, neighbors: u32) -> LbpImage {
    let (w, h) = (src.width() as usize, src.height() as usize);
    let r = radius as usize;
    if w <= 2 * r || h <= 2 * r {
        return LbpImage { width: 0, height: 0, codes: Vec::new() };
    }

    let out_w = w - 2 * r;
    let out_h = h - 2 * r;
    let mut codes = vec![0u32; out_w * out_h];
    let px = |x: usize, y: usize| src.get_pixel(x as u32, y as u32)[0] as f32;

    for n in 0..neighbors {
        let angle = 2.0 * std::f32::consts::PI * n as f32 / neighbors as f32;
        let x = radius as f32 * angle.cos();
        let y = -(radius as f32) * angle.sin();

        let fx = x.floor();
        let fy = y.floor();
        let cx = x.ceil();
        let cy = y.ceil();
        let tx = x - fx;
        let ty = y - fy;

        let w1 = (1.0 - tx) * (1.0 - ty);
        let w2 = tx * (1.0 - ty);
        let w3 = (1.0 - tx) * ty;
        let w4 = tx * ty;

        let (fx, fy, cx, cy) = (fx as isize, fy as isize, cx as isize, cy as isize);

        for i in r..h - r {
            for j in r..w - r {
                let at = |dx: isize, dy: isize| {
                    px((j as isize + dx) as usize, (i as isize + dy) as usize)
                };
                let t = w1 * at(fx, fy) + w2 * at(cx, fy) + w3 * at(fx, cy) + w4 * at(cx, cy);
                let center = px(j, i);
                if t > center || (t - center).abs() < LBP_EPSILON {
                    codes[(i - r) * out_w + (j - r)] |= 1 << n;
                }
            }
        }
    }

    LbpImage { width: out_w, height: out_h, codes }
}

/// Concatenated per-cell histograms, each normalised by its pixel count.
fn spatial_histogram(lbp: &LbpImage, params: &RecognizerConfig) -> Vec<f32> {
    let bins = 1usize << params.neighbors;
    let (grid_x, grid_y) = (params.grid_x as usize, params.grid_y as usize);
    let mut hist = vec![0.0f32; bins * grid_x * grid_y];

    let cell_w = lbp.width / grid_x;
    let cell_h = lbp.height / grid_y;
    if cell_w == 0 || cell_h == 0 {
        return hist;
    }

    let norm = 1.0 / (cell_w * cell_h) as f32;
    for gy in 0..grid_y {
        for gx in 0..grid_x {
            let offset = (gy * grid_x + gx) * bins;
            for y in gy * cell_h..(gy + 1) * cell_h {
                for x in gx * cell_w..(gx + 1) * cell_w {
                    let code = lbp.codes[y * lbp.width + x] as usize;
                    hist[offset + code] += norm;
                }
            }
        }
    }
    hist
}

fn chi_square_alt(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let sum = (x + y) as f64;
            if sum.abs() > f64::EPSILON {
                let diff = (x - y) as f64;
                2.0 * diff * diff / sum
            } else {
                0.0
            }
        })
        .sum()
}
