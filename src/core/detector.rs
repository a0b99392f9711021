use crate::common::config::DetectorConfig;
use crate::common::{FaceGateError, Result};
use ort::{Environment, Session, SessionBuilder, Value, GraphOptimizationLevel};
use std::sync::Arc;
use image::{DynamicImage, GrayImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

/// Axis-aligned face region in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl FaceRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height, confidence: 1.0 }
    }

    /// Intersects with a `frame_width` x `frame_height` frame. `None` when
    /// nothing of the rectangle is left.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<FaceRect> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(FaceRect { width, height, ..*self })
    }

    /// Grayscale crop of this region, clamped to the frame.
    pub fn crop(&self, gray: &GrayImage) -> Option<GrayImage> {
        let rect = self.clamp_to(gray.width(), gray.height())?;
        Some(image::imageops::crop_imm(gray, rect.x, rect.y, rect.width, rect.height).to_image())
    }
}

/// Finds candidate faces in one frame. Zero or more per frame; callers treat
/// the returned order as-is.
pub trait FaceDetector {
    fn detect(&self, frame: &DynamicImage) -> Result<Vec<FaceRect>>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for &D {
    fn detect(&self, frame: &DynamicImage) -> Result<Vec<FaceRect>> {
        (**self).detect(frame)
    }
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&self, frame: &DynamicImage) -> Result<Vec<FaceRect>> {
        (**self).detect(frame)
    }
}

/// Box in detector input space, before scaling back to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
}

/// Single-class YOLO face model run through ONNX Runtime.
pub struct OnnxFaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: DetectorConfig,
}

impl OnnxFaceDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| FaceGateError::Model(format!("Failed to create environment: {}", e)))?
        );

        let model_path = &config.model_path;
        if !model_path.exists() {
            return Err(FaceGateError::Detector(
                format!("Detector model not found at: {:?}", model_path)
            ));
        }

        let opt_level = match config.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };
        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(opt_level)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let gray = img.to_luma8();
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in gray.enumerate_pixels() {
            let value = pixel[0] as f32 * norm_factor;
            let (x, y) = (x as usize, y as usize);
            // Grayscale replicated into the three channels the model expects.
            array[[0, 0, y, x]] = value;
            array[[0, 1, y, x]] = value;
            array[[0, 2, y, x]] = value;
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<Candidate>> {
        let Some(first) = outputs.first() else {
            return Ok(Vec::new());
        };

        let output = first.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let data: Vec<f32> = output.iter().copied().collect();

        Ok(decode_predictions(
            &data,
            &shape,
            self.config.input_width as f32,
            self.config.input_height as f32,
        ))
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceRect>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.config.input_width
            && image.height() == self.config.input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(
                self.config.input_width,
                self.config.input_height,
                FilterType::Nearest
            );
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let candidates = self.parse_detections(&outputs)?;
        let mut kept = apply_nms(candidates, self.config.iou_threshold);
        kept.retain(|c| c.confidence >= self.config.confidence_threshold);
        kept.truncate(self.config.max_faces);

        let scale_x = orig_width / self.config.input_width as f32;
        let scale_y = orig_height / self.config.input_height as f32;

        Ok(kept
            .into_iter()
            .filter_map(|c| to_frame_rect(&c, scale_x, scale_y))
            .collect())
    }
}

/// Reads YOLO output laid out as `[1, N, 5+]` or transposed `[1, 5+, N]`.
fn decode_predictions(data: &[f32], shape: &[usize], input_width: f32, input_height: f32) -> Vec<Candidate> {
    let (num_predictions, prediction_length, is_transposed) = match shape {
        [_, a, b] if *b > *a && *a <= 10 => (*b, *a, true),
        [_, a, b] => (*a, *b, false),
        [a, b] => (*a, *b, false),
        _ => {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Vec::new();
        }
    };
    if prediction_length < 4 || data.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too short for shape {:?}", shape);
        return Vec::new();
    }

    let at = |i: usize, field: usize| -> f32 {
        if is_transposed {
            data[field * num_predictions + i]
        } else {
            data[i * prediction_length + field]
        }
    };

    let mut candidates = Vec::new();
    for i in 0..num_predictions {
        let confidence = if prediction_length > 4 { at(i, 4) } else { 0.0 };
        if confidence <= 0.001 {
            continue;
        }

        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        // Normalized outputs are scaled up to input pixels.
        let scale = if cx > 1.0 || cy > 1.0 || w > 1.0 || h > 1.0 { 1.0 } else { input_width };
        let (cx, cy, w, h) = (cx * scale, cy * scale, w * scale, h * scale);

        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(input_width);
        let y2 = (cy + h / 2.0).min(input_height);

        if x2 - x1 > 10.0 && y2 - y1 > 10.0 {
            candidates.push(Candidate { x1, y1, x2, y2, confidence });
        }
    }
    candidates
}

/// Greedy non-max suppression; result is sorted by descending confidence.
fn apply_nms(mut boxes: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| calculate_iou(k, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn calculate_iou(box1: &Candidate, box2: &Candidate) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1.x2 - box1.x1) * (box1.y2 - box1.y1);
    let area2 = (box2.x2 - box2.x1) * (box2.y2 - box2.y1);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn to_frame_rect(c: &Candidate, scale_x: f32, scale_y: f32) -> Option<FaceRect> {
    let x = (c.x1 * scale_x).round().max(0.0) as u32;
    let y = (c.y1 * scale_y).round().max(0.0) as u32;
    let width = ((c.x2 - c.x1) * scale_x).round() as u32;
    let height = ((c.y2 - c.y1) * scale_y).round() as u32;
    if width == 0 || height == 0 {
        return None;
    }
    Some(FaceRect { x, y, width, height, confidence: c.confidence })
}
