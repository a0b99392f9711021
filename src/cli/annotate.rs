use crate::common::DevMode;
use crate::core::{FaceRect, FaceVerdict, FrameView, SessionObserver};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Dev-mode observer that saves frames containing faces with their
/// rectangles drawn in, coloured by verdict.
pub struct DebugFrameSaver {
    dev_mode: DevMode,
    prefix: &'static str,
    saved: usize,
    limit: usize,
}

impl DebugFrameSaver {
    pub fn new(dev_mode: DevMode, prefix: &'static str, limit: usize) -> Self {
        Self { dev_mode, prefix, saved: 0, limit }
    }
}

impl SessionObserver for DebugFrameSaver {
    fn on_frame(&mut self, view: &FrameView<'_>) {
        if view.faces.is_empty() || self.saved >= self.limit {
            return;
        }

        let annotated = annotate(view.frame, view.faces, view.verdicts);
        let path = self.dev_mode.get_debug_path(self.prefix);
        match annotated.save(&path) {
            Ok(()) => {
                self.saved += 1;
                tracing::debug!("Saved annotated frame to {:?}", path);
            }
            Err(e) => tracing::warn!("Failed to save annotated frame {:?}: {}", path, e),
        }
    }
}

fn verdict_color(verdict: Option<&FaceVerdict>) -> Rgb<u8> {
    match verdict {
        Some(FaceVerdict::Accepted { .. }) | Some(FaceVerdict::Captured { .. }) => Rgb([0, 255, 0]),
        Some(FaceVerdict::LowConfidence { .. }) => Rgb([255, 255, 0]),
        Some(FaceVerdict::Mismatch { .. }) | Some(FaceVerdict::Unrecognized) => Rgb([255, 0, 0]),
        Some(FaceVerdict::Skipped) => Rgb([128, 128, 128]),
        None => Rgb([0, 255, 255]),
    }
}

/// Draws every face with a two pixel border coloured by its own verdict.
/// Faces beyond the verdict list (not evaluated) are drawn in cyan.
pub fn annotate(frame: &DynamicImage, faces: &[FaceRect], verdicts: &[FaceVerdict]) -> RgbImage {
    let mut img = frame.to_rgb8();
    let (width, height) = img.dimensions();

    for (i, face) in faces.iter().enumerate() {
        let Some(face) = face.clamp_to(width, height) else { continue };
        let color = verdict_color(verdicts.get(i));

        let rect = Rect::at(face.x as i32, face.y as i32).of_size(face.width, face.height);
        draw_hollow_rect_mut(&mut img, rect, color);

        if face.width > 2 && face.height > 2 {
            let inner = Rect::at(face.x as i32 + 1, face.y as i32 + 1)
                .of_size(face.width - 2, face.height - 2);
            draw_hollow_rect_mut(&mut img, inner, color);
        }
    }

    img
}
