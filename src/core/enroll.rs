use crate::camera::FrameSource;
use crate::common::{FaceGateError, Result};
use crate::core::detector::FaceDetector;
use crate::core::recognizer::meets_min_size;
use crate::core::session::{FaceVerdict, FrameView, SessionObserver, StopSignal};
use crate::storage::{Identifier, SampleKey, SampleStore};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrollmentOutcome {
    pub identifier: Identifier,
    pub samples_written: usize,
    /// False when the operator stopped before the quota was met.
    pub completed: bool,
}

/// Collects `quota` face samples for one identifier.
///
/// The quota counts samples, not frames: a frame with several faces writes
/// one sample per rectangle and may finish enrollment on its own. A frame
/// source failure ends the session with `Capture`; samples already written
/// are left in the store.
pub struct EnrollmentController<'a, D: ?Sized, S: ?Sized> {
    detector: &'a D,
    store: &'a S,
    quota: usize,
    min_face: (u32, u32),
}

impl<'a, D, S> EnrollmentController<'a, D, S>
where
    D: FaceDetector + ?Sized,
    S: SampleStore + ?Sized,
{
    pub fn new(detector: &'a D, store: &'a S, quota: usize) -> Self {
        Self { detector, store, quota, min_face: (1, 1) }
    }

    /// Faces smaller than `(width, height)` are skipped without using quota.
    pub fn with_min_face_size(mut self, min_face: (u32, u32)) -> Self {
        self.min_face = min_face;
        self
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
        tracing::info!("Enrolling identifier {} (quota {})", identifier, self.quota);
        let mut count = 0usize;

        while count < self.quota {
            let frame = source.next_frame().map_err(|e| {
                tracing::warn!("Frame source failed after {} sample(s): {}", count, e);
                FaceGateError::Capture { samples_written: count, reason: e.to_string() }
            })?;

            let faces = self.detector.detect(&frame)?;
            let gray = frame.to_luma8();
            let mut verdicts = Vec::with_capacity(faces.len());

            for face in &faces {
                if count >= self.quota {
                    break;
                }
                let crop = match face.crop(&gray) {
                    Some(crop) if meets_min_size(&crop, self.min_face) => crop,
                    _ => {
                        tracing::debug!("Skipping face outside frame or too small: {:?}", face);
                        verdicts.push(FaceVerdict::Skipped);
                        continue;
                    }
                };

                let sequence = count as u32;
                self.store.put(SampleKey::new(identifier, sequence), &crop)?;
                verdicts.push(FaceVerdict::Captured { sequence });
                count += 1;
            }

            tracing::debug!("Frame: {} face(s), {}/{} samples", faces.len(), count, self.quota);
            observer.on_frame(&FrameView {
                frame: &frame,
                faces: &faces,
                verdicts: &verdicts,
                progress: Some((count, self.quota)),
                remaining: None,
            });

            if count < self.quota && stop.is_stopped() {
                tracing::info!("Enrollment stopped by operator after {} sample(s)", count);
                break;
            }
        }

        let completed = count >= self.quota;
        if completed {
            tracing::info!("Enrollment of {} complete: {} samples", identifier, count);
        }
        Ok(EnrollmentOutcome { identifier, samples_written: count, completed })
    }
}
