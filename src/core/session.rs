use crate::core::detector::FaceRect;
use crate::storage::Identifier;
use image::DynamicImage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Operator "stop" request, shared between the controller loop and whatever
/// watches the keyboard. Checked once per frame.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-face outcome, for feedback only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FaceVerdict {
    /// Written to the sample store during enrollment.
    Captured { sequence: u32 },
    /// No trained model to compare against.
    Unrecognized,
    Accepted { label: Identifier, distance: f64 },
    /// Claimed label, but not close enough to accept.
    LowConfidence { label: Identifier, distance: f64 },
    Mismatch { label: Identifier, distance: f64 },
    /// Outside the frame or too small to describe; never written or predicted.
    Skipped,
}

pub struct FrameView<'a> {
    pub frame: &'a DynamicImage,
    pub faces: &'a [FaceRect],
    /// `verdicts[i]` belongs to `faces[i]`. Shorter than `faces` when the
    /// frame ended early (quota met, face accepted, model failure).
    pub verdicts: &'a [FaceVerdict],
    /// Samples written so far / quota, during enrollment.
    pub progress: Option<(usize, usize)>,
    /// Time left before the authentication deadline.
    pub remaining: Option<Duration>,
}

/// Presentation hook. Nothing it does can change a session's outcome.
pub trait SessionObserver {
    fn on_frame(&mut self, _view: &FrameView<'_>) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

impl<O: SessionObserver + ?Sized> SessionObserver for &mut O {
    fn on_frame(&mut self, view: &FrameView<'_>) {
        (**self).on_frame(view)
    }
}

impl<O: SessionObserver> SessionObserver for Option<O> {
    fn on_frame(&mut self, view: &FrameView<'_>) {
        if let Some(observer) = self {
            observer.on_frame(view);
        }
    }
}

impl<A: SessionObserver, B: SessionObserver> SessionObserver for (A, B) {
    fn on_frame(&mut self, view: &FrameView<'_>) {
        self.0.on_frame(view);
        self.1.on_frame(view);
    }
}

impl FaceVerdict {
    pub fn message(&self) -> &'static str {
        match self {
            FaceVerdict::Captured { .. } => "Captured",
            FaceVerdict::Unrecognized => "Model not trained",
            FaceVerdict::Accepted { .. } => "Welcome",
            FaceVerdict::LowConfidence { .. } => "Low confidence, hold still",
            FaceVerdict::Mismatch { .. } => "Face does not match",
            FaceVerdict::Skipped => "Move closer to the camera",
        }
    }
}
