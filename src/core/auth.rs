use crate::camera::FrameSource;
use crate::common::config::AuthConfig;
use crate::core::detector::FaceDetector;
use crate::core::recognizer::{meets_min_size, FaceModel, Prediction};
use crate::core::session::{FaceVerdict, FrameView, SessionObserver, StopSignal};
use crate::storage::Identifier;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Terminal state of one authentication session. Only `Accepted` lets the
/// caller in; the rest are kept apart for logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthOutcome {
    Accepted { distance: f64 },
    /// Operator stopped the session.
    Rejected,
    TimedOut,
    /// Frame source, detector or model failed.
    Failed { reason: String },
}

impl AuthOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthOutcome::Accepted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthPolicy {
    pub timeout: Duration,
    /// Accept strictly below this distance.
    pub accept_distance: f64,
    /// Feedback only: below this the claimed face counts as "close".
    pub near_distance: f64,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for AuthPolicy {
    fn from(config: &AuthConfig) -> Self {
        Self {
            timeout: config.timeout(),
            accept_distance: config.accept_distance,
            near_distance: config.near_distance,
        }
    }
}

impl AuthPolicy {
    /// Accepts iff the predicted label is the claimed one and the distance is
    /// under `accept_distance`.
    pub fn judge(&self, claimed: Identifier, prediction: Prediction) -> FaceVerdict {
        let Prediction { label, distance } = prediction;
        if label == claimed && distance < self.accept_distance {
            FaceVerdict::Accepted { label, distance }
        } else if label == claimed && distance < self.near_distance {
            FaceVerdict::LowConfidence { label, distance }
        } else {
            FaceVerdict::Mismatch { label, distance }
        }
    }
}

/// Deadline-bounded matching loop for one claimed identifier.
///
/// The deadline is checked at the top of every iteration, so a slow frame
/// pull can overshoot it by at most one pull.
pub struct AuthenticationController<'a, D: ?Sized> {
    detector: &'a D,
    policy: AuthPolicy,
    min_face: (u32, u32),
}

impl<'a, D: FaceDetector + ?Sized> AuthenticationController<'a, D> {
    pub fn new(detector: &'a D, policy: AuthPolicy) -> Self {
        Self { detector, policy, min_face: (1, 1) }
    }

    /// Faces smaller than `(width, height)` are never predicted.
    pub fn with_min_face_size(mut self, min_face: (u32, u32)) -> Self {
        self.min_face = min_face;
        self
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn authenticate<F, M, O>(
        &self,
        source: &mut F,
        claimed: Identifier,
        model: Option<&M>,
        stop: &StopSignal,
        observer: &mut O,
    ) -> AuthOutcome
    where
        F: FrameSource + ?Sized,
        M: FaceModel + ?Sized,
        O: SessionObserver + ?Sized,
    {
        let start = Instant::now();
        let mut frames = 0u32;

        tracing::info!("Authenticating identifier {} ({}s window)", claimed, self.policy.timeout.as_secs_f32());
        if model.is_none() {
            tracing::warn!("No trained model available; every face will be unrecognized");
        }

        let outcome = loop {
            let elapsed = start.elapsed();
            if elapsed >= self.policy.timeout {
                break AuthOutcome::TimedOut;
            }

            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => break AuthOutcome::Failed { reason: e.to_string() },
            };
            frames += 1;

            let faces = match self.detector.detect(&frame) {
                Ok(faces) => faces,
                Err(e) => break AuthOutcome::Failed { reason: e.to_string() },
            };

            let gray = frame.to_luma8();
            let mut verdicts = Vec::with_capacity(faces.len());
            let mut accepted = None;
            let mut failure = None;

            for face in &faces {
                let crop = match face.crop(&gray) {
                    Some(crop) if meets_min_size(&crop, self.min_face) => crop,
                    _ => {
                        verdicts.push(FaceVerdict::Skipped);
                        continue;
                    }
                };

                let Some(model) = model else {
                    verdicts.push(FaceVerdict::Unrecognized);
                    continue;
                };

                let prediction = match model.predict(&crop) {
                    Ok(prediction) => prediction,
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                };

                let verdict = self.policy.judge(claimed, prediction);
                tracing::debug!(
                    "Face predicted as {} at distance {:.2}: {:?}",
                    prediction.label, prediction.distance, verdict
                );
                verdicts.push(verdict);

                if let FaceVerdict::Accepted { distance, .. } = verdict {
                    accepted = Some(distance);
                    break;
                }
            }

            observer.on_frame(&FrameView {
                frame: &frame,
                faces: &faces,
                verdicts: &verdicts,
                progress: None,
                remaining: Some(self.policy.timeout.saturating_sub(elapsed)),
            });

            if let Some(reason) = failure {
                break AuthOutcome::Failed { reason };
            }
            if let Some(distance) = accepted {
                break AuthOutcome::Accepted { distance };
            }
            if stop.is_stopped() {
                break AuthOutcome::Rejected;
            }
        };

        match &outcome {
            AuthOutcome::Accepted { distance } => tracing::info!(
                "Identifier {} accepted at distance {:.2} after {} frame(s)", claimed, distance, frames
            ),
            AuthOutcome::Rejected => tracing::info!("Authentication stopped by operator after {} frame(s)", frames),
            AuthOutcome::TimedOut => tracing::info!("Authentication timed out after {} frame(s)", frames),
            AuthOutcome::Failed { reason } => tracing::warn!("Authentication failed: {}", reason),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(label: i32, distance: f64) -> Prediction {
        Prediction { label: Identifier(label), distance }
    }

    #[test]
    fn accept_requires_claimed_label_and_strict_threshold() {
        let policy = AuthPolicy::default();
        let claimed = Identifier(7);

        assert!(matches!(policy.judge(claimed, prediction(7, 10.0)), FaceVerdict::Accepted { .. }));
        assert!(matches!(policy.judge(claimed, prediction(7, 25.0)), FaceVerdict::LowConfidence { .. }));
        assert!(matches!(policy.judge(claimed, prediction(7, 40.0)), FaceVerdict::LowConfidence { .. }));
        assert!(matches!(policy.judge(claimed, prediction(7, 100.0)), FaceVerdict::Mismatch { .. }));
        assert!(matches!(policy.judge(claimed, prediction(9, 5.0)), FaceVerdict::Mismatch { .. }));
    }

    #[test]
    fn acceptance_is_monotonic_in_distance() {
        let policy = AuthPolicy::default();
        let claimed = Identifier(1);
        let mut accepted_so_far = true;
        // Walking distance upward, acceptance may only ever switch off.
        for step in 0..400 {
            let distance = step as f64 * 0.25;
            let accepted = matches!(policy.judge(claimed, prediction(1, distance)), FaceVerdict::Accepted { .. });
            assert!(!(accepted && !accepted_so_far), "re-accepted at {distance}");
            accepted_so_far = accepted;
        }
    }

    #[test]
    fn policy_follows_config() {
        let config = AuthConfig { timeout_seconds: 3, accept_distance: 12.5, near_distance: 50.0 };
        let policy = AuthPolicy::from(&config);
        assert_eq!(policy.timeout, Duration::from_secs(3));
        assert_eq!(policy.accept_distance, 12.5);
    }
}
