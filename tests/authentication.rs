mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::{
    FailingDetector, FixedDetector, MemoryStore, ScriptedBuilder, ScriptedFrames, ScriptedModel, WidthModel,
};
use facegate::common::{Config, FaceGateError, Result};
use facegate::core::{
    AuthOutcome, AuthPolicy, AuthenticationController, FaceGate, FaceModel, FaceRect, FaceVerdict,
    FrameView, LbphBuilder, ModelRegistry, NoopObserver, Prediction, SessionObserver, StopSignal,
};
use facegate::storage::{Identifier, SampleKey, SampleStore};
use image::{GrayImage, Luma};
use tempfile::TempDir;

const WINDOW: Duration = Duration::from_millis(200);

fn short_policy() -> AuthPolicy {
    AuthPolicy { timeout: WINDOW, ..AuthPolicy::default() }
}

type TestGate = FaceGate<MemoryStore, FixedDetector, ScriptedBuilder>;

fn gate(tmp: &TempDir, builder: ScriptedBuilder) -> TestGate {
    let registry = ModelRegistry::empty(tmp.path().join("face_model.bin"));
    FaceGate::new(MemoryStore::default(), FixedDetector::with_faces(1), builder, registry, &Config::default())
        .with_policy(short_policy())
}

/// Enrolls identifiers 7 and 9 with 30 samples each, then trains.
fn trained_gate(tmp: &TempDir, label: i32, distance: f64) -> TestGate {
    let gate = gate(tmp, ScriptedBuilder::predicting(label, distance));
    for id in [7, 9] {
        let outcome = gate
            .enroll(&mut ScriptedFrames::endless(), Identifier(id), &StopSignal::new(), &mut NoopObserver)
            .unwrap();
        assert!(outcome.completed);
    }
    let report = gate.train().unwrap();
    assert_eq!(report.samples, 60);
    assert_eq!(report.identities, 2);
    gate
}

fn authenticate(gate: &TestGate, claimed: i32) -> AuthOutcome {
    gate.authenticate(
        &mut ScriptedFrames::endless().with_delay(Duration::from_millis(5)),
        Identifier(claimed),
        &StopSignal::new(),
        &mut NoopObserver,
    )
}

#[test]
fn close_match_for_claimed_identity_is_accepted() {
    let tmp = TempDir::new().unwrap();
    let gate = trained_gate(&tmp, 7, 10.0);

    let outcome = authenticate(&gate, 7);
    assert_eq!(outcome, AuthOutcome::Accepted { distance: 10.0 });
    assert!(outcome.is_accepted());
}

#[test]
fn claimed_identity_too_far_away_times_out() {
    let tmp = TempDir::new().unwrap();
    let gate = trained_gate(&tmp, 7, 40.0);

    let outcome = authenticate(&gate, 7);
    assert_eq!(outcome, AuthOutcome::TimedOut);
    assert!(!outcome.is_accepted());
}

#[test]
fn face_recognized_as_someone_else_is_not_accepted() {
    let tmp = TempDir::new().unwrap();
    let gate = trained_gate(&tmp, 9, 5.0);

    assert!(!authenticate(&gate, 7).is_accepted());
    // The same model does let 9 in.
    assert!(authenticate(&gate, 9).is_accepted());
}

#[test]
fn acceptance_threshold_is_strict() {
    let tmp = TempDir::new().unwrap();
    assert!(!authenticate(&trained_gate(&tmp, 7, 25.0), 7).is_accepted());

    let tmp = TempDir::new().unwrap();
    assert!(authenticate(&trained_gate(&tmp, 7, 24.99), 7).is_accepted());
}

#[test]
fn untrained_gate_rejects_without_error() {
    let tmp = TempDir::new().unwrap();
    let gate = gate(&tmp, ScriptedBuilder::predicting(7, 0.0));
    assert!(!gate.registry().is_available());

    let outcome = authenticate(&gate, 7);
    assert_eq!(outcome, AuthOutcome::TimedOut);
}

#[derive(Default)]
struct VerdictLog {
    verdicts: Vec<FaceVerdict>,
    remaining: Vec<Duration>,
}

impl SessionObserver for VerdictLog {
    fn on_frame(&mut self, view: &FrameView<'_>) {
        self.verdicts.extend_from_slice(view.verdicts);
        self.remaining.extend(view.remaining);
    }
}

#[test]
fn untrained_gate_reports_faces_as_unrecognized() {
    let tmp = TempDir::new().unwrap();
    let gate = gate(&tmp, ScriptedBuilder::predicting(7, 0.0));
    let mut log = VerdictLog::default();

    gate.authenticate(
        &mut ScriptedFrames::endless().with_delay(Duration::from_millis(20)),
        Identifier(7),
        &StopSignal::new(),
        &mut log,
    );

    assert!(!log.verdicts.is_empty());
    assert!(log.verdicts.iter().all(|v| *v == FaceVerdict::Unrecognized));
    assert!(log.remaining.iter().all(|r| *r <= WINDOW));
}

#[test]
fn no_faces_times_out_near_the_deadline() {
    let detector = FixedDetector::none();
    let model = ScriptedModel {
        prediction: Prediction { label: Identifier(7), distance: 0.0 },
        trained_on: 1,
        predictions: AtomicUsize::new(0),
    };
    let mut frames = ScriptedFrames::endless().with_delay(Duration::from_millis(10));

    let started = Instant::now();
    let outcome = AuthenticationController::new(&detector, short_policy()).authenticate(
        &mut frames,
        Identifier(7),
        Some(&model),
        &StopSignal::new(),
        &mut NoopObserver,
    );
    let elapsed = started.elapsed();

    assert_eq!(outcome, AuthOutcome::TimedOut);
    assert!(elapsed >= WINDOW);
    assert!(elapsed < WINDOW + Duration::from_secs(1));
    assert_eq!(model.predictions.load(Ordering::SeqCst), 0);
    assert!(frames.pulled > 0);
}

#[test]
fn frame_source_failure_fails_the_session() {
    let tmp = TempDir::new().unwrap();
    let gate = trained_gate(&tmp, 7, 0.0);

    let outcome = gate.authenticate(
        &mut ScriptedFrames::failing_after(0),
        Identifier(7),
        &StopSignal::new(),
        &mut NoopObserver,
    );

    match outcome {
        AuthOutcome::Failed { reason } => assert!(reason.contains("device unplugged")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn detector_failure_fails_the_session() {
    let outcome = AuthenticationController::new(&FailingDetector, short_policy()).authenticate(
        &mut ScriptedFrames::endless(),
        Identifier(7),
        None::<&WidthModel>,
        &StopSignal::new(),
        &mut NoopObserver,
    );

    assert!(matches!(outcome, AuthOutcome::Failed { .. }));
}

struct BrokenModel;

impl FaceModel for BrokenModel {
    fn predict(&self, _face: &GrayImage) -> Result<Prediction> {
        Err(FaceGateError::Model("histogram length mismatch".into()))
    }

    fn save(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[test]
fn model_failure_fails_the_session() {
    let detector = FixedDetector::with_faces(2);
    let outcome = AuthenticationController::new(&detector, short_policy()).authenticate(
        &mut ScriptedFrames::endless(),
        Identifier(7),
        Some(&BrokenModel),
        &StopSignal::new(),
        &mut NoopObserver,
    );

    assert!(matches!(outcome, AuthOutcome::Failed { .. }));
}

#[test]
fn stop_request_rejects_after_current_frame() {
    let tmp = TempDir::new().unwrap();
    let gate = trained_gate(&tmp, 7, 40.0);
    let stop = StopSignal::new();
    stop.stop();
    let mut frames = ScriptedFrames::endless();

    let outcome = gate.authenticate(&mut frames, Identifier(7), &stop, &mut NoopObserver);

    assert_eq!(outcome, AuthOutcome::Rejected);
    assert_eq!(frames.pulled, 1);
}

#[test]
fn acceptance_in_the_same_frame_wins_over_stop() {
    let tmp = TempDir::new().unwrap();
    let gate = trained_gate(&tmp, 7, 3.0);
    let stop = StopSignal::new();
    stop.stop();

    let outcome = gate.authenticate(&mut ScriptedFrames::endless(), Identifier(7), &stop, &mut NoopObserver);
    assert!(outcome.is_accepted());
}

#[test]
fn first_accepting_face_ends_the_session() {
    // Faces are 10, 11 and 12 pixels wide; the model labels by width.
    let detector = FixedDetector::with_faces(3);
    let model = WidthModel::default();
    let calls = model.calls.clone();
    let mut frames = ScriptedFrames::endless();

    let outcome = AuthenticationController::new(&detector, short_policy()).authenticate(
        &mut frames,
        Identifier(11),
        Some(&model),
        &StopSignal::new(),
        &mut NoopObserver,
    );

    assert_eq!(outcome, AuthOutcome::Accepted { distance: 0.0 });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(frames.pulled, 1);
}

#[test]
fn acceptance_is_monotonic_across_sessions() {
    let detector = FixedDetector::with_faces(1);
    let policy = short_policy();
    let mut rejected_seen = false;

    for step in 0..12 {
        let distance = step as f64 * 5.0;
        let model = ScriptedModel {
            prediction: Prediction { label: Identifier(4), distance },
            trained_on: 1,
            predictions: AtomicUsize::new(0),
        };
        let outcome = AuthenticationController::new(&detector, AuthPolicy { timeout: Duration::from_millis(30), ..policy })
            .authenticate(
                &mut ScriptedFrames::endless(),
                Identifier(4),
                Some(&model),
                &StopSignal::new(),
                &mut NoopObserver,
            );

        if outcome.is_accepted() {
            assert!(!rejected_seen, "accepted at {distance} after a closer face was rejected");
            assert!(distance < policy.accept_distance);
        } else {
            rejected_seen = true;
        }
    }
    assert!(rejected_seen);
}

#[test]
fn outcome_serializes_with_tag() {
    let json = serde_json::to_value(AuthOutcome::Accepted { distance: 12.5 }).unwrap();
    assert_eq!(json["outcome"], "accepted");
    assert_eq!(json["distance"], 12.5);

    let json = serde_json::to_value(AuthOutcome::TimedOut).unwrap();
    assert_eq!(json["outcome"], "timed_out");
}

#[test]
fn undersized_faces_are_skipped_not_predicted() {
    let detector = FixedDetector::rects(vec![
        FaceRect::new(0, 0, 5, 60),
        FaceRect::new(500, 500, 20, 20),
        FaceRect::new(20, 20, 11, 11),
    ]);
    let model = WidthModel::default();
    let calls = model.calls.clone();
    let mut log = VerdictLog::default();

    let outcome = AuthenticationController::new(&detector, short_policy())
        .with_min_face_size((10, 10))
        .authenticate(&mut ScriptedFrames::endless(), Identifier(11), Some(&model), &StopSignal::new(), &mut log);

    assert_eq!(outcome, AuthOutcome::Accepted { distance: 0.0 });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        log.verdicts,
        vec![
            FaceVerdict::Skipped,
            FaceVerdict::Skipped,
            FaceVerdict::Accepted { label: Identifier(11), distance: 0.0 },
        ]
    );
}

#[test]
fn thin_crops_never_match_each_other_through_the_gate() {
    // Enrolled and live crops are both too small to describe; with LBPH they
    // would otherwise compare as identical.
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::default();
    store.put(SampleKey::new(Identifier(7), 0), &GrayImage::from_pixel(3, 100, Luma([40]))).unwrap();
    store.put(SampleKey::new(Identifier(7), 1), &GrayImage::from_pixel(32, 32, Luma([200]))).unwrap();

    let gate = FaceGate::new(
        store,
        FixedDetector::rects(vec![FaceRect::new(0, 0, 5, 60)]),
        LbphBuilder::default(),
        ModelRegistry::empty(tmp.path().join("face_model.bin")),
        &Config::default(),
    )
    .with_policy(short_policy());

    let report = gate.train().unwrap();
    assert_eq!(report.samples, 1);
    assert_eq!(report.skipped, 1);

    let mut log = VerdictLog::default();
    let outcome = gate.authenticate(
        &mut ScriptedFrames::endless().with_delay(Duration::from_millis(20)),
        Identifier(7),
        &StopSignal::new(),
        &mut log,
    );

    assert_eq!(outcome, AuthOutcome::TimedOut);
    assert!(log.verdicts.iter().all(|v| *v == FaceVerdict::Skipped));
}
