//! End-to-end runtime tests with a scripted classifier and camera platform,
//! running the polling loop under virtual time.

use mien_assets::{SourceCatalog, SourcePair};
use mien_core::{
    ClassifierError, DetectOptions, Detection, ExpressionCategory, ExpressionClassifier,
    ExpressionScores, FaceBox, VideoFrame,
};
use mien_hw::{CameraError, CameraPlatform, StreamConstraints, StreamStatus, VideoStream};
use mien_runtime::orchestrator::{STATUS_STREAM_ENDED, STATUS_UNSUPPORTED};
use mien_runtime::{
    presenter_channel, DetectionState, ExpressionSignal, Orchestrator, OrchestratorOptions,
    PresenterEvent, RefreshClock, Severity, StartError,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// --- Scripted classifier -------------------------------------------------

#[derive(Clone)]
enum DetectScript {
    Face(ExpressionScores),
    NoFace,
    Fail,
}

struct MockClassifier {
    fail_library_locations: HashSet<String>,
    library_loads: AtomicUsize,
    model_loads: AtomicUsize,
    library_ready: AtomicBool,
    models_ready: AtomicBool,
    detect_calls: AtomicUsize,
    /// Consumed front to back; `fallback` repeats once the queue is empty.
    script: Mutex<VecDeque<DetectScript>>,
    fallback: DetectScript,
}

impl MockClassifier {
    fn new(fallback: DetectScript) -> Self {
        Self {
            fail_library_locations: HashSet::new(),
            library_loads: AtomicUsize::new(0),
            model_loads: AtomicUsize::new(0),
            library_ready: AtomicBool::new(false),
            models_ready: AtomicBool::new(false),
            detect_calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    fn failing_all_libraries(locations: &[&str]) -> Self {
        let mut c = Self::new(DetectScript::NoFace);
        c.fail_library_locations = locations.iter().map(|s| s.to_string()).collect();
        c
    }

    fn push_script(&self, steps: impl IntoIterator<Item = DetectScript>) {
        self.script.lock().unwrap().extend(steps);
    }

    fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

impl ExpressionClassifier for MockClassifier {
    async fn load_library(&self, location: &str) -> Result<(), ClassifierError> {
        self.library_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_library_locations.contains(location) {
            return Err(ClassifierError::LibraryLoad("unreachable".into()));
        }
        self.library_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn library_ready(&self) -> bool {
        self.library_ready.load(Ordering::SeqCst)
    }

    async fn load_model_set(&self, _base_location: &str) -> Result<(), ClassifierError> {
        self.model_loads.fetch_add(1, Ordering::SeqCst);
        self.models_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn models_ready(&self) -> bool {
        self.models_ready.load(Ordering::SeqCst)
    }

    async fn detect(
        &self,
        _frame: &VideoFrame,
        _options: &DetectOptions,
    ) -> Result<Option<Detection>, ClassifierError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            DetectScript::Face(scores) => Ok(Some(Detection {
                face: FaceBox {
                    x: 10.0,
                    y: 10.0,
                    width: 80.0,
                    height: 80.0,
                    confidence: 0.9,
                },
                expressions: scores,
            })),
            DetectScript::NoFace => Ok(None),
            DetectScript::Fail => Err(ClassifierError::Inference("codec hiccup".into())),
        }
    }
}

// --- Scripted camera platform --------------------------------------------

#[derive(Clone, Copy)]
enum AcquireBehavior {
    Succeed,
    DenyPermission,
    DeviceBusy,
}

struct MockStreamState {
    status: Mutex<StreamStatus>,
    tracks_stopped: AtomicBool,
    sequence: AtomicU32,
}

impl MockStreamState {
    fn set_status(&self, status: StreamStatus) {
        *self.status.lock().unwrap() = status;
    }
}

struct MockStream {
    state: Arc<MockStreamState>,
}

impl VideoStream for MockStream {
    fn status(&self) -> StreamStatus {
        *self.state.status.lock().unwrap()
    }

    fn grab(&mut self) -> Result<VideoFrame, CameraError> {
        Ok(VideoFrame {
            data: vec![128; 4],
            width: 2,
            height: 2,
            timestamp: std::time::Instant::now(),
            sequence: self.state.sequence.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn stop(&mut self) {
        self.state.tracks_stopped.store(true, Ordering::SeqCst);
        self.state.set_status(StreamStatus::Ended);
    }
}

struct PlatformState {
    supported: bool,
    behavior: Mutex<AcquireBehavior>,
    acquires: AtomicUsize,
    streams: Mutex<Vec<Arc<MockStreamState>>>,
}

#[derive(Clone)]
struct MockPlatform {
    state: Arc<PlatformState>,
}

impl MockPlatform {
    fn new(supported: bool, behavior: AcquireBehavior) -> (Self, Arc<PlatformState>) {
        let state = Arc::new(PlatformState {
            supported,
            behavior: Mutex::new(behavior),
            acquires: AtomicUsize::new(0),
            streams: Mutex::new(Vec::new()),
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl CameraPlatform for MockPlatform {
    type Stream = MockStream;

    fn is_supported(&self) -> bool {
        self.state.supported
    }

    async fn acquire(&self, _constraints: &StreamConstraints) -> Result<MockStream, CameraError> {
        self.state.acquires.fetch_add(1, Ordering::SeqCst);
        match *self.state.behavior.lock().unwrap() {
            AcquireBehavior::DenyPermission => Err(CameraError::PermissionDenied),
            AcquireBehavior::DeviceBusy => Err(CameraError::DeviceUnavailable("device busy".into())),
            AcquireBehavior::Succeed => {
                let stream_state = Arc::new(MockStreamState {
                    status: Mutex::new(StreamStatus::Playable),
                    tracks_stopped: AtomicBool::new(false),
                    sequence: AtomicU32::new(0),
                });
                self.state.streams.lock().unwrap().push(Arc::clone(&stream_state));
                Ok(MockStream {
                    state: stream_state,
                })
            }
        }
    }
}

// --- Harness --------------------------------------------------------------

fn catalog() -> SourceCatalog {
    SourceCatalog::with_pairs(vec![SourcePair {
        id: "test".into(),
        library: "lib".into(),
        models: "models".into(),
    }])
}

fn options() -> OrchestratorOptions {
    OrchestratorOptions {
        // No manifest probing in loop tests; probing is covered by the
        // loader's own tests.
        manifests: vec![],
        ..OrchestratorOptions::default()
    }
}

type TestOrchestrator = Orchestrator<MockClassifier, MockPlatform, RefreshClock>;

fn orchestrator(
    classifier: MockClassifier,
    platform: MockPlatform,
) -> (TestOrchestrator, Arc<MockClassifier>, mpsc::Receiver<PresenterEvent>) {
    let classifier = Arc::new(classifier);
    let (tx, rx) = presenter_channel(256);
    let orchestrator = Orchestrator::new(
        Arc::clone(&classifier),
        platform,
        RefreshClock::new(Duration::from_millis(10)),
        &catalog(),
        tx,
        options(),
    );
    (orchestrator, classifier, rx)
}

fn drain(rx: &mut mpsc::Receiver<PresenterEvent>) -> Vec<PresenterEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn happy() -> DetectScript {
    DetectScript::Face(ExpressionScores::from_pairs(&[(
        ExpressionCategory::Happy,
        0.9,
    )]))
}

fn detected_signals(events: &[PresenterEvent]) -> Vec<ExpressionSignal> {
    events
        .iter()
        .filter_map(|e| match e {
            PresenterEvent::Expression(signal) => Some(signal.clone()),
            _ => None,
        })
        .collect()
}

// --- Tests ----------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unsupported_platform_fails_fast_without_acquisition() {
    let (platform, platform_state) = MockPlatform::new(false, AcquireBehavior::Succeed);
    let (mut orch, _, mut rx) = orchestrator(MockClassifier::new(DetectScript::NoFace), platform);

    match orch.start().await {
        Err(StartError::Camera(CameraError::Unsupported)) => {}
        other => panic!("unexpected start result: {other:?}"),
    }

    assert_eq!(platform_state.acquires.load(Ordering::SeqCst), 0);
    assert_eq!(orch.state(), DetectionState::Stopped);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PresenterEvent::Status { text, severity: Severity::Error, visible: true }
            if text == STATUS_UNSUPPORTED
    )));
}

#[tokio::test(start_paused = true)]
async fn permission_denied_leaves_no_stream_and_allows_retry() {
    let (platform, platform_state) = MockPlatform::new(true, AcquireBehavior::DenyPermission);
    let (mut orch, _, _rx) = orchestrator(MockClassifier::new(DetectScript::NoFace), platform);

    match orch.start().await {
        Err(StartError::Camera(CameraError::PermissionDenied)) => {}
        other => panic!("unexpected start result: {other:?}"),
    }
    assert!(platform_state.streams.lock().unwrap().is_empty());
    assert_eq!(orch.state(), DetectionState::Stopped);

    // User grants permission; the same orchestrator can start cleanly.
    *platform_state.behavior.lock().unwrap() = AcquireBehavior::Succeed;
    orch.start().await.unwrap();
    assert_eq!(orch.state(), DetectionState::Polling);
    orch.stop().await;
}

#[tokio::test(start_paused = true)]
async fn library_failure_stops_before_polling_and_releases_stream() {
    let (platform, platform_state) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let classifier = MockClassifier::failing_all_libraries(&["lib"]);
    let (mut orch, classifier, _rx) = orchestrator(classifier, platform);

    match orch.start().await {
        Err(StartError::Assets(_)) => {}
        other => panic!("unexpected start result: {other:?}"),
    }
    assert_eq!(orch.state(), DetectionState::Stopped);
    assert_eq!(classifier.detect_calls(), 0);

    // The acquired stream must not be left open with no consumer.
    let streams = platform_state.streams.lock().unwrap();
    assert_eq!(streams.len(), 1);
    assert!(streams[0].tracks_stopped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn model_probe_falls_back_to_working_source() {
    // Local mirror directory does not exist; a real temp dir does.
    let good = std::env::temp_dir().join(format!("mien-runtime-test-{}", std::process::id()));
    std::fs::create_dir_all(&good).unwrap();
    std::fs::write(good.join("weights-manifest.json"), b"[]").unwrap();
    let missing = std::env::temp_dir().join("mien-runtime-test-definitely-absent");

    let catalog = SourceCatalog::with_pairs(vec![
        SourcePair {
            id: "local".into(),
            library: "lib".into(),
            models: missing.to_string_lossy().into_owned(),
        },
        SourcePair {
            id: "mirror".into(),
            library: "lib".into(),
            models: good.to_string_lossy().into_owned(),
        },
    ]);

    let (platform, _) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let classifier = Arc::new(MockClassifier::new(DetectScript::NoFace));
    let (tx, _rx) = presenter_channel(256);
    let mut orch = Orchestrator::new(
        Arc::clone(&classifier),
        platform,
        RefreshClock::new(Duration::from_millis(10)),
        &catalog,
        tx,
        OrchestratorOptions {
            manifests: vec!["weights-manifest.json".into()],
            ..OrchestratorOptions::default()
        },
    );

    orch.start().await.unwrap();
    assert_eq!(orch.state(), DetectionState::Polling);
    assert_eq!(orch.asset_status().models.unwrap().id, "mirror");
    // The probed-out local source never reached the classifier.
    assert_eq!(classifier.model_loads.load(Ordering::SeqCst), 1);

    orch.stop().await;
    std::fs::remove_dir_all(good).ok();
}

#[tokio::test(start_paused = true)]
async fn double_start_never_acquires_two_streams() {
    let (platform, platform_state) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let (mut orch, _, _rx) = orchestrator(MockClassifier::new(DetectScript::NoFace), platform);

    orch.start().await.unwrap();
    orch.start().await.unwrap(); // no-op while polling
    assert_eq!(platform_state.acquires.load(Ordering::SeqCst), 1);
    assert_eq!(platform_state.streams.lock().unwrap().len(), 1);

    orch.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_before_start_is_a_noop() {
    let (platform, _) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let (mut orch, _, mut rx) = orchestrator(MockClassifier::new(DetectScript::NoFace), platform);

    orch.stop().await;
    orch.stop().await;
    assert_eq!(orch.state(), DetectionState::Idle);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_inference_after_stop_across_further_tick_intervals() {
    let (platform, _) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let (mut orch, classifier, mut rx) = orchestrator(MockClassifier::new(happy()), platform);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(55)).await;
    assert!(classifier.detect_calls() > 0, "loop should have run ticks");

    orch.stop().await;
    assert_eq!(orch.state(), DetectionState::Stopped);
    let calls_at_stop = classifier.detect_calls();
    drain(&mut rx);

    // Several tick intervals later, still exactly zero additional calls.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(classifier.detect_calls(), calls_at_stop);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn per_frame_failures_never_kill_the_loop() {
    let (platform, _) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let classifier = MockClassifier::new(happy());
    classifier.push_script([
        DetectScript::Fail,
        DetectScript::Fail,
        DetectScript::Fail,
        DetectScript::Fail,
        DetectScript::Fail,
    ]);
    let (mut orch, classifier, mut rx) = orchestrator(classifier, platform);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    // Tick N+1 after N consecutive failures, and the loop recovered far
    // enough to publish an actual expression.
    assert!(classifier.detect_calls() > 5);
    assert_eq!(orch.state(), DetectionState::Polling);
    let signals = detected_signals(&drain(&mut rx));
    assert!(signals.iter().any(|s| matches!(
        s,
        ExpressionSignal::Detected { category: ExpressionCategory::Happy, .. }
    )));

    orch.stop().await;
}

#[tokio::test(start_paused = true)]
async fn change_events_fire_only_on_category_change() {
    let (platform, _) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let (mut orch, _, mut rx) = orchestrator(MockClassifier::new(happy()), platform);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    orch.stop().await;

    let changes: Vec<bool> = detected_signals(&drain(&mut rx))
        .iter()
        .filter_map(|s| match s {
            ExpressionSignal::Detected { changed, .. } => Some(*changed),
            _ => None,
        })
        .collect();
    assert!(changes.len() >= 2, "expected several detections, got {changes:?}");
    assert!(changes[0], "first detection must be a change");
    assert!(
        changes[1..].iter().all(|&c| !c),
        "steady category must not re-report changes: {changes:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn restart_resets_hysteresis() {
    let (platform, _) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let (mut orch, _, mut rx) = orchestrator(MockClassifier::new(happy()), platform);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    orch.stop().await;
    assert_eq!(orch.last_displayed(), None);
    drain(&mut rx);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    orch.stop().await;

    let signals = detected_signals(&drain(&mut rx));
    match signals.iter().find(|s| matches!(s, ExpressionSignal::Detected { .. })) {
        Some(ExpressionSignal::Detected { changed, .. }) => {
            assert!(changed, "first detection after restart must be a change");
        }
        other => panic!("expected a detection after restart, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stream_loss_mid_poll_self_terminates() {
    let (platform, platform_state) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let (mut orch, classifier, mut rx) = orchestrator(MockClassifier::new(happy()), platform);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(35)).await;

    // Stream dies without any external stop() call.
    platform_state.streams.lock().unwrap()[0].set_status(StreamStatus::Ended);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(orch.state(), DetectionState::Stopped);
    let calls_after_loss = classifier.detect_calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(classifier.detect_calls(), calls_after_loss);

    let events = drain(&mut rx);
    assert!(events.contains(&PresenterEvent::Expression(ExpressionSignal::Hidden)));
    assert!(events.iter().any(|e| matches!(
        e,
        PresenterEvent::Status { text, severity: Severity::Info, .. } if text == STATUS_STREAM_ENDED
    )));

    // Restart works after a self-termination.
    orch.start().await.unwrap();
    assert_eq!(orch.state(), DetectionState::Polling);
    orch.stop().await;
}

#[tokio::test(start_paused = true)]
async fn suspended_stream_skips_ticks_without_stopping() {
    let (platform, platform_state) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let (mut orch, classifier, _rx) = orchestrator(MockClassifier::new(happy()), platform);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(35)).await;
    let before = classifier.detect_calls();
    assert!(before > 0);

    platform_state.streams.lock().unwrap()[0].set_status(StreamStatus::Suspended);
    tokio::time::sleep(Duration::from_millis(100)).await;
    // Transient condition: no inference, but the loop is still alive.
    assert_eq!(classifier.detect_calls(), before);
    assert_eq!(orch.state(), DetectionState::Polling);

    platform_state.streams.lock().unwrap()[0].set_status(StreamStatus::Playable);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(classifier.detect_calls() > before, "loop should resume after suspension");

    orch.stop().await;
}

#[tokio::test(start_paused = true)]
async fn no_face_is_reported_distinctly() {
    let (platform, _) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let classifier = MockClassifier::new(DetectScript::NoFace);
    let (mut orch, _, mut rx) = orchestrator(classifier, platform);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(35)).await;
    orch.stop().await;

    let signals = detected_signals(&drain(&mut rx));
    assert!(signals.contains(&ExpressionSignal::NoFace));
    assert!(!signals
        .iter()
        .any(|s| matches!(s, ExpressionSignal::Detected { .. })));
}

#[tokio::test(start_paused = true)]
async fn asset_cache_survives_restart() {
    let (platform, _) = MockPlatform::new(true, AcquireBehavior::Succeed);
    let (mut orch, classifier, _rx) = orchestrator(MockClassifier::new(happy()), platform);

    orch.start().await.unwrap();
    orch.stop().await;
    orch.start().await.unwrap();
    orch.stop().await;

    // Library and models were loaded exactly once across both sessions.
    assert_eq!(classifier.library_loads.load(Ordering::SeqCst), 1);
    assert_eq!(classifier.model_loads.load(Ordering::SeqCst), 1);
}
