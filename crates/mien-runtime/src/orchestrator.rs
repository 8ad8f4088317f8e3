//! The detection orchestrator: asset readiness, stream lifecycle, and the
//! bounded-rate polling loop, owned by one object with explicit lifecycle.
//!
//! State machine: `Idle → AwaitingAssets → Polling → Stopped`, re-entrant
//! from `Stopped` on restart. The polling loop runs only while the state
//! is `Polling` and a live stream exists; it self-terminates the moment
//! either stops being true. Per-frame inference failures never escape the
//! loop — its job is to keep running despite them.

use crate::clock::FrameClock;
use crate::presenter::{ExpressionSignal, PresenterEvent};
use crate::stream::{FramePoll, StreamManager};
use mien_assets::source::DEFAULT_MANIFESTS;
use mien_assets::{AssetError, AssetLoader, AssetStatus, SourceCatalog};
use mien_core::{
    AggregatorConfig, DetectOptions, ExpressionAggregator, ExpressionClassifier, ExpressionUpdate,
    LowConfidencePolicy,
};
use mien_hw::{CameraError, CameraPlatform, StreamConstraints};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

// User-visible status texts. One distinct message per failure class.
pub const STATUS_LOADING: &str = "Loading the face analysis models";
pub const STATUS_UNSUPPORTED: &str = "Camera is not supported in this environment";
pub const STATUS_PERMISSION_DENIED: &str = "Camera access denied";
pub const STATUS_DEVICE_FAILURE: &str = "Camera unavailable";
pub const STATUS_MODEL_FAILURE: &str = "Unable to load the face analysis models";
pub const STATUS_STREAM_ENDED: &str = "Camera stream ended";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    Idle,
    AwaitingAssets,
    Polling,
    Stopped,
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("asset error: {0}")]
    Assets(#[from] AssetError),
}

/// Tuning knobs with sensible defaults; the source catalog is the only
/// mandatory configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Manifest files a model source is probed for.
    pub manifests: Vec<String>,
    pub aggregator: AggregatorConfig,
    pub detect: DetectOptions,
    pub constraints: StreamConstraints,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            manifests: DEFAULT_MANIFESTS.iter().map(|m| m.to_string()).collect(),
            aggregator: AggregatorConfig::default(),
            detect: DetectOptions::default(),
            constraints: StreamConstraints::default(),
        }
    }
}

pub struct Orchestrator<C, P, K>
where
    C: ExpressionClassifier,
    P: CameraPlatform,
    K: FrameClock + Clone,
{
    classifier: Arc<C>,
    loader: Arc<AssetLoader<C>>,
    streams: StreamManager<P>,
    clock: K,
    aggregator: Arc<Mutex<ExpressionAggregator>>,
    presenter: mpsc::Sender<PresenterEvent>,
    state: Arc<Mutex<DetectionState>>,
    detect_options: DetectOptions,
    constraints: StreamConstraints,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl<C, P, K> Orchestrator<C, P, K>
where
    C: ExpressionClassifier,
    P: CameraPlatform,
    K: FrameClock + Clone,
{
    pub fn new(
        classifier: Arc<C>,
        platform: P,
        clock: K,
        catalog: &SourceCatalog,
        presenter: mpsc::Sender<PresenterEvent>,
        options: OrchestratorOptions,
    ) -> Self {
        let loader = Arc::new(AssetLoader::new(
            Arc::clone(&classifier),
            catalog,
            options.manifests,
        ));
        Self {
            classifier,
            loader,
            streams: StreamManager::new(platform),
            clock,
            aggregator: Arc::new(Mutex::new(ExpressionAggregator::new(options.aggregator))),
            presenter,
            state: Arc::new(Mutex::new(DetectionState::Idle)),
            detect_options: options.detect,
            constraints: options.constraints,
            stop_tx: None,
            task: None,
        }
    }

    pub fn state(&self) -> DetectionState {
        *lock(&self.state)
    }

    /// The category currently displayed, if any.
    pub fn last_displayed(&self) -> Option<mien_core::ExpressionCategory> {
        lock(&self.aggregator).last_displayed()
    }

    /// Asset cache snapshot for diagnostics.
    pub fn asset_status(&self) -> AssetStatus {
        self.loader.status()
    }

    /// Start detection: acquire the camera stream, make the classification
    /// assets ready, then enter the polling loop.
    ///
    /// A no-op while already starting or polling. On failure the state is
    /// `Stopped` with the stream released; there is no automatic retry —
    /// the next call walks the whole path again, reusing whatever the
    /// asset cache already holds.
    pub async fn start(&mut self) -> Result<(), StartError> {
        match self.state() {
            DetectionState::Polling | DetectionState::AwaitingAssets => return Ok(()),
            DetectionState::Idle | DetectionState::Stopped => {}
        }

        // Reap a loop that self-terminated (stream loss) since the last start.
        self.stop_tx = None;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        self.set_state(DetectionState::AwaitingAssets);

        if let Err(e) = self.streams.start(&self.constraints).await {
            self.set_state(DetectionState::Stopped);
            let _ = self.presenter.send(PresenterEvent::error(camera_status_text(&e))).await;
            return Err(e.into());
        }

        let _ = self.presenter.send(PresenterEvent::info(STATUS_LOADING)).await;

        if let Err(e) = self.ensure_assets().await {
            // Asset failure must not leave the stream open with no consumer.
            self.streams.stop().await;
            self.set_state(DetectionState::Stopped);
            let _ = self.presenter.send(PresenterEvent::error(STATUS_MODEL_FAILURE)).await;
            return Err(e.into());
        }

        let _ = self.presenter.send(PresenterEvent::status_hidden()).await;
        self.set_state(DetectionState::Polling);

        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = LoopContext {
            classifier: Arc::clone(&self.classifier),
            streams: self.streams.clone(),
            aggregator: Arc::clone(&self.aggregator),
            presenter: self.presenter.clone(),
            state: Arc::clone(&self.state),
            options: self.detect_options,
        };
        self.stop_tx = Some(stop_tx);
        self.task = Some(tokio::spawn(run_poll_loop(ctx, self.clock.clone(), stop_rx)));

        tracing::info!("detection started");
        Ok(())
    }

    async fn ensure_assets(&self) -> Result<(), AssetError> {
        self.loader.ensure_library().await?;
        self.loader.ensure_models().await?;
        Ok(())
    }

    /// Stop detection and release the stream. Idempotent; safe before the
    /// first start. Clears display hysteresis so a restart treats its
    /// first result as a change.
    pub async fn stop(&mut self) {
        let was_running = self.task.is_some() || self.streams.is_active().await;

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        self.streams.stop().await;
        lock(&self.aggregator).reset();

        if was_running {
            let _ = self.presenter.send(PresenterEvent::Expression(ExpressionSignal::Hidden)).await;
            let _ = self.presenter.send(PresenterEvent::status_hidden()).await;
            tracing::info!("detection stopped");
        }
        if self.state() != DetectionState::Idle {
            self.set_state(DetectionState::Stopped);
        }
    }

    fn set_state(&self, next: DetectionState) {
        *lock(&self.state) = next;
    }
}

struct LoopContext<C, P: CameraPlatform> {
    classifier: Arc<C>,
    streams: StreamManager<P>,
    aggregator: Arc<Mutex<ExpressionAggregator>>,
    presenter: mpsc::Sender<PresenterEvent>,
    state: Arc<Mutex<DetectionState>>,
    options: DetectOptions,
}

/// One tick in flight at a time: the next tick is not awaited until this
/// one's handling, success or failure, completes. That keeps UI updates
/// in frame order without any extra sequencing.
async fn run_poll_loop<C, P, K>(ctx: LoopContext<C, P>, mut clock: K, mut stop_rx: watch::Receiver<bool>)
where
    C: ExpressionClassifier,
    P: CameraPlatform,
    K: FrameClock,
{
    tracing::debug!("detection loop entered");
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                // A send or a dropped sender both mean teardown.
                let _ = changed;
                break;
            }
            _ = clock.next_frame() => {}
        }
        if *stop_rx.borrow() {
            break;
        }
        if *lock(&ctx.state) != DetectionState::Polling {
            break;
        }

        match ctx.streams.poll_frame().await {
            FramePoll::Gone => {
                // Stream died under us: self-terminate instead of polling
                // a dead source.
                tracing::info!("stream gone; detection loop self-terminating");
                *lock(&ctx.state) = DetectionState::Stopped;
                lock(&ctx.aggregator).reset();
                let _ = ctx.presenter.send(PresenterEvent::Expression(ExpressionSignal::Hidden)).await;
                let _ = ctx.presenter.send(PresenterEvent::info(STATUS_STREAM_ENDED)).await;
                break;
            }
            FramePoll::NotPlayable => continue,
            FramePoll::Frame(frame) => {
                let sequence = frame.sequence;
                match ctx.classifier.detect(&frame, &ctx.options).await {
                    Err(e) => {
                        // Transient per-frame failure: report and keep going.
                        tracing::warn!(error = %e, sequence, "frame inference failed; continuing");
                    }
                    Ok(detection) => {
                        let signal = {
                            let mut aggregator = lock(&ctx.aggregator);
                            let update = aggregator.observe(detection.as_ref().map(|d| &d.expressions));
                            signal_for(update, aggregator.config().low_confidence)
                        };
                        if let Some(signal) = signal {
                            let _ = ctx.presenter.send(PresenterEvent::Expression(signal)).await;
                        }
                    }
                }
            }
        }
    }
    tracing::debug!("detection loop exited");
}

fn signal_for(update: ExpressionUpdate, policy: LowConfidencePolicy) -> Option<ExpressionSignal> {
    match update {
        ExpressionUpdate::Expression { top, changed } => Some(ExpressionSignal::Detected {
            category: top.category,
            confidence_percent: top.confidence_percent(),
            changed,
        }),
        ExpressionUpdate::NoFace => Some(ExpressionSignal::NoFace),
        ExpressionUpdate::LowConfidence => match policy {
            // Hide the indicator, but keep the status line untouched —
            // this is not "no face detected".
            LowConfidencePolicy::Hide => Some(ExpressionSignal::Hidden),
            LowConfidencePolicy::Fallback => None,
        },
    }
}

fn camera_status_text(e: &CameraError) -> &'static str {
    match e {
        CameraError::Unsupported => STATUS_UNSUPPORTED,
        CameraError::PermissionDenied => STATUS_PERMISSION_DENIED,
        CameraError::DeviceUnavailable(_) | CameraError::CaptureFailed(_) => STATUS_DEVICE_FAILURE,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
