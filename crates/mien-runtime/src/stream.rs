//! Camera stream lifecycle, independent of model/detection state.
//!
//! Exactly one live stream exists at a time, held in a single slot that
//! only the manager mutates. The detection loop reads frames through the
//! manager but never owns the stream.

use mien_core::VideoFrame;
use mien_hw::{CameraError, CameraPlatform, StreamConstraints, StreamStatus, VideoStream};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of one frame poll by the detection loop.
pub enum FramePoll {
    Frame(VideoFrame),
    /// Stream exists but is not currently playable, or the grab hiccuped.
    /// Transient; skip this tick and try again on the next one.
    NotPlayable,
    /// No live stream (never started, stopped, or ended). Terminal for
    /// the polling loop.
    Gone,
}

pub struct StreamManager<P: CameraPlatform> {
    platform: Arc<P>,
    slot: Arc<Mutex<Option<P::Stream>>>,
}

impl<P: CameraPlatform> Clone for StreamManager<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<P: CameraPlatform> StreamManager<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform: Arc::new(platform),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Acquire the camera stream. A second start while a stream is live is
    /// a successful no-op, never an error and never a second handle. The
    /// support check runs before any acquisition attempt; on acquisition
    /// failure the slot stays empty so the caller can retry.
    pub async fn start(&self, constraints: &StreamConstraints) -> Result<(), CameraError> {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            tracing::debug!("camera stream already active");
            return Ok(());
        }

        if !self.platform.is_supported() {
            return Err(CameraError::Unsupported);
        }

        let stream = self.platform.acquire(constraints).await?;
        *slot = Some(stream);
        tracing::info!("camera stream acquired");
        Ok(())
    }

    /// Stop every track of the held stream and release it. Idempotent.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut stream) = slot.take() {
            stream.stop();
            tracing::info!("camera stream released");
        }
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Read the current frame for one detection tick. A stream that turns
    /// out to have ended is released here — an ended stream has no
    /// consumer and must not linger in the slot.
    pub async fn poll_frame(&self) -> FramePoll {
        let mut slot = self.slot.lock().await;
        let Some(stream) = slot.as_mut() else {
            return FramePoll::Gone;
        };

        match stream.status() {
            StreamStatus::Ended => {
                if let Some(mut dead) = slot.take() {
                    dead.stop();
                }
                tracing::info!("camera stream ended; slot released");
                FramePoll::Gone
            }
            StreamStatus::Suspended => FramePoll::NotPlayable,
            StreamStatus::Playable => match stream.grab() {
                Ok(frame) => FramePoll::Frame(frame),
                Err(e) => {
                    tracing::warn!(error = %e, "frame grab failed; skipping tick");
                    FramePoll::NotPlayable
                }
            },
        }
    }
}
