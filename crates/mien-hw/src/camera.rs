//! Camera platform capability traits and error taxonomy.

use mien_core::VideoFrame;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    /// Camera APIs are absent on this platform. Fatal to start; acquisition
    /// must never be attempted once this is known.
    #[error("camera capture is not supported on this platform")]
    Unsupported,
    /// The user (or system policy) denied access. Recoverable after the
    /// user changes settings.
    #[error("camera permission denied")]
    PermissionDenied,
    /// Device busy, missing, or otherwise not acquirable right now.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Acquisition constraints. Video only; audio is never requested.
#[derive(Debug, Clone)]
pub struct StreamConstraints {
    /// Preferred camera facing, honored by backends that expose facing
    /// metadata. The V4L2 backend selects by its configured device path
    /// and ignores this field.
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::User,
            width: 640,
            height: 360,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Live and delivering frames.
    Playable,
    /// Live but momentarily not delivering frames. Transient; the
    /// detection loop skips work and tries again next tick.
    Suspended,
    /// All tracks stopped. Terminal; the detection loop self-terminates.
    Ended,
}

/// A live camera stream. At most one exists at a time, owned by the
/// stream manager; the detection loop only reads through it.
pub trait VideoStream: Send + 'static {
    fn status(&self) -> StreamStatus;

    /// Grab the current frame. Errors are transient capture hiccups
    /// unless the stream has ended.
    fn grab(&mut self) -> Result<VideoFrame, CameraError>;

    /// Stop every underlying track and end the stream. Idempotent.
    fn stop(&mut self);
}

/// Platform capability for acquiring camera streams.
pub trait CameraPlatform: Send + Sync + 'static {
    type Stream: VideoStream;

    /// Cheap support check. Callers must fail fast with
    /// [`CameraError::Unsupported`] when this is false, without ever
    /// calling [`acquire`](Self::acquire).
    fn is_supported(&self) -> bool;

    /// Acquire a live stream. Suspends until the platform (and any
    /// permission prompt) resolves.
    fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send;
}
