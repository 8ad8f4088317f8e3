//! V4L2 camera backend via the `v4l` crate.

use crate::camera::{CameraError, CameraPlatform, StreamConstraints, StreamStatus, VideoStream};
use crate::frame;
use mien_core::VideoFrame;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const V4L_SYSFS_ROOT: &str = "/sys/class/video4linux";

/// Negotiated pixel format for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel, native IR camera output).
    Grey,
}

/// Info about a discovered V4L2 capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// V4L2 implementation of the camera platform capability.
pub struct V4l2Platform {
    device_path: String,
}

impl V4l2Platform {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }

    fn open(&self, constraints: &StreamConstraints) -> Result<V4l2Stream, CameraError> {
        if !Path::new(&self.device_path).exists() {
            return Err(CameraError::DeviceUnavailable(format!(
                "device not found: {}",
                self.device_path
            )));
        }

        let device = Device::with_path(&self.device_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                CameraError::PermissionDenied
            } else if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceUnavailable("device busy".into())
            } else {
                CameraError::DeviceUnavailable(format!("{}: {e}", self.device_path))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(
            device = %self.device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::Unsupported);
        }

        // Request YUYV at the constrained size; accept GREY if the driver
        // negotiates it (common for IR cameras).
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to get format: {e}")))?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = constraints.width;
        fmt.height = constraints.height;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to set format: {e}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else {
            return Err(CameraError::CaptureFailed(format!(
                "unsupported pixel format: {:?} (need YUYV or GREY)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        let cell = Arc::new(FrameCell::new());
        let thread_cell = Arc::clone(&cell);
        let width = negotiated.width;
        let height = negotiated.height;
        let thread = std::thread::Builder::new()
            .name("mien-capture".into())
            .spawn(move || capture_loop(device, width, height, pixel_format, thread_cell))
            .map_err(|e| {
                CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}"))
            })?;

        Ok(V4l2Stream {
            cell,
            thread: Some(thread),
        })
    }
}

impl CameraPlatform for V4l2Platform {
    type Stream = V4l2Stream;

    /// The V4L2 subsystem being registered at all is the platform
    /// capability; a missing or busy device is a separate, recoverable
    /// condition reported by `acquire`.
    fn is_supported(&self) -> bool {
        Path::new(V4L_SYSFS_ROOT).exists()
    }

    async fn acquire(&self, constraints: &StreamConstraints) -> Result<V4l2Stream, CameraError> {
        // V4L2 open/format negotiation is quick; no permission prompt to
        // await on this platform.
        self.open(constraints)
    }
}

/// Consecutive dequeue failures before the capture thread gives up and
/// ends the stream.
const MAX_CAPTURE_ERRORS: u32 = 10;

/// State shared between the capture thread and the stream handle. The
/// thread publishes the newest frame; the handle only ever takes a
/// non-blocking snapshot, so dequeue latency never reaches the caller.
struct FrameCell {
    latest: Mutex<Option<VideoFrame>>,
    running: AtomicBool,
    ended: AtomicBool,
}

impl FrameCell {
    fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            running: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        }
    }

    fn publish(&self, frame: VideoFrame) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
    }

    fn snapshot(&self) -> Option<VideoFrame> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn end(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.ended.store(true, Ordering::SeqCst);
    }

    fn status(&self) -> StreamStatus {
        if self.ended.load(Ordering::SeqCst) {
            StreamStatus::Ended
        } else if self.latest.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
            StreamStatus::Playable
        } else {
            // Live but no frame dequeued yet (device warmup).
            StreamStatus::Suspended
        }
    }
}

/// Blocking capture loop, run on a dedicated OS thread that owns the
/// device handle. Conversion failures are transient and skipped; repeated
/// dequeue failures end the stream.
fn capture_loop(
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    cell: Arc<FrameCell>,
) {
    tracing::debug!("capture thread started");

    let mut stream = match MmapStream::with_buffers(&device, BufType::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "failed to create mmap stream; ending capture");
            cell.end();
            return;
        }
    };

    let mut errors = 0u32;
    while cell.running.load(Ordering::SeqCst) {
        let (buf, meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) => {
                errors += 1;
                tracing::warn!(error = %e, errors, "buffer dequeue failed");
                if errors >= MAX_CAPTURE_ERRORS {
                    cell.end();
                    break;
                }
                continue;
            }
        };
        errors = 0;

        let gray = match pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, width, height),
            PixelFormat::Grey => frame::grey_plane(buf, width, height),
        };
        match gray {
            Ok(data) => cell.publish(VideoFrame {
                data,
                width,
                height,
                timestamp: std::time::Instant::now(),
                sequence: meta.sequence,
            }),
            Err(e) => tracing::warn!(error = %e, "frame conversion failed; skipping"),
        }
    }

    tracing::debug!("capture thread exiting");
}

/// A live V4L2 stream. The device is owned by the capture thread; this
/// handle reads published frames and signals teardown.
pub struct V4l2Stream {
    cell: Arc<FrameCell>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl VideoStream for V4l2Stream {
    fn status(&self) -> StreamStatus {
        self.cell.status()
    }

    fn grab(&mut self) -> Result<VideoFrame, CameraError> {
        self.cell
            .snapshot()
            .ok_or_else(|| CameraError::CaptureFailed("no frame buffered yet".into()))
    }

    fn stop(&mut self) {
        self.cell.end();
        if let Some(thread) = self.thread.take() {
            // The thread exits after its in-flight dequeue, so this join
            // is bounded by one frame interval. Joining before returning
            // guarantees the device is closed when a restart re-opens it.
            let _ = thread.join();
            tracing::debug!("v4l2 stream stopped");
        }
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.stop();
    }
}
