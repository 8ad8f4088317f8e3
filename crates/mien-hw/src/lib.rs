//! mien-hw — Camera platform abstraction.
//!
//! Defines the capability traits the runtime consumes (support check,
//! stream acquisition, per-frame grab, teardown) and provides the V4L2
//! implementation used on Linux.

pub mod camera;
pub mod frame;
pub mod v4l2;

pub use camera::{CameraError, CameraPlatform, FacingMode, StreamConstraints, StreamStatus, VideoStream};
pub use v4l2::{DeviceInfo, V4l2Platform, V4l2Stream};
