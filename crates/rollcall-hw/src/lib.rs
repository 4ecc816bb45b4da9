//! rollcall-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access, YUYV/MJPG to RGB conversion, and
//! JPEG encoding of captured frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
