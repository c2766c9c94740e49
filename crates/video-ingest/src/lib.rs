//! Frame sources for the live detection stream.
//!
//! A [`FrameSource`] hands out raw frames one at a time on demand. The OpenCV
//! webcam backend lives behind the `opencv` feature so the rest of the
//! workspace builds without native OpenCV libraries.

#[cfg(feature = "opencv")]
mod camera;
mod types;

#[cfg(feature = "opencv")]
pub use camera::Camera;
pub use types::{CaptureError, Frame, FrameFormat, FrameSource, parse_device_index};
