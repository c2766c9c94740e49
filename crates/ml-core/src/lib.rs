//! Detection primitives shared by the live stream and the model backends.
//!
//! The TorchScript YOLOv8 backend is only compiled with the `with-tch`
//! feature; everything else is plain Rust and usable from tests.

pub mod detection;
pub mod detector;
pub mod labels;

pub use detection::{Detection, nms};
pub use detector::Detector;
#[cfg(feature = "with-tch")]
pub use detector::{TorchDetector, TorchDetectorOptions};
pub use labels::ClassNames;

#[cfg(feature = "with-tch")]
pub use tch;
