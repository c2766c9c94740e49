//! OpenCV-backed webcam capture.

use opencv::{
    core::{Mat, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, info, warn};

use crate::types::{CaptureError, Frame, FrameFormat, FrameSource, parse_device_index};

/// Exclusive handle on a capture device.
///
/// The device stays open for the lifetime of the value and is released on drop.
pub struct Camera {
    uri: String,
    cap: VideoCapture,
    frame: Mat,
    resolution: (i32, i32),
}

impl Camera {
    /// Open `uri` (device index, `/dev/videoN`, or anything OpenCV can read)
    /// and request `resolution` as `(width, height)`.
    pub fn open(uri: &str, resolution: (i32, i32)) -> Result<Self, CaptureError> {
        let mut cap = open_video_capture(uri)?;
        configure_camera(&mut cap, resolution);

        let reported = (
            cap.get(videoio::CAP_PROP_FRAME_WIDTH)
                .map_err(|e| CaptureError::Other(e.into()))? as i32,
            cap.get(videoio::CAP_PROP_FRAME_HEIGHT)
                .map_err(|e| CaptureError::Other(e.into()))? as i32,
        );
        if reported != resolution {
            warn!(
                "camera {uri} delivers {}x{} instead of the requested {}x{}",
                reported.0, reported.1, resolution.0, resolution.1
            );
        }
        info!("opened camera {uri} at {}x{}", reported.0, reported.1);

        Ok(Self {
            uri: uri.to_string(),
            cap,
            frame: Mat::default(),
            resolution: reported,
        })
    }

    fn read_error(&self, err: opencv::Error) -> CaptureError {
        CaptureError::Read {
            uri: self.uri.clone(),
            source: err.into(),
        }
    }
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| self.read_error(e))?;
        if !grabbed {
            return Ok(None);
        }

        let size = self.frame.size().map_err(|e| self.read_error(e))?;
        if size.width <= 0 || size.height <= 0 {
            return Ok(None);
        }

        let data = self
            .frame
            .data_bytes()
            .map_err(|e| self.read_error(e))?
            .to_vec();

        Ok(Some(Frame::new(
            data,
            size.width,
            size.height,
            FrameFormat::Bgr8,
        )))
    }

    fn resolution(&self) -> (i32, i32) {
        self.resolution
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(err) = self.cap.release() {
            warn!("failed to release camera {}: {err}", self.uri);
        } else {
            debug!("released camera {}", self.uri);
        }
    }
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    debug!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    } else {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::from_file(uri, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    debug!("failed to open {uri} with backend {backend}: {err}");
                }
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Apply resolution and preferred pixel format. Drivers may ignore any of these.
fn configure_camera(cap: &mut VideoCapture, resolution: (i32, i32)) {
    let mut fourcc_set = false;
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        if matches!(cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64), Ok(true)) {
            fourcc_set = true;
        }
    }
    if !fourcc_set {
        if let Ok(yuyv) = videoio::VideoWriter::fourcc('Y', 'U', 'Y', 'V') {
            let _ = cap.set(videoio::CAP_PROP_FOURCC, yuyv as f64);
        }
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, resolution.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, resolution.1 as f64);
}
