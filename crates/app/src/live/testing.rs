//! In-memory stand-ins for the camera and the model.

use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use ml_core::{Detection, Detector};
use video_ingest::{CaptureError, Frame, FrameFormat, FrameSource};

/// Mid-grey BGR frame.
pub(crate) fn solid_frame(width: i32, height: i32) -> Frame {
    Frame::new(
        vec![128; (width * height * 3) as usize],
        width,
        height,
        FrameFormat::Bgr8,
    )
}

/// Replays a fixed list of frames, then reports end of stream.
pub(crate) struct ScriptedSource {
    frames: VecDeque<Frame>,
    resolution: (i32, i32),
}

impl ScriptedSource {
    pub(crate) fn new(frames: Vec<Frame>) -> Self {
        let resolution = frames
            .first()
            .map(|frame| (frame.width, frame.height))
            .unwrap_or((0, 0));
        Self {
            frames: frames.into(),
            resolution,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        Ok(self.frames.pop_front())
    }

    fn resolution(&self) -> (i32, i32) {
        self.resolution
    }
}

/// Delivers its frames, then fails every read.
pub(crate) struct FailingSource {
    frames: VecDeque<Frame>,
}

impl FailingSource {
    pub(crate) fn after(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for FailingSource {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => Err(CaptureError::Read {
                uri: "scripted".to_string(),
                source: anyhow!("device unplugged"),
            }),
        }
    }

    fn resolution(&self) -> (i32, i32) {
        (16, 16)
    }
}

/// Returns the same detections for every frame, or always fails.
pub(crate) struct FixedDetector {
    detections: Vec<Detection>,
    failure: Option<&'static str>,
}

impl FixedDetector {
    pub(crate) fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            failure: None,
        }
    }

    pub(crate) fn failing(message: &'static str) -> Self {
        Self {
            detections: Vec::new(),
            failure: Some(message),
        }
    }
}

impl Detector for FixedDetector {
    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        match self.failure {
            Some(message) => Err(anyhow!(message)),
            None => Ok(self.detections.clone()),
        }
    }
}
