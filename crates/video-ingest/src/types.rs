use anyhow::Error;
use thiserror::Error;

/// Raw interleaved 8-bit frame captured from a video source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    /// OpenCV's native channel order.
    Bgr8,
    Rgb8,
}

impl FrameFormat {
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::Bgr8 | FrameFormat::Rgb8 => 3,
        }
    }
}

impl Frame {
    /// Build a frame stamped with the current wall-clock time.
    pub fn new(data: Vec<u8>, width: i32, height: i32, format: FrameFormat) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            format,
        }
    }

    /// Number of bytes a buffer of this size and format must hold.
    pub fn expected_len(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize) * self.format.channels()
    }

    /// Copy the pixels out in RGB order, or `None` when the buffer length does
    /// not match the advertised dimensions.
    pub fn to_rgb_bytes(&self) -> Option<Vec<u8>> {
        if self.width <= 0 || self.height <= 0 || self.data.len() != self.expected_len() {
            return None;
        }
        match self.format {
            FrameFormat::Rgb8 => Some(self.data.clone()),
            FrameFormat::Bgr8 => {
                let mut output = Vec::with_capacity(self.data.len());
                for chunk in self.data.chunks_exact(3) {
                    output.push(chunk[2]);
                    output.push(chunk[1]);
                    output.push(chunk[0]);
                }
                Some(output)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot open video device {uri:?}")]
    Open { uri: String },
    #[error("failed to read frame from {uri:?}")]
    Read {
        uri: String,
        #[source]
        source: Error,
    },
    #[error(transparent)]
    Other(#[from] Error),
}

/// Pull-based producer of raw frames.
///
/// `Ok(None)` signals end of stream: the device stopped delivering frames and
/// callers should stop polling.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Resolution the device actually delivers, as `(width, height)`.
    fn resolution(&self) -> (i32, i32);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).read()
    }

    fn resolution(&self) -> (i32, i32) {
        (**self).resolution()
    }
}

/// Parse a `/dev/videoX` style URI or bare index and return the device index.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_indices() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("rtsp://cam/stream"), None);
    }

    #[test]
    fn bgr_frames_swap_to_rgb() {
        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, FrameFormat::Bgr8);
        assert_eq!(frame.to_rgb_bytes(), Some(vec![3, 2, 1, 6, 5, 4]));
    }

    #[test]
    fn truncated_buffers_are_rejected() {
        let frame = Frame::new(vec![0; 5], 2, 1, FrameFormat::Rgb8);
        assert_eq!(frame.expected_len(), 6);
        assert!(frame.to_rgb_bytes().is_none());
    }

    #[test]
    fn empty_frames_are_rejected() {
        let frame = Frame::new(Vec::new(), 0, 0, FrameFormat::Rgb8);
        assert!(frame.to_rgb_bytes().is_none());
    }
}
