//! JPEG encoding of annotated frames.

use image::{ImageError, RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;

/// JPEG start-of-image marker every encoded frame begins with.
#[cfg(test)]
pub(crate) const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("JPEG encode failed: {0}")]
    Jpeg(#[from] ImageError),
    #[error("JPEG encoder produced no output")]
    Empty,
}

/// Compresses annotated frames into standalone JPEG images.
#[derive(Clone, Copy, Debug)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self { quality: 85 }
    }
}

impl JpegFrameEncoder {
    /// `quality` is clamped to 1-100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, EncodeError> {
        let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut buffer, self.quality).encode_image(image)?;
        if buffer.is_empty() {
            return Err(EncodeError::Empty);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn encodes_to_a_jpeg_stream() {
        let image = RgbImage::from_pixel(64, 48, Rgb([200, 10, 10]));
        let jpeg = JpegFrameEncoder::default().encode(&image).unwrap();
        assert!(jpeg.len() > JPEG_SOI.len());
        assert_eq!(jpeg[..2], JPEG_SOI);
        assert_eq!(jpeg[jpeg.len() - 2..], [0xFF, 0xD9]);
    }

    #[test]
    fn lower_quality_is_smaller() {
        let image = RgbImage::from_fn(128, 128, |x, y| {
            Rgb([(x * 2) as u8, (y * 2) as u8, ((x ^ y) & 0xFF) as u8])
        });
        let high = JpegFrameEncoder::new(95).encode(&image).unwrap();
        let low = JpegFrameEncoder::new(10).encode(&image).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(JpegFrameEncoder::new(0).quality(), 1);
        assert_eq!(JpegFrameEncoder::new(250).quality(), 100);
    }

    #[test]
    fn oversized_frames_fail_instead_of_panicking() {
        let image = RgbImage::new(70_000, 1);
        assert!(matches!(
            JpegFrameEncoder::default().encode(&image),
            Err(EncodeError::Jpeg(_))
        ));
    }
}
