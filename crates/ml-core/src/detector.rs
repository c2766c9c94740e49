//! Detector abstraction plus the TorchScript YOLOv8 backend.

use anyhow::Result;
use video_ingest::Frame;

use crate::detection::Detection;

/// Opaque object detector.
///
/// Implementations run synchronously; a slow call blocks whoever asked.
pub trait Detector: Send {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).infer(frame)
    }
}

#[cfg(feature = "with-tch")]
pub use torch::{TorchDetector, TorchDetectorOptions};

#[cfg(feature = "with-tch")]
mod torch {
    use std::path::Path;

    use anyhow::{Context, Result, anyhow, bail};
    use image::{RgbImage, imageops::FilterType};
    use tch::{self, Device, Kind, Tensor};
    use tracing::debug;
    use video_ingest::Frame;

    use super::Detector;
    use crate::detection::{Detection, nms};

    const MAX_DETECTIONS: usize = 300;

    /// Tuning knobs for [`TorchDetector`].
    #[derive(Clone, Copy, Debug)]
    pub struct TorchDetectorOptions {
        /// Square model input edge in pixels.
        pub input_size: i64,
        pub confidence_threshold: f32,
        pub iou_threshold: f32,
    }

    impl Default for TorchDetectorOptions {
        fn default() -> Self {
            Self {
                input_size: 640,
                confidence_threshold: 0.25,
                iou_threshold: 0.45,
            }
        }
    }

    /// TorchScript export of a YOLOv8 detection model.
    pub struct TorchDetector {
        module: tch::CModule,
        device: Device,
        options: TorchDetectorOptions,
    }

    impl TorchDetector {
        /// Load a TorchScript module onto `device`.
        pub fn new<P: AsRef<Path>>(
            model_path: P,
            device: Device,
            options: TorchDetectorOptions,
        ) -> Result<Self> {
            let path = model_path.as_ref();
            let mut module = tch::CModule::load_on_device(path, device)
                .with_context(|| format!("failed to load TorchScript model {}", path.display()))?;
            module.set_eval();
            Ok(Self {
                module,
                device,
                options,
            })
        }

        pub fn device(&self) -> Device {
            self.device
        }

        /// Resize an RGB frame to the model input and build a normalised NCHW tensor.
        fn frame_to_tensor(&self, frame: &Frame) -> Result<Tensor> {
            let rgb = frame.to_rgb_bytes().ok_or_else(|| {
                anyhow!(
                    "unexpected frame buffer size: got {} bytes, expected {}",
                    frame.data.len(),
                    frame.expected_len()
                )
            })?;
            let image = RgbImage::from_raw(frame.width as u32, frame.height as u32, rgb)
                .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))?;
            let side = self.options.input_size;
            let resized =
                image::imageops::resize(&image, side as u32, side as u32, FilterType::Triangle);

            let tensor = Tensor::from_slice(resized.as_raw())
                .to_device(self.device)
                .to_kind(Kind::Float)
                .view([1, side, side, 3])
                .permute([0, 3, 1, 2])
                / 255.0;
            Ok(tensor)
        }

        /// Decode a `[1, 4 + classes, anchors]` YOLOv8 head into frame-space boxes.
        fn decode(&self, output: &Tensor, frame: &Frame) -> Result<Vec<Detection>> {
            let shape = output.size();
            if shape.len() != 3 {
                bail!("unexpected detector output shape: {shape:?}");
            }
            if shape[0] != 1 {
                bail!("detector expected batch=1 but received {}", shape[0]);
            }
            if shape[1] < 5 {
                bail!(
                    "detector output requires at least 5 channels (cx,cy,w,h,class), got {}",
                    shape[1]
                );
            }

            let preds = output
                .to_device(Device::Cpu)
                .to_kind(Kind::Float)
                .squeeze_dim(0)
                .permute([1, 0])
                .contiguous();
            let rows: Vec<Vec<f32>> = Vec::<Vec<f32>>::try_from(&preds)?;

            let side = self.options.input_size as f32;
            let scale_x = frame.width as f32 / side;
            let scale_y = frame.height as f32 / side;
            let max_x = (frame.width - 1).max(0) as f32;
            let max_y = (frame.height - 1).max(0) as f32;

            let mut candidates = Vec::new();
            for row in rows {
                let Some((class_idx, score)) = row[4..]
                    .iter()
                    .copied()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                else {
                    continue;
                };
                if score < self.options.confidence_threshold {
                    continue;
                }
                let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
                candidates.push(Detection {
                    bbox: [
                        ((cx - w / 2.0) * scale_x).clamp(0.0, max_x),
                        ((cy - h / 2.0) * scale_y).clamp(0.0, max_y),
                        ((cx + w / 2.0) * scale_x).clamp(0.0, max_x),
                        ((cy + h / 2.0) * scale_y).clamp(0.0, max_y),
                    ],
                    score,
                    class_id: class_idx as i64,
                });
            }

            let mut kept = nms(candidates, self.options.iou_threshold);
            kept.truncate(MAX_DETECTIONS);
            Ok(kept)
        }
    }

    impl Detector for TorchDetector {
        fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
            let input = self.frame_to_tensor(frame)?;
            let output = tch::no_grad(|| self.module.forward_ts(&[input]))
                .context("detector forward pass failed")?;
            let detections = self.decode(&output, frame)?;
            debug!("detector returned {} detection(s)", detections.len());
            Ok(detections)
        }
    }
}
