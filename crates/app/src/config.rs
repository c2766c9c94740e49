//! Command-line configuration.
//!
//! `LiveCliArgs` is the raw clap surface; `LiveConfig` is the validated form
//! the rest of the binary consumes without re-checking flags.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

/// CLI arguments accepted by `yolo-live`.
#[derive(Debug, Parser)]
#[command(name = "yolo-live", version, about = "YOLO Live: webcam object detection over MJPEG")]
pub struct LiveCliArgs {
    /// Requested capture resolution.
    #[arg(
        long = "webcam-resolution",
        num_args = 2,
        value_names = ["WIDTH", "HEIGHT"],
        default_values_t = [1280, 720]
    )]
    pub webcam_resolution: Vec<i32>,
    /// Camera index, `/dev/videoN` path, or any URI the capture backend accepts.
    #[arg(long = "source", value_name = "URI", default_value = "0", env = "YOLO_LIVE_SOURCE")]
    pub source: String,
    /// TorchScript export of the detection model.
    #[arg(
        long = "model",
        value_name = "PATH",
        default_value = "yolov8n.torchscript",
        env = "YOLO_LIVE_MODEL"
    )]
    pub model: PathBuf,
    /// Class names file, one per line. Defaults to the COCO table.
    #[arg(long = "classes", value_name = "PATH", env = "YOLO_LIVE_CLASSES")]
    pub classes: Option<PathBuf>,
    /// Square detector input size in pixels.
    #[arg(long = "input-size", value_name = "PX", default_value_t = 640, env = "YOLO_LIVE_INPUT_SIZE")]
    pub input_size: i64,
    /// Minimum detection confidence.
    #[arg(long = "confidence", value_name = "SCORE", default_value_t = 0.25, env = "YOLO_LIVE_CONFIDENCE")]
    pub confidence: f32,
    /// IoU threshold used by non-maximum suppression.
    #[arg(long = "iou", value_name = "RATIO", default_value_t = 0.45, env = "YOLO_LIVE_IOU")]
    pub iou: f32,
    /// Bounding box line thickness.
    #[arg(long = "thickness", value_name = "PX", default_value_t = 1, env = "YOLO_LIVE_THICKNESS")]
    pub thickness: u32,
    /// Draw boxes without text labels.
    #[arg(long = "no-labels", action = clap::ArgAction::SetTrue, env = "YOLO_LIVE_NO_LABELS")]
    pub no_labels: bool,
    /// JPEG quality used by the encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85, env = "YOLO_LIVE_JPEG_QUALITY")]
    pub jpeg_quality: i32,
    /// Address the HTTP server binds to.
    #[arg(long = "bind", value_name = "ADDR", default_value = "127.0.0.1", env = "YOLO_LIVE_BIND")]
    pub bind: String,
    /// Port the HTTP server listens on.
    #[arg(long = "port", value_name = "PORT", default_value_t = 5000, env = "YOLO_LIVE_PORT")]
    pub port: u16,
    /// Force CPU inference.
    #[arg(long = "cpu", action = clap::ArgAction::SetTrue, env = "YOLO_LIVE_CPU")]
    pub use_cpu: bool,
    /// Enable per-frame debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue, env = "YOLO_LIVE_VERBOSE")]
    pub verbose: bool,
}

/// Settings handed to the detector backend.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(not(feature = "with-tch"), allow(dead_code))]
pub struct DetectorSettings {
    pub input_size: i64,
    pub confidence: f32,
    pub iou: f32,
}

#[derive(Clone, Debug)]
pub struct LiveConfig {
    pub camera_uri: String,
    pub width: i32,
    pub height: i32,
    pub model_path: PathBuf,
    pub class_names_path: Option<PathBuf>,
    #[cfg_attr(not(feature = "with-tch"), allow(dead_code))]
    pub detector: DetectorSettings,
    pub thickness: u32,
    pub draw_labels: bool,
    pub jpeg_quality: u8,
    pub bind_addr: String,
    pub port: u16,
    #[cfg_attr(not(feature = "with-tch"), allow(dead_code))]
    pub use_cpu: bool,
    pub verbose: bool,
}

impl TryFrom<LiveCliArgs> for LiveConfig {
    type Error = anyhow::Error;

    fn try_from(args: LiveCliArgs) -> Result<Self> {
        let [width, height] = match args.webcam_resolution.as_slice() {
            [w, h] => [*w, *h],
            other => bail!("--webcam-resolution takes exactly two values, got {}", other.len()),
        };
        if width <= 0 || height <= 0 {
            bail!("Webcam width and height must be positive integers");
        }

        if args.input_size <= 0 || args.input_size % 32 != 0 {
            bail!("--input-size must be a positive multiple of 32");
        }
        if !(0.0..=1.0).contains(&args.confidence) {
            bail!("--confidence must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&args.iou) {
            bail!("--iou must be between 0 and 1");
        }
        if args.thickness == 0 {
            bail!("--thickness must be at least 1");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }

        Ok(Self {
            camera_uri: args.source,
            width,
            height,
            model_path: args.model,
            class_names_path: args.classes,
            detector: DetectorSettings {
                input_size: args.input_size,
                confidence: args.confidence,
                iou: args.iou,
            },
            thickness: args.thickness,
            draw_labels: !args.no_labels,
            jpeg_quality: args.jpeg_quality as u8,
            bind_addr: args.bind,
            port: args.port,
            use_cpu: args.use_cpu,
            verbose: args.verbose,
        })
    }
}

impl LiveConfig {
    #[cfg_attr(not(feature = "opencv"), allow(dead_code))]
    pub fn resolution(&self) -> (i32, i32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl LiveConfig {
        fn from_args<const N: usize>(args: [&str; N]) -> Result<Self> {
            Self::try_from(LiveCliArgs::try_parse_from(args)?)
        }
    }

    #[test]
    fn defaults_match_the_stock_webcam_setup() {
        let config = LiveConfig::from_args(["yolo-live"]).unwrap();
        assert_eq!(config.resolution(), (1280, 720));
        assert_eq!(config.camera_uri, "0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.jpeg_quality, 85);
        assert!(config.draw_labels);
        assert_eq!(config.detector.input_size, 640);
    }

    #[test]
    fn webcam_resolution_takes_two_values() {
        let config =
            LiveConfig::from_args(["yolo-live", "--webcam-resolution", "1200", "720"]).unwrap();
        assert_eq!(config.resolution(), (1200, 720));

        assert!(LiveConfig::from_args(["yolo-live", "--webcam-resolution", "1200"]).is_err());
    }

    #[test]
    fn rejects_non_positive_resolution() {
        let err = LiveConfig::from_args(["yolo-live", "--webcam-resolution", "0", "720"])
            .unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn rejects_out_of_range_quality() {
        assert!(LiveConfig::from_args(["yolo-live", "--jpeg-quality", "0"]).is_err());
        assert!(LiveConfig::from_args(["yolo-live", "--jpeg-quality", "101"]).is_err());
    }

    #[test]
    fn rejects_unaligned_input_size() {
        assert!(LiveConfig::from_args(["yolo-live", "--input-size", "650"]).is_err());
    }

    #[test]
    fn no_labels_disables_label_drawing() {
        let config = LiveConfig::from_args(["yolo-live", "--no-labels", "--thickness", "2"]).unwrap();
        assert!(!config.draw_labels);
        assert_eq!(config.thickness, 2);
    }
}
