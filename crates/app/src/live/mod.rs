//! Live webcam detection streamed to the browser.
//!
//! - `stream`: shared capture context and the per-connection frame iterator.
//! - `annotation`: box and label drawing.
//! - `encoding`: JPEG compression.
//! - `server`: Actix Web routes.

mod annotation;
mod encoding;
mod server;
mod stream;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use ml_core::{ClassNames, Detector};
use tracing::{info, warn};
use video_ingest::FrameSource;

use annotation::Annotator;
use encoding::JpegFrameEncoder;
use stream::{LiveContext, StreamOptions};

use crate::{config::LiveConfig, telemetry};

/// Open the camera, load the model, and serve until shutdown.
pub fn run(config: LiveConfig) -> Result<()> {
    if let Err(err) = telemetry::init_metrics_recorder() {
        warn!("metrics disabled: {err:#}");
    }

    let session_span = tracing::info_span!(
        "live.session",
        source = %config.camera_uri,
        width = config.width,
        height = config.height,
        model = %config.model_path.display(),
    );
    let _session_guard = session_span.enter();

    let source = open_source(&config)?;

    let detector = load_detector(&config)?;
    let class_names = match &config.class_names_path {
        Some(path) => ClassNames::load(path)?,
        None => ClassNames::coco(),
    };
    info!("{} class name(s) loaded", class_names.len());

    let options = StreamOptions {
        annotator: Annotator::new(config.thickness),
        encoder: JpegFrameEncoder::new(config.jpeg_quality),
        class_names,
        draw_labels: config.draw_labels,
        verbose: config.verbose,
    };
    info!(
        "jpeg quality {}, labels {}",
        options.encoder.quality(),
        if options.draw_labels { "on" } else { "off" }
    );

    let ctx = Arc::new(LiveContext::new(source, detector, options));
    server::serve(ctx, &config.bind_addr, config.port)
}

#[cfg(feature = "opencv")]
fn open_source(config: &LiveConfig) -> Result<Box<dyn FrameSource>> {
    let camera = video_ingest::Camera::open(&config.camera_uri, config.resolution())
        .with_context(|| format!("Error: could not open video source {}", config.camera_uri))?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "opencv"))]
fn open_source(config: &LiveConfig) -> Result<Box<dyn FrameSource>> {
    Err(video_ingest::CaptureError::Open {
        uri: config.camera_uri.clone(),
    })
    .context("yolo-live was built without camera support; rebuild with `--features opencv`")
}

#[cfg(feature = "with-tch")]
fn load_detector(config: &LiveConfig) -> Result<Box<dyn Detector>> {
    use ml_core::{
        TorchDetector, TorchDetectorOptions,
        tch::{Cuda, Device},
    };

    let device = if config.use_cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    };
    tracing::debug!(
        "CUDA available: {} (devices: {})",
        Cuda::is_available(),
        Cuda::device_count()
    );

    let detector = TorchDetector::new(
        &config.model_path,
        device,
        TorchDetectorOptions {
            input_size: config.detector.input_size,
            confidence_threshold: config.detector.confidence,
            iou_threshold: config.detector.iou,
        },
    )?;
    info!("detector loaded on {:?}", detector.device());
    Ok(Box::new(detector))
}

#[cfg(not(feature = "with-tch"))]
fn load_detector(config: &LiveConfig) -> Result<Box<dyn Detector>> {
    anyhow::bail!(
        "cannot load {}: yolo-live was built without the `with-tch` detector backend",
        config.model_path.display()
    )
}
