//! Connection-bound frame producer for the MJPEG endpoint.
//!
//! [`LiveContext`] owns the capture rig (camera + detector) behind a single
//! mutex. Every `/video` connection gets its own [`MjpegFrames`] iterator that
//! pulls one frame per call: read → infer → annotate → encode → multipart part.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use actix_web::web::Bytes;
use ml_core::{ClassNames, Detector};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use video_ingest::FrameSource;

use super::{
    annotation::{Annotator, format_label},
    encoding::JpegFrameEncoder,
};

/// Multipart boundary token advertised on `/video`.
pub const BOUNDARY: &str = "frame";
/// Content type of the `/video` response.
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("detector failed: {0:#}")]
    Detector(anyhow::Error),
    #[error("capture rig lock poisoned by an earlier panic")]
    RigPoisoned,
    #[error("frame worker unavailable: {0}")]
    Blocking(String),
}

impl actix_web::ResponseError for StreamError {}

/// Camera and detector, used together under one lock.
struct FrameRig {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
}

/// Rendering choices applied to every streamed frame.
#[derive(Clone, Debug, Default)]
pub struct StreamOptions {
    pub annotator: Annotator,
    pub encoder: JpegFrameEncoder,
    pub class_names: ClassNames,
    pub draw_labels: bool,
    pub verbose: bool,
}

/// Shared state behind every HTTP handler.
pub struct LiveContext {
    rig: Mutex<FrameRig>,
    options: StreamOptions,
    active_streams: AtomicUsize,
}

impl LiveContext {
    pub fn new(
        source: impl FrameSource + 'static,
        detector: impl Detector + 'static,
        options: StreamOptions,
    ) -> Self {
        Self {
            rig: Mutex::new(FrameRig {
                source: Box::new(source),
                detector: Box::new(detector),
            }),
            options,
            active_streams: AtomicUsize::new(0),
        }
    }

    /// Number of `/video` connections currently streaming.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    /// Resolution reported by the capture device.
    pub fn resolution(&self) -> Option<(i32, i32)> {
        self.rig.lock().ok().map(|rig| rig.source.resolution())
    }
}

/// Tracks the Idle/Streaming transition for the lifetime of one connection.
struct StreamSession {
    ctx: Arc<LiveContext>,
}

impl StreamSession {
    fn open(ctx: Arc<LiveContext>) -> Self {
        let previous = ctx.active_streams.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            info!("first client connected, streaming");
        } else {
            debug!("client connected ({} active)", previous + 1);
        }
        metrics::gauge!("live_active_streams").set((previous + 1) as f64);
        Self { ctx }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let remaining = self.ctx.active_streams.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("live_active_streams").set(remaining as f64);
        if remaining == 0 {
            info!("last client disconnected, idle");
        } else {
            debug!("client disconnected ({remaining} active)");
        }
    }
}

enum Pull {
    Part(Bytes),
    Skip,
    End,
    Fail(StreamError),
}

/// Pull-based iterator of multipart MJPEG parts bound to one connection.
///
/// Ends (`None`) when the camera stops delivering frames. A detector failure
/// is yielded once as `Some(Err(..))` and the iterator is fused afterwards.
/// Frames that fail to annotate or encode are skipped.
pub struct MjpegFrames {
    session: StreamSession,
    frame_number: u64,
    finished: bool,
}

impl MjpegFrames {
    pub fn new(ctx: Arc<LiveContext>) -> Self {
        Self {
            session: StreamSession::open(ctx),
            frame_number: 0,
            finished: false,
        }
    }

    fn pull(&mut self) -> Pull {
        let ctx = &self.session.ctx;
        let options = &ctx.options;
        let frame_span = tracing::debug_span!("live.frame", frame = self.frame_number);
        let _frame_guard = frame_span.enter();

        let (frame, detections) = {
            let mut rig = match ctx.rig.lock() {
                Ok(rig) => rig,
                Err(_) => return Pull::Fail(StreamError::RigPoisoned),
            };

            let capture_start = Instant::now();
            let frame = match rig.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("camera reported end of stream");
                    return Pull::End;
                }
                Err(err) => {
                    warn!("frame read failed, ending stream: {err}");
                    return Pull::End;
                }
            };
            record_stage("capture", capture_start);

            let infer_start = Instant::now();
            let detections = match rig.detector.infer(&frame) {
                Ok(detections) => detections,
                Err(err) => {
                    error!("detector failed: {err:#}");
                    metrics::counter!("live_stream_errors_total").increment(1);
                    return Pull::Fail(StreamError::Detector(err));
                }
            };
            record_stage("inference", infer_start);
            (frame, detections)
        };

        if options.verbose {
            debug!("{} detection(s)", detections.len());
            for (idx, det) in detections.iter().enumerate() {
                debug!(
                    "  #{idx}: class={} conf={:.3} bbox={:?}",
                    det.class_id, det.score, det.bbox
                );
            }
        }

        let annotate_start = Instant::now();
        let labels: Option<Vec<String>> = options.draw_labels.then(|| {
            detections
                .iter()
                .map(|det| format_label(&options.class_names, det))
                .collect()
        });
        let image = match options
            .annotator
            .annotate(&frame, &detections, labels.as_deref())
        {
            Ok(image) => image,
            Err(err) => {
                warn!("skipping frame: {err}");
                metrics::counter!("live_frames_skipped_total", "reason" => "annotate").increment(1);
                return Pull::Skip;
            }
        };
        record_stage("annotation", annotate_start);

        let encode_start = Instant::now();
        let jpeg = match options.encoder.encode(&image) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                warn!("skipping frame: {err}");
                metrics::counter!("live_frames_skipped_total", "reason" => "encode").increment(1);
                return Pull::Skip;
            }
        };
        record_stage("encoding", encode_start);

        metrics::counter!("live_frames_streamed_total").increment(1);
        Pull::Part(multipart_part(&jpeg))
    }
}

impl Iterator for MjpegFrames {
    type Item = Result<Bytes, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let pulled = self.pull();
            self.frame_number += 1;
            match pulled {
                Pull::Part(part) => return Some(Ok(part)),
                Pull::Skip => continue,
                Pull::End => self.finished = true,
                Pull::Fail(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

/// Wrap one JPEG in the multipart boundary and part header.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 64);
    payload.extend_from_slice(b"--");
    payload.extend_from_slice(BOUNDARY.as_bytes());
    payload.extend_from_slice(b"\r\n");
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

fn record_stage(stage: &'static str, started: Instant) {
    metrics::histogram!("live_stage_latency_seconds", "stage" => stage)
        .record(started.elapsed().as_secs_f64());
}
