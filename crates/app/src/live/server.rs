//! Actix Web server exposing the landing page, the MJPEG stream, and metrics.

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, http::header, web};
use anyhow::{Context, Result};
use async_stream::stream;
use tracing::info;

use super::stream::{LiveContext, MJPEG_CONTENT_TYPE, MjpegFrames, StreamError};
use crate::{html::INDEX_HTML, telemetry};

/// Register every route on an app or test service.
pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/video", web::get().to(video_route))
        .route("/metrics", web::get().to(metrics_route));
}

/// Serve until the server is stopped (Ctrl+C / SIGTERM).
///
/// The context, and with it the camera handle, is dropped once this returns.
pub(crate) fn serve(ctx: Arc<LiveContext>, bind_addr: &str, port: u16) -> Result<()> {
    if let Some((width, height)) = ctx.resolution() {
        info!("capture resolution {width}x{height}");
    }
    let bind_addr = bind_addr.to_string();
    actix_web::rt::System::new().block_on(async move {
        let data = web::Data::from(ctx);
        let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
            .bind((bind_addr.as_str(), port))
            .with_context(|| format!("failed to bind {bind_addr}:{port}"))?;
        info!("serving on http://{bind_addr}:{port}/");
        server.run().await.context("HTTP server error")
    })
}

/// Serve the landing page embedding the stream.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

/// Stream annotated frames as `multipart/x-mixed-replace`.
///
/// Each part is produced on the blocking pool so camera reads and inference
/// stay off the async workers. Dropping the body (client gone) drops the
/// iterator and ends the session.
async fn video_route(ctx: web::Data<LiveContext>) -> HttpResponse {
    let mut frames = MjpegFrames::new(ctx.into_inner());
    let body = stream! {
        loop {
            let pulled = web::block(move || {
                let item = frames.next();
                (frames, item)
            })
            .await;
            match pulled {
                Ok((rest, Some(item))) => {
                    frames = rest;
                    yield item;
                }
                Ok((_, None)) => break,
                Err(err) => {
                    yield Err(StreamError::Blocking(err.to_string()));
                    break;
                }
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .content_type(MJPEG_CONTENT_TYPE)
        .streaming(body)
}

/// Prometheus text exposition of the process metrics.
async fn metrics_route() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}
