//! HTTP surface: viewer page, MJPEG live feed, and the alert WebSocket.
//!
//! Every connected viewer gets its own send loop over the shared frame cell,
//! so a slow client only ever throttles itself. Alert listeners each drain a
//! private fan-out queue into their socket; the wait is cancellable, so a
//! disconnect tears the subscription down immediately.

use crate::config::StreamConfig;
use crate::fanout::AlertFanout;
use crate::frame_cell::FrameCell;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Multipart boundary marker for the MJPEG stream.
const STREAM_BOUNDARY: &str = "frame";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub frames: Arc<FrameCell>,
    pub alerts: Arc<AlertFanout>,
    /// Minimum interval between frames sent to one viewer.
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
}

/// Create the HTTP router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/ws", get(alert_ws))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the HTTP surface until the shutdown future resolves.
pub async fn serve(
    state: AppState,
    config: &StreamConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting stream server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind stream server address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Stream server error")?;

    Ok(())
}

/// Viewer page: live stream plus the alert socket.
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fallwatch",
        "streaming": state.frames.has_frame(),
        "alert_listeners": state.alerts.subscriber_count(),
    }))
}

/// Continuously multiplexed MJPEG live stream, one part per frame.
async fn video_feed(State(state): State<AppState>) -> impl IntoResponse {
    let stream = async_stream::stream! {
        let mut ticker = tokio::time::interval(state.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // The tick enforces the per-viewer rate cap and doubles as the
            // retry delay while no frame has been published yet.
            ticker.tick().await;

            let frame = match state.frames.latest() {
                Some(frame) => frame,
                None => continue,
            };

            match frame.encode_jpeg(state.jpeg_quality) {
                Ok(jpeg) => yield Ok::<Bytes, Infallible>(mjpeg_part(&jpeg)),
                Err(e) => {
                    // Drop this frame; the viewer keeps the previous one.
                    debug!(error = %e, "Frame encode failed, skipping");
                }
            }
        }
    };

    (
        [
            (
                header::CONTENT_TYPE,
                "multipart/x-mixed-replace; boundary=frame",
            ),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
}

/// Frame one JPEG as a multipart stream part.
fn mjpeg_part(jpeg: &Bytes) -> Bytes {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(format!("--{STREAM_BOUNDARY}\r\n").as_bytes());
    part.extend_from_slice(b"Content-Type: image/jpeg\r\n");
    part.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Upgrade to the alert WebSocket.
async fn alert_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| alert_session(socket, state.alerts.clone()))
}

/// One alert listener's session: drain the private fan-out queue into the
/// socket until either side goes away.
async fn alert_session(socket: WebSocket, fanout: Arc<AlertFanout>) {
    let mut subscription = fanout.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            alert = subscription.recv() => {
                match alert {
                    Some(message) => {
                        if sender.send(Message::Text(message)).await.is_err() {
                            break;
                        }
                    }
                    // Registry torn down; nothing more to deliver.
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    // No client-to-server messages are defined; drain and
                    // ignore anything that is not a close.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("Alert listener disconnected");
    // Dropping the subscription deregisters its queue.
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>fallwatch</title>
  <style>
    body { background: #111; color: #eee; font-family: sans-serif; text-align: center; }
    img { margin-top: 1em; border: 2px solid #333; }
    #alert { color: #f33; font-size: 1.5em; min-height: 1.5em; }
  </style>
</head>
<body>
  <h1>fallwatch</h1>
  <div id="alert"></div>
  <img src="/video_feed" alt="live feed">
  <script>
    const ws = new WebSocket(`ws://${location.host}/ws`);
    ws.onmessage = (event) => {
      if (event.data === "FALLDETECTED") {
        document.getElementById("alert").textContent = "FALL DETECTED";
      }
    };
  </script>
</body>
</html>
"#;
