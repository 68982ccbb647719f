//! Live camera stream handlers.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;
use vdd_media::{mjpeg_stream, Camera, MJPEG_CONTENT_TYPE};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Response header carrying the id to pass to `/stop`.
pub const STREAM_ID_HEADER: &str = "X-Stream-Id";

/// Stream annotated camera frames as multipart JPEG.
///
/// GET /video_feed
pub async fn video_feed(State(state): State<AppState>) -> ApiResult<Response> {
    let pipeline = state.pipeline()?;
    let camera = Camera::open(&state.config.camera)?;

    let (ticket, cancel) = state.streams.register();
    let stream_id = ticket.id().to_string();
    metrics::record_stream_started();
    info!(stream_id = %stream_id, device = %camera.device().display(), "Live stream started");

    // The ticket lives as long as the body, so the stream deregisters on disconnect
    let parts = mjpeg_stream(camera, pipeline, state.config.stream, cancel).map(move |part| {
        let _ = &ticket;
        part
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store")
        .header(STREAM_ID_HEADER, stream_id)
        .body(Body::from_stream(parts))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct StopParams {
    pub stream_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: String,
    pub message: String,
    pub streams_stopped: usize,
}

/// Stop one live stream, or all of them when no id is given.
///
/// POST /stop
pub async fn stop_stream(
    State(state): State<AppState>,
    Query(params): Query<StopParams>,
) -> Json<StopResponse> {
    let streams_stopped = match params.stream_id.as_deref() {
        Some(id) => usize::from(state.streams.stop(id)),
        None => state.streams.stop_all(),
    };
    info!(stream_id = ?params.stream_id, streams_stopped, "Live stream stop requested");

    Json(StopResponse {
        status: "stopped".to_string(),
        message: "Video stream stopped".to_string(),
        streams_stopped,
    })
}
