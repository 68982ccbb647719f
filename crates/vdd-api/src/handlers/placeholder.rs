//! Placeholder preview images.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;
use vdd_media::render_placeholder;

use crate::state::AppState;

/// Grey preview image with a size caption. 204 when it cannot be rendered.
///
/// GET /api/placeholder/:width/:height
pub async fn placeholder_image(
    State(state): State<AppState>,
    Path((width, height)): Path<(u32, u32)>,
) -> Response {
    let annotator = state.annotator.clone();
    let rendered =
        tokio::task::spawn_blocking(move || render_placeholder(width, height, annotator.font()))
            .await;

    match rendered {
        Ok(Ok(png)) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(Err(e)) => {
            debug!(width, height, error = %e, "Placeholder not rendered");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            debug!(width, height, error = %e, "Placeholder task failed");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}
