//! API routes.

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::error::ApiError;
use crate::handlers::{
    api_info, health, placeholder_image, predict_image, predict_video, predict_video_get,
    serve_processed, stop_stream, video_feed,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, preflight, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let predict_routes = Router::new()
        .route("/predict", post(predict_image))
        // Older frontends post images here
        .route("/image", post(predict_image))
        .route("/predict_img", post(predict_video).get(predict_video_get));

    let stream_routes = Router::new()
        .route("/video_feed", get(video_feed))
        .route("/stop", post(stop_stream));

    // Wildcard so names with separators reach the handler and get rejected there
    let file_routes = Router::new().route("/data/processed/*filename", get(serve_processed));

    let api_routes = Router::new()
        .route("/info", get(api_info))
        .route("/placeholder/:width/:height", get(placeholder_image))
        .fallback(api_not_found);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let max_body_size = state.config.max_body_size;

    Router::new()
        .nest("/api", api_routes)
        .merge(predict_routes)
        .merge(stream_routes)
        .merge(file_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .fallback(frontend)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer())
        .layer(middleware::from_fn(preflight))
        .with_state(state)
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("API endpoint not found")
}

/// Serve the single-page frontend: static assets, else `index.html` so
/// client-side routes resolve.
async fn frontend(State(state): State<AppState>, request: Request) -> Response {
    if request.uri().path().starts_with("/api/") {
        return api_not_found().await.into_response();
    }

    let static_dir = &state.config.static_dir;
    let service =
        ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    match service.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
