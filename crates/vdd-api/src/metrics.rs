//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vdd_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vdd_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vdd_http_requests_in_flight";

    // Prediction metrics
    pub const PREDICTIONS_TOTAL: &str = "vdd_predictions_total";
    pub const DETECTIONS_TOTAL: &str = "vdd_detections_total";

    // Live stream metrics
    pub const STREAMS_ACTIVE: &str = "vdd_streams_active";
    pub const STREAMS_STARTED_TOTAL: &str = "vdd_streams_started_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished prediction request.
pub fn record_prediction(kind: &str, outcome: &str) {
    let labels = [("kind", kind.to_string()), ("outcome", outcome.to_string())];
    counter!(names::PREDICTIONS_TOTAL, &labels).increment(1);
}

/// Record detections returned for an image.
pub fn record_detections(count: usize) {
    counter!(names::DETECTIONS_TOTAL).increment(count as u64);
}

pub fn record_stream_started() {
    counter!(names::STREAMS_STARTED_TOTAL).increment(1);
}

pub fn set_active_streams(count: usize) {
    gauge!(names::STREAMS_ACTIVE).set(count as f64);
}

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid regex")
});
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/[0-9]+(/|$)").expect("valid regex")
});
static PROCESSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/data/processed/.+").expect("valid regex")
});

/// Sanitize path for metrics labels (remove IDs, file names).
fn sanitize_path(path: &str) -> String {
    let path = UUID_RE.replace_all(path, ":id");
    // applied twice so adjacent numeric segments both match
    let path = NUMERIC_RE.replace_all(&path, "/:n$1");
    let path = NUMERIC_RE.replace_all(&path, "/:n$1");
    let path = PROCESSED_RE.replace_all(&path, "/data/processed/:file");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/api/placeholder/640/360"), "/api/placeholder/:n/:n");
        assert_eq!(
            sanitize_path("/data/processed/550e8400-e29b-41d4-a716-446655440000.mp4"),
            "/data/processed/:file"
        );
        assert_eq!(sanitize_path("/predict"), "/predict");
    }
}
