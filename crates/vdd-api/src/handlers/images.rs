//! Still-image prediction.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use tracing::info;
use vdd_models::{max_confidence, Detection};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::validate_image_filename;
use crate::state::AppState;
use crate::upload::UploadedFile;

/// Response for an analyzed image.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    /// Annotated image, base64 PNG
    pub image: String,
    pub predictions: Vec<Detection>,
    /// Inference time in seconds
    #[serde(rename = "processingTime")]
    pub processing_time: f64,
    /// Highest prediction confidence, 0.0 when nothing was found
    pub confidence: f32,
}

/// Detect damage in an uploaded image.
///
/// POST /predict (alias /image)
pub async fn predict_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<PredictResponse>> {
    let upload = UploadedFile::from_multipart(multipart).await?;
    validate_image_filename(&upload.file_name)?;

    let pipeline = state.pipeline()?;

    let analysis = pipeline.process_image_bytes(upload.bytes).await.map_err(|e| {
        metrics::record_prediction("image", "failure");
        ApiError::Processing(format!("Failed to process image: {}", e))
    })?;

    let confidence = max_confidence(&analysis.detections);
    info!(
        file_name = %upload.file_name,
        detections = analysis.detections.len(),
        confidence,
        inference_ms = analysis.inference_time.as_millis() as u64,
        "Image analyzed"
    );
    metrics::record_prediction("image", "success");
    metrics::record_detections(analysis.detections.len());

    Ok(Json(PredictResponse {
        image: BASE64.encode(&analysis.png),
        processing_time: analysis.inference_time.as_secs_f64(),
        confidence,
        predictions: analysis.detections,
    }))
}
