//! Video prediction.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};
use vdd_media::fs_utils::{prune_oldest, save_upload};
use vdd_media::{MediaError, VideoJob};
use vdd_models::{JobId, JobStage};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::validate_video_filename;
use crate::state::AppState;
use crate::upload::UploadedFile;

/// URL prefix the processed directory is served under.
pub const PROCESSED_URL_PREFIX: &str = "/data/processed";

/// Response for a processed video.
#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub success: bool,
    pub message: String,
    pub output_path: String,
    pub video_url: String,
    pub job_id: JobId,
}

fn processing_error(err: MediaError) -> ApiError {
    match err {
        MediaError::OutputMissing(_) => {
            ApiError::Encoding("Failed to create output video file".to_string())
        }
        other => ApiError::Processing(format!("Failed to process video: {}", other)),
    }
}

/// Annotate every frame of an uploaded MP4.
///
/// POST /predict_img
pub async fn predict_video(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<VideoResponse>> {
    let upload = UploadedFile::from_multipart(multipart).await?;
    validate_video_filename(&upload.file_name)?;

    let pipeline = state.pipeline()?;

    let job_id = JobId::new();
    info!(
        job_id = %job_id,
        file_name = %upload.file_name,
        size = upload.bytes.len(),
        stage = %JobStage::Received,
        "Video job stage"
    );

    let result = async {
        let source =
            save_upload(&state.config.upload_dir, &upload.file_name, &upload.bytes).await?;
        info!(
            job_id = %job_id,
            path = %source.display(),
            stage = %JobStage::Saved,
            "Video job stage"
        );

        VideoJob::new(job_id.clone(), source, &state.config.processed_dir)
            .run(&pipeline, state.failure_policy())
            .await
    }
    .await;

    let outcome = result.map_err(|e| {
        metrics::record_prediction("video", "failure");
        processing_error(e)
    })?;
    metrics::record_prediction("video", "success");

    let keep = state.config.processed_keep_last;
    if keep > 0 {
        match prune_oldest(&state.config.processed_dir, "mp4", keep).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, keep, "Pruned old processed videos"),
            Err(e) => warn!(error = %e, "Failed to prune processed videos"),
        }
    }

    let url = format!("{}/{}", PROCESSED_URL_PREFIX, outcome.job_id.output_file_name());
    Ok(Json(VideoResponse {
        success: true,
        message: outcome.stats.summary(),
        output_path: url.clone(),
        video_url: url,
        job_id: outcome.job_id,
    }))
}

/// GET /predict_img
pub async fn predict_video_get() -> ApiError {
    ApiError::MethodNotAllowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_output_maps_to_fixed_message() {
        let err = processing_error(MediaError::OutputMissing(PathBuf::from("x.mp4")));
        assert_eq!(err.to_string(), "Failed to create output video file");

        let err = processing_error(MediaError::InvalidVideo("no video stream".into()));
        assert_eq!(
            err.to_string(),
            "Failed to process video: Invalid video file: no video stream"
        );
    }
}
