//! Upload and path input validation.

use crate::error::{ApiError, ApiResult};

/// Extensions accepted by the image endpoint.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Extensions accepted by the video endpoint.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4"];

/// Lowercased extension after the last dot, if any.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn has_extension(file_name: &str, allowed: &[&str]) -> bool {
    file_extension(file_name).is_some_and(|ext| allowed.contains(&ext.as_str()))
}

/// Check an upload name for the image endpoint.
pub fn validate_image_filename(file_name: &str) -> ApiResult<()> {
    if has_extension(file_name, VIDEO_EXTENSIONS) {
        return Err(ApiError::validation(
            "Video files not supported in this endpoint. Use /predict_img instead.",
        ));
    }
    if !has_extension(file_name, IMAGE_EXTENSIONS) {
        return Err(ApiError::validation(
            "Invalid file format. Please upload JPG, JPEG, or PNG files.",
        ));
    }
    Ok(())
}

/// Check an upload name for the video endpoint.
pub fn validate_video_filename(file_name: &str) -> ApiResult<()> {
    if !has_extension(file_name, VIDEO_EXTENSIONS) {
        return Err(ApiError::validation(
            "Only MP4 files are supported for video processing",
        ));
    }
    Ok(())
}

/// Check a requested artifact name. Rejects anything that could leave the
/// processed directory, before any filesystem access.
pub fn validate_processed_filename(file_name: &str) -> ApiResult<()> {
    if file_name.is_empty()
        || file_name.contains("..")
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains('\0')
    {
        return Err(ApiError::bad_request("Invalid filename"));
    }
    Ok(())
}

/// Content type for a served artifact.
pub fn content_type_for(file_name: &str) -> &'static str {
    match file_extension(file_name).as_deref() {
        Some("mp4") => "video/mp4",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}
