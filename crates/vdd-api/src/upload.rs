//! Multipart upload extraction.

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::http::StatusCode;
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// Name of the multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// One uploaded file: declared name and raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Pull the `file` field out of a multipart request.
    ///
    /// A body that is not multipart, or has no `file` part, yields
    /// "No file provided"; a `file` part with an empty name yields
    /// "No file selected".
    pub async fn from_multipart(
        multipart: Result<Multipart, MultipartRejection>,
    ) -> ApiResult<Self> {
        let mut multipart = multipart.map_err(|rejection| {
            debug!(error = %rejection, "Request is not multipart");
            ApiError::bad_request("No file provided")
        })?;

        while let Some(field) = multipart.next_field().await.map_err(read_error)? {
            if field.name() != Some(FILE_FIELD) {
                continue;
            }

            let file_name = match field.file_name() {
                Some(name) => name.to_string(),
                None => return Err(ApiError::bad_request("No file provided")),
            };
            if file_name.is_empty() {
                return Err(ApiError::bad_request("No file selected"));
            }

            let bytes = field.bytes().await.map_err(read_error)?.to_vec();
            debug!(file_name = %file_name, size = bytes.len(), "Upload received");
            return Ok(Self { file_name, bytes });
        }

        Err(ApiError::bad_request("No file provided"))
    }
}

fn read_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File too large. Maximum upload size is 16MB.".to_string())
    } else {
        ApiError::bad_request(format!("Malformed upload: {}", err.body_text()))
    }
}
