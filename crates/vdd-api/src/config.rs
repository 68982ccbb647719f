//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use vdd_media::{CameraConfig, LiveStreamOptions, ObjectDetectorConfig};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Max request body size
    pub max_body_size: usize,
    /// Where video uploads are saved
    pub upload_dir: PathBuf,
    /// Where annotated videos are written and served from
    pub processed_dir: PathBuf,
    /// Processed videos kept on disk; older ones are pruned after each job.
    /// 0 keeps everything.
    pub processed_keep_last: usize,
    /// Frontend build served for non-API paths
    pub static_dir: PathBuf,
    /// Detection model settings
    pub detector: ObjectDetectorConfig,
    /// Font used for box labels and placeholder captions
    pub label_font_path: Option<PathBuf>,
    /// Live stream capture device
    pub camera: CameraConfig,
    /// Live stream pacing and encoding
    pub stream: LiveStreamOptions,
    /// Abort a video job once this fraction of frames fails; unset means never
    pub frame_failure_abort_ratio: Option<f64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_body_size: 16 * 1024 * 1024, // 16MB
            upload_dir: PathBuf::from("data/uploads"),
            processed_dir: PathBuf::from("data/processed"),
            processed_keep_last: 20,
            static_dir: PathBuf::from("static"),
            detector: ObjectDetectorConfig::default(),
            label_font_path: None,
            camera: CameraConfig::default(),
            stream: LiveStreamOptions::default(),
            frame_failure_abort_ratio: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let detector = ObjectDetectorConfig {
            model_path: env_path("MODEL_PATH").unwrap_or(defaults.detector.model_path),
            labels_path: env_path("MODEL_LABELS"),
            confidence_threshold: env_parse("CONFIDENCE_THRESHOLD")
                .unwrap_or(defaults.detector.confidence_threshold),
            nms_threshold: env_parse("NMS_THRESHOLD").unwrap_or(defaults.detector.nms_threshold),
            input_size: env_parse("MODEL_INPUT_SIZE").unwrap_or(defaults.detector.input_size),
        };

        let camera = CameraConfig {
            device: env_path("CAMERA_DEVICE").unwrap_or(defaults.camera.device),
            width: env_parse("CAMERA_WIDTH").unwrap_or(defaults.camera.width),
            height: env_parse("CAMERA_HEIGHT").unwrap_or(defaults.camera.height),
            fps: env_parse("CAMERA_FPS").unwrap_or(defaults.camera.fps),
        };

        let stream = LiveStreamOptions {
            frame_delay: env_parse("STREAM_FRAME_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.stream.frame_delay),
            jpeg_quality: env_parse("STREAM_JPEG_QUALITY").unwrap_or(defaults.stream.jpeg_quality),
        };

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            upload_dir: env_path("UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            processed_dir: env_path("PROCESSED_DIR").unwrap_or(defaults.processed_dir),
            processed_keep_last: env_parse("PROCESSED_KEEP_LAST")
                .unwrap_or(defaults.processed_keep_last),
            static_dir: env_path("STATIC_DIR").unwrap_or(defaults.static_dir),
            detector,
            label_font_path: env_path("LABEL_FONT_PATH"),
            camera,
            stream,
            frame_failure_abort_ratio: env_parse::<f64>("FRAME_FAILURE_ABORT_RATIO")
                .filter(|r| (0.0..=1.0).contains(r)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_body_size, 16 * 1024 * 1024);
        assert_eq!(config.processed_dir, PathBuf::from("data/processed"));
        assert_eq!(config.stream.frame_delay, Duration::from_millis(50));
        assert!(config.frame_failure_abort_ratio.is_none());
        assert_eq!(config.processed_keep_last, 20);
    }
}
