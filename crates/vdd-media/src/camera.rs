//! Live camera capture through FFmpeg's V4L2 input.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbImage;
use tracing::info;

use crate::command::{FfmpegCommand, PIPE_OUT};
use crate::error::{MediaError, MediaResult};
use crate::frames::{FfmpegDecoder, FrameSource};

/// Capture device settings.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub device: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video0"),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// An open capture device producing RGB frames of the configured size.
///
/// The FFmpeg process is killed when the camera is dropped.
pub struct Camera {
    decoder: FfmpegDecoder,
    config: CameraConfig,
}

impl Camera {
    pub fn open(config: &CameraConfig) -> MediaResult<Self> {
        if !config.device.exists() {
            return Err(MediaError::CameraUnavailable(format!(
                "device {} not found",
                config.device.display()
            )));
        }

        let cmd = capture_command(config);
        let decoder = FfmpegDecoder::spawn(&cmd, config.width, config.height)
            .map_err(|e| MediaError::CameraUnavailable(e.to_string()))?;

        info!(
            device = %config.device.display(),
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Camera opened"
        );

        Ok(Self {
            decoder,
            config: config.clone(),
        })
    }

    pub fn device(&self) -> &Path {
        &self.config.device
    }
}

#[async_trait]
impl FrameSource for Camera {
    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        self.decoder.next_frame().await
    }
}

fn capture_command(config: &CameraConfig) -> FfmpegCommand {
    FfmpegCommand::new(&config.device, PIPE_OUT)
        .input_args(["-f".to_string(), "v4l2".to_string()])
        .input_args(["-framerate".to_string(), config.fps.to_string()])
        .video_filter(format!("scale={}:{}", config.width, config.height))
        .raw_rgb_output()
}
