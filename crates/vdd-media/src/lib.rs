#![deny(unreachable_patterns)]
//! Detection and media plumbing for vehicle damage detection.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and ffprobe metadata
//! - Raw RGB frame decoding/encoding and V4L2 camera capture over FFmpeg pipes
//! - The `DetectionProvider` seam and an ONNX Runtime YOLO detector
//! - Box/label rendering, the image and video annotation pipelines
//! - The live MJPEG stream and placeholder previews

pub mod annotate;
pub mod camera;
pub mod command;
pub mod detection;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod live;
pub mod pipeline;
pub mod placeholder;
pub mod probe;
pub mod video_job;

pub use annotate::{encode_jpeg, encode_png, load_font, Annotator};
pub use camera::{Camera, CameraConfig};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use detection::{DetectionProvider, ObjectDetector, ObjectDetectorConfig, SharedDetector};
pub use error::{MediaError, MediaResult};
pub use frames::{FfmpegDecoder, FfmpegEncoder, FrameSink, FrameSource, MemorySink};
pub use live::{mjpeg_stream, LiveStreamOptions, MJPEG_CONTENT_TYPE};
pub use pipeline::{AnnotatedFrame, FramePipeline, ImageAnalysis};
pub use placeholder::{render_placeholder, MAX_PLACEHOLDER_DIMENSION};
pub use probe::{probe_video, VideoInfo};
pub use video_job::{annotate_frames, FrameFailurePolicy, VideoJob, VideoJobOutcome};
