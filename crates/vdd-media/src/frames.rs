//! Frame sources and sinks.
//!
//! Video decoding and encoding are delegated to FFmpeg child processes that
//! exchange raw RGB24 frames over pipes:
//! - [`FfmpegDecoder`] reads frames from a file
//! - [`FfmpegEncoder`] writes frames to an H.264 MP4
//!
//! Both sides are expressed as [`FrameSource`] / [`FrameSink`] so the frame
//! loop can run against in-memory implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{collect_stderr, FfmpegCommand, PIPE_IN, PIPE_OUT};
use crate::error::{MediaError, MediaResult};

const RGB_CHANNELS: usize = 3;

/// A sequence of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;
}

/// A consumer of annotated frames.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and close the sink.
    async fn finish(&mut self) -> MediaResult<()>;
}

/// Splits a byte stream of packed RGB24 frames into images.
pub struct RawFrameReader<R> {
    reader: R,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> RawFrameReader<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        let frame_len = width as usize * height as usize * RGB_CHANNELS;
        Self {
            reader,
            width,
            height,
            buffer: vec![0u8; frame_len],
        }
    }

    pub fn frame_len(&self) -> usize {
        self.buffer.len()
    }

    /// Read one full frame. A clean EOF or a truncated trailing frame ends the
    /// sequence.
    pub async fn read_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            let n = self.reader.read(&mut self.buffer[filled..]).await?;
            if n == 0 {
                if filled > 0 {
                    warn!(
                        bytes = filled,
                        expected = self.buffer.len(),
                        "Discarding truncated trailing frame"
                    );
                }
                return Ok(None);
            }
            filled += n;
        }

        let image = RgbImage::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| MediaError::internal("Failed to create image buffer"))?;
        Ok(Some(image))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameSource for RawFrameReader<R> {
    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        self.read_frame().await
    }
}

/// Decodes a video file into RGB frames through FFmpeg.
pub struct FfmpegDecoder {
    child: Child,
    frames: RawFrameReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl FfmpegDecoder {
    /// Start decoding `path`, which must have the given frame geometry.
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let cmd = FfmpegCommand::new(path, PIPE_OUT).raw_rgb_output();
        Self::spawn(&cmd, width, height)
    }

    /// Start a decoder from a prepared command whose output is raw RGB24 on stdout.
    pub(crate) fn spawn(cmd: &FfmpegCommand, width: u32, height: u32) -> MediaResult<Self> {
        let mut child = cmd.spawn(false, true)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| {
                MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None)
            })?;
        let stderr = Some(collect_stderr(child.stderr.take()));

        Ok(Self {
            child,
            frames: RawFrameReader::new(stdout, width, height),
            stderr,
        })
    }

    /// Wait for the decoder to exit.
    ///
    /// Frames already delivered stay valid, so a non-zero exit is only logged.
    pub async fn close(mut self) -> MediaResult<()> {
        let _ = self.child.start_kill();
        let status = self.child.wait().await?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() && !stderr.is_empty() {
            warn!(code = ?status.code(), stderr = %stderr, "FFmpeg decoder exited with errors");
        } else {
            debug!("FFmpeg decoder closed");
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FfmpegDecoder {
    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        self.frames.read_frame().await
    }
}

/// Encodes RGB frames into a web-compatible MP4 (H.264, yuv420p, faststart).
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    output: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn create(
        output: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
    ) -> MediaResult<Self> {
        let output = output.as_ref().to_path_buf();

        // yuv420p requires even dimensions
        let cmd = FfmpegCommand::new(PIPE_IN, &output)
            .raw_rgb_input(width, height, fps)
            .output_arg("-an")
            .video_filter("scale=trunc(iw/2)*2:trunc(ih/2)*2")
            .video_codec("libx264")
            .preset("veryfast")
            .crf(23)
            .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"]);

        let mut child = cmd.spawn(true, false)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| {
                MediaError::ffmpeg_failed("Failed to capture FFmpeg stdin", None, None)
            })?;
        let stderr = Some(collect_stderr(child.stderr.take()));

        info!(
            output = %output.display(),
            width,
            height,
            fps,
            "FFmpeg encoder started"
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr,
            output,
            width,
            height,
            frames_written: 0,
        })
    }

    async fn stderr_tail(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl FrameSink for FfmpegEncoder {
    async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(MediaError::encoding_failed(format!(
                "Frame size {}x{} does not match encoder size {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::encoding_failed("Encoder already finished"))?;

        if let Err(e) = stdin.write_all(frame.as_raw()).await {
            let _ = self.child.start_kill();
            let stderr = self.stderr_tail().await;
            return Err(MediaError::encoding_failed(format!(
                "Failed to write frame to FFmpeg: {} {}",
                e, stderr
            )));
        }

        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().await?;
            // Closing stdin signals end of input
            drop(stdin);
        }

        let status = self.child.wait().await?;
        let stderr = self.stderr_tail().await;

        if !status.success() {
            return Err(MediaError::encoding_failed(format!(
                "FFmpeg encoder exited with {:?} for {}: {}",
                status.code(),
                self.output.display(),
                stderr
            )));
        }

        info!(
            output = %self.output.display(),
            frames = self.frames_written,
            "FFmpeg encoder finished"
        );
        Ok(())
    }
}

/// In-memory sink collecting frames.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<RgbImage>,
    pub finished: bool,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        Ok(())
    }
}
