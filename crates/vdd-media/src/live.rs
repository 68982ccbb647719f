//! Live MJPEG stream over a frame source.

use std::time::Duration;

use futures_util::stream::{self, Stream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::annotate::encode_jpeg;
use crate::error::{MediaError, MediaResult};
use crate::frames::FrameSource;
use crate::pipeline::FramePipeline;

/// Multipart boundary used between JPEG parts.
pub const MJPEG_BOUNDARY: &str = "frame";

/// Content type of the streamed response.
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Debug, Clone, Copy)]
pub struct LiveStreamOptions {
    /// Pause between emitted frames
    pub frame_delay: Duration,
    pub jpeg_quality: u8,
}

impl Default for LiveStreamOptions {
    fn default() -> Self {
        Self {
            frame_delay: Duration::from_millis(50),
            jpeg_quality: 80,
        }
    }
}

/// Wrap one JPEG as a multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", MJPEG_BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

struct StreamState<S> {
    source: S,
    pipeline: FramePipeline,
    options: LiveStreamOptions,
    cancel: watch::Receiver<bool>,
    captured: u64,
    emitted: u64,
}

impl<S> StreamState<S> {
    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Sleep for the frame delay. Returns false if cancelled meanwhile.
    async fn pace(&mut self) -> bool {
        let sender_alive = tokio::select! {
            _ = tokio::time::sleep(self.options.frame_delay) => true,
            changed = self.cancel.changed() => changed.is_ok(),
        };
        sender_alive && !self.is_cancelled()
    }
}

/// Lazily capture, annotate and JPEG-encode frames as multipart parts.
///
/// The stream ends when the source is exhausted or fails, or when `cancel`
/// becomes `true` or its sender is dropped. Frames whose inference fails are
/// skipped. The source is dropped with the stream.
pub fn mjpeg_stream<S>(
    source: S,
    pipeline: FramePipeline,
    options: LiveStreamOptions,
    cancel: watch::Receiver<bool>,
) -> impl Stream<Item = MediaResult<Vec<u8>>> + Send + 'static
where
    S: FrameSource + 'static,
{
    let state = StreamState {
        source,
        pipeline,
        options,
        cancel,
        captured: 0,
        emitted: 0,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.is_cancelled() {
                info!(frames = state.emitted, "Live stream cancelled");
                return None;
            }

            if state.captured > 0 && !state.pace().await {
                info!(frames = state.emitted, "Live stream cancelled");
                return None;
            }

            let frame = match state.source.next_frame().await {
                Ok(Some(frame)) => {
                    state.captured += 1;
                    frame
                }
                Ok(None) => {
                    info!(frames = state.emitted, "Live source ended");
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "Live capture failed, ending stream");
                    return None;
                }
            };

            match encode_annotated(&state.pipeline, frame, state.options.jpeg_quality).await {
                Ok(jpeg) => {
                    state.emitted += 1;
                    debug!(frame = state.emitted, bytes = jpeg.len(), "Live frame emitted");
                    return Some((Ok(multipart_part(&jpeg)), state));
                }
                Err(e) => warn!(error = %e, "Live frame failed, skipping"),
            }
        }
    })
}

async fn encode_annotated(
    pipeline: &FramePipeline,
    frame: image::RgbImage,
    quality: u8,
) -> MediaResult<Vec<u8>> {
    let annotated = pipeline.process_frame(frame).await?;
    tokio::task::spawn_blocking(move || encode_jpeg(&annotated.image, quality))
        .await
        .map_err(|e| MediaError::internal(format!("JPEG task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::pipeline;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;

    struct VecSource(VecDeque<RgbImage>);

    #[async_trait]
    impl FrameSource for VecSource {
        async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
            Ok(self.0.pop_front())
        }
    }

    fn source(reds: &[u8]) -> VecSource {
        VecSource(
            reds.iter()
                .map(|r| RgbImage::from_pixel(8, 8, Rgb([*r, 0, 0])))
                .collect(),
        )
    }

    fn fast() -> LiveStreamOptions {
        LiveStreamOptions {
            frame_delay: Duration::from_millis(1),
            jpeg_quality: 80,
        }
    }

    #[test]
    fn test_multipart_part_layout() {
        let part = multipart_part(b"JPEG");
        assert_eq!(part, b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_stream_skips_failed_frames_and_ends_with_source() {
        let (_tx, rx) = watch::channel(false);
        let parts: Vec<_> = mjpeg_stream(source(&[0, 255, 0]), pipeline(vec![]), fast(), rx)
            .collect()
            .await;

        assert_eq!(parts.len(), 2);
        for part in parts {
            let part = part.unwrap();
            assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
            assert!(part.ends_with(b"\r\n"));
        }
    }

    #[tokio::test]
    async fn test_cancelled_stream_yields_nothing() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let parts: Vec<_> = mjpeg_stream(source(&[0, 0]), pipeline(vec![]), fast(), rx)
            .collect()
            .await;
        assert!(parts.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_frames() {
        let (tx, rx) = watch::channel(false);
        let mut stream = Box::pin(mjpeg_stream(
            source(&[0, 0, 0, 0]),
            pipeline(vec![]),
            fast(),
            rx,
        ));

        assert!(stream.next().await.is_some());
        tx.send(true).unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_sender_ends_stream() {
        let (tx, rx) = watch::channel(false);
        let mut stream = Box::pin(mjpeg_stream(
            source(&[0, 0, 0]),
            pipeline(vec![]),
            fast(),
            rx,
        ));

        assert!(stream.next().await.is_some());
        drop(tx);
        assert!(stream.next().await.is_none());
    }
}
