//! Frame-by-frame video annotation.
//!
//! A job decodes the uploaded MP4, runs every frame through the
//! [`FramePipeline`] and encodes the annotated frames into a per-job output
//! file. Frames whose inference fails are skipped and counted. A job that
//! fails or is dropped mid-run removes its partial output.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use vdd_models::{JobId, JobStage, VideoJobStats};

use crate::error::{MediaError, MediaResult};
use crate::frames::{FfmpegDecoder, FfmpegEncoder, FrameSink, FrameSource};
use crate::fs_utils::{ensure_dir, is_non_empty_file};
use crate::pipeline::FramePipeline;
use crate::probe::probe_video;

/// Frames that must be read before an abort ratio is applied.
pub const MIN_FRAMES_BEFORE_ABORT: u64 = 10;

/// What to do when per-frame inference fails.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FrameFailurePolicy {
    /// Skip failed frames and keep going, whatever the failure count.
    #[default]
    Continue,
    /// Abort once the failure ratio exceeds the given fraction.
    AbortAboveRatio(f64),
}

impl FrameFailurePolicy {
    /// Policy from an optional configured ratio.
    pub fn from_ratio(ratio: Option<f64>) -> Self {
        match ratio {
            Some(r) => Self::AbortAboveRatio(r),
            None => Self::Continue,
        }
    }

    fn should_abort(&self, stats: &VideoJobStats) -> bool {
        match self {
            Self::Continue => false,
            Self::AbortAboveRatio(max) => {
                stats.total_frames >= MIN_FRAMES_BEFORE_ABORT && stats.failure_ratio() > *max
            }
        }
    }
}

/// One video annotation job.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub job_id: JobId,
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Outcome of a finished job.
#[derive(Debug, Clone)]
pub struct VideoJobOutcome {
    pub job_id: JobId,
    pub output: PathBuf,
    pub stats: VideoJobStats,
}

impl VideoJob {
    /// Job reading `source` and writing `<processed_dir>/<job_id>.mp4`.
    pub fn new(job_id: JobId, source: impl Into<PathBuf>, processed_dir: impl AsRef<Path>) -> Self {
        let output = processed_dir.as_ref().join(job_id.output_file_name());
        Self {
            job_id,
            source: source.into(),
            output,
        }
    }

    fn stage(&self, stage: JobStage) {
        info!(job_id = %self.job_id, stage = %stage, "Video job stage");
    }

    /// Decode, annotate and encode the whole video.
    pub async fn run(
        &self,
        pipeline: &FramePipeline,
        policy: FrameFailurePolicy,
    ) -> MediaResult<VideoJobOutcome> {
        let mut output_guard = PartialOutput::new(&self.output);
        let result = self.run_stages(pipeline, policy).await;
        if result.is_ok() {
            output_guard.keep();
        }

        let status = match &result {
            Ok(_) => {
                self.stage(JobStage::Done);
                "success"
            }
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Video job failed");
                self.stage(JobStage::Failed);
                "failure"
            }
        };
        metrics::counter!("vdd_video_jobs_total", "status" => status).increment(1);

        result
    }

    async fn run_stages(
        &self,
        pipeline: &FramePipeline,
        policy: FrameFailurePolicy,
    ) -> MediaResult<VideoJobOutcome> {
        let info = probe_video(&self.source).await?;
        let fps = info.effective_fps();
        info!(
            job_id = %self.job_id,
            width = info.width,
            height = info.height,
            rotation = info.rotation,
            fps,
            "Video probed"
        );

        if let Some(dir) = self.output.parent() {
            ensure_dir(dir).await?;
        }

        self.stage(JobStage::Decoding);
        let mut decoder = FfmpegDecoder::open(&self.source, info.width, info.height)?;
        let mut encoder = FfmpegEncoder::create(&self.output, info.width, info.height, fps)?;

        // Both processes are killed on drop if the loop bails out early
        let stats = annotate_frames(pipeline, &mut decoder, &mut encoder, policy).await?;
        decoder.close().await?;
        self.stage(JobStage::Encoded);

        if !is_non_empty_file(&self.output).await {
            return Err(MediaError::OutputMissing(self.output.clone()));
        }
        self.stage(JobStage::Verified);

        info!(
            job_id = %self.job_id,
            total = stats.total_frames,
            processed = stats.processed_frames,
            failed = stats.failed_frames,
            "Video frames annotated"
        );

        Ok(VideoJobOutcome {
            job_id: self.job_id.clone(),
            output: self.output.clone(),
            stats,
        })
    }
}

/// Removes a job's output file on drop unless the job completed.
///
/// Also covers the job future being dropped, e.g. when the client disconnects.
struct PartialOutput {
    path: PathBuf,
    keep: bool,
}

impl PartialOutput {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            keep: false,
        }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial video output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove partial output")
            }
        }
    }
}

/// Run every frame of `source` through the pipeline into `sink`.
///
/// Frames whose inference fails are skipped, never written and never retried.
/// The sink is finished once the source is exhausted.
pub async fn annotate_frames<S, K>(
    pipeline: &FramePipeline,
    source: &mut S,
    sink: &mut K,
    policy: FrameFailurePolicy,
) -> MediaResult<VideoJobStats>
where
    S: FrameSource + ?Sized,
    K: FrameSink + ?Sized,
{
    let mut stats = VideoJobStats::default();

    while let Some(frame) = source.next_frame().await? {
        match pipeline.process_frame(frame).await {
            Ok(annotated) => {
                sink.write_frame(&annotated.image).await?;
                stats.record_processed();
                metrics::counter!("vdd_video_frames_total", "outcome" => "processed").increment(1);
            }
            Err(e) => {
                stats.record_failed();
                metrics::counter!("vdd_video_frames_total", "outcome" => "failed").increment(1);
                warn!(
                    frame = stats.total_frames - 1,
                    error = %e,
                    "Frame inference failed, skipping"
                );

                if policy.should_abort(&stats) {
                    return Err(MediaError::TooManyFailedFrames {
                        failed: stats.failed_frames,
                        total: stats.total_frames,
                    });
                }
            }
        }
    }

    sink.finish().await?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::MemorySink;
    use crate::pipeline::test_support::pipeline;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use vdd_models::Detection;

    struct VecSource(VecDeque<RgbImage>);

    #[async_trait]
    impl FrameSource for VecSource {
        async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
            Ok(self.0.pop_front())
        }
    }

    /// `total` frames; those at `failing` indices are marked for the fake detector.
    fn frames(total: usize, failing: &[usize]) -> VecSource {
        VecSource(
            (0..total)
                .map(|i| {
                    let red = if failing.contains(&i) { 255 } else { 0 };
                    RgbImage::from_pixel(8, 8, Rgb([red, 0, 0]))
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_failed_frames_are_skipped() {
        let pipeline = pipeline(vec![Detection::new(0, "dent", 0.9, [1.0, 1.0, 6.0, 6.0])]);
        let mut source = frames(7, &[1, 4, 5]);
        let mut sink = MemorySink::default();

        let stats = annotate_frames(&pipeline, &mut source, &mut sink, FrameFailurePolicy::Continue)
            .await
            .unwrap();

        assert_eq!(stats.total_frames, 7);
        assert_eq!(stats.processed_frames, 4);
        assert_eq!(stats.failed_frames, 3);
        assert_eq!(sink.frames.len(), 4);
        assert!(sink.finished);
        assert_eq!(stats.summary(), "Video processed successfully. 4/7 frames analyzed.");
    }

    #[tokio::test]
    async fn test_all_frames_failing_still_finishes() {
        let pipeline = pipeline(vec![]);
        let mut source = frames(3, &[0, 1, 2]);
        let mut sink = MemorySink::default();

        let policy = FrameFailurePolicy::default();
        let stats = annotate_frames(&pipeline, &mut source, &mut sink, policy)
            .await
            .unwrap();

        assert_eq!(stats.processed_frames, 0);
        assert!(sink.frames.is_empty());
        assert!(sink.finished);
    }

    #[tokio::test]
    async fn test_abort_ratio_needs_minimum_frames() {
        let pipeline = pipeline(vec![]);
        let policy = FrameFailurePolicy::from_ratio(Some(0.5));

        // 5 of 5 failing: below the minimum, so the job completes
        let mut sink = MemorySink::default();
        let stats = annotate_frames(&pipeline, &mut frames(5, &[0, 1, 2, 3, 4]), &mut sink, policy)
            .await
            .unwrap();
        assert_eq!(stats.failed_frames, 5);

        // 10 of 12 failing: aborts at the tenth frame read
        let failing: Vec<usize> = (0..10).collect();
        let mut sink = MemorySink::default();
        let result = annotate_frames(&pipeline, &mut frames(12, &failing), &mut sink, policy).await;
        assert!(matches!(
            result,
            Err(MediaError::TooManyFailedFrames { failed: 10, total: 10 })
        ));
        assert!(!sink.finished);
    }

    #[tokio::test]
    async fn test_failed_job_removes_its_output() {
        let temp = tempfile::TempDir::new().unwrap();
        let job = VideoJob::new(
            JobId::from_string("broken"),
            temp.path().join("missing.mp4"),
            temp.path(),
        );
        // Left behind by an encoder that started before the job failed
        std::fs::write(&job.output, b"partial").unwrap();

        let result = job.run(&pipeline(vec![]), FrameFailurePolicy::Continue).await;

        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
        assert!(!job.output.exists());
    }

    #[test]
    fn test_partial_output_guard() {
        let temp = tempfile::TempDir::new().unwrap();
        let dropped = temp.path().join("dropped.mp4");
        let kept = temp.path().join("kept.mp4");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(PartialOutput::new(&dropped));
        let mut guard = PartialOutput::new(&kept);
        guard.keep();
        drop(guard);
        // Nothing to remove is not an error
        drop(PartialOutput::new(&temp.path().join("never-written.mp4")));

        assert!(!dropped.exists());
        assert!(kept.exists());
    }

    #[test]
    fn test_output_path_is_per_job() {
        let a = VideoJob::new(JobId::from_string("a"), "uploads/clip.mp4", "processed");
        let b = VideoJob::new(JobId::from_string("b"), "uploads/clip.mp4", "processed");

        assert_eq!(a.output, PathBuf::from("processed/a.mp4"));
        assert_ne!(a.output, b.output);
    }

    fn has_x264() -> bool {
        if crate::command::check_ffmpeg().is_err() || crate::command::check_ffprobe().is_err() {
            return false;
        }
        std::process::Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .output()
            .map(|out| String::from_utf8_lossy(&out.stdout).contains("libx264"))
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_job_annotates_every_frame() {
        if !has_x264() {
            eprintln!("skipping: ffmpeg with libx264 not available");
            return;
        }

        let temp = tempfile::TempDir::new().unwrap();
        let source = temp.path().join("clip.mp4");
        let status = std::process::Command::new("ffmpeg")
            .args(["-y", "-hide_banner", "-v", "error", "-f", "lavfi"])
            .args(["-i", "color=c=gray:size=64x48:rate=5", "-frames:v", "6"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(&source)
            .status()
            .unwrap();
        assert!(status.success());

        let job = VideoJob::new(JobId::from_string("six"), &source, temp.path().join("out"));
        let pipeline = pipeline(vec![Detection::new(0, "dent", 0.9, [2.0, 2.0, 20.0, 20.0])]);
        let outcome = job.run(&pipeline, FrameFailurePolicy::Continue).await.unwrap();

        assert_eq!(outcome.stats.total_frames, 6);
        assert_eq!(outcome.stats.processed_frames, 6);
        assert_eq!(outcome.output, temp.path().join("out").join("six.mp4"));

        let info = probe_video(&outcome.output).await.unwrap();
        assert_eq!((info.width, info.height), (64, 48));
        assert_eq!(info.rotation, 0);
    }
}
