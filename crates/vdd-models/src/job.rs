//! Video job definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a video job.
///
/// Also names the job's output artifact, so concurrent jobs never share a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the processed video for this job.
    pub fn output_file_name(&self) -> String {
        format!("{}.mp4", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stage of a video job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// Upload received by the handler
    #[default]
    Received,
    /// Upload persisted to the working directory
    Saved,
    /// Frames are being decoded, inferred and encoded
    Decoding,
    /// Encoder finished writing the output
    Encoded,
    /// Output artifact exists and is non-empty
    Verified,
    /// Job completed successfully
    Done,
    /// Job failed
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Received => "received",
            JobStage::Saved => "saved",
            JobStage::Decoding => "decoding",
            JobStage::Encoded => "encoded",
            JobStage::Verified => "verified",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame counters for one video job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct VideoJobStats {
    /// Frames read from the source
    pub total_frames: u64,
    /// Frames inferred, annotated and written to the output
    pub processed_frames: u64,
    /// Frames skipped because inference failed
    pub failed_frames: u64,
}

impl VideoJobStats {
    pub fn record_processed(&mut self) {
        self.total_frames += 1;
        self.processed_frames += 1;
    }

    pub fn record_failed(&mut self) {
        self.total_frames += 1;
        self.failed_frames += 1;
    }

    /// Fraction of frames that failed inference.
    pub fn failure_ratio(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.failed_frames as f64 / self.total_frames as f64
        }
    }

    /// Human-readable summary returned to clients.
    pub fn summary(&self) -> String {
        format!(
            "Video processed successfully. {}/{} frames analyzed.",
            self.processed_frames, self.total_frames
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_output_name() {
        let id = JobId::from_string("abc");
        assert_eq!(id.output_file_name(), "abc.mp4");
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_stage_serialization() {
        assert_eq!(serde_json::to_string(&JobStage::Verified).unwrap(), "\"verified\"");
        assert_eq!(JobStage::Failed.to_string(), "failed");
    }

    #[test]
    fn test_stats_summary() {
        let mut stats = VideoJobStats::default();
        for _ in 0..8 {
            stats.record_processed();
        }
        stats.record_failed();
        stats.record_failed();

        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.processed_frames + stats.failed_frames, stats.total_frames);
        assert!((stats.failure_ratio() - 0.2).abs() < 1e-9);
        assert_eq!(stats.summary(), "Video processed successfully. 8/10 frames analyzed.");
    }
}
