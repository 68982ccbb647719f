//! Shared data models for the vehicle damage detection service.
//!
//! This crate provides Serde-serializable types for:
//! - Detections produced by the model
//! - Video job identifiers, stages and frame statistics

pub mod detection;
pub mod job;

// Re-export common types
pub use detection::{max_confidence, Detection};
pub use job::{JobId, JobStage, VideoJobStats};
