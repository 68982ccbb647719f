//! Application state.

use std::sync::Arc;

use vdd_media::{Annotator, FrameFailurePolicy, FramePipeline, SharedDetector};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::stream_registry::StreamRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    /// `None` when the model failed to load; the server still runs degraded
    pub detector: Option<SharedDetector>,
    pub annotator: Arc<Annotator>,
    pub streams: StreamRegistry,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        detector: Option<SharedDetector>,
        annotator: Arc<Annotator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            detector,
            annotator,
            streams: StreamRegistry::new(),
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.detector.is_some()
    }

    /// Detection pipeline, or 503 when no model is loaded.
    pub fn pipeline(&self) -> ApiResult<FramePipeline> {
        let detector = self.detector.clone().ok_or_else(ApiError::model_not_loaded)?;
        Ok(FramePipeline::new(detector, Arc::clone(&self.annotator)))
    }

    pub fn failure_policy(&self) -> FrameFailurePolicy {
        FrameFailurePolicy::from_ratio(self.config.frame_failure_abort_ratio)
    }
}
