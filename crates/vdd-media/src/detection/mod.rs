//! Detection providers.
//!
//! The HTTP layer and the frame loops only see [`DetectionProvider`]; the
//! production implementation is the ONNX [`ObjectDetector`].

mod object_detector;

pub use object_detector::{load_labels, ObjectDetector, ObjectDetectorConfig, COCO_CLASSES};

use std::sync::Arc;

use image::RgbImage;
use vdd_models::Detection;

use crate::error::MediaResult;

/// Object detection over a single RGB image.
///
/// Implementations are called from the blocking pool and may be shared
/// between concurrent requests.
pub trait DetectionProvider: Send + Sync {
    /// Detect objects, returning boxes in pixel coordinates of `image`.
    fn infer(&self, image: &RgbImage) -> MediaResult<Vec<Detection>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str {
        "detector"
    }
}

/// Shared handle to a loaded detector.
pub type SharedDetector = Arc<dyn DetectionProvider>;
