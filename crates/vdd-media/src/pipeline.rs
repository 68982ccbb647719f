//! Detect-and-render pipeline shared by the image, video and live paths.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::debug;
use vdd_models::Detection;

use crate::annotate::{encode_png, Annotator};
use crate::detection::SharedDetector;
use crate::error::{MediaError, MediaResult};

/// One frame with its detections rendered.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub detections: Vec<Detection>,
    pub inference_time: Duration,
}

/// Result of analyzing an uploaded still image.
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    /// Annotated image, PNG encoded
    pub png: Vec<u8>,
    pub detections: Vec<Detection>,
    /// Time spent in the detector
    pub inference_time: Duration,
}

/// Detector plus annotator.
///
/// Cheap to clone; all work runs on the blocking pool.
#[derive(Clone)]
pub struct FramePipeline {
    detector: SharedDetector,
    annotator: Arc<Annotator>,
}

impl FramePipeline {
    pub fn new(detector: SharedDetector, annotator: Arc<Annotator>) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    /// Detect and render synchronously.
    pub fn process_frame_blocking(&self, frame: &RgbImage) -> MediaResult<AnnotatedFrame> {
        let started = Instant::now();
        let detections = self.detector.infer(frame)?;
        let inference_time = started.elapsed();

        metrics::histogram!("vdd_inference_duration_seconds", "detector" => self.detector.name())
            .record(inference_time.as_secs_f64());

        let image = self.annotator.annotate(frame, &detections);
        Ok(AnnotatedFrame {
            image,
            detections,
            inference_time,
        })
    }

    /// Detect and render on the blocking pool.
    pub async fn process_frame(&self, frame: RgbImage) -> MediaResult<AnnotatedFrame> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.process_frame_blocking(&frame))
            .await
            .map_err(|e| MediaError::internal(format!("Frame task failed: {}", e)))?
    }

    /// Decode an uploaded image, detect, render and re-encode as PNG.
    pub async fn process_image_bytes(&self, bytes: Vec<u8>) -> MediaResult<ImageAnalysis> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)?.to_rgb8();
            debug!(width = image.width(), height = image.height(), "Image decoded");

            let frame = pipeline.process_frame_blocking(&image)?;
            let png = encode_png(&frame.image)?;

            Ok(ImageAnalysis {
                png,
                detections: frame.detections,
                inference_time: frame.inference_time,
            })
        })
        .await
        .map_err(|e| MediaError::internal(format!("Image task failed: {}", e)))?
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::detection::DetectionProvider;

    /// Returns a fixed detection list; fails on frames whose top-left red channel is 255.
    pub struct FakeDetector {
        pub detections: Vec<Detection>,
    }

    impl DetectionProvider for FakeDetector {
        fn infer(&self, image: &RgbImage) -> MediaResult<Vec<Detection>> {
            if image.width() > 0 && image.get_pixel(0, 0).0[0] == 255 {
                return Err(MediaError::detection_failed("marked frame"));
            }
            Ok(self.detections.clone())
        }
    }

    pub fn pipeline(detections: Vec<Detection>) -> FramePipeline {
        FramePipeline::new(
            Arc::new(FakeDetector { detections }),
            Arc::new(Annotator::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::pipeline;
    use super::*;
    use image::Rgb;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(width, height, Rgb([40, 40, 40]))).unwrap()
    }

    #[tokio::test]
    async fn test_process_image_without_detections() {
        let analysis = pipeline(vec![])
            .process_image_bytes(png_bytes(16, 12))
            .await
            .unwrap();

        assert!(analysis.detections.is_empty());
        let decoded = image::load_from_memory(&analysis.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[tokio::test]
    async fn test_process_image_keeps_detection_order() {
        let dets = vec![
            Detection::new(0, "dent", 0.4, [1.0, 1.0, 8.0, 8.0]),
            Detection::new(1, "scratch", 0.8, [2.0, 2.0, 10.0, 10.0]),
        ];
        let analysis = pipeline(dets.clone())
            .process_image_bytes(png_bytes(16, 12))
            .await
            .unwrap();

        assert_eq!(analysis.detections, dets);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_fail() {
        let result = pipeline(vec![])
            .process_image_bytes(b"not an image".to_vec())
            .await;
        assert!(matches!(result, Err(MediaError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn test_detector_failure_propagates() {
        let marked = RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        let result = pipeline(vec![]).process_frame(marked).await;
        assert!(matches!(result, Err(MediaError::DetectionFailed(_))));
    }
}
