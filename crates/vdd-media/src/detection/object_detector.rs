//! Object detection using a YOLOv8-format ONNX model.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when the `cuda` feature is enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};
use vdd_models::Detection;

use super::DetectionProvider;
use crate::error::{MediaError, MediaResult};

/// Box coordinates preceding the class scores in each candidate row.
const BOX_FEATURES: usize = 4;

/// COCO class names (80 classes), used when no labels file is configured.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Configuration for object detection.
#[derive(Debug, Clone)]
pub struct ObjectDetectorConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Optional labels file, one class name per line
    pub labels_path: Option<PathBuf>,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
}

impl Default for ObjectDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/best.onnx"),
            labels_path: None,
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// Object detector running a YOLOv8 ONNX export through ONNX Runtime.
pub struct ObjectDetector {
    session: Mutex<Session>,
    labels: Vec<String>,
    config: ObjectDetectorConfig,
}

impl ObjectDetector {
    /// Load the model and its labels.
    ///
    /// Returns `ModelNotFound` if the weights file doesn't exist.
    pub fn load(config: &ObjectDetectorConfig) -> MediaResult<Self> {
        if !config.model_path.exists() {
            return Err(MediaError::model_not_found(
                config.model_path.display().to_string(),
            ));
        }

        let labels = match &config.labels_path {
            Some(path) => load_labels(path)?,
            None => COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        };

        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            classes = labels.len(),
            "Object detector initialized"
        );

        Ok(Self {
            session,
            labels,
            config: config.clone(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Resize to the model input, normalize to [0, 1] and lay out as NCHW.
    fn preprocess(&self, image: &RgbImage) -> MediaResult<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let (w, h) = (size as usize, size as usize);

        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = resized.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detection_failed(format!("Failed to create tensor: {}", e)))
    }

    /// Run the session, returning the output shape and data.
    fn run_inference(&self, input: Value) -> MediaResult<(Vec<i64>, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok((shape.iter().copied().collect(), data.to_vec()))
    }
}

impl DetectionProvider for ObjectDetector {
    fn infer(&self, image: &RgbImage) -> MediaResult<Vec<Detection>> {
        let (width, height) = image.dimensions();
        let input = self.preprocess(image)?;
        let (shape, data) = self.run_inference(input)?;

        let candidates = decode_output(
            &shape,
            &data,
            &OutputGeometry {
                input_size: self.config.input_size,
                orig_width: width,
                orig_height: height,
            },
            self.config.confidence_threshold,
            &self.labels,
        )?;
        let detections = non_maximum_suppression(candidates, self.config.nms_threshold);

        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    fn name(&self) -> &'static str {
        "yolov8-onnx"
    }
}

/// Mapping from model input space back to the source image.
#[derive(Debug, Clone, Copy)]
struct OutputGeometry {
    input_size: u32,
    orig_width: u32,
    orig_height: u32,
}

/// Parse a YOLOv8 output tensor `[1, 4 + classes, boxes]` into pixel-space detections.
fn decode_output(
    shape: &[i64],
    data: &[f32],
    geometry: &OutputGeometry,
    confidence_threshold: f32,
    labels: &[String],
) -> MediaResult<Vec<Detection>> {
    let (num_features, num_boxes) = match shape {
        [1, features, boxes] if *features as usize > BOX_FEATURES => {
            (*features as usize, *boxes as usize)
        }
        _ => {
            return Err(MediaError::detection_failed(format!(
                "Unexpected output shape: {:?}",
                shape
            )))
        }
    };

    if data.len() != num_features * num_boxes {
        return Err(MediaError::detection_failed(format!(
            "Unexpected output size: expected {}, got {}",
            num_features * num_boxes,
            data.len()
        )));
    }

    let output = Array2::from_shape_vec((num_features, num_boxes), data.to_vec())
        .map_err(|e| MediaError::detection_failed(format!("Failed to reshape output: {}", e)))?;
    let rows = output.t();

    let input_size = geometry.input_size as f32;
    let (orig_w, orig_h) = (geometry.orig_width as f32, geometry.orig_height as f32);
    let scale_w = orig_w / input_size;
    let scale_h = orig_h / input_size;

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for c in 0..(num_features - BOX_FEATURES) {
            let score = rows[[i, BOX_FEATURES + c]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (rows[[i, 0]], rows[[i, 1]], rows[[i, 2]], rows[[i, 3]]);
        let x1 = ((cx - w / 2.0) * scale_w).clamp(0.0, orig_w);
        let y1 = ((cy - h / 2.0) * scale_h).clamp(0.0, orig_h);
        let x2 = ((cx + w / 2.0) * scale_w).clamp(0.0, orig_w);
        let y2 = ((cy + h / 2.0) * scale_h).clamp(0.0, orig_h);

        let class_name = labels
            .get(best_class)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", best_class));

        candidates.push(Detection::new(
            best_class,
            class_name,
            best_score.min(1.0),
            [x1, y1, x2, y2],
        ));
    }

    Ok(candidates)
}

/// Per-class non-maximum suppression, highest confidence first.
fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Read class names, one per line. Blank lines are skipped.
pub fn load_labels(path: impl AsRef<Path>) -> MediaResult<Vec<String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let labels: Vec<String> = std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();

    if labels.is_empty() {
        return Err(MediaError::model_not_found(format!(
            "labels file {} is empty",
            path.display()
        )));
    }
    Ok(labels)
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::model_not_found(format!("Failed to load ONNX model: {}", e)))
}
