//! Detection models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One predicted object instance in an image or frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class label from the model's label set
    #[serde(rename = "class")]
    pub class_name: String,
    /// Index into the model's label set
    #[serde(skip)]
    pub class_id: usize,
    /// Detection confidence [0, 1]
    pub confidence: f32,
    /// Bounding box `[x1, y1, x2, y2]` in pixel coordinates of the input
    pub bbox: [f32; 4],
}

impl Detection {
    /// Create a new detection.
    pub fn new(
        class_id: usize,
        class_name: impl Into<String>,
        confidence: f32,
        bbox: [f32; 4],
    ) -> Self {
        Self {
            class_name: class_name.into(),
            class_id,
            confidence,
            bbox,
        }
    }

    pub fn width(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another detection.
    pub fn iou(&self, other: &Detection) -> f32 {
        let x1 = self.bbox[0].max(other.bbox[0]);
        let y1 = self.bbox[1].max(other.bbox[1]);
        let x2 = self.bbox[2].min(other.bbox[2]);
        let y2 = self.bbox[3].min(other.bbox[3]);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Highest confidence among detections, or 0.0 when there are none.
pub fn max_confidence(detections: &[Detection]) -> f32 {
    detections
        .iter()
        .map(|d| d.confidence)
        .fold(None, |acc: Option<f32>, c| Some(acc.map_or(c, |a| a.max(c))))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_class_and_bbox() {
        let det = Detection::new(3, "dent", 0.75, [10.0, 20.0, 30.0, 60.0]);
        let json = serde_json::to_value(&det).unwrap();

        assert_eq!(json["class"], "dent");
        assert_eq!(json["bbox"].as_array().unwrap().len(), 4);
        assert!(json.get("class_id").is_none());
    }

    #[test]
    fn test_geometry() {
        let det = Detection::new(0, "scratch", 0.5, [10.0, 10.0, 30.0, 50.0]);
        assert!((det.width() - 20.0).abs() < f32::EPSILON);
        assert!((det.height() - 40.0).abs() < f32::EPSILON);
        assert!((det.area() - 800.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_iou() {
        let a = Detection::new(0, "dent", 0.9, [0.0, 0.0, 10.0, 10.0]);
        let b = Detection::new(0, "dent", 0.8, [5.0, 0.0, 15.0, 10.0]);
        let c = Detection::new(0, "dent", 0.8, [20.0, 20.0, 30.0, 30.0]);

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_max_confidence() {
        assert_eq!(max_confidence(&[]), 0.0);

        let dets = vec![
            Detection::new(0, "dent", 0.4, [0.0; 4]),
            Detection::new(1, "scratch", 0.9, [0.0; 4]),
            Detection::new(2, "crack", 0.6, [0.0; 4]),
        ];
        assert_eq!(max_confidence(&dets), 0.9);
    }
}
