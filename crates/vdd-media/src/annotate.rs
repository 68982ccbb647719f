//! Detection rendering and image encoding.

use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::info;
use vdd_models::Detection;

use crate::error::{MediaError, MediaResult};

const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Box colours, indexed by class id.
const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Draws bounding boxes and `"<class> <confidence>"` labels.
///
/// Without a font only the boxes are drawn.
pub struct Annotator {
    font: Option<FontVec>,
    font_size: f32,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            font_size: LABEL_FONT_SIZE,
        }
    }

    /// Build an annotator, loading the label font if a path is given.
    pub fn from_font_path(path: Option<&Path>) -> MediaResult<Self> {
        let font = path.map(load_font).transpose()?;
        Ok(Self::new(font))
    }

    pub fn font(&self) -> Option<&FontVec> {
        self.font.as_ref()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render detections onto a copy of `image`.
    pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        self.draw(&mut canvas, detections);
        canvas
    }

    /// Render detections in place.
    pub fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
        for detection in detections {
            self.draw_detection(image, detection);
        }
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let (w, h) = (image.width() as i32, image.height() as i32);
        if w == 0 || h == 0 {
            return;
        }

        let x_min = (detection.bbox[0].floor() as i32).clamp(0, w - 1);
        let y_min = (detection.bbox[1].floor() as i32).clamp(0, h - 1);
        let x_max = (detection.bbox[2].ceil() as i32).clamp(0, w - 1);
        let y_max = (detection.bbox[3].ceil() as i32).clamp(0, h - 1);

        if x_min >= x_max || y_min >= y_max {
            return;
        }

        let color = class_color(detection.class_id);
        for t in 0..BOX_THICKNESS {
            let box_w = x_max - x_min - 2 * t;
            let box_h = y_max - y_min - 2 * t;
            if box_w <= 0 || box_h <= 0 {
                break;
            }
            let rect = Rect::at(x_min + t, y_min + t).of_size(box_w as u32 + 1, box_h as u32 + 1);
            draw_hollow_rect_mut(image, rect, color);
        }

        let Some(font) = &self.font else {
            return;
        };

        let label = format!("{} {:.2}", detection.class_name, detection.confidence);
        let scale = PxScale::from(self.font_size);
        let (text_w, text_h) = text_size(scale, font, &label);

        let label_h = text_h as i32 + 2 * LABEL_PADDING;
        let label_w = (text_w as i32 + 2 * LABEL_PADDING).min(w - x_min);
        // above the box, or inside it when there is no room
        let label_y = if y_min >= label_h { y_min - label_h } else { y_min };

        if label_w > 0 && label_h > 0 {
            let rect = Rect::at(x_min, label_y).of_size(label_w as u32, label_h as u32);
            draw_filled_rect_mut(image, rect, color);
            draw_text_mut(
                image,
                TEXT_COLOR,
                x_min + LABEL_PADDING,
                label_y + LABEL_PADDING,
                scale,
                font,
                &label,
            );
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Load a TrueType/OpenType font from disk.
pub fn load_font(path: &Path) -> MediaResult<FontVec> {
    let bytes = std::fs::read(path)?;
    let font = FontVec::try_from_vec(bytes)
        .map_err(|e| MediaError::internal(format!("Invalid font {}: {}", path.display(), e)))?;
    info!(path = %path.display(), "Label font loaded");
    Ok(font)
}

pub fn encode_png(image: &RgbImage) -> MediaResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| MediaError::encoding_failed(format!("PNG encoding failed: {}", e)))?;
    Ok(buf.into_inner())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> MediaResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| MediaError::encoding_failed(format!("JPEG encoding failed: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotate_leaves_source_untouched() {
        let image = RgbImage::new(40, 40);
        let dets = vec![Detection::new(0, "dent", 0.9, [5.0, 5.0, 30.0, 30.0])];

        let annotated = Annotator::default().annotate(&image, &dets);

        assert_eq!(image.get_pixel(5, 5).0, [0, 0, 0]);
        assert_eq!(annotated.get_pixel(5, 5).0, PALETTE[0]);
        assert_eq!(annotated.get_pixel(17, 5).0, PALETTE[0]);
        // interior stays clear
        assert_eq!(annotated.get_pixel(17, 17).0, [0, 0, 0]);
    }

    #[test]
    fn test_out_of_bounds_box_is_clamped() {
        let mut image = RgbImage::new(20, 20);
        let dets = vec![Detection::new(3, "scratch", 0.5, [-10.0, -10.0, 100.0, 100.0])];

        Annotator::default().draw(&mut image, &dets);
        assert_eq!(image.get_pixel(0, 0).0, PALETTE[3]);
        assert_eq!(image.get_pixel(19, 19).0, PALETTE[3]);
    }

    #[test]
    fn test_degenerate_box_is_skipped() {
        let mut image = RgbImage::new(20, 20);
        let dets = vec![Detection::new(0, "dent", 0.5, [10.0, 10.0, 10.0, 15.0])];

        Annotator::default().draw(&mut image, &dets);
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_encoders_produce_valid_images() {
        let image = RgbImage::from_pixel(8, 6, Rgb([10, 20, 30]));

        let png = encode_png(&image).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));

        let jpeg = encode_jpeg(&image, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_class_colors_cycle() {
        assert_eq!(class_color(0), class_color(PALETTE.len()));
        assert_ne!(class_color(0), class_color(1));
    }

    #[test]
    fn test_missing_font_path_is_an_error() {
        assert!(Annotator::from_font_path(Some(Path::new("/nonexistent/font.ttf"))).is_err());
        assert!(!Annotator::from_font_path(None).unwrap().has_font());
    }
}
