//! Placeholder preview images for the frontend.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};

use crate::annotate::encode_png;
use crate::error::{MediaError, MediaResult};

/// Largest accepted width or height.
pub const MAX_PLACEHOLDER_DIMENSION: u32 = 4096;

const BACKGROUND: Rgb<u8> = Rgb([0xf3, 0xf4, 0xf6]);
const CAPTION_COLOR: Rgb<u8> = Rgb([0x6b, 0x72, 0x80]);
const CAPTION_SIZE: f32 = 16.0;
const LINE_SPACING: i32 = 4;

/// Render a `width`x`height` PNG with a centred "Video Preview" caption.
///
/// The caption is only drawn when a font is available.
pub fn render_placeholder(
    width: u32,
    height: u32,
    font: Option<&FontVec>,
) -> MediaResult<Vec<u8>> {
    if width == 0
        || height == 0
        || width > MAX_PLACEHOLDER_DIMENSION
        || height > MAX_PLACEHOLDER_DIMENSION
    {
        return Err(MediaError::InvalidImage(format!(
            "placeholder size {}x{} out of range",
            width, height
        )));
    }

    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);

    if let Some(font) = font {
        let dims = format!("{}x{}", width, height);
        draw_centered_lines(&mut image, font, &["Video Preview", dims.as_str()]);
    }

    encode_png(&image)
}

fn draw_centered_lines(image: &mut RgbImage, font: &FontVec, lines: &[&str]) {
    let scale = PxScale::from(CAPTION_SIZE);
    let sizes: Vec<(i32, i32)> = lines
        .iter()
        .map(|line| {
            let (w, h) = text_size(scale, font, line);
            (w as i32, h as i32)
        })
        .collect();

    let block_height: i32 =
        sizes.iter().map(|(_, h)| h).sum::<i32>() + LINE_SPACING * (lines.len() as i32 - 1);
    let mut y = (image.height() as i32 - block_height) / 2;

    for (line, (w, h)) in lines.iter().zip(sizes) {
        let x = (image.width() as i32 - w) / 2;
        draw_text_mut(image, CAPTION_COLOR, x, y, scale, font, line);
        y += h + LINE_SPACING;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_without_font_is_plain_background() {
        let png = render_placeholder(320, 180, None).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();

        assert_eq!(decoded.dimensions(), (320, 180));
        assert!(decoded.pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn test_placeholder_rejects_bad_sizes() {
        assert!(render_placeholder(0, 100, None).is_err());
        assert!(render_placeholder(100, 0, None).is_err());
        assert!(render_placeholder(MAX_PLACEHOLDER_DIMENSION + 1, 10, None).is_err());
        assert!(render_placeholder(MAX_PLACEHOLDER_DIMENSION, 1, None).is_ok());
    }
}
