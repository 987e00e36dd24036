use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::shared::constants::{LABEL_FONT_NAME, LABEL_FONT_URL};
use crate::shared::model_resolver;

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
/// Horizontal advance per glyph, in font cells.
const ADVANCE: u32 = GLYPH_W + 1;

/// Font used for region labels.
///
/// `Bitmap` is a built-in 5x7 cell font scaled by an integer factor, so
/// labels render without any font file on disk. Lowercase letters use the
/// uppercase shapes and unknown characters render as `?`.
pub enum LabelFont {
    Bitmap,
    TrueType(FontArc),
}

impl LabelFont {
    /// Loads a TrueType/OpenType font, or the built-in bitmap font when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            None => Ok(Self::Bitmap),
            Some(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|e| format!("failed to read font {}: {e}", path.display()))?;
                let font = FontArc::try_from_vec(bytes)
                    .map_err(|e| format!("invalid font {}: {e}", path.display()))?;
                Ok(Self::TrueType(font))
            }
        }
    }

    /// Loads `explicit` if given. Otherwise the default TrueType font is
    /// taken from the model cache, downloaded on first use; if that fails
    /// the bitmap font is used.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if explicit.is_some() {
            return Self::load(explicit);
        }
        match model_resolver::model_cache_dir() {
            Ok(cache_dir) => Ok(Self::resolve_in(&cache_dir, LABEL_FONT_NAME, LABEL_FONT_URL)),
            Err(e) => {
                log::warn!("No font cache available, using built-in label glyphs: {e}");
                Ok(Self::Bitmap)
            }
        }
    }

    fn resolve_in(cache_dir: &Path, name: &str, url: &str) -> Self {
        let loaded = model_resolver::resolve_in(cache_dir, name, url, None)
            .map_err(|e| e.to_string())
            .and_then(|path| Self::load(Some(&path)).map_err(|e| e.to_string()));
        match loaded {
            Ok(font) => {
                log::debug!("Using label font {name}");
                font
            }
            Err(e) => {
                log::warn!("Label font {name} unavailable, using built-in glyphs: {e}");
                Self::Bitmap
            }
        }
    }

    /// Width in pixels of `text` rendered at `height`.
    pub fn text_width(&self, height: u32, text: &str) -> u32 {
        match self {
            Self::Bitmap => {
                let n = text.chars().count() as u32;
                (n * ADVANCE).saturating_sub(1) * bitmap_scale(height)
            }
            Self::TrueType(font) => text_size(PxScale::from(height as f32), font, text).0,
        }
    }

    /// Draws `text` with its top-left corner at (`x`, `y`). Pixels outside
    /// the canvas are clipped.
    pub fn draw(
        &self,
        canvas: &mut RgbImage,
        color: Rgb<u8>,
        x: i32,
        y: i32,
        height: u32,
        text: &str,
    ) {
        match self {
            Self::Bitmap => draw_bitmap_text(canvas, color, x, y, height, text),
            Self::TrueType(font) => {
                draw_text_mut(canvas, color, x, y, PxScale::from(height as f32), font, text)
            }
        }
    }
}

fn bitmap_scale(height: u32) -> u32 {
    (height / GLYPH_H).max(1)
}

fn draw_bitmap_text(canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, height: u32, text: &str) {
    let scale = bitmap_scale(height);
    // Glyphs sit on the bottom of the requested line height.
    let top = y + height.saturating_sub(GLYPH_H * scale) as i32;
    for (i, ch) in text.chars().enumerate() {
        let gx = x + (i as u32 * ADVANCE * scale) as i32;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                let px = gx + (col * scale) as i32;
                let py = top + (row as u32 * scale) as i32;
                draw_filled_rect_mut(canvas, Rect::at(px, py).of_size(scale, scale), color);
            }
        }
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        ' ' => [0; 7],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '\'' => [0x0C, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}
