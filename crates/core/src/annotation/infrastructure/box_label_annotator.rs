use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::detection_result::DetectionResult;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;
use crate::shared::settings::AnnotationStyle;

use super::label_font::LabelFont;

/// Outlines each region and writes its label just above the top edge.
pub struct BoxLabelAnnotator {
    style: AnnotationStyle,
    font: LabelFont,
}

impl BoxLabelAnnotator {
    /// Uses the configured font, or the built-in bitmap font when none is set.
    pub fn new(style: AnnotationStyle) -> Result<Self, Box<dyn std::error::Error>> {
        let font = LabelFont::load(style.font_path.as_deref())?;
        Ok(Self::with_font(style, font))
    }

    pub fn with_font(style: AnnotationStyle, font: LabelFont) -> Self {
        Self { style, font }
    }

    fn color(&self) -> Rgb<u8> {
        Rgb(self.style.color)
    }

    /// The outline is `line_width` concentric one-pixel rectangles centered
    /// on the region edge.
    fn draw_box(&self, canvas: &mut RgbImage, region: &FaceRegion) {
        let lw = self.style.line_width as i32;
        let first = -(lw / 2);
        for offset in first..first + lw {
            let w = region.width - 2 * offset;
            let h = region.height - 2 * offset;
            if w <= 0 || h <= 0 {
                continue;
            }
            let rect = Rect::at(region.x + offset, region.y + offset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, self.color());
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, region: &FaceRegion, label: &str) {
        let height = self.style.text_height;
        let top = (region.y - self.style.label_gap as i32 - height as i32).max(0);
        self.font
            .draw(canvas, self.color(), region.x, top, height, label);
    }
}

impl FrameAnnotator for BoxLabelAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        result: Option<&DetectionResult>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(result) = result.filter(|r| !r.is_empty()) else {
            return Ok(());
        };
        if frame.channels() != 3 {
            return Err(format!("cannot annotate {}-channel frame", frame.channels()).into());
        }
        frame
            .with_rgb_image(|canvas| {
                for (region, label) in result.iter() {
                    self.draw_box(canvas, region);
                    if let Some(label) = label {
                        self.draw_label(canvas, region, label);
                    }
                }
            })
            .ok_or("frame buffer does not match its dimensions")?;
        Ok(())
    }
}
