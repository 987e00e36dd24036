/// Multi-scale Haar cascade face localizer.
///
/// Scans a grayscale pyramid with the cascade window, maps hits back to
/// frame coordinates, then groups overlapping hits so that each face is
/// reported once.
use std::path::Path;

use image::imageops::{self, FilterType};

use crate::detection::domain::face_localizer::FaceLocalizer;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;
use crate::shared::settings::DetectionSettings;

use super::haar_cascade::{CascadeLoadError, HaarCascade};
use super::integral_image::{to_gray, IntegralImage};
use super::math::{group_rectangles, GROUP_EPS};

pub struct CascadeFaceLocalizer {
    cascade: HaarCascade,
    settings: DetectionSettings,
}

impl CascadeFaceLocalizer {
    pub fn new(cascade: HaarCascade, settings: DetectionSettings) -> Self {
        Self { cascade, settings }
    }

    pub fn from_file(path: &Path, settings: DetectionSettings) -> Result<Self, CascadeLoadError> {
        let cascade = HaarCascade::from_file(path)?;
        log::info!(
            "Loaded cascade {} ({} stages)",
            path.display(),
            cascade.stage_count()
        );
        Ok(Self::new(cascade, settings))
    }

    /// Every window the cascade accepts, before grouping.
    fn raw_hits(&self, frame: &Frame) -> Vec<FaceRegion> {
        let (win_w, win_h) = self.cascade.window_size();
        let (fw, fh) = (frame.width(), frame.height());
        let (min_w, min_h) = self.settings.min_size;
        let (max_w, max_h) = self.settings.max_size.unwrap_or((fw, fh));
        let gray = to_gray(frame);

        let mut hits = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let window_w = (win_w as f64 * factor).round() as u32;
            let window_h = (win_h as f64 * factor).round() as u32;
            let scaled_w = (fw as f64 / factor).round() as u32;
            let scaled_h = (fh as f64 / factor).round() as u32;
            if scaled_w < win_w || scaled_h < win_h {
                break;
            }
            if window_w > max_w || window_h > max_h {
                break;
            }
            if window_w >= min_w && window_h >= min_h {
                let scaled = if scaled_w == fw && scaled_h == fh {
                    gray.clone()
                } else {
                    imageops::resize(&gray, scaled_w, scaled_h, FilterType::Triangle)
                };
                let ii = IntegralImage::new(&scaled);
                let step = if factor > 2.0 { 1 } else { 2 };
                for y in (0..=ii.height() - win_h).step_by(step) {
                    for x in (0..=ii.width() - win_w).step_by(step) {
                        if self.cascade.accepts(&ii, x, y) {
                            hits.push(FaceRegion::new(
                                (x as f64 * factor).round() as i32,
                                (y as f64 * factor).round() as i32,
                                window_w as i32,
                                window_h as i32,
                            ));
                        }
                    }
                }
            }
            factor *= self.settings.scale_factor;
        }
        hits
    }
}

impl FaceLocalizer for CascadeFaceLocalizer {
    fn locate(&self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        if !(frame.channels() == 1 || frame.channels() == 3) {
            return Err(format!("unsupported channel count: {}", frame.channels()).into());
        }
        if self.settings.scale_factor.is_nan() || self.settings.scale_factor <= 1.0 {
            return Err(format!("scale factor must exceed 1.0, got {}", self.settings.scale_factor).into());
        }

        let hits = self.raw_hits(frame);
        let (min_w, min_h) = self.settings.min_size;
        let regions: Vec<FaceRegion> =
            group_rectangles(&hits, self.settings.min_neighbors, GROUP_EPS)
                .into_iter()
                .filter_map(|r| r.clamp_to(frame.width(), frame.height()))
                .filter(|r| r.meets_min_size(min_w, min_h))
                .collect();
        log::debug!(
            "frame {}: {} raw hits, {} regions",
            frame.index(),
            hits.len(),
            regions.len()
        );
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::haar_cascade::tests::CHECKER_CASCADE;

    fn localizer() -> CascadeFaceLocalizer {
        CascadeFaceLocalizer::new(
            HaarCascade::from_xml(CHECKER_CASCADE).unwrap(),
            DetectionSettings::default(),
        )
    }

    /// Mid-gray canvas with a 2x2 checker "face" of side `size` at (`x`, `y`).
    fn canvas_with_checker(w: u32, h: u32, x: u32, y: u32, size: u32) -> Frame {
        let mut data = vec![128u8; (w * h * 3) as usize];
        let half = size / 2;
        for py in y..y + size {
            for px in x..x + size {
                let right = px - x >= half;
                let lower = py - y >= half;
                let v = if right != lower { 255 } else { 0 };
                let i = ((py * w + px) * 3) as usize;
                data[i..i + 3].copy_from_slice(&[v, v, v]);
            }
        }
        Frame::new(data, w, h, 3, 0)
    }

    #[test]
    fn test_uniform_frame_has_no_faces() {
        let frame = Frame::new(vec![128u8; 200 * 200 * 3], 200, 200, 3, 0);
        assert!(localizer().locate(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_single_face_found_once() {
        let frame = canvas_with_checker(400, 400, 150, 150, 100);
        let regions = localizer().locate(&frame).unwrap();

        assert_eq!(regions.len(), 1);
        let r = regions[0];
        assert!(r.width >= 40 && r.height >= 40);
        let (cx, cy) = (r.x + r.width / 2, r.y + r.height / 2);
        assert!((cx - 200).abs() <= 15, "center x {cx}");
        assert!((cy - 200).abs() <= 15, "center y {cy}");
    }

    #[test]
    fn test_regions_lie_inside_frame() {
        let frame = canvas_with_checker(300, 240, 100, 60, 120);
        for r in localizer().locate(&frame).unwrap() {
            assert!(r.is_within(300, 240));
            assert!(r.meets_min_size(40, 40));
        }
    }

    #[test]
    fn test_detection_is_deterministic() {
        let frame = canvas_with_checker(320, 240, 60, 40, 96);
        let loc = localizer();
        assert_eq!(loc.locate(&frame).unwrap(), loc.locate(&frame).unwrap());
    }

    #[test]
    fn test_min_size_larger_than_face_finds_nothing() {
        let frame = canvas_with_checker(400, 400, 150, 150, 100);
        let settings = DetectionSettings {
            min_size: (200, 200),
            ..DetectionSettings::default()
        };
        let loc = CascadeFaceLocalizer::new(HaarCascade::from_xml(CHECKER_CASCADE).unwrap(), settings);
        assert!(loc.locate(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_frame_smaller_than_window_is_empty() {
        let frame = Frame::new(vec![0u8; 10 * 10 * 3], 10, 10, 3, 0);
        assert!(localizer().locate(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_scale_factor_of_one_is_rejected() {
        let settings = DetectionSettings {
            scale_factor: 1.0,
            ..DetectionSettings::default()
        };
        let loc = CascadeFaceLocalizer::new(HaarCascade::from_xml(CHECKER_CASCADE).unwrap(), settings);
        let frame = Frame::new(vec![0u8; 64 * 64 * 3], 64, 64, 3, 0);
        assert!(loc.locate(&frame).is_err());
    }

    #[test]
    fn test_zero_min_neighbors_returns_raw_hits() {
        let frame = canvas_with_checker(400, 400, 150, 150, 100);
        let settings = DetectionSettings {
            min_neighbors: 0,
            ..DetectionSettings::default()
        };
        let loc = CascadeFaceLocalizer::new(HaarCascade::from_xml(CHECKER_CASCADE).unwrap(), settings);
        assert!(loc.locate(&frame).unwrap().len() > 1);
    }
}
