use crate::shared::detection_result::DetectionResult;
use crate::shared::frame::Frame;

/// Draws detection results onto a frame in place.
///
/// Annotation never changes frame dimensions. A `None` or empty result
/// leaves the frame untouched, and a region without a label gets its box
/// but no text.
pub trait FrameAnnotator: Send + Sync {
    fn annotate(
        &self,
        frame: &mut Frame,
        result: Option<&DetectionResult>,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
