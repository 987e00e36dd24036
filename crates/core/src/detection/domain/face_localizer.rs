use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

/// Domain interface for face localization.
///
/// Implementations are read-only with respect to the frame and hold no
/// per-call state, so a single instance can serve many sessions at once.
pub trait FaceLocalizer: Send + Sync {
    /// Returns zero or more face regions. No face is an empty vec, not an error.
    fn locate(&self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>>;
}
