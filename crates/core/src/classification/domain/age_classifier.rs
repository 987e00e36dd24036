use crate::shared::detection_result::Label;
use crate::shared::frame::Frame;

/// Domain interface for the pretrained age classifier.
///
/// Receives one RGB face crop of arbitrary aspect ratio and returns its
/// label. Must tolerate concurrent calls from independent sessions.
pub trait AgeClassifier: Send + Sync {
    fn classify(&self, face: &Frame) -> Result<Label, Box<dyn std::error::Error>>;
}
