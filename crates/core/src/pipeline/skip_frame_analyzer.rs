use crate::shared::detection_result::DetectionResult;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;

use super::face_analyzer::FaceAnalyzer;

/// Runs a full detection cycle every `interval` frames and caches the
/// result for the frames in between.
///
/// Frame `c` (counting calls from 0) triggers detection when
/// `c % interval == 0`. Cached regions are reused unchanged; there is no
/// motion compensation. A failed detection clears the cache, so frames
/// up to the next detection draw nothing.
pub struct SkipFrameAnalyzer {
    analyzer: FaceAnalyzer,
    interval: usize,
    frame_count: usize,
    cached: Option<DetectionResult>,
}

impl SkipFrameAnalyzer {
    pub fn new(analyzer: FaceAnalyzer, interval: usize) -> Result<Self, &'static str> {
        if interval < 1 {
            return Err("detection interval must be >= 1");
        }
        Ok(Self {
            analyzer,
            interval,
            frame_count: 0,
            cached: None,
        })
    }

    /// Frames consumed so far.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn cached(&self) -> Option<&DetectionResult> {
        self.cached.as_ref()
    }

    /// Whether the next frame is due for a fresh detection.
    pub fn is_due(&self) -> bool {
        self.frame_count % self.interval == 0
    }

    /// Replaces the cache with a detection on `frame`. On failure the cache
    /// is left empty. Does not move the counter.
    pub fn refresh(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        self.cached = None;
        self.cached = Some(self.analyzer.analyze(frame)?);
        Ok(())
    }

    /// Counts one frame as consumed.
    pub fn consume(&mut self) {
        self.frame_count += 1;
    }

    /// Consumes one frame. Returns `true` when detection ran on it.
    ///
    /// The counter advances even when detection fails.
    pub fn advance(&mut self, frame: &Frame) -> Result<bool, PipelineError> {
        let detect = self.is_due();
        self.consume();
        if detect {
            self.refresh(frame)?;
        }
        Ok(detect)
    }
}
