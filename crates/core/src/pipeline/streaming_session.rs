use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::error::PipelineError;
use crate::shared::settings::StreamingSettings;
use crate::video::domain::image_codec::{ImageCodec, ImageEncoding};

use super::face_analyzer::FaceAnalyzer;
use super::skip_frame_analyzer::SkipFrameAnalyzer;

/// Reply for one pushed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Annotated frame, JPEG-encoded.
    pub bytes: Vec<u8>,
    /// Whether a fresh detection succeeded on this frame.
    pub detected: bool,
    /// Position of the frame in the session, from 0.
    pub index: usize,
}

/// State for one live connection: a frame counter and the last detection.
///
/// Strictly request/response: each frame is decoded, annotated and encoded
/// before `process_frame` returns, and only a frame that produced a reply
/// advances the counter. A failed detection is logged and the frame goes
/// out with nothing drawn; the session carries on.
pub struct StreamingSession {
    analyzer: SkipFrameAnalyzer,
    annotator: Arc<dyn FrameAnnotator>,
    codec: Arc<dyn ImageCodec>,
    reply_encoding: ImageEncoding,
}

impl StreamingSession {
    pub fn new(
        analyzer: FaceAnalyzer,
        annotator: Arc<dyn FrameAnnotator>,
        codec: Arc<dyn ImageCodec>,
        settings: &StreamingSettings,
    ) -> Result<Self, &'static str> {
        Ok(Self {
            analyzer: SkipFrameAnalyzer::new(analyzer, settings.detection_interval)?,
            annotator,
            codec,
            reply_encoding: ImageEncoding::Jpeg {
                quality: settings.jpeg_quality,
            },
        })
    }

    /// Frames replied to so far.
    pub fn frames_processed(&self) -> usize {
        self.analyzer.frame_count()
    }

    pub fn process_frame(&mut self, bytes: &[u8]) -> Result<FrameOutcome, PipelineError> {
        let index = self.analyzer.frame_count();
        let mut frame = self
            .codec
            .decode(bytes, index)
            .map_err(|e| PipelineError::Decode(e.to_string()))?;

        let mut detected = false;
        if self.analyzer.is_due() {
            match self.analyzer.refresh(&frame) {
                Ok(()) => detected = true,
                Err(e) => {
                    log::warn!("Stream frame {index}: detection failed, drawing nothing: {e}")
                }
            }
        }

        self.annotator
            .annotate(&mut frame, self.analyzer.cached())
            .map_err(|e| PipelineError::frame(index, e))?;
        let bytes = self
            .codec
            .encode(&frame, self.reply_encoding)
            .map_err(|e| PipelineError::frame(index, e))?;
        self.analyzer.consume();

        Ok(FrameOutcome {
            bytes,
            detected,
            index,
        })
    }

    /// Text-framed variant: standard base64 in, standard base64 out.
    pub fn process_base64(&mut self, payload: &str) -> Result<String, PipelineError> {
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| PipelineError::Decode(format!("invalid base64: {e}")))?;
        let outcome = self.process_frame(&bytes)?;
        Ok(STANDARD.encode(outcome.bytes))
    }
}
