use std::sync::Arc;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::error::PipelineError;
use crate::video::domain::image_codec::{ImageCodec, ImageEncoding};

use super::archive::ArchiveBuilder;
use super::face_analyzer::FaceAnalyzer;

/// One uploaded file with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUpload {
    pub filename: String,
    pub reason: String,
}

/// Result of a batch: the ZIP bytes plus what went in and what did not.
#[derive(Debug, Clone)]
pub struct AnnotatedBatch {
    pub archive: Vec<u8>,
    /// Archive entry names, in archive order.
    pub entries: Vec<String>,
    pub skipped: Vec<SkippedUpload>,
}

/// Still-image batch pipeline: decode → analyze → annotate → encode → zip.
///
/// Skip-and-continue: non-image uploads and images that fail anywhere in
/// the pipeline are left out of the archive and reported in
/// [`AnnotatedBatch::skipped`]. Only a batch with nothing left fails.
pub struct AnnotateImagesUseCase {
    analyzer: FaceAnalyzer,
    annotator: Arc<dyn FrameAnnotator>,
    codec: Arc<dyn ImageCodec>,
    encoding: ImageEncoding,
}

impl AnnotateImagesUseCase {
    pub fn new(
        analyzer: FaceAnalyzer,
        annotator: Arc<dyn FrameAnnotator>,
        codec: Arc<dyn ImageCodec>,
        encoding: ImageEncoding,
    ) -> Self {
        Self {
            analyzer,
            annotator,
            codec,
            encoding,
        }
    }

    pub fn execute(&self, uploads: &[MediaUpload]) -> Result<AnnotatedBatch, PipelineError> {
        let mut archive = ArchiveBuilder::new();
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for (index, upload) in uploads.iter().enumerate() {
            let outcome = if upload.is_image() {
                self.process(index, upload)
            } else {
                Err(PipelineError::Decode(format!(
                    "not an image ({})",
                    upload.content_type
                )))
            };
            match outcome {
                Ok(encoded) => entries.push(archive.add(&upload.filename, &encoded)?),
                Err(e) => {
                    log::warn!("Skipping {}: {e}", upload.filename);
                    skipped.push(SkippedUpload {
                        filename: upload.filename.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if archive.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        log::info!(
            "Annotated {} of {} uploads",
            entries.len(),
            uploads.len()
        );
        Ok(AnnotatedBatch {
            archive: archive.finish()?,
            entries,
            skipped,
        })
    }

    fn process(&self, index: usize, upload: &MediaUpload) -> Result<Vec<u8>, PipelineError> {
        let mut frame = self
            .codec
            .decode(&upload.bytes, index)
            .map_err(|e| PipelineError::Decode(e.to_string()))?;
        let result = self.analyzer.analyze(&frame)?;
        log::debug!("{}: {} face(s)", upload.filename, result.len());
        self.annotator
            .annotate(&mut frame, Some(&result))
            .map_err(|e| PipelineError::frame(index, e))?;
        self.codec
            .encode(&frame, self.encoding)
            .map_err(|e| PipelineError::frame(index, e))
    }
}
