use thiserror::Error;

/// Failures surfaced by the image, video and streaming pipelines.
///
/// Backend errors arrive as `Box<dyn Error>` from the domain traits and are
/// flattened to text here so the error can cross thread boundaries.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("could not decode input media: {0}")]
    Decode(String),
    #[error("no usable inputs in batch")]
    EmptyBatch,
    #[error("processing failed for frame {index}: {reason}")]
    FrameProcessing { index: usize, reason: String },
    #[error("could not decode video: {0}")]
    VideoDecode(String),
    #[error("could not encode video: {0}")]
    VideoEncode(String),
    #[error("could not build archive: {0}")]
    Archive(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cancelled")]
    Cancelled,
    #[error("pipeline already executed")]
    AlreadyExecuted,
}

impl PipelineError {
    pub fn frame(index: usize, reason: impl std::fmt::Display) -> Self {
        Self::FrameProcessing {
            index,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_processing_message_names_index() {
        let err = PipelineError::frame(12, "classifier exploded");
        assert_eq!(
            err.to_string(),
            "processing failed for frame 12: classifier exploded"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
