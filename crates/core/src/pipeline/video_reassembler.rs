use std::path::{Path, PathBuf};

use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_writer::VideoWriter;

/// Writes annotated frames into an output container at the source frame
/// rate, then hands back the finished container bytes.
///
/// Frames must arrive with indices 0, 1, 2, ... exactly; a gap or a repeat
/// is an encode error rather than a silently reordered video.
pub struct VideoReassembler {
    writer: Box<dyn VideoWriter>,
    output_path: PathBuf,
    next_index: usize,
}

impl VideoReassembler {
    pub fn open(
        mut writer: Box<dyn VideoWriter>,
        output_path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<Self, PipelineError> {
        writer
            .open(output_path, metadata)
            .map_err(|e| PipelineError::VideoEncode(format!("open output: {e}")))?;
        log::debug!(
            "Opened output {} at {} fps",
            output_path.display(),
            metadata.frame_rate
        );
        Ok(Self {
            writer,
            output_path: output_path.to_path_buf(),
            next_index: 0,
        })
    }

    pub fn frames_written(&self) -> usize {
        self.next_index
    }

    pub fn push(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        if frame.index() != self.next_index {
            return Err(PipelineError::VideoEncode(format!(
                "frame {} out of order, expected {}",
                frame.index(),
                self.next_index
            )));
        }
        self.writer
            .write(frame)
            .map_err(|e| PipelineError::VideoEncode(format!("frame {}: {e}", frame.index())))?;
        self.next_index += 1;
        Ok(())
    }

    /// Finalizes the container and reads it back.
    pub fn finish(mut self) -> Result<Vec<u8>, PipelineError> {
        self.writer
            .close()
            .map_err(|e| PipelineError::VideoEncode(format!("finalize: {e}")))?;
        std::fs::read(&self.output_path)
            .map_err(|e| PipelineError::VideoEncode(format!("read output: {e}")))
    }
}
