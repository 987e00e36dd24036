use crate::shared::frame::Frame;
use crate::shared::settings::OutputImageFormat;

/// Target encoding for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Bmp,
    Tiff,
    Jpeg { quality: u8 },
}

impl From<OutputImageFormat> for ImageEncoding {
    fn from(format: OutputImageFormat) -> Self {
        match format {
            OutputImageFormat::Png => Self::Png,
            OutputImageFormat::Bmp => Self::Bmp,
            OutputImageFormat::Tiff => Self::Tiff,
        }
    }
}

/// Converts between encoded still-image bytes and RGB frames.
pub trait ImageCodec: Send + Sync {
    /// Decodes any supported raster format into a 3-channel RGB frame.
    fn decode(&self, bytes: &[u8], index: usize) -> Result<Frame, Box<dyn std::error::Error>>;

    fn encode(
        &self,
        frame: &Frame,
        encoding: ImageEncoding,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>>;
}
