use std::io::Cursor;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::shared::frame::Frame;
use crate::video::domain::image_codec::{ImageCodec, ImageEncoding};

/// Still-image codec backed by the `image` crate.
///
/// Decoding accepts every format the crate was built with and converts to
/// RGB, dropping any alpha channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateCodec;

impl ImageCrateCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8], index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
        let rgb = image::load_from_memory(bytes)?.into_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err("image has no pixels".into());
        }
        Ok(Frame::from_rgb_image(rgb, index))
    }

    fn encode(
        &self,
        frame: &Frame,
        encoding: ImageEncoding,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        if frame.channels() != 3 {
            return Err(format!("cannot encode {}-channel frame", frame.channels()).into());
        }
        let (w, h, data) = (frame.width(), frame.height(), frame.data());
        let color = ExtendedColorType::Rgb8;

        let mut buf = Cursor::new(Vec::new());
        match encoding {
            ImageEncoding::Png => PngEncoder::new(&mut buf).write_image(data, w, h, color)?,
            ImageEncoding::Bmp => BmpEncoder::new(&mut buf).write_image(data, w, h, color)?,
            ImageEncoding::Tiff => TiffEncoder::new(&mut buf).write_image(data, w, h, color)?,
            ImageEncoding::Jpeg { quality } => {
                JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
                    .write_image(data, w, h, color)?
            }
        }
        Ok(buf.into_inner())
    }
}
