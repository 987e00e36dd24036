use image::RgbImage;
use ndarray::ArrayView3;

use crate::shared::region::FaceRegion;

/// A single decoded image or video frame: contiguous RGB bytes in row-major order.
///
/// Channel order is RGB everywhere inside the crate. Conversion from the
/// source encoding happens at the decode boundary only, so crops handed to
/// the classifier are already in the order it expects.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn from_rgb_image(image: RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels into an owned `RgbImage`. `None` for non-RGB frames.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.channels != 3 {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Lends the pixel buffer to `f` as an `RgbImage` without copying.
    ///
    /// Returns `None` and leaves the frame untouched if it is not a
    /// well-formed RGB frame.
    pub fn with_rgb_image<R>(&mut self, f: impl FnOnce(&mut RgbImage) -> R) -> Option<R> {
        if self.channels != 3 || self.data.len() != self.expected_len() {
            return None;
        }
        let data = std::mem::take(&mut self.data);
        let mut image = RgbImage::from_raw(self.width, self.height, data)?;
        let result = f(&mut image);
        self.data = image.into_raw();
        Some(result)
    }

    /// Copies out the pixels covered by `region`.
    ///
    /// Returns `None` when the region has no area or does not lie fully
    /// inside the frame.
    pub fn crop(&self, region: &FaceRegion) -> Option<Frame> {
        if region.width <= 0 || region.height <= 0 || !region.is_within(self.width, self.height) {
            return None;
        }
        let channels = self.channels as usize;
        let fw = self.width as usize;
        let (x, y) = (region.x as usize, region.y as usize);
        let (w, h) = (region.width as usize, region.height as usize);

        let mut data = Vec::with_capacity(w * h * channels);
        for row in y..y + h {
            let start = (row * fw + x) * channels;
            data.extend_from_slice(&self.data[start..start + w * channels]);
        }
        Some(Frame::new(data, w as u32, h as u32, self.channels, self.index))
    }

    fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * (self.channels as usize)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
