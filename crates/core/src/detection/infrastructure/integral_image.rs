use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};

use crate::shared::frame::Frame;

/// Summed-area tables of pixel values and squared pixel values, built by
/// `imageproc` with `u64` accumulators.
pub struct IntegralImage {
    width: u32,
    height: u32,
    sum: ImageBuffer<Luma<u64>, Vec<u64>>,
    sq_sum: ImageBuffer<Luma<u64>, Vec<u64>>,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        Self {
            width,
            height,
            sum: integral_image::<_, u64>(gray),
            sq_sum: integral_squared_image::<_, u64>(gray),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sum, x, y, w, h)
    }

    pub fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sq_sum, x, y, w, h)
    }

    fn rect(table: &ImageBuffer<Luma<u64>, Vec<u64>>, x: u32, y: u32, w: u32, h: u32) -> u64 {
        if w == 0 || h == 0 {
            return 0;
        }
        // Bounds are inclusive pixel coordinates of the source image.
        sum_image_pixels(table, x, y, x + w - 1, y + h - 1)[0]
    }
}

/// Luma with ITU-R BT.601 weights, matching what Haar cascades are trained on.
pub fn to_gray(frame: &Frame) -> GrayImage {
    let channels = frame.channels() as usize;
    let data = frame.data();
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let i = (y as usize * frame.width() as usize + x as usize) * channels;
        let luma = if channels >= 3 {
            let (r, g, b) = (data[i] as u32, data[i + 1] as u32, data[i + 2] as u32);
            ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8
        } else {
            data[i]
        };
        image::Luma([luma])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_of_full_image() {
        let img = GrayImage::from_fn(4, 3, |x, y| image::Luma([(x + y * 4) as u8]));
        let ii = IntegralImage::new(&img);
        assert_eq!(ii.sum(0, 0, 4, 3), (0..12).sum::<u64>());
    }

    #[test]
    fn test_sum_of_sub_rectangle() {
        let img = GrayImage::from_fn(4, 4, |x, y| image::Luma([(x + y * 4) as u8]));
        let ii = IntegralImage::new(&img);
        // pixels (1,1)=5 (2,1)=6 (1,2)=9 (2,2)=10
        assert_eq!(ii.sum(1, 1, 2, 2), 30);
        assert_eq!(ii.sq_sum(1, 1, 2, 2), 25 + 36 + 81 + 100);
    }

    #[test]
    fn test_single_pixel_rectangles() {
        let img = GrayImage::from_fn(3, 2, |x, y| image::Luma([(10 * x + y) as u8]));
        let ii = IntegralImage::new(&img);
        assert_eq!(ii.sum(0, 0, 1, 1), 0);
        assert_eq!(ii.sum(2, 1, 1, 1), 21);
        assert_eq!(ii.sq_sum(2, 1, 1, 1), 441);
    }

    #[test]
    fn test_bright_image_does_not_overflow() {
        let ii = IntegralImage::new(&GrayImage::from_pixel(640, 480, image::Luma([255])));
        assert_eq!(ii.sq_sum(0, 0, 640, 480), 640 * 480 * 255 * 255);
    }

    #[test]
    fn test_empty_rectangle_is_zero() {
        let ii = IntegralImage::new(&GrayImage::from_pixel(3, 3, image::Luma([7])));
        assert_eq!(ii.sum(1, 1, 0, 2), 0);
    }

    #[test]
    fn test_to_gray_weights() {
        let frame = Frame::new(vec![255, 0, 0, 0, 255, 0, 0, 0, 255], 3, 1, 3, 0);
        let gray = to_gray(&frame);
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 29);
    }
}
