// THEORY:
// A `Mask` is the binary membership map that flows from the classifier through the
// refiner into the shape extractor. It wraps a `GrayImage` so every stage can use the
// `image` crate's pixel addressing, but it only ever stores two intensities:
// `ON` (255) and `OFF` (0).

use image::{GrayImage, Luma};

pub const ON: u8 = 255;
pub const OFF: u8 = 0;

/// A same-resolution binary map of "pixel belongs to the tracked color".
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// Creates an all-off mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    /// Wraps a grayscale image, snapping every non-zero pixel to `ON`.
    pub fn from_gray(mut image: GrayImage) -> Self {
        for pixel in image.pixels_mut() {
            pixel.0[0] = if pixel.0[0] > OFF { ON } else { OFF };
        }
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[inline]
    pub fn is_on(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] == ON
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.image.put_pixel(x, y, Luma([if on { ON } else { OFF }]));
    }

    pub fn count_on(&self) -> usize {
        self.image.pixels().filter(|p| p.0[0] == ON).count()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }
}
