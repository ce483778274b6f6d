// THEORY:
// The `classifier` is the first stage of the per-frame detection pipeline. It
// converts every pixel of an RGB frame to the 8-bit HSV domain and asks the color
// definition whether that HSV triple is "in".
//
// Key architectural principles:
// 1.  **Any Range Counts**: A pixel is on when it falls inside any of the definition's
//     ranges. This is what lets a red that straddles the hue wrap point be tracked.
// 2.  **Stateless Utility**: No memory of previous frames and no side effects.
// 3.  **Only Degenerate Input Fails**: Every pixel value is valid; only a frame with
//     zero area is rejected.

use crate::core_modules::color_registry::ColorDefinition;
use crate::core_modules::mask::{Mask, OFF, ON};
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{Result, TrailError};
use image::{Luma, RgbImage};
use imageproc::map::map_colors;

/// Builds the membership mask of `definition` over `frame`.
pub fn classify(frame: &RgbImage, definition: &ColorDefinition) -> Result<Mask> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(TrailError::InvalidFrame { width, height });
    }
    let membership = map_colors(frame, |rgb| {
        let hsv = Pixel::from(rgb).to_hsv();
        Luma([if definition.matches(hsv) { ON } else { OFF }])
    });
    Ok(Mask::from_gray(membership))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color_registry::{BgrColor, ColorRegistry};
    use image::Rgb;

    #[test]
    fn zero_area_frame_is_invalid() {
        let registry = ColorRegistry::with_presets();
        let yellow = registry.lookup("yellow").unwrap();
        let err = classify(&RgbImage::new(0, 10), yellow).unwrap_err();
        assert!(matches!(err, TrailError::InvalidFrame { width: 0, height: 10 }));
    }

    #[test]
    fn only_matching_pixels_are_on() {
        let registry = ColorRegistry::with_presets();
        let yellow = registry.lookup("yellow").unwrap();

        let mut frame = RgbImage::new(4, 2);
        frame.put_pixel(1, 0, Rgb([255, 220, 0]));
        frame.put_pixel(3, 1, Rgb([0, 0, 255]));

        let mask = classify(&frame, yellow).unwrap();
        assert_eq!(mask.dimensions(), (4, 2));
        assert!(mask.is_on(1, 0));
        assert!(!mask.is_on(3, 1));
        assert_eq!(mask.count_on(), 1);
    }

    #[test]
    fn wrapping_range_covers_both_ends_of_the_hue_circle() {
        let mut registry = ColorRegistry::empty();
        let magenta_red = registry
            .register(
                "magenta_red",
                &[[[170, 100, 100], [5, 255, 255]]],
                BgrColor::BLACK,
                BgrColor::BLACK,
                None,
            )
            .unwrap();

        let mut frame = RgbImage::new(4, 1);
        frame.put_pixel(0, 0, Rgb([255, 0, 1])); // 359.8 degrees, wraps to hue 0
        frame.put_pixel(1, 0, Rgb([255, 0, 60])); // hue 173
        frame.put_pixel(2, 0, Rgb([255, 20, 0])); // hue 2
        frame.put_pixel(3, 0, Rgb([255, 255, 0])); // yellow, hue 30

        let mask = classify(&frame, magenta_red).unwrap();
        assert!(mask.is_on(0, 0));
        assert!(mask.is_on(1, 0));
        assert!(mask.is_on(2, 0));
        assert!(!mask.is_on(3, 0));
    }

    #[test]
    fn near_pure_red_matches_the_low_red_range() {
        let mut registry = ColorRegistry::empty();
        let low_red = registry
            .register("low_red", &[[[0, 100, 100], [10, 255, 255]]], BgrColor::BLACK, BgrColor::BLACK, None)
            .unwrap();
        let frame = RgbImage::from_pixel(4, 4, Rgb([255, 0, 1]));
        assert_eq!(classify(&frame, low_red).unwrap().count_on(), 16);
    }

    #[test]
    fn both_red_ranges_contribute() {
        let registry = ColorRegistry::with_presets();
        let red = registry.lookup("red").unwrap();

        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(0, 0, Rgb([255, 10, 0])); // low-hue red
        frame.put_pixel(1, 0, Rgb([255, 0, 30])); // high-hue red

        let mask = classify(&frame, red).unwrap();
        assert!(mask.is_on(0, 0));
        assert!(mask.is_on(1, 0));
    }
}
