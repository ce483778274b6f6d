// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the tracking engine. It is a
// "dumb" data container for a single RGB pixel plus the one heuristic the classifier
// needs from it: the pixel's position in HSV space. Nothing here reads neighbors or
// history; anything spatial belongs in the mask modules.
//
// HSV scale:
// - The engine uses the compact 8-bit HSV domain common to video tooling:
//   hue in [0, 180) (degrees halved so it fits a byte, wrapping at 180),
//   saturation and value in [0, 255].
// - Color presets and user ranges are written in this domain, so a red that
//   straddles the wrap point needs two ranges, e.g. [0, 10] and [170, 180].
//
// Key principles:
// 1) Single-pixel scope: conversion never reads neighbors.
// 2) Integer in, integer out: channels are bytes so masks are reproducible.

pub mod pixel {
    pub type Channel = u8;
    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;

    /// Largest hue in the 8-bit HSV domain. Hue wraps here.
    pub const HUE_MAX: u8 = 180;
    /// Largest saturation/value in the 8-bit HSV domain.
    pub const SV_MAX: u8 = 255;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    /// A pixel expressed in the 8-bit HSV domain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hsv {
        pub hue: Hue,
        pub saturation: Saturation,
        pub value: Value,
    }

    impl Hsv {
        pub fn as_array(&self) -> [u8; 3] {
            [self.hue, self.saturation, self.value]
        }
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// HSV Value (V): brightness defined as max(R, G, B).
        pub fn value(&self) -> Value {
            self.red.max(self.green.max(self.blue))
        }

        /// Chroma (C): color purity = max(R,G,B) - min(R,G,B).
        pub fn chroma(&self) -> u8 {
            self.value() - self.red.min(self.green.min(self.blue))
        }

        /// Saturation (HSV): S = chroma / value, scaled to 0..255.
        pub fn saturation(&self) -> Saturation {
            let value = self.value();
            if value == 0 {
                return 0;
            }
            ((self.chroma() as f32 * 255.0) / value as f32).round() as Saturation
        }

        /// Hue angle in degrees [0, 360).
        ///
        /// - Uses the raw byte channels; gray pixels report 0.
        pub fn hue_degrees(&self) -> f32 {
            let maximum_channel = self.value();
            let chroma = self.chroma();
            if chroma == 0 {
                return 0.0;
            }

            let red = self.red as f32;
            let green = self.green as f32;
            let blue = self.blue as f32;
            let inverse_chroma = 1.0 / chroma as f32;

            let (base_difference, sector_offset) = if maximum_channel == self.red {
                (green - blue, 0.0)
            } else if maximum_channel == self.green {
                (blue - red, 2.0)
            } else {
                (red - green, 4.0)
            };

            let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// Hue in the halved 8-bit domain [0, 180). Degrees that round up to 180 wrap to 0.
        pub fn hue(&self) -> Hue {
            ((self.hue_degrees() / 2.0).round() as u16 % HUE_MAX as u16) as Hue
        }

        /// Full conversion to the 8-bit HSV domain.
        pub fn to_hsv(&self) -> Hsv {
            Hsv {
                hue: self.hue(),
                saturation: self.saturation(),
                value: self.value(),
            }
        }
    }

    impl From<image::Rgb<u8>> for Pixel {
        fn from(rgb: image::Rgb<u8>) -> Self {
            Pixel::new(rgb.0[0], rgb.0[1], rgb.0[2])
        }
    }

    impl From<&image::Rgb<u8>> for Pixel {
        fn from(rgb: &image::Rgb<u8>) -> Self {
            Pixel::new(rgb.0[0], rgb.0[1], rgb.0[2])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn primary_colors_land_on_expected_hues() {
        assert_eq!(Pixel::new(255, 0, 0).to_hsv().as_array(), [0, 255, 255]);
        assert_eq!(Pixel::new(0, 255, 0).to_hsv().as_array(), [60, 255, 255]);
        assert_eq!(Pixel::new(0, 0, 255).to_hsv().as_array(), [120, 255, 255]);
        assert_eq!(Pixel::new(255, 255, 0).to_hsv().as_array(), [30, 255, 255]);
    }

    #[test]
    fn gray_has_no_hue_or_saturation() {
        let hsv = Pixel::new(128, 128, 128).to_hsv();
        assert_eq!(hsv.hue, 0);
        assert_eq!(hsv.saturation, 0);
        assert_eq!(hsv.value, 128);
    }

    #[test]
    fn black_is_zero_everywhere() {
        assert_eq!(Pixel::default().to_hsv().as_array(), [0, 0, 0]);
    }

    #[test]
    fn magenta_red_sits_near_the_wrap_point() {
        let hsv = Pixel::new(255, 0, 20).to_hsv();
        assert!(hsv.hue >= 170 && hsv.hue < HUE_MAX, "hue was {}", hsv.hue);
    }

    #[test]
    fn hue_just_below_360_degrees_wraps_to_zero() {
        // 359.76 degrees halves to 179.88, which rounds onto the wrap point.
        let pixel = Pixel::new(255, 0, 1);
        assert!(pixel.hue_degrees() > 359.0);
        assert_eq!(pixel.to_hsv().as_array(), [0, 255, 255]);
        assert_eq!(Pixel::new(255, 0, 8).hue(), 179);
    }

    #[test]
    fn hue_never_reaches_the_wrap_point() {
        for blue in 0..=255u8 {
            assert!(Pixel::new(255, 0, blue).hue() < HUE_MAX);
            assert!(Pixel::new(blue, 0, 255).hue() < HUE_MAX);
        }
    }
}
