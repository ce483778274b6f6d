// THEORY:
// The `MaskRefiner` cleans a raw classifier mask before any shapes are extracted.
//
// Algorithm steps:
// 1.  **Smoothing**: A separable Gaussian blur (odd kernel, sigma derived from the
//     kernel size) softens the binary mask; re-thresholding at half intensity wipes
//     out isolated speckle while leaving solid regions intact.
// 2.  **Opening**: Erosion then dilation with a square structuring element removes
//     small false positives that survived the blur.
// 3.  **Closing**: Dilation then erosion fills pinholes inside the true object.
//
// Kernel sizes are validated when `DetectionSettings` are built, so refinement itself
// never fails. Pixels outside the image never pull a neighborhood's minimum or maximum.

use crate::config::DetectionSettings;
use crate::core_modules::mask::{Mask, OFF, ON};
use image::Luma;
use imageproc::distance_transform::Norm;
use imageproc::filter::separable_filter_equal;
use imageproc::map::map_colors;
use imageproc::morphology::{close, open};

/// Blurred intensities at or above this snap back to on.
const BLUR_THRESHOLD: u8 = 128;

/// Applies blur, opening and closing with the sizes from `DetectionSettings`.
#[derive(Debug, Clone)]
pub struct MaskRefiner {
    blur_weights: Vec<f32>,
    morphology_radius: u8,
}

impl MaskRefiner {
    pub fn new(settings: &DetectionSettings) -> Self {
        Self {
            blur_weights: gaussian_weights(settings.blur_kernel_size()),
            // Kernel sizes are capped at 255, so the radius always fits.
            morphology_radius: u8::try_from(settings.morphology_kernel_size() / 2).unwrap_or(u8::MAX),
        }
    }

    /// Smooths, opens, then closes `mask`. The result has the same resolution.
    pub fn refine(&self, mask: &Mask) -> Mask {
        let smoothed = self.smooth(mask);
        if self.morphology_radius == 0 {
            return smoothed;
        }
        // The L-infinity norm makes the structuring element a square.
        let opened = open(smoothed.as_gray(), Norm::LInf, self.morphology_radius);
        Mask::from_gray(close(&opened, Norm::LInf, self.morphology_radius))
    }

    fn smooth(&self, mask: &Mask) -> Mask {
        if self.blur_weights.len() <= 1 {
            return mask.clone();
        }
        let blurred = separable_filter_equal(mask.as_gray(), &self.blur_weights);
        Mask::from_gray(map_colors(&blurred, |p: Luma<u8>| {
            Luma([if p.0[0] >= BLUR_THRESHOLD { ON } else { OFF }])
        }))
    }
}

/// Normalized 1-D Gaussian taps for an odd `size`, with the sigma video tooling derives
/// from the kernel size when none is given.
fn gaussian_weights(size: u32) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0];
    }
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (size / 2) as i32;
    let raw: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> Mask {
        let (x0, y0, w, h) = rect;
        let mut mask = Mask::new(width, height);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn gaussian_weights_are_symmetric_and_normalized() {
        let weights = gaussian_weights(5);
        assert_eq!(weights.len(), 5);
        assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((weights[0] - weights[4]).abs() < 1e-6);
        assert!(weights[2] > weights[1]);
    }

    #[test]
    fn isolated_speck_is_removed() {
        let mut mask = filled(40, 40, (20, 20, 10, 10));
        mask.set(3, 3, true);
        mask.set(4, 3, true);

        let refined = MaskRefiner::new(&DetectionSettings::default()).refine(&mask);
        assert!(!refined.is_on(3, 3));
        assert!(!refined.is_on(4, 3));
        assert!(refined.is_on(25, 25));
    }

    #[test]
    fn pinhole_inside_object_is_filled() {
        let mut mask = filled(40, 40, (10, 10, 16, 16));
        mask.set(18, 18, false);

        let refined = MaskRefiner::new(&DetectionSettings::default()).refine(&mask);
        assert!(refined.is_on(18, 18));
    }

    #[test]
    fn resolution_is_preserved() {
        let mask = Mask::new(17, 9);
        let refined = MaskRefiner::new(&DetectionSettings::default()).refine(&mask);
        assert_eq!(refined.dimensions(), (17, 9));
        assert_eq!(refined.count_on(), 0);
    }

    #[test]
    fn opening_uses_a_square_element() {
        // A square exactly the size of the kernel survives opening corners and all.
        let mask = filled(20, 20, (6, 6, 5, 5));
        let settings = DetectionSettings::new(50, 5, 1).unwrap();
        let refined = MaskRefiner::new(&settings).refine(&mask);
        assert_eq!(refined, mask);
        assert!(refined.is_on(6, 6) && refined.is_on(10, 10));
    }

    #[test]
    fn opening_removes_features_thinner_than_the_kernel() {
        let mut mask = filled(30, 30, (5, 5, 12, 12));
        for x in 0..30 {
            mask.set(x, 25, true);
            mask.set(x, 26, true);
        }
        let settings = DetectionSettings::new(50, 5, 1).unwrap();
        let refined = MaskRefiner::new(&settings).refine(&mask);
        assert!(!refined.is_on(15, 25));
        assert_eq!(refined.count_on(), 144);
    }

    #[test]
    fn unit_kernels_leave_mask_untouched() {
        let mask = filled(10, 10, (2, 2, 3, 3));
        let settings = DetectionSettings::new(50, 1, 1).unwrap();
        assert_eq!(MaskRefiner::new(&settings).refine(&mask), mask);
    }
}
