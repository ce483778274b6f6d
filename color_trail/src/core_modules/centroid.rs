// THEORY:
// The `centroid` estimator reduces a selected region to a single position using its
// raw spatial moments: m00 (area), m10 (sum of x) and m01 (sum of y). The center is
// (m10 / m00, m01 / m00), rounded to the nearest pixel.
//
// A zero m00 means the region has no pixels. The area gate upstream already rejects
// such a region, so reaching it here is an internal invariant violation.

use crate::core_modules::shape_extractor::Region;
use crate::core_modules::trajectory::Position;
use crate::error::{Result, TrailError};

/// Zeroth- and first-order spatial moments of a region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    pub fn of(region: &Region) -> Self {
        region.pixels.iter().fold(Moments::default(), |acc, p| Moments {
            m00: acc.m00 + 1.0,
            m10: acc.m10 + p.x as f64,
            m01: acc.m01 + p.y as f64,
        })
    }

    /// Sub-pixel center of mass.
    pub fn center(&self) -> Result<(f64, f64)> {
        if self.m00 == 0.0 {
            return Err(TrailError::Internal("centroid of a region with zero area"));
        }
        Ok((self.m10 / self.m00, self.m01 / self.m00))
    }
}

/// The region's center of mass, rounded to integer pixel coordinates.
pub fn centroid(region: &Region) -> Result<Position> {
    let (x, y) = Moments::of(region).center()?;
    Ok(Position {
        x: x.round() as i32,
        y: y.round() as i32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::shape_extractor::Point;

    fn region(pixels: Vec<Point>) -> Region {
        let seed = pixels.first().copied().unwrap_or(Point { x: 0, y: 0 });
        Region {
            seed,
            contour: Vec::new(),
            bounding_box: (seed, seed),
            pixels,
        }
    }

    #[test]
    fn center_of_a_rectangle() {
        let mut pixels = Vec::new();
        for y in 10..20 {
            for x in 30..50 {
                pixels.push(Point { x, y });
            }
        }
        let moments = Moments::of(&region(pixels.clone()));
        assert_eq!(moments.m00, 200.0);
        assert_eq!(moments.center().unwrap(), (39.5, 14.5));
        // 39.5 and 14.5 round away from zero.
        assert_eq!(centroid(&region(pixels)).unwrap(), Position { x: 40, y: 15 });
    }

    #[test]
    fn empty_region_is_an_internal_error() {
        let err = centroid(&region(Vec::new())).unwrap_err();
        assert!(matches!(err, TrailError::Internal(_)));
    }
}
