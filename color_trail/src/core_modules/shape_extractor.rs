// THEORY:
// The `shape_extractor` is the spatial grouping stage. It turns a refined mask into
// a list of connected foreground regions and then picks the one worth tracking.
//
// Algorithm steps:
// 1.  **Labelling**: `imageproc` labels every 8-connected foreground component.
// 2.  **Raster Ordering**: The label image is scanned top-to-bottom, left-to-right.
//     The first pixel met for a label becomes that region's seed, so regions come out
//     in the order of their top-most, then left-most pixel whatever the label values.
// 3.  **Contour Tracing**: Outer borders from `imageproc`'s border follower are
//     attached to the region their first point belongs to. Hole borders are ignored.
// 4.  **Selection**: The region with the largest area (pixel count) wins. Equal areas
//     keep the earliest region in raster order. A winner whose area does not exceed
//     the minimum-area gate is discarded: the frame has no detection.

use crate::core_modules::mask::{Mask, OFF};
use image::Luma;
use imageproc::contours::{BorderType, find_contours};
use imageproc::region_labelling::{Connectivity, connected_components};

/// A pixel coordinate inside a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// One connected foreground component.
#[derive(Debug, Clone)]
pub struct Region {
    /// The first pixel found in raster order.
    pub seed: Point,
    /// Every pixel in the component.
    pub pixels: Vec<Point>,
    /// Outer boundary of the component, in tracing order.
    pub contour: Vec<Point>,
    /// Top-left and bottom-right corners, inclusive.
    pub bounding_box: (Point, Point),
}

impl Region {
    fn seeded(seed: Point) -> Self {
        Self {
            seed,
            pixels: Vec::new(),
            contour: Vec::new(),
            bounding_box: (seed, seed),
        }
    }

    fn absorb(&mut self, p: Point) {
        let (min, max) = &mut self.bounding_box;
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        self.pixels.push(p);
    }

    /// Enclosed area in pixels.
    pub fn area(&self) -> usize {
        self.pixels.len()
    }
}

/// Finds all 8-connected components of the mask, in raster order of their seeds.
pub fn find_regions(mask: &Mask) -> Vec<Region> {
    let labels = connected_components(mask.as_gray(), Connectivity::Eight, Luma([OFF]));

    // label -> index into `regions`
    let mut slots: Vec<Option<usize>> = Vec::new();
    let mut regions: Vec<Region> = Vec::new();

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 {
            continue;
        }
        if slots.len() <= label {
            slots.resize(label + 1, None);
        }
        let point = Point { x, y };
        let index = match slots[label] {
            Some(index) => index,
            None => {
                regions.push(Region::seeded(point));
                slots[label] = Some(regions.len() - 1);
                regions.len() - 1
            }
        };
        regions[index].absorb(point);
    }

    for contour in find_contours::<u32>(mask.as_gray()) {
        if !matches!(contour.border_type, BorderType::Outer) {
            continue;
        }
        let Some(start) = contour.points.first() else {
            continue;
        };
        let label = labels.get_pixel(start.x, start.y).0[0] as usize;
        if let Some(Some(index)) = slots.get(label) {
            regions[*index]
                .contour
                .extend(contour.points.iter().map(|p| Point { x: p.x, y: p.y }));
        }
    }

    regions
}

/// Picks the largest region, or `None` if it does not exceed `min_area`.
/// Ties go to the region that appears first in raster order.
pub fn select_largest(regions: &[Region], min_area: usize) -> Option<&Region> {
    let mut best: Option<&Region> = None;
    for region in regions {
        match best {
            Some(current) if region.area() <= current.area() => {}
            _ => best = Some(region),
        }
    }
    best.filter(|region| region.area() > min_area)
}
