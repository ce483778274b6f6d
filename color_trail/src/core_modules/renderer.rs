// THEORY:
// The `TrajectoryRenderer` turns a finished `Trajectory` into one output frame per
// observation, drawing the path as it grows over time.
//
// Key architectural principles:
// 1.  **Growing Trail**: Frame i adds the segment between observations i - 1 and i when
//     both carry a position. A gap breaks the line; nothing is ever drawn across it.
//     Because segments are only ever added, the trail at frame i is a visual prefix
//     of the trail at frame i + 1.
// 2.  **Persistent Trail Layer**: Segments are drawn once, with `imageproc`, into an
//     off-screen coverage layer. Each output frame paints that layer and the
//     current-position marker over a copy of its background.
// 3.  **Two Backgrounds, One Path**: Standalone mode paints over a black canvas at
//     full opacity; overlay mode weights the painted copy against the source frame
//     with the configured alpha, like a weighted add of two frames.
// 4.  **Clipping, Not Failing**: Shapes partially or fully outside the canvas are
//     clipped by the drawing primitives.

use crate::config::RenderSettings;
use crate::core_modules::color_registry::{BgrColor, ColorDefinition};
use crate::core_modules::mask::ON;
use crate::core_modules::trajectory::{Position, Trajectory};
use crate::error::{Result, TrailError};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::map::map_colors2;
use imageproc::point::Point;

/// Where the trail is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Over a black canvas.
    Standalone,
    /// Over the corresponding source frame.
    Overlay,
}

/// A straight piece of trail between two consecutive detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub from: Position,
    pub to: Position,
}

/// The segment that frame `frame` adds to the trail, if any: observations `frame - 1`
/// and `frame` must both exist and both carry a position.
pub fn segment_ending_at(trajectory: &Trajectory, frame: usize) -> Option<Segment> {
    let previous = trajectory.get(frame.checked_sub(1)?)?;
    let current = trajectory.get(frame)?;
    Some(Segment {
        from: previous.position?,
        to: current.position?,
    })
}

/// Frame-by-frame trail renderer.
pub struct TrajectoryRenderer<'a> {
    trajectory: &'a Trajectory,
    track_color: Rgb<u8>,
    highlight_color: Rgb<u8>,
    settings: RenderSettings,
    mode: RenderMode,
    width: u32,
    height: u32,
    /// Coverage of every trail segment drawn so far.
    layer: GrayImage,
    /// Index of the next frame to produce.
    next_frame: usize,
}

fn rgb(color: BgrColor) -> Rgb<u8> {
    Rgb(color.to_rgb())
}

fn blend(under: Rgb<u8>, over: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix = |u: u8, o: u8| (u as f32 * (1.0 - alpha) + o as f32 * alpha).round() as u8;
    Rgb([mix(under.0[0], over.0[0]), mix(under.0[1], over.0[1]), mix(under.0[2], over.0[2])])
}

impl<'a> TrajectoryRenderer<'a> {
    pub fn new(
        trajectory: &'a Trajectory,
        definition: &ColorDefinition,
        settings: RenderSettings,
        mode: RenderMode,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TrailError::InvalidFrame { width, height });
        }
        Ok(Self {
            trajectory,
            track_color: rgb(definition.track_color),
            highlight_color: rgb(definition.highlight_color),
            settings,
            mode,
            width,
            height,
            layer: GrayImage::new(width, height),
            next_frame: 0,
        })
    }

    /// Renders the next frame, or `None` once every observation has been drawn.
    ///
    /// In overlay mode `background` should be the matching source frame; `None`
    /// falls back to a black canvas. Standalone mode ignores it.
    pub fn render_next(&mut self, background: Option<&RgbImage>) -> Result<Option<RgbImage>> {
        let Some(observation) = self.trajectory.get(self.next_frame).copied() else {
            return Ok(None);
        };
        if let Some(segment) = segment_ending_at(self.trajectory, self.next_frame) {
            self.draw_segment(segment);
        }
        self.next_frame += 1;

        let (base, alpha) = match (self.mode, background) {
            (RenderMode::Overlay, Some(frame)) => {
                if frame.dimensions() != (self.width, self.height) {
                    return Err(TrailError::Video(format!(
                        "source frame is {}x{}, expected {}x{}",
                        frame.width(),
                        frame.height(),
                        self.width,
                        self.height
                    )));
                }
                (frame.clone(), self.settings.overlay_alpha())
            }
            (RenderMode::Overlay, None) => (RgbImage::new(self.width, self.height), self.settings.overlay_alpha()),
            (RenderMode::Standalone, _) => (RgbImage::new(self.width, self.height), 1.0),
        };

        let mut painted = base.clone();
        for (x, y, coverage) in self.layer.enumerate_pixels() {
            if coverage.0[0] == ON {
                painted.put_pixel(x, y, self.track_color);
            }
        }
        if let Some(position) = observation.position {
            draw_filled_circle_mut(
                &mut painted,
                (position.x, position.y),
                self.settings.marker_radius() as i32,
                self.highlight_color,
            );
        }

        if alpha >= 1.0 {
            return Ok(Some(painted));
        }
        Ok(Some(map_colors2(&base, &painted, |under: Rgb<u8>, over: Rgb<u8>| {
            blend(under, over, alpha)
        })))
    }

    /// Draws a segment into the trail layer as a thick line with round caps.
    fn draw_segment(&mut self, segment: Segment) {
        let thickness = self.settings.line_thickness();
        let a = (segment.from.x as f32, segment.from.y as f32);
        let b = (segment.to.x as f32, segment.to.y as f32);
        let on = Luma([ON]);

        if thickness <= 1 {
            draw_line_segment_mut(&mut self.layer, a, b, on);
            return;
        }

        let radius = thickness as f32 / 2.0;
        let cap = (thickness / 2) as i32;
        draw_filled_circle_mut(&mut self.layer, (segment.from.x, segment.from.y), cap, on);
        draw_filled_circle_mut(&mut self.layer, (segment.to.x, segment.to.y), cap, on);

        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 {
            return;
        }
        let (nx, ny) = (-dy / length * radius, dx / length * radius);
        let corner = |p: (f32, f32), sign: f32| {
            Point::new((p.0 + sign * nx).round() as i32, (p.1 + sign * ny).round() as i32)
        };
        let body = [corner(a, 1.0), corner(b, 1.0), corner(b, -1.0), corner(a, -1.0)];
        if body[0] == body[3] {
            draw_line_segment_mut(&mut self.layer, a, b, on);
        } else {
            draw_polygon_mut(&mut self.layer, &body, on);
        }
    }
}
