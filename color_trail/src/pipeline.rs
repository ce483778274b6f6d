// THEORY:
// The `pipeline` module is the top-level API of the tracking engine. It wires the
// stateless detection stages into a single per-frame transform and feeds the result
// into the trajectory accumulator, then drives the renderer once the run is complete.
//
// Pipeline per frame:
//   RGB frame -> classifier (HSV mask) -> refiner (blur, open, close)
//             -> shape extractor (largest region above the area gate)
//             -> centroid estimator -> trajectory accumulator
//
// Key architectural principles:
// 1.  **Pure Detection**: `Detector::detect` maps one frame to an optional position with
//     no memory, so detection can be tested without any video I/O.
// 2.  **Sequential Runs**: One frame is fully processed before the next is pulled from
//     the source; ordering of the trajectory holds by construction.
// 3.  **I/O at the Seams**: Decoding and encoding live behind the `FrameSource` and
//     `FrameSink` traits, implemented by the binary with its video backend.
// 4.  **Gaps, Not Aborts**: A frame with nothing to track, or a degenerate frame, is
//     recorded as a gap and the run continues. Configuration errors surface before
//     the first frame is read.

use crate::config::{DetectionSettings, RenderSettings, TrackerConfig};
use crate::core_modules::centroid::centroid;
use crate::core_modules::classifier::classify;
use crate::core_modules::color_registry::{ColorDefinition, ColorRegistry};
use crate::core_modules::refiner::MaskRefiner;
use crate::core_modules::renderer::TrajectoryRenderer;
use crate::core_modules::shape_extractor::{find_regions, select_largest};
use crate::core_modules::trajectory::TrajectoryAccumulator;
use crate::error::{Result, TrailError};
use image::RgbImage;
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::renderer::RenderMode;
pub use crate::core_modules::trajectory::{FrameObservation, Position, Trajectory};

/// Resolution and frame rate of a video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// A decoder handing out frames in presentation order.
pub trait FrameSource {
    fn info(&self) -> VideoInfo;

    /// The next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// An encoder accepting frames in presentation order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flushes and closes the output.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The stateless per-frame detector for one color.
#[derive(Debug, Clone)]
pub struct Detector<'a> {
    definition: &'a ColorDefinition,
    refiner: MaskRefiner,
    min_area: usize,
}

impl<'a> Detector<'a> {
    pub fn new(definition: &'a ColorDefinition, settings: &DetectionSettings) -> Self {
        Self {
            definition,
            refiner: MaskRefiner::new(settings),
            min_area: settings.min_area(),
        }
    }

    pub fn definition(&self) -> &ColorDefinition {
        self.definition
    }

    /// The centroid of the largest qualifying region, or `None` if nothing qualifies.
    pub fn detect(&self, frame: &RgbImage) -> Result<Option<Position>> {
        let raw = classify(frame, self.definition)?;
        let refined = self.refiner.refine(&raw);
        let regions = find_regions(&refined);
        match select_largest(&regions, self.min_area) {
            Some(region) => Ok(Some(centroid(region)?)),
            None => Ok(None),
        }
    }
}

/// One-shot convenience around `Detector`.
pub fn detect(frame: &RgbImage, definition: &ColorDefinition, settings: &DetectionSettings) -> Result<Option<Position>> {
    Detector::new(definition, settings).detect(frame)
}

/// A single tracking run for one color.
pub struct TrackingPipeline<'a> {
    detector: Detector<'a>,
    accumulator: TrajectoryAccumulator,
}

impl<'a> TrackingPipeline<'a> {
    /// Resolves the color and validates the frame rate before any frame is read.
    pub fn new(registry: &'a ColorRegistry, color: &str, config: &TrackerConfig, fps: f64) -> Result<Self> {
        let definition = registry.lookup(color)?;
        Ok(Self {
            detector: Detector::new(definition, &config.detection),
            accumulator: TrajectoryAccumulator::new(fps)?,
        })
    }

    /// Detects in `frame` and appends the outcome. Degenerate frames are recorded as gaps.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<FrameObservation> {
        let position = match self.detector.detect(frame) {
            Ok(position) => position,
            Err(TrailError::InvalidFrame { width, height }) => {
                warn!(frame = self.accumulator.frame_count(), width, height, "degenerate frame recorded as a gap");
                None
            }
            Err(other) => return Err(other),
        };
        let observation = self.accumulator.record(position);
        match observation.position {
            Some(p) => debug!(frame = observation.frame_index, x = p.x, y = p.y, "detected"),
            None => debug!(frame = observation.frame_index, "no detection"),
        }
        Ok(observation)
    }

    /// Processes every frame of `source`.
    pub fn run(self, source: &mut dyn FrameSource) -> Result<Trajectory> {
        self.run_with_cancel(source, |_, _| Ok(false))
    }

    /// Processes `source` until it ends or `cancelled` returns true.
    ///
    /// `cancelled` is called once per frame, after the frame has been recorded, with the
    /// decoded frame and its observation. A cancelled run returns what was accumulated
    /// so far, including that frame. An error from `cancelled` aborts the run.
    pub fn run_with_cancel(
        mut self,
        source: &mut dyn FrameSource,
        mut cancelled: impl FnMut(&RgbImage, &FrameObservation) -> Result<bool>,
    ) -> Result<Trajectory> {
        let info = source.info();
        info!(
            color = %self.detector.definition().name,
            width = info.width,
            height = info.height,
            fps = info.fps,
            "tracking started"
        );
        while let Some(frame) = source.next_frame()? {
            let observation = self.process_frame(&frame)?;
            if cancelled(&frame, &observation)? {
                info!(frames = self.accumulator.frame_count(), "tracking cancelled");
                break;
            }
        }
        let trajectory = self.finish();
        info!(
            frames = trajectory.len(),
            detections = trajectory.detection_count(),
            "tracking finished"
        );
        Ok(trajectory)
    }

    pub fn trajectory(&self) -> &Trajectory {
        self.accumulator.trajectory()
    }

    pub fn finish(self) -> Trajectory {
        self.accumulator.finish()
    }
}

/// Renders `trajectory` frame by frame into `sink` and returns the frame count.
///
/// In overlay mode each output frame is drawn over the next frame of `source`; once
/// the source runs dry the remaining frames use a black canvas.
#[allow(clippy::too_many_arguments)]
pub fn render_trajectory(
    trajectory: &Trajectory,
    definition: &ColorDefinition,
    settings: RenderSettings,
    mode: RenderMode,
    width: u32,
    height: u32,
    mut source: Option<&mut dyn FrameSource>,
    sink: &mut dyn FrameSink,
) -> Result<usize> {
    let mut renderer = TrajectoryRenderer::new(trajectory, definition, settings, mode, width, height)?;
    let mut source_exhausted = false;
    let mut written = 0;

    info!(frames = trajectory.len(), width, height, ?mode, "rendering trail");
    loop {
        let background = match (mode, source.as_deref_mut()) {
            (RenderMode::Overlay, Some(src)) if !source_exhausted => {
                let frame = src.next_frame()?;
                if frame.is_none() {
                    warn!(frame = written, "source video ended before the trajectory; using a blank canvas");
                    source_exhausted = true;
                }
                frame
            }
            _ => None,
        };
        let Some(frame) = renderer.render_next(background.as_ref())? else {
            break;
        };
        sink.write_frame(&frame)?;
        written += 1;
    }
    sink.finish()?;
    info!(frames = written, "rendering finished");
    Ok(written)
}
