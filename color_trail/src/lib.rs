// THEORY:
// This file is the main entry point for the `color_trail` library crate.
//
// The public surface is the `pipeline` module (`TrackingPipeline`, `Detector`,
// `render_trajectory` and the `FrameSource` / `FrameSink` seams), plus the pieces a
// caller configures or persists: the `ColorRegistry`, the settings in `config`, and
// the coordinate table codec in `coordinates`. The detection and rendering stages
// live in `core_modules` and are public so they can be exercised one at a time.

pub mod config;
pub mod coordinates;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::{DetectionSettings, RenderSettings, TrackerConfig};
pub use core_modules::color_registry::{BgrColor, ColorDefinition, ColorRegistry, HsvRange, RawRange};
pub use error::{ConfigError, OrderError, Result, TrailError};
