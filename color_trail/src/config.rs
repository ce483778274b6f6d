// THEORY:
// The `config` module owns every tunable of a tracking run and the JSON file that
// persists them alongside user-defined colors.
//
// Key architectural principles:
// 1.  **Validated at Construction**: `DetectionSettings` and `RenderSettings` can only
//     be built through validating constructors (or `Default`), so the frame loop
//     never has to re-check a kernel size or an alpha.
// 2.  **Detection vs. Drawing**: Detection tuning (minimum area, kernel sizes) and
//     visual tuning (thickness, radius, alpha) are separate structs grouped in a
//     single `TrackerConfig`, immutable for the duration of one run.
// 3.  **Forgiving Files, Strict Values**: Every section and field of the JSON file is
//     optional, but any value that is present must be valid.

use crate::core_modules::color_registry::{BgrColor, ColorDefinition, ColorRegistry, RawRange};
use crate::error::{ConfigError, Result, TrailError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MIN_AREA: usize = 50;
pub const DEFAULT_MORPHOLOGY_KERNEL: u32 = 5;
pub const DEFAULT_BLUR_KERNEL: u32 = 5;
pub const DEFAULT_LINE_THICKNESS: u32 = 6;
pub const DEFAULT_MARKER_RADIUS: u32 = 8;
pub const DEFAULT_OVERLAY_ALPHA: f32 = 1.0;
pub const DEFAULT_FPS: f64 = 60.0;

/// Frame rates above this would give two frames the same millisecond timestamp.
pub const MAX_FPS: f64 = 1000.0;

/// Largest accepted kernel size; morphology radii must fit in a byte.
pub const MAX_KERNEL_SIZE: i64 = 255;

fn odd_kernel(which: &'static str, size: i64) -> std::result::Result<u32, ConfigError> {
    if size <= 0 || size % 2 == 0 || size > MAX_KERNEL_SIZE {
        return Err(ConfigError::InvalidKernelSize { which, size });
    }
    Ok(size as u32)
}

/// Validates a source frame rate for timestamp derivation.
pub fn validate_fps(fps: f64) -> std::result::Result<f64, ConfigError> {
    if !fps.is_finite() || fps <= 0.0 || fps > MAX_FPS {
        return Err(ConfigError::InvalidSetting {
            field: "fps",
            reason: format!("must be in (0, {MAX_FPS}], got {fps}"),
        });
    }
    Ok(fps)
}

/// Tunables for the per-frame detection stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    min_area: usize,
    morphology_kernel_size: u32,
    blur_kernel_size: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
            morphology_kernel_size: DEFAULT_MORPHOLOGY_KERNEL,
            blur_kernel_size: DEFAULT_BLUR_KERNEL,
        }
    }
}

impl DetectionSettings {
    /// Both kernel sizes must be positive, odd and at most `MAX_KERNEL_SIZE`. A blur kernel of 1 disables blurring.
    pub fn new(min_area: i64, morphology_kernel_size: i64, blur_kernel_size: i64) -> Result<Self> {
        if min_area < 0 {
            return Err(ConfigError::InvalidSetting {
                field: "min_area",
                reason: format!("must not be negative, got {min_area}"),
            }
            .into());
        }
        Ok(Self {
            min_area: min_area as usize,
            morphology_kernel_size: odd_kernel("morphology", morphology_kernel_size)?,
            blur_kernel_size: odd_kernel("blur", blur_kernel_size)?,
        })
    }

    /// A region must be strictly larger than this (in pixels) to count as a detection.
    pub fn min_area(&self) -> usize {
        self.min_area
    }

    pub fn morphology_kernel_size(&self) -> u32 {
        self.morphology_kernel_size
    }

    pub fn blur_kernel_size(&self) -> u32 {
        self.blur_kernel_size
    }
}

/// Tunables for drawing the trail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    line_thickness: u32,
    marker_radius: u32,
    overlay_alpha: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            line_thickness: DEFAULT_LINE_THICKNESS,
            marker_radius: DEFAULT_MARKER_RADIUS,
            overlay_alpha: DEFAULT_OVERLAY_ALPHA,
        }
    }
}

impl RenderSettings {
    pub fn new(line_thickness: i64, marker_radius: i64, overlay_alpha: f64) -> Result<Self> {
        if line_thickness < 1 || line_thickness > u32::MAX as i64 {
            return Err(ConfigError::InvalidSetting {
                field: "line_thickness",
                reason: format!("must be at least 1, got {line_thickness}"),
            }
            .into());
        }
        if marker_radius < 0 || marker_radius > u32::MAX as i64 {
            return Err(ConfigError::InvalidSetting {
                field: "highlight_circle_size",
                reason: format!("must not be negative, got {marker_radius}"),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&overlay_alpha) {
            return Err(ConfigError::InvalidSetting {
                field: "overlay_alpha",
                reason: format!("must be within [0, 1], got {overlay_alpha}"),
            }
            .into());
        }
        Ok(Self {
            line_thickness: line_thickness as u32,
            marker_radius: marker_radius as u32,
            overlay_alpha: overlay_alpha as f32,
        })
    }

    pub fn line_thickness(&self) -> u32 {
        self.line_thickness
    }

    pub fn marker_radius(&self) -> u32 {
        self.marker_radius
    }

    /// Opacity of the trail layer when composited over a source frame.
    pub fn overlay_alpha(&self) -> f32 {
        self.overlay_alpha
    }
}

/// Everything a run needs besides the colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub detection: DetectionSettings,
    pub render: RenderSettings,
    /// Frame rate for render-only runs that have no source video to read it from.
    pub default_fps: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            detection: DetectionSettings::default(),
            render: RenderSettings::default(),
            default_fps: DEFAULT_FPS,
        }
    }
}

// --- On-disk shape ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorEntry {
    /// All inclusion ranges for this color.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hsv_ranges: Vec<RawRange>,
    /// Single-range shorthand kept for older preset files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hsv_range: Option<RawRange>,
    pub track_color: BgrColor,
    pub highlight_color: BgrColor,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ColorEntry {
    fn all_ranges(&self) -> Vec<RawRange> {
        self.hsv_range
            .iter()
            .copied()
            .chain(self.hsv_ranges.iter().copied())
            .collect()
    }

    fn from_definition(definition: &ColorDefinition) -> Self {
        Self {
            hsv_ranges: definition.ranges.iter().map(|r| r.to_raw()).collect(),
            hsv_range: None,
            track_color: definition.track_color,
            highlight_color: definition.highlight_color,
            name: Some(definition.display_name.clone()),
        }
    }

    /// True when this entry describes exactly the given definition.
    fn describes(&self, definition: &ColorDefinition) -> bool {
        let ranges: Vec<RawRange> = definition.ranges.iter().map(|r| r.to_raw()).collect();
        self.all_ranges() == ranges
            && self.track_color == definition.track_color
            && self.highlight_color == definition.highlight_color
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSection {
    pub min_area: i64,
    pub morphology_kernel_size: i64,
    pub blur_kernel_size: i64,
}

impl Default for DetectionSection {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA as i64,
            morphology_kernel_size: DEFAULT_MORPHOLOGY_KERNEL as i64,
            blur_kernel_size: DEFAULT_BLUR_KERNEL as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectorySection {
    pub line_thickness: i64,
    pub highlight_circle_size: i64,
    pub overlay_alpha: f64,
    pub fps: f64,
}

impl Default for TrajectorySection {
    fn default() -> Self {
        Self {
            line_thickness: DEFAULT_LINE_THICKNESS as i64,
            highlight_circle_size: DEFAULT_MARKER_RADIUS as i64,
            overlay_alpha: DEFAULT_OVERLAY_ALPHA as f64,
            fps: DEFAULT_FPS,
        }
    }
}

/// The JSON configuration file: colors plus detection and trajectory tunables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Color name -> entry, in file order.
    pub colors: serde_json::Map<String, serde_json::Value>,
    pub detection: DetectionSection,
    pub trajectory: TrajectorySection,
}

impl ConfigFile {
    /// Validates the file and produces a populated registry and run config.
    ///
    /// File colors are registered after the presets. An entry that repeats a preset
    /// verbatim is accepted as-is; any other reuse of a taken name is a
    /// `DuplicateColorName`.
    pub fn resolve(&self) -> Result<(ColorRegistry, TrackerConfig)> {
        let detection = DetectionSettings::new(
            self.detection.min_area,
            self.detection.morphology_kernel_size,
            self.detection.blur_kernel_size,
        )?;
        let render = RenderSettings::new(
            self.trajectory.line_thickness,
            self.trajectory.highlight_circle_size,
            self.trajectory.overlay_alpha,
        )?;
        let default_fps = validate_fps(self.trajectory.fps)?;

        let mut registry = ColorRegistry::with_presets();
        for (name, value) in &self.colors {
            let entry: ColorEntry = serde_json::from_value(value.clone())?;
            if let Ok(existing) = registry.lookup(name) {
                if entry.describes(existing) {
                    continue;
                }
                return Err(ConfigError::DuplicateColorName(name.clone()).into());
            }
            registry.register(
                name,
                &entry.all_ranges(),
                entry.track_color,
                entry.highlight_color,
                entry.name.as_deref(),
            )?;
        }

        Ok((
            registry,
            TrackerConfig {
                detection,
                render,
                default_fps,
            },
        ))
    }

    /// Captures the custom colors of `registry` and all of `config`.
    pub fn from_parts(registry: &ColorRegistry, config: &TrackerConfig) -> Result<Self> {
        let mut colors = serde_json::Map::new();
        for definition in registry.custom() {
            let entry = ColorEntry::from_definition(definition);
            colors.insert(definition.name.clone(), serde_json::to_value(entry)?);
        }
        Ok(Self {
            colors,
            detection: DetectionSection {
                min_area: config.detection.min_area() as i64,
                morphology_kernel_size: config.detection.morphology_kernel_size() as i64,
                blur_kernel_size: config.detection.blur_kernel_size() as i64,
            },
            trajectory: TrajectorySection {
                line_thickness: config.render.line_thickness() as i64,
                highlight_circle_size: config.render.marker_radius() as i64,
                overlay_alpha: config.render.overlay_alpha() as f64,
                fps: config.default_fps,
            },
        })
    }
}

/// Parses configuration JSON text.
pub fn parse_config(text: &str) -> Result<(ColorRegistry, TrackerConfig)> {
    let file: ConfigFile = serde_json::from_str(text)?;
    file.resolve()
}

/// Loads and validates a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<(ColorRegistry, TrackerConfig)> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let resolved = parse_config(&text)?;
    tracing::info!(path = %path.display(), colors = resolved.0.len(), "loaded configuration");
    Ok(resolved)
}

/// Writes the custom colors and settings as pretty-printed JSON.
pub fn save_config(path: impl AsRef<Path>, registry: &ColorRegistry, config: &TrackerConfig) -> Result<()> {
    let path = path.as_ref();
    let file = ConfigFile::from_parts(registry, config)?;
    let text = serde_json::to_string_pretty(&file).map_err(TrailError::from)?;
    std::fs::write(path, text)?;
    tracing::info!(path = %path.display(), custom_colors = registry.custom().len(), "saved configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.detection.min_area(), 50);
        assert_eq!(config.detection.morphology_kernel_size(), 5);
        assert_eq!(config.detection.blur_kernel_size(), 5);
        assert_eq!(config.render.line_thickness(), 6);
        assert_eq!(config.render.marker_radius(), 8);
        assert_eq!(config.render.overlay_alpha(), 1.0);
        assert_eq!(config.default_fps, 60.0);
    }

    #[test]
    fn even_or_non_positive_kernels_are_rejected() {
        for (morph, blur) in [(4, 5), (5, 0), (-3, 5), (5, 2), (257, 5), (5, 301)] {
            let err = DetectionSettings::new(50, morph, blur).unwrap_err();
            assert!(
                matches!(err, TrailError::Config(ConfigError::InvalidKernelSize { .. })),
                "{morph} {blur}"
            );
        }
        assert!(DetectionSettings::new(50, 3, 1).is_ok());
        assert!(DetectionSettings::new(50, 255, 255).is_ok());
    }

    #[test]
    fn render_settings_validate_alpha_and_thickness() {
        assert!(RenderSettings::new(0, 8, 1.0).is_err());
        assert!(RenderSettings::new(6, -1, 1.0).is_err());
        assert!(RenderSettings::new(6, 8, 1.5).is_err());
        assert!(RenderSettings::new(6, 8, 0.5).is_ok());
    }

    #[test]
    fn fps_must_be_positive_and_bounded() {
        assert!(validate_fps(0.0).is_err());
        assert!(validate_fps(f64::NAN).is_err());
        assert!(validate_fps(2000.0).is_err());
        assert_eq!(validate_fps(29.97).unwrap(), 29.97);
    }

    #[test]
    fn empty_file_yields_presets_and_defaults() {
        let (registry, config) = parse_config("{}").unwrap();
        assert_eq!(registry.len(), 6);
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn file_colors_follow_presets_in_file_order() {
        let text = r#"{
            "colors": {
                "zeta": { "hsv_ranges": [[[90, 80, 80], [95, 255, 255]]],
                          "track_color": [1, 2, 3], "highlight_color": [4, 5, 6] },
                "alpha": { "hsv_range": [[140, 80, 80], [150, 255, 255]],
                           "track_color": [7, 8, 9], "highlight_color": [10, 11, 12],
                           "name": "Alpha" }
            },
            "detection": { "min_area": 80 }
        }"#;
        let (registry, config) = parse_config(text).unwrap();
        let custom: Vec<&str> = registry.custom().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(custom, ["zeta", "alpha"]);
        assert_eq!(registry.lookup("alpha").unwrap().display_name, "Alpha");
        assert_eq!(config.detection.min_area(), 80);
        assert_eq!(config.detection.morphology_kernel_size(), 5);
    }

    #[test]
    fn bad_kernel_in_file_fails_at_load() {
        let err = parse_config(r#"{ "detection": { "morphology_kernel_size": 4 } }"#).unwrap_err();
        assert!(matches!(err, TrailError::Config(ConfigError::InvalidKernelSize { size: 4, .. })));
    }

    #[test]
    fn verbatim_preset_is_tolerated_but_altered_preset_is_a_duplicate() {
        let same = r#"{ "colors": { "yellow": { "hsv_range": [[15, 50, 50], [35, 255, 255]],
            "track_color": [0, 255, 0], "highlight_color": [0, 255, 255] } } }"#;
        assert!(parse_config(same).is_ok());

        let altered = r#"{ "colors": { "yellow": { "hsv_range": [[20, 50, 50], [35, 255, 255]],
            "track_color": [0, 255, 0], "highlight_color": [0, 255, 255] } } }"#;
        assert!(matches!(
            parse_config(altered),
            Err(TrailError::Config(ConfigError::DuplicateColorName(_)))
        ));
    }

    #[test]
    fn save_then_load_preserves_custom_colors_and_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker_config.json");

        let mut registry = ColorRegistry::with_presets();
        registry
            .register(
                "pink",
                &[[[160, 100, 100], [180, 255, 255]]],
                BgrColor([203, 192, 255]),
                BgrColor([147, 20, 255]),
                Some("Pink"),
            )
            .unwrap();
        let config = TrackerConfig {
            detection: DetectionSettings::new(30, 3, 7).unwrap(),
            render: RenderSettings::new(10, 12, 0.5).unwrap(),
            default_fps: 30.0,
        };

        save_config(&path, &registry, &config).unwrap();
        let (loaded_registry, loaded_config) = load_config(&path).unwrap();

        assert_eq!(loaded_config, config);
        assert_eq!(loaded_registry.lookup("pink").unwrap(), registry.lookup("pink").unwrap());
        assert_eq!(loaded_registry.len(), registry.len());
    }
}
