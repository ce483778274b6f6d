// THEORY:
// The `ColorRegistry` is the table of every color the engine knows how to track.
// It is an explicit object, built once before a run and handed by shared reference to
// the pipeline and the renderer. There is no process-wide singleton.
//
// Key architectural principles:
// 1.  **Colors Are Data, Not Code**: Adding a color never adds a code path. A
//     `ColorDefinition` is validated data (one or more HSV ranges plus two render
//     colors) consumed by a single, fixed detection algorithm.
// 2.  **Append-Only Lifecycle**: Presets are registered at construction, custom
//     colors after. Nothing is ever overwritten; a duplicate name is an error and
//     leaves the registry untouched.
// 3.  **Eager Validation**: A malformed range is rejected at `register` time so the
//     frame loop never meets a bad definition.
// 4.  **Stable Order**: `list()` yields definitions in registration order, presets
//     first, and can be restarted as often as the caller likes.

use crate::core_modules::pixel::pixel::{HUE_MAX, Hsv, SV_MAX};
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A range exactly as a caller writes it: `[[h, s, v], [h, s, v]]` (lower, upper).
/// Signed so out-of-domain input can be reported instead of silently wrapping.
pub type RawRange = [[i32; 3]; 2];

/// A render color in `[blue, green, red]` channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BgrColor(pub [u8; 3]);

impl BgrColor {
    pub const BLACK: BgrColor = BgrColor([0, 0, 0]);

    /// The same color in `[red, green, blue]` order, ready for an `image::Rgb`.
    pub fn to_rgb(self) -> [u8; 3] {
        let [b, g, r] = self.0;
        [r, g, b]
    }
}

/// One validated inclusion range in the 8-bit HSV domain.
///
/// When `lower.hue > upper.hue` the hue interval wraps through 0, so
/// `[170..=10]` covers both ends of the color wheel. Saturation and value never wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    /// Validates a raw range against the channel domains.
    pub fn new(color_name: &str, raw: RawRange) -> std::result::Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRange {
            name: color_name.to_string(),
            reason,
        };
        let maxima = [HUE_MAX as i32, SV_MAX as i32, SV_MAX as i32];
        let labels = ["hue", "saturation", "value"];

        for bound in raw.iter() {
            for channel in 0..3 {
                if bound[channel] < 0 || bound[channel] > maxima[channel] {
                    return Err(invalid(format!(
                        "{} bound {} outside 0..={}",
                        labels[channel], bound[channel], maxima[channel]
                    )));
                }
            }
        }
        // Hue (channel 0) may wrap; saturation and value may not.
        for channel in 1..3 {
            if raw[0][channel] > raw[1][channel] {
                return Err(invalid(format!(
                    "{} lower bound {} exceeds upper bound {}",
                    labels[channel], raw[0][channel], raw[1][channel]
                )));
            }
        }

        let narrow = |b: [i32; 3]| [b[0] as u8, b[1] as u8, b[2] as u8];
        Ok(Self {
            lower: narrow(raw[0]),
            upper: narrow(raw[1]),
        })
    }

    pub fn wraps_hue(&self) -> bool {
        self.lower[0] > self.upper[0]
    }

    #[inline]
    pub fn contains(&self, hsv: Hsv) -> bool {
        let hue_ok = if self.wraps_hue() {
            hsv.hue >= self.lower[0] || hsv.hue <= self.upper[0]
        } else {
            hsv.hue >= self.lower[0] && hsv.hue <= self.upper[0]
        };
        hue_ok
            && hsv.saturation >= self.lower[1]
            && hsv.saturation <= self.upper[1]
            && hsv.value >= self.lower[2]
            && hsv.value <= self.upper[2]
    }

    pub fn to_raw(&self) -> RawRange {
        let widen = |b: [u8; 3]| [b[0] as i32, b[1] as i32, b[2] as i32];
        [widen(self.lower), widen(self.upper)]
    }
}

/// Everything the engine needs to find and draw one color.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorDefinition {
    /// The lookup key, e.g. `"yellow"`.
    pub name: String,
    /// A human-facing label; defaults to `name`.
    pub display_name: String,
    /// Inclusion ranges, OR-ed together by the classifier.
    pub ranges: Vec<HsvRange>,
    /// Color of the trail polyline.
    pub track_color: BgrColor,
    /// Color of the current-position marker.
    pub highlight_color: BgrColor,
}

impl ColorDefinition {
    pub fn matches(&self, hsv: Hsv) -> bool {
        self.ranges.iter().any(|range| range.contains(hsv))
    }
}

struct Preset {
    name: &'static str,
    display_name: &'static str,
    ranges: &'static [RawRange],
    track: [u8; 3],
    highlight: [u8; 3],
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "yellow",
        display_name: "Yellow",
        ranges: &[[[15, 50, 50], [35, 255, 255]]],
        track: [0, 255, 0],
        highlight: [0, 255, 255],
    },
    Preset {
        name: "red",
        display_name: "Red",
        ranges: &[[[0, 100, 100], [10, 255, 255]], [[170, 100, 100], [180, 255, 255]]],
        track: [255, 0, 0],
        highlight: [0, 0, 255],
    },
    Preset {
        name: "blue",
        display_name: "Blue",
        ranges: &[[[100, 100, 100], [130, 255, 255]]],
        track: [0, 255, 255],
        highlight: [255, 0, 0],
    },
    Preset {
        name: "green",
        display_name: "Green",
        ranges: &[[[40, 100, 100], [80, 255, 255]]],
        track: [255, 0, 255],
        highlight: [0, 255, 0],
    },
    Preset {
        name: "orange",
        display_name: "Orange",
        ranges: &[[[10, 100, 100], [25, 255, 255]]],
        track: [0, 128, 255],
        highlight: [0, 165, 255],
    },
    Preset {
        name: "purple",
        display_name: "Purple",
        ranges: &[[[130, 100, 100], [160, 255, 255]]],
        track: [255, 255, 0],
        highlight: [128, 0, 128],
    },
];

/// The append-only table of named color definitions.
#[derive(Debug, Clone, Default)]
pub struct ColorRegistry {
    /// Definitions in registration order.
    definitions: Vec<ColorDefinition>,
    /// Name -> position in `definitions`.
    index: HashMap<String, usize>,
    /// How many leading entries are built-in presets.
    preset_count: usize,
}

impl ColorRegistry {
    /// A registry with no colors at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in presets.
    pub fn with_presets() -> Self {
        let mut registry = Self::empty();
        for preset in PRESETS {
            registry
                .register(
                    preset.name,
                    preset.ranges,
                    BgrColor(preset.track),
                    BgrColor(preset.highlight),
                    Some(preset.display_name),
                )
                .expect("built-in presets are valid and unique");
        }
        registry.preset_count = registry.definitions.len();
        registry
    }

    /// Adds a new color. Fails without touching the registry if the name is taken
    /// or any range is malformed.
    pub fn register(
        &mut self,
        name: &str,
        hsv_ranges: &[RawRange],
        track_color: BgrColor,
        highlight_color: BgrColor,
        display_name: Option<&str>,
    ) -> Result<&ColorDefinition> {
        if self.index.contains_key(name) {
            return Err(ConfigError::DuplicateColorName(name.to_string()).into());
        }
        if hsv_ranges.is_empty() {
            return Err(ConfigError::InvalidRange {
                name: name.to_string(),
                reason: "at least one range is required".to_string(),
            }
            .into());
        }
        let ranges = hsv_ranges
            .iter()
            .map(|raw| HsvRange::new(name, *raw))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let definition = ColorDefinition {
            name: name.to_string(),
            display_name: display_name.unwrap_or(name).to_string(),
            ranges,
            track_color,
            highlight_color,
        };
        tracing::debug!(color = name, ranges = hsv_ranges.len(), "registered color");

        let position = self.definitions.len();
        self.index.insert(name.to_string(), position);
        self.definitions.push(definition);
        Ok(&self.definitions[position])
    }

    pub fn lookup(&self, name: &str) -> Result<&ColorDefinition> {
        self.index
            .get(name)
            .map(|&position| &self.definitions[position])
            .ok_or_else(|| ConfigError::UnknownColorName(name.to_string()).into())
    }

    /// Every definition in registration order, presets first. The iterator is
    /// cheap to clone, so it can be restarted.
    pub fn list(&self) -> std::slice::Iter<'_, ColorDefinition> {
        self.definitions.iter()
    }

    /// Only the colors added after the presets.
    pub fn custom(&self) -> &[ColorDefinition] {
        &self.definitions[self.preset_count..]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
