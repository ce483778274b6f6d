// THEORY:
// `trail_tester` is the command-line driver for the color_trail engine. It owns
// everything the library deliberately leaves out: argument parsing, log setup, video
// decoding and encoding through OpenCV, and the configuration file on disk.
//
// Key architectural principles:
// 1.  **Thin Shell**: Every subcommand resolves its inputs, hands them to the library
//     and reports the outcome. No detection or drawing logic lives here.
// 2.  **Fail Before Decoding**: The color name, settings and overrides are validated
//     before the first frame is read, so a typo never costs a full decode.
// 3.  **Errors With Context**: Library errors are wrapped with `anyhow::Context` naming
//     the file or step that failed.

mod video;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use color_trail::config::{load_config, save_config};
use color_trail::coordinates::{read_csv, write_csv};
use color_trail::pipeline::{FrameSource, RenderMode, TrackingPipeline, render_trajectory};
use color_trail::{BgrColor, ColorRegistry, DetectionSettings, RawRange, RenderSettings, TrackerConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use video::{PreviewWindow, VideoFileSink, VideoFileSource};

/// Margin added around the trajectory when no canvas size is known.
const CANVAS_MARGIN: i32 = 200;
/// Highest frame rate a container may report before it is treated as bogus.
const MAX_FPS: f64 = 1000.0;

#[derive(Parser, Debug)]
#[command(name = "trail_tester", about = "Track a colored object in a video and draw its trail")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track one color through a video.
    Track {
        video: PathBuf,
        #[arg(long)]
        color: String,
        /// Write the coordinate table here.
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,
        /// Write the trail on a black canvas here.
        #[arg(long, value_name = "PATH")]
        trail: Option<PathBuf>,
        /// Write the trail drawn over the source video here.
        #[arg(long, value_name = "PATH")]
        overlay: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Show each frame with the detection circled while tracking; `q` stops early.
        #[arg(long)]
        preview: bool,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Render a trail video from a coordinate table.
    Render {
        csv: PathBuf,
        #[arg(long)]
        color: String,
        /// Draw over this video instead of a black canvas.
        #[arg(long, value_name = "PATH")]
        source: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        output: PathBuf,
        #[arg(long, requires = "height")]
        width: Option<u32>,
        #[arg(long, requires = "width")]
        height: Option<u32>,
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List the registered colors.
    Colors {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Register a custom color and save it to the configuration file.
    AddColor {
        name: String,
        #[arg(long, value_parser = parse_hsv, value_name = "H,S,V")]
        lower: [i32; 3],
        #[arg(long, value_parser = parse_hsv, value_name = "H,S,V")]
        upper: [i32; 3],
        /// Lower bound of a second range, for hues split across 0.
        #[arg(long, value_parser = parse_hsv, value_name = "H,S,V", requires = "extra_upper")]
        extra_lower: Option<[i32; 3]>,
        #[arg(long, value_parser = parse_hsv, value_name = "H,S,V", requires = "extra_lower")]
        extra_upper: Option<[i32; 3]>,
        #[arg(long, value_parser = parse_bgr, value_name = "B,G,R")]
        track: [u8; 3],
        #[arg(long, value_parser = parse_bgr, value_name = "B,G,R")]
        highlight: [u8; 3],
        /// Display name; defaults to the color name.
        #[arg(long)]
        label: Option<String>,
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
    },
}

/// Command-line values that take precedence over the configuration file.
#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(long)]
    line_thickness: Option<i64>,
    #[arg(long)]
    marker_radius: Option<i64>,
    #[arg(long)]
    alpha: Option<f64>,
    #[arg(long)]
    min_area: Option<i64>,
}

impl Overrides {
    fn apply(&self, config: TrackerConfig) -> Result<TrackerConfig> {
        let detection = DetectionSettings::new(
            self.min_area.unwrap_or(config.detection.min_area() as i64),
            config.detection.morphology_kernel_size() as i64,
            config.detection.blur_kernel_size() as i64,
        )?;
        let render = RenderSettings::new(
            self.line_thickness.unwrap_or(config.render.line_thickness() as i64),
            self.marker_radius.unwrap_or(config.render.marker_radius() as i64),
            self.alpha.unwrap_or(config.render.overlay_alpha() as f64),
        )?;
        Ok(TrackerConfig {
            detection,
            render,
            default_fps: config.default_fps,
        })
    }
}

fn parse_triple<T: std::str::FromStr>(text: &str) -> std::result::Result<[T; 3], String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let [a, b, c] = parts.as_slice() else {
        return Err(format!("expected three comma-separated values, got `{text}`"));
    };
    let parse = |s: &str| s.parse::<T>().map_err(|_| format!("`{s}` is not a valid channel value"));
    Ok([parse(*a)?, parse(*b)?, parse(*c)?])
}

fn parse_hsv(text: &str) -> std::result::Result<[i32; 3], String> {
    parse_triple(text)
}

fn parse_bgr(text: &str) -> std::result::Result<[u8; 3], String> {
    parse_triple(text)
}

/// The container's frame rate, or `fallback` when it reports none or an absurd one.
fn usable_fps(reported: f64, fallback: f64) -> f64 {
    if reported > 0.0 && reported <= MAX_FPS {
        reported
    } else {
        tracing::warn!(reported, fallback, "video reports no usable frame rate");
        fallback
    }
}

fn load(config: Option<&Path>) -> Result<(ColorRegistry, TrackerConfig)> {
    match config {
        Some(path) => load_config(path).with_context(|| format!("failed to load config {}", path.display())),
        None => Ok((ColorRegistry::with_presets(), TrackerConfig::default())),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Track {
            video,
            color,
            csv,
            trail,
            overlay,
            config,
            preview,
            overrides,
        } => track(&video, &color, csv, trail, overlay, config.as_deref(), preview, &overrides),
        Command::Render {
            csv,
            color,
            source,
            output,
            width,
            height,
            config,
            overrides,
        } => render(
            &csv,
            &color,
            source.as_deref(),
            &output,
            width.zip(height),
            config.as_deref(),
            &overrides,
        ),
        Command::Colors { config } => list_colors(config.as_deref()),
        Command::AddColor {
            name,
            lower,
            upper,
            extra_lower,
            extra_upper,
            track,
            highlight,
            label,
            config,
        } => {
            let mut ranges: Vec<RawRange> = vec![[lower, upper]];
            if let (Some(lower), Some(upper)) = (extra_lower, extra_upper) {
                ranges.push([lower, upper]);
            }
            add_color(&name, &ranges, track, highlight, label.as_deref(), &config)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn track(
    video: &Path,
    color: &str,
    csv: Option<PathBuf>,
    trail: Option<PathBuf>,
    overlay: Option<PathBuf>,
    config: Option<&Path>,
    preview: bool,
    overrides: &Overrides,
) -> Result<()> {
    let (registry, config) = load(config)?;
    let config = overrides.apply(config)?;
    let definition = registry.lookup(color)?;

    let mut source = VideoFileSource::open(video).with_context(|| format!("failed to open {}", video.display()))?;
    let info = source.info();
    let fps = usable_fps(info.fps, config.default_fps);

    let pipeline = TrackingPipeline::new(&registry, color, &config, fps)?;
    let trajectory = if preview {
        let mut window = PreviewWindow::open(&definition.display_name, definition.highlight_color)?;
        pipeline.run_with_cancel(&mut source, |frame, observation| window.show(frame, observation))
    } else {
        pipeline.run(&mut source)
    }
    .context("tracking failed")?;
    println!(
        "{}: {} of {} frames had a detection",
        definition.display_name,
        trajectory.detection_count(),
        trajectory.len()
    );

    if let Some(path) = csv {
        write_csv(&path, &trajectory).with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = trail {
        let mut sink = VideoFileSink::create(&path, info.width, info.height, fps)?;
        render_trajectory(
            &trajectory,
            definition,
            config.render,
            RenderMode::Standalone,
            info.width,
            info.height,
            None,
            &mut sink,
        )
        .with_context(|| format!("failed to render {}", path.display()))?;
    }
    if let Some(path) = overlay {
        let mut replay = VideoFileSource::open(video)?;
        let mut sink = VideoFileSink::create(&path, info.width, info.height, fps)?;
        render_trajectory(
            &trajectory,
            definition,
            config.render,
            RenderMode::Overlay,
            info.width,
            info.height,
            Some(&mut replay),
            &mut sink,
        )
        .with_context(|| format!("failed to render {}", path.display()))?;
    }
    Ok(())
}

fn render(
    csv: &Path,
    color: &str,
    source: Option<&Path>,
    output: &Path,
    size: Option<(u32, u32)>,
    config: Option<&Path>,
    overrides: &Overrides,
) -> Result<()> {
    let (registry, config) = load(config)?;
    let config = overrides.apply(config)?;
    let definition = registry.lookup(color)?;
    let trajectory = read_csv(csv).with_context(|| format!("failed to read {}", csv.display()))?;

    let mut video = source.map(VideoFileSource::open).transpose()?;
    let (width, height, fps) = match (&video, size) {
        (_, Some((w, h))) => (
            w,
            h,
            video
                .as_ref()
                .map_or(config.default_fps, |v| usable_fps(v.info().fps, config.default_fps)),
        ),
        (Some(v), None) => (v.info().width, v.info().height, usable_fps(v.info().fps, config.default_fps)),
        (None, None) => {
            let Some((_, max)) = trajectory.bounds() else {
                bail!("{} has no detections; pass --width and --height", csv.display());
            };
            (
                (max.x.max(0) + CANVAS_MARGIN) as u32,
                (max.y.max(0) + CANVAS_MARGIN) as u32,
                config.default_fps,
            )
        }
    };
    let mode = if video.is_some() {
        RenderMode::Overlay
    } else {
        RenderMode::Standalone
    };

    let mut sink = VideoFileSink::create(output, width, height, fps)?;
    let frames = render_trajectory(
        &trajectory,
        definition,
        config.render,
        mode,
        width,
        height,
        video.as_mut().map(|v| v as &mut dyn FrameSource),
        &mut sink,
    )
    .with_context(|| format!("failed to render {}", output.display()))?;
    println!("wrote {frames} frames to {}", output.display());
    Ok(())
}

fn list_colors(config: Option<&Path>) -> Result<()> {
    let (registry, _) = load(config)?;
    for definition in registry.list() {
        let ranges: Vec<String> = definition
            .ranges
            .iter()
            .map(|r| format!("{:?}-{:?}", r.lower, r.upper))
            .collect();
        println!(
            "{:<10} {:<12} track={:?} highlight={:?} hsv={}",
            definition.name,
            definition.display_name,
            definition.track_color.0,
            definition.highlight_color.0,
            ranges.join(" ")
        );
    }
    Ok(())
}

fn add_color(
    name: &str,
    ranges: &[RawRange],
    track: [u8; 3],
    highlight: [u8; 3],
    label: Option<&str>,
    config: &Path,
) -> Result<()> {
    let (mut registry, settings) = if config.exists() {
        load(Some(config))?
    } else {
        (ColorRegistry::with_presets(), TrackerConfig::default())
    };
    registry
        .register(name, ranges, BgrColor(track), BgrColor(highlight), label)
        .with_context(|| format!("cannot add color `{name}`"))?;
    save_config(config, &registry, &settings).with_context(|| format!("failed to save {}", config.display()))?;
    println!("added `{name}` to {}", config.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_triples_parse() {
        assert_eq!(parse_hsv("160, 100,100").unwrap(), [160, 100, 100]);
        assert_eq!(parse_bgr("203,192,255").unwrap(), [203, 192, 255]);
        assert!(parse_bgr("256,0,0").is_err());
        assert!(parse_hsv("1,2").is_err());
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let overrides = Overrides {
            min_area: Some(120),
            alpha: Some(0.5),
            ..Overrides::default()
        };
        let config = overrides.apply(TrackerConfig::default()).unwrap();
        assert_eq!(config.detection.min_area(), 120);
        assert_eq!(config.render.overlay_alpha(), 0.5);
        assert_eq!(config.render.line_thickness(), 6);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let overrides = Overrides {
            alpha: Some(1.5),
            ..Overrides::default()
        };
        assert!(overrides.apply(TrackerConfig::default()).is_err());
    }

    #[test]
    fn unusable_frame_rates_fall_back() {
        assert_eq!(usable_fps(29.97, 30.0), 29.97);
        assert_eq!(usable_fps(1000.0, 30.0), 1000.0);
        assert_eq!(usable_fps(0.0, 30.0), 30.0);
        assert_eq!(usable_fps(-1.0, 25.0), 25.0);
        assert_eq!(usable_fps(90_000.0, 30.0), 30.0);
        assert_eq!(usable_fps(f64::NAN, 30.0), 30.0);
    }

    #[test]
    fn preview_is_an_opt_in_track_flag() {
        let cli = Cli::try_parse_from(["trail_tester", "track", "ball.mp4", "--color", "yellow", "--preview"]).unwrap();
        let Command::Track { preview, .. } = cli.command else {
            panic!("expected the track subcommand");
        };
        assert!(preview);
        let cli = Cli::try_parse_from(["trail_tester", "track", "ball.mp4", "--color", "yellow"]).unwrap();
        assert!(matches!(cli.command, Command::Track { preview: false, .. }));
    }

    #[test]
    fn cli_shape_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
