//! papercut-bench: build a scene from a saved segmentation response and
//! report what happened.
//!
//! Loads a response file (the service envelope or a bare mask payload),
//! applies any layer gestures given on the command line, builds the
//! scene, and prints per-layer diagnostics. Useful for:
//!
//! - Tuning the cutout and merge thresholds against real masks
//! - Checking how a response shape normalizes
//! - Spotting slow or broken mask references
//! - Exporting panel textures for inspection
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin papercut-bench -- [OPTIONS] <RESPONSE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod gesture;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use papercut_io::HttpFetcher;
use papercut_pipeline::{DepthOrder, Offset, ResampleFilter, SceneConfig, SceneDiagnostics};
use tracing_subscriber::EnvFilter;

use crate::gesture::Gesture;

/// Scene building and diagnostics for papercut.
///
/// Builds a depth-layered cutout scene from a segmentation response and
/// prints per-layer timing and outcome diagnostics.
#[derive(Parser)]
#[command(name = "papercut-bench", version)]
struct Cli {
    /// Path to the segmentation response (JSON).
    response_path: PathBuf,

    /// Source image. Defaults to the response's embedded `originalImage`.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Working resolution (side of the square every raster is resampled to).
    #[arg(long, default_value_t = SceneConfig::DEFAULT_WORKING_RESOLUTION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    working_resolution: u32,

    /// Resampling filter (nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    resample_filter: Filter,

    /// Cutout foreground threshold on the mask's red channel.
    #[arg(long, default_value_t = SceneConfig::DEFAULT_CUTOUT_THRESHOLD)]
    cutout_threshold: u8,

    /// Merge inclusion threshold on the mask's red channel.
    #[arg(long, default_value_t = SceneConfig::DEFAULT_MERGE_THRESHOLD)]
    merge_threshold: u8,

    /// Z spacing between layers in world units.
    #[arg(long, default_value_t = SceneConfig::DEFAULT_DEPTH_STEP)]
    depth_step: f32,

    /// Which end of the layer list is nearest the camera.
    #[arg(long, value_enum, default_value_t = Order::FirstIsBack)]
    depth_order: Order,

    /// Distance of each shadow behind its panel.
    #[arg(long, default_value_t = SceneConfig::DEFAULT_SHADOW_OFFSET)]
    shadow_offset: f32,

    /// Shadow opacity (0.0-1.0).
    #[arg(long, default_value_t = SceneConfig::DEFAULT_SHADOW_OPACITY)]
    shadow_opacity: f32,

    /// Shadow horizontal shift in world units.
    #[arg(long, default_value_t = SceneConfig::DEFAULT_SHADOW_SHIFT.x, allow_hyphen_values = true)]
    shadow_shift_x: f32,

    /// Shadow vertical shift in world units.
    #[arg(long, default_value_t = SceneConfig::DEFAULT_SHADOW_SHIFT.y, allow_hyphen_values = true)]
    shadow_shift_y: f32,

    /// Shadow blur sigma in pixels (0 for a hard edge).
    #[arg(long, default_value_t = SceneConfig::DEFAULT_SHADOW_SOFTNESS)]
    shadow_softness: f32,

    /// Panel side length in world units.
    #[arg(long, default_value_t = SceneConfig::DEFAULT_PANEL_EXTENT)]
    panel_extent: f32,

    /// Per-mask fetch bound in seconds.
    #[arg(long, default_value_t = SceneConfig::DEFAULT_FETCH_TIMEOUT.as_secs_f64())]
    fetch_timeout: f64,

    /// Layer edit applied before building: `merge=S:T` or `reorder=F:T`.
    /// Repeatable; applied in the order given.
    #[arg(long = "gesture", value_name = "GESTURE")]
    gestures: Vec<Gesture>,

    /// Print the layer list before building.
    #[arg(long)]
    list: bool,

    /// Number of builds for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Write panel textures, shadows, `scene.json`, and `layers.json` to
    /// this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Full scene config as a JSON string.
    ///
    /// When provided, all other scene parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Log per-layer progress (overridden by `RUST_LOG`).
    #[arg(long, short)]
    verbose: bool,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, keeps masks binary).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Maps a [`ResampleFilter`] to the local CLI [`Filter`] enum.
const fn filter_from_pipeline(f: ResampleFilter) -> Filter {
    match f {
        ResampleFilter::Nearest => Filter::Nearest,
        ResampleFilter::Triangle => Filter::Triangle,
        ResampleFilter::CatmullRom => Filter::CatmullRom,
        ResampleFilter::Gaussian => Filter::Gaussian,
        ResampleFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// The CLI default filter, derived from [`SceneConfig::DEFAULT_RESAMPLE_FILTER`]
/// so the two cannot silently diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(SceneConfig::DEFAULT_RESAMPLE_FILTER);

/// Depth ordering selection.
#[derive(Clone, Copy, ValueEnum)]
enum Order {
    /// The first layer is the rearmost.
    FirstIsBack,
    /// The first layer is the frontmost.
    FirstIsFront,
}

/// Build a [`SceneConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<SceneConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        SceneConfig {
            working_resolution: cli.working_resolution,
            resample_filter: match cli.resample_filter {
                Filter::Nearest => ResampleFilter::Nearest,
                Filter::Triangle => ResampleFilter::Triangle,
                Filter::CatmullRom => ResampleFilter::CatmullRom,
                Filter::Gaussian => ResampleFilter::Gaussian,
                Filter::Lanczos3 => ResampleFilter::Lanczos3,
            },
            cutout_threshold: cli.cutout_threshold,
            merge_threshold: cli.merge_threshold,
            depth_step: cli.depth_step,
            depth_order: match cli.depth_order {
                Order::FirstIsBack => DepthOrder::FirstIsBack,
                Order::FirstIsFront => DepthOrder::FirstIsFront,
            },
            shadow_offset: cli.shadow_offset,
            shadow_opacity: cli.shadow_opacity,
            shadow_shift: Offset::new(cli.shadow_shift_x, cli.shadow_shift_y),
            shadow_softness: cli.shadow_softness,
            panel_extent: cli.panel_extent,
            fetch_timeout: Duration::try_from_secs_f64(cli.fetch_timeout)
                .map_err(|e| format!("Invalid --fetch-timeout: {e}"))?,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let base_dir = cli
        .response_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let fetcher = match HttpFetcher::new(config.fetch_timeout) {
        Ok(f) => f.with_base_dir(base_dir),
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut session =
        match papercut_io::open_session(config.clone(), &cli.response_path, cli.image.as_deref())
            .await
        {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error loading {}: {e}", cli.response_path.display());
                return ExitCode::FAILURE;
            }
        };

    let (width, height) = session.source().dimensions();
    eprintln!(
        "Response: {} ({} layers)",
        cli.response_path.display(),
        session.store().len(),
    );
    eprintln!("Source: {width}x{height}");
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    for gesture in &cli.gestures {
        if let Err(e) = gesture.apply(&mut session, &fetcher).await {
            eprintln!("Gesture {gesture} rejected: {e}");
            return ExitCode::FAILURE;
        }
        tracing::info!(%gesture, layers = session.store().len(), "applied gesture");
    }

    if cli.list {
        print_layer_list(&session);
    }

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut last_scene = None;

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (scene, diagnostics) = session.build_with_diagnostics(&fetcher).await;
        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
        }

        all_diagnostics.push(diagnostics);
        last_scene = Some(scene);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    let Some(scene) = last_scene else {
        return ExitCode::FAILURE;
    };
    let scene = match scene.ensure_visible() {
        Ok(scene) => scene,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if scene.failed_count() > 0 {
        eprintln!(
            "Warning: {} layer(s) could not be loaded",
            scene.failed_count()
        );
    }

    if let Some(ref out_dir) = cli.out_dir {
        match papercut_io::export_scene(&scene, out_dir) {
            Ok(manifest) => eprintln!(
                "Scene written to {} ({} panels)",
                out_dir.display(),
                manifest.panels.len(),
            ),
            Err(e) => {
                eprintln!("Error writing scene to {}: {e}", out_dir.display());
                return ExitCode::FAILURE;
            }
        }
        match papercut_io::write_layers(&session.snapshot(), out_dir) {
            Ok(path) => tracing::info!(path = %path.display(), "saved layer list"),
            Err(e) => {
                eprintln!("Error saving layers to {}: {e}", out_dir.display());
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_layer_list(session: &papercut_pipeline::Session) {
    println!("{:<6} {:<8} {:<7} Mask", "Pos", "Layer", "Merged");
    println!("{}", "-".repeat(60));
    for summary in session.snapshot().summaries() {
        println!(
            "{:<6} {:<8} {:<7} {}",
            summary.position,
            summary.id.to_string(),
            if summary.merged { "yes" } else { "" },
            summary.mask,
        );
    }
    println!();
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[SceneDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    let resample_mean = all_diagnostics
        .iter()
        .map(|d| d.resample_duration.as_secs_f64() * 1000.0)
        .sum::<f64>()
        / all_diagnostics.len() as f64;
    println!("Resample mean: {resample_mean:.3}ms");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("papercut-bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_scene_config() {
        let cli = parse(&["response.json"]);
        assert_eq!(config_from_cli(&cli).unwrap(), SceneConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "response.json",
            "--depth-step",
            "0.5",
            "--depth-order",
            "first-is-front",
            "--resample-filter",
            "nearest",
            "--shadow-shift-y",
            "-0.1",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!((config.depth_step - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.depth_order, DepthOrder::FirstIsFront);
        assert_eq!(config.resample_filter, ResampleFilter::Nearest);
        assert!((config.shadow_shift.y + 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn config_json_takes_precedence() {
        let cli = parse(&[
            "response.json",
            "--depth-step",
            "0.9",
            "--config-json",
            r#"{"merge_threshold": 40}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.merge_threshold, 40);
        assert!((config.depth_step - SceneConfig::DEFAULT_DEPTH_STEP).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cli = parse(&["response.json", "--shadow-opacity", "2"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("shadow_opacity"));
    }

    #[test]
    fn oversized_shadow_softness_is_rejected() {
        let cli = parse(&["response.json", "--shadow-softness", "1e9"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("shadow_softness"));

        let cli = parse(&["response.json", "--working-resolution", "100000"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("working_resolution"));
    }

    #[test]
    fn gestures_keep_command_line_order() {
        let cli = parse(&[
            "response.json",
            "--gesture",
            "merge=0:1",
            "--gesture",
            "reorder=1:0",
        ]);
        assert_eq!(
            cli.gestures,
            [
                Gesture::Merge {
                    source: 0,
                    target: 1
                },
                Gesture::Reorder { from: 1, to: 0 },
            ]
        );
    }
}
