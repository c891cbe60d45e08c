use std::path::PathBuf;

use clap::Parser;
use gridstitch::stitcher::compose_canvas;
use gridstitch::{
    apply_initial_grid, project, EventSink, FsTileSource, GuessMode, LogLevel, OverlapConfig,
    OverlapSolver, Point2i, ProgressStep, RangeShrink, RelaxationSolver, SaveFlags, Size2i,
    TracingSink,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Grid mosaic stitcher (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "stitch.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Route solver events through the tracing subscriber.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GuessModeConfig {
    Stage,
    Result,
    Fixed,
}

impl From<GuessModeConfig> for GuessMode {
    fn from(value: GuessModeConfig) -> Self {
        match value {
            GuessModeConfig::Stage => GuessMode::Stage,
            GuessModeConfig::Result => GuessMode::Result,
            GuessModeConfig::Fixed => GuessMode::Fixed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ShrinkConfig {
    Quarter,
    Third,
}

impl From<ShrinkConfig> for RangeShrink {
    fn from(value: ShrinkConfig) -> Self {
        match value {
            ShrinkConfig::Quarter => RangeShrink::Quarter,
            ShrinkConfig::Third => RangeShrink::Third,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SolverConfigJson {
    guess_mode: GuessModeConfig,
    max_distance: f64,
    log_steps: u32,
    crop_size: [i32; 2],
    range_h: [i32; 2],
    range_v: [i32; 2],
    guess_h: [i32; 2],
    guess_v: [i32; 2],
    shrink: ShrinkConfig,
    parallel: bool,
}

impl Default for SolverConfigJson {
    fn default() -> Self {
        let cfg = OverlapConfig::default();
        Self {
            guess_mode: GuessModeConfig::Stage,
            max_distance: cfg.max_distance,
            log_steps: cfg.log_steps,
            crop_size: [cfg.crop_size.width, cfg.crop_size.height],
            range_h: [cfg.range_h.x, cfg.range_h.y],
            range_v: [cfg.range_v.x, cfg.range_v.y],
            guess_h: [cfg.guess_h.x, cfg.guess_h.y],
            guess_v: [cfg.guess_v.x, cfg.guess_v.y],
            shrink: ShrinkConfig::Quarter,
            parallel: cfg.parallel,
        }
    }
}

impl From<SolverConfigJson> for OverlapConfig {
    fn from(value: SolverConfigJson) -> Self {
        OverlapConfig {
            guess_mode: value.guess_mode.into(),
            max_distance: value.max_distance,
            log_steps: value.log_steps,
            crop_size: Size2i::new(value.crop_size[0], value.crop_size[1]),
            range_h: Point2i::new(value.range_h[0], value.range_h[1]),
            range_v: Point2i::new(value.range_v[0], value.range_v[1]),
            guess_h: Point2i::new(value.guess_h[0], value.guess_h[1]),
            guess_v: Point2i::new(value.guess_v[0], value.guess_v[1]),
            shrink: value.shrink.into(),
            parallel: value.parallel,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunConfig {
    input_project: PathBuf,
    output_project: PathBuf,
    #[serde(default)]
    overlaps_path: Option<PathBuf>,
    #[serde(default)]
    output_image: Option<PathBuf>,
    #[serde(default)]
    anchor: [i32; 2],
    #[serde(default = "default_iterations")]
    iterations: usize,
    #[serde(default = "default_max_sanity_diff")]
    max_sanity_diff: f64,
    bootstrap_guess_h: [i32; 2],
    bootstrap_guess_v: [i32; 2],
    #[serde(default = "default_composite_decimate")]
    composite_decimate: i32,
    #[serde(default)]
    solver: SolverConfigJson,
}

fn default_iterations() -> usize {
    200
}

fn default_max_sanity_diff() -> f64 {
    10.0
}

fn default_composite_decimate() -> i32 {
    4
}

/// Prints solver events to stderr.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn log(&self, level: LogLevel, message: &str) {
        eprintln!("[{level:?}] {message}");
    }

    fn progress(&self, step: ProgressStep, n: usize, n_max: usize, message: &str) {
        eprintln!("[{step:?} {n}/{n_max}] {message}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let tracing_sink = TracingSink;
    let console_sink = ConsoleSink;
    let sink: &dyn EventSink = if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        &tracing_sink
    } else {
        &console_sink
    };

    let text = std::fs::read_to_string(&cli.config)?;
    let config: RunConfig = serde_json::from_str(&text)?;
    let source = FsTileSource;

    let mut set = project::load_input(&config.input_project)?;
    set.generate_grid()?;
    sink.log(
        LogLevel::Info,
        &format!(
            "loaded {} tiles on a {}x{} grid",
            set.tiles().len(),
            set.grid_width(),
            set.grid_height()
        ),
    );

    // Bootstrap the stage→image map with fixed guesses at the anchor.
    let bootstrap = OverlapSolver::new(OverlapConfig {
        guess_mode: GuessMode::Fixed,
        guess_h: Point2i::new(config.bootstrap_guess_h[0], config.bootstrap_guess_h[1]),
        guess_v: Point2i::new(config.bootstrap_guess_v[0], config.bootstrap_guess_v[1]),
        ..SolverConfigJson::default().into()
    })?;
    bootstrap.calibrate_affine(&mut set, &source, sink, config.anchor[0], config.anchor[1])?;
    apply_initial_grid(&mut set)?;
    set.evict_all();

    // Precision sweeps with the configured guess mode.
    let solver = OverlapSolver::new(config.solver.into())?;
    solver.compute_overlaps_y(&mut set, &source, sink)?;
    solver.compute_overlaps_x(&mut set, &source, sink)?;
    set.evict_all();

    let mut relax = RelaxationSolver::new();
    relax.setup(&set, config.max_sanity_diff, sink)?;
    relax.run(&mut set, config.iterations, sink)?;

    project::save_project(&set, &config.output_project, SaveFlags::all())?;
    if let Some(path) = &config.overlaps_path {
        project::save_overlaps(&set, path)?;
    }
    if let Some(path) = &config.output_image {
        let crop = solver.config().crop_size;
        compose_canvas(
            &mut set,
            &source,
            sink,
            path,
            crop,
            config.composite_decimate,
        )?;
    }

    sink.log(LogLevel::Info, "pipeline complete");
    Ok(())
}
