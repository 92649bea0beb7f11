use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use cov_grid::{
    analyze_coverage_with, ingest_source, BoundingBox, Config, CoverageGrid, DecimalCoordinate,
    Engine, IngestReport, IngestStats,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod render;

use render::{render_grid_guard, ChartKind};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detector coverage grid CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a log directory and compute the coverage grid for a bounding box
    Analyze(AnalyzeArgs),
    /// Decode a log directory and write the coordinates as CSV
    Parse(ParseArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Directory containing device log files
    #[arg(value_hint = ValueHint::DirPath)]
    source: PathBuf,

    /// INI configuration file
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Field delimiter (overrides config)
    #[arg(long)]
    delimiter: Option<String>,

    /// Log file name suffix, e.g. `.txt` (overrides config)
    #[arg(long)]
    extension: Option<String>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Southern edge of the area (degrees)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_latitude)]
    min_lat: f64,

    /// Northern edge of the area (degrees)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_latitude)]
    max_lat: f64,

    /// Western edge of the area (degrees)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_longitude)]
    min_lon: f64,

    /// Eastern edge of the area (degrees)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_longitude)]
    max_lon: f64,

    /// Detection radius in meters (overrides config)
    #[arg(short, long, value_parser = parse_radius)]
    radius: Option<f64>,

    /// Analysis engine (overrides config)
    #[arg(long, value_enum)]
    engine: Option<EngineOpt>,

    /// Refuse grids with more cells than this, e.g. 25000000 (overrides config)
    #[arg(long, value_parser = parse_max_cells)]
    max_cells: Option<usize>,

    /// Output cell CSV path (`-` for stdout)
    #[arg(short, long, default_value = "coverage.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output PNG figure path (defaults next to CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable plot generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Optional JSON run summary path
    #[arg(long, value_hint = ValueHint::FilePath)]
    summary: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ParseArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output coordinate CSV path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EngineOpt {
    Auto,
    BruteForce,
    Bucketed,
}

impl From<EngineOpt> for Engine {
    fn from(value: EngineOpt) -> Self {
        match value {
            EngineOpt::Auto => Engine::Auto,
            EngineOpt::BruteForce => Engine::BruteForce,
            EngineOpt::Bucketed => Engine::Bucketed,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.source.verbose,
        Command::Parse(args) => args.source.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Parse(args) => handle_parse(args),
    }
}

fn parse_bounded(value: &str, min: f64, max: f64) -> Result<f64, String> {
    let number: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !(min..=max).contains(&number) {
        return Err(format!("{} is outside [{}, {}]", number, min, max));
    }
    Ok(number)
}

fn parse_latitude(value: &str) -> Result<f64, String> {
    parse_bounded(value, -90.0, 90.0)
}

fn parse_longitude(value: &str) -> Result<f64, String> {
    parse_bounded(value, -180.0, 180.0)
}

fn parse_radius(value: &str) -> Result<f64, String> {
    let number: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !(number > 0.0 && number.is_finite()) {
        return Err("radius must be a positive number of meters".to_string());
    }
    Ok(number)
}

fn parse_max_cells(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{}' is not a positive cell count", value)),
    }
}

/// Config file first, then command-line overrides.
fn load_config(args: &SourceArgs) -> Result<Config> {
    let mut config = match args.config.as_ref() {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(delimiter) = args.delimiter.as_ref() {
        if delimiter.is_empty() {
            return Err(anyhow!("--delimiter must not be empty"));
        }
        config.ingest.delimiter = delimiter.clone();
    }
    if let Some(extension) = args.extension.as_ref() {
        config.ingest.file_extension = extension.clone();
    }
    debug!("effective config: {:?}", config);
    Ok(config)
}

fn ingest(args: &SourceArgs, config: &Config) -> Result<IngestReport> {
    let t_parse = Instant::now();
    let report = ingest_source(&args.source, &config.ingest)
        .with_context(|| format!("failed to ingest {}", args.source.display()))?;
    debug!(
        "Parse stage: {:.1} ms",
        t_parse.elapsed().as_secs_f64() * 1000.0
    );
    Ok(report)
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = load_config(&args.source)?;
    if let Some(engine) = args.engine {
        config.analysis.engine = engine.into();
    }
    if let Some(max_cells) = args.max_cells {
        config.analysis.max_cells = max_cells;
    }
    let radius = args
        .radius
        .or(config.analysis.radius_m)
        .ok_or_else(|| anyhow!("no detection radius given (use --radius or [analysis] radius_m)"))?;
    let bbox = BoundingBox::new(args.min_lat, args.max_lat, args.min_lon, args.max_lon);

    let report = ingest(&args.source, &config)?;
    if report.coordinates.is_empty() {
        warn!("No coordinates found in {}", args.source.source.display());
    }

    let t_compute = Instant::now();
    let grid = analyze_coverage_with(&report.coordinates, &bbox, radius, &config.analysis)
        .with_context(|| format!("coverage analysis failed for {}", bbox))?;
    debug!(
        "Compute stage: {:.1} ms",
        t_compute.elapsed().as_secs_f64() * 1000.0
    );
    info!(
        "Coverage grid {}x{}: {} of {} cells covered ({:.1}%)",
        grid.grid_size_lat(),
        grid.grid_size_lon(),
        grid.covered_count(),
        grid.geometry().cell_count(),
        grid.coverage_ratio() * 100.0
    );

    if let Some(path) = args.summary.as_ref() {
        let summary = RunSummary::new(&args.source.source, &grid, &config, &report.stats);
        write_summary(&summary, path)?;
        info!("Wrote run summary: {}", path.display());
    }

    if args.output.as_os_str() == "-" {
        write_grid_stdout(&grid)?;
    } else {
        write_grid_csv(&grid, &args.output)?;
        info!("Wrote coverage CSV: {}", args.output.display());
    }

    if !args.no_plot {
        let png_path = args.png.clone().or_else(|| {
            if args.output.as_os_str() == "-" {
                None
            } else {
                Some(args.output.with_extension("png"))
            }
        });
        if let Some(path) = png_path.as_ref() {
            let t_plot = Instant::now();
            if let Err(err) = render_grid_guard(&grid, path, ChartKind::Png) {
                warn!("Skipping PNG render ({}): {}", path.display(), err);
            } else {
                info!("Wrote plot: {}", path.display());
            }
            debug!(
                "Plot stage: {:.1} ms",
                t_plot.elapsed().as_secs_f64() * 1000.0
            );
        }
        if let Some(path) = args.svg.as_ref() {
            if let Err(err) = render_grid_guard(&grid, path, ChartKind::Svg) {
                warn!("Skipping SVG render ({}): {}", path.display(), err);
            } else {
                info!("Wrote plot: {}", path.display());
            }
        }
    }

    Ok(())
}

fn handle_parse(args: ParseArgs) -> Result<()> {
    let config = load_config(&args.source)?;
    let report = ingest(&args.source, &config)?;

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_coordinate_rows(&report.coordinates, &mut writer)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_coordinate_rows(&report.coordinates, &mut writer)?;
        info!("Wrote coordinates CSV: {}", args.output.display());
    }
    Ok(())
}

#[derive(Serialize, Debug)]
struct RunSummary<'a> {
    source: String,
    bbox: BoundingBox,
    radius_m: f64,
    radius_deg: f64,
    engine: String,
    grid_size_lat: usize,
    grid_size_lon: usize,
    covered_cells: usize,
    total_cells: usize,
    coverage_ratio: f64,
    ingest: &'a IngestStats,
}

impl<'a> RunSummary<'a> {
    fn new(source: &Path, grid: &CoverageGrid, config: &Config, stats: &'a IngestStats) -> Self {
        let geometry = grid.geometry();
        Self {
            source: source.display().to_string(),
            bbox: geometry.bbox,
            radius_m: geometry.radius_m,
            radius_deg: geometry.radius_deg,
            engine: config.analysis.engine.to_string(),
            grid_size_lat: grid.grid_size_lat(),
            grid_size_lon: grid.grid_size_lon(),
            covered_cells: grid.covered_count(),
            total_cells: geometry.cell_count(),
            coverage_ratio: grid.coverage_ratio(),
            ingest: stats,
        }
    }
}

fn write_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(summary)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn write_grid_stdout(grid: &CoverageGrid) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_grid_rows(grid, &mut writer)
}

fn write_grid_csv(grid: &CoverageGrid, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_grid_rows(grid, &mut writer)
}

fn write_grid_rows<W: Write>(grid: &CoverageGrid, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["row", "col", "center_lat", "center_lon", "covered"])?;

    let geometry = grid.geometry();
    for (row, col, covered) in grid.iter_cells() {
        let (lat, lon) = geometry.cell_center(row, col);
        writer.write_record([
            row.to_string(),
            col.to_string(),
            format!("{:.6}", lat),
            format!("{:.6}", lon),
            if covered { "1" } else { "0" }.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_coordinate_rows<W: Write>(
    coordinates: &[DecimalCoordinate],
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    writer.write_record(["lat", "lon"])?;
    for coord in coordinates {
        writer.write_record([format!("{:.8}", coord.lat), format!("{:.8}", coord.lon)])?;
    }
    writer.flush()?;
    Ok(())
}
