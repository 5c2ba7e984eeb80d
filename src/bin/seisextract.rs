//! seisextract CLI - sample seismic volumes along well paths

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use seisextract::{ColumnNames, ExtractionConfig, ExtractionPipeline, SurveyKind};

#[derive(Parser)]
#[command(name = "seisextract")]
#[command(author, version, about = "Extract seismic attributes at well positions", long_about = None)]
struct Cli {
    /// Folder with SEG-Y volumes
    seismic_folder: Option<PathBuf>,
    /// Well table (CSV, TSV or spreadsheet)
    well_table: Option<PathBuf>,
    /// Output table (.xlsx for a workbook, otherwise delimited text)
    result: Option<PathBuf>,
    /// First depth sample of the volumes, replacing the header value
    start_depth: Option<f64>,

    /// TOML parameter file; command-line values take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Volumes are 2D lines
    #[arg(long)]
    line_2d: bool,

    /// Average well samples falling into the same bin
    #[arg(long)]
    bin_average: bool,

    /// Expansion radius in geographic units (with --bin-average)
    #[arg(long)]
    radius: Option<f64>,

    /// Well column name
    #[arg(long)]
    well_col: Option<String>,
    /// X column name
    #[arg(long, requires_all = ["y_col", "depth_col"])]
    x_col: Option<String>,
    /// Y column name
    #[arg(long, requires_all = ["x_col", "depth_col"])]
    y_col: Option<String>,
    /// Depth column name
    #[arg(long, requires_all = ["x_col", "y_col"])]
    depth_col: Option<String>,

    /// The table has no well column
    #[arg(long)]
    no_well_column: bool,

    /// Column to leave out of the result (repeatable)
    #[arg(long = "drop-column")]
    drop_columns: Vec<String>,

    /// Number of volumes processed at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn build_config(cli: Cli) -> Result<ExtractionConfig> {
    let mut config = match &cli.config {
        Some(path) => ExtractionConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load parameters from {}", path.display()))?,
        None => ExtractionConfig::default(),
    };

    if let Some(folder) = cli.seismic_folder {
        config.seismic_folder = folder;
    }
    if let Some(table) = cli.well_table {
        config.well_table = table;
    }
    if let Some(result) = cli.result {
        config.result = result;
    }
    if cli.start_depth.is_some() {
        config.start_depth = cli.start_depth;
    }
    if cli.line_2d {
        config.survey = SurveyKind::Line2D;
    }
    if cli.bin_average {
        config.bin_averaging = true;
    }
    if let Some(radius) = cli.radius {
        config.expansion_radius = radius;
    }
    if cli.no_well_column {
        config.require_well_column = false;
    }
    if let (Some(x), Some(y), Some(depth)) = (cli.x_col, cli.y_col, cli.depth_col) {
        config.columns = Some(ColumnNames { well: cli.well_col, x, y, depth });
    } else if let Some(well) = cli.well_col {
        match config.columns.as_mut() {
            Some(columns) => columns.well = Some(well),
            None => anyhow::bail!("--well-col needs --x-col, --y-col and --depth-col"),
        }
    }
    if !cli.drop_columns.is_empty() {
        config.drop_columns = cli.drop_columns;
    }
    if let Some(jobs) = cli.jobs {
        config.max_parallel = jobs;
    }

    config.validate().context("Invalid parameters")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = build_config(cli)?;
    let start = Instant::now();

    let mut pipeline = ExtractionPipeline::new();
    let result = pipeline.run(&config).context("Extraction failed")?;

    log::info!(
        "Done: {} rows x {} attributes written to {} in {:.2} seconds",
        result.len(),
        result.volumes.len(),
        config.result.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
