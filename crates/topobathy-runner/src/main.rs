//! `topobathy`: build a topo-bathymetric elevation raster.
//!
//! ```text
//! topobathy --config topobathy.yaml run
//! topobathy --config topobathy.yaml repair
//! topobathy inspect out/topobathy.tif --x 505000 --y 4005000
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use topobathy_dem::{read_geotiff, RasterError};
use topobathy_mosaic::metrics::describe_metrics;
use topobathy_mosaic::{ConfigError, MosaicError, Pipeline, PipelineConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "topobathy", version)]
#[command(about = "Merge bathymetry tiles and topography into one elevation raster")]
struct Args {
    /// Pipeline configuration file
    #[arg(short, long, env = "TOPOBATHY_CONFIG", default_value = "topobathy.yaml")]
    config: PathBuf,

    /// Log filter, e.g. `info` or `topobathy_mosaic=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the whole pipeline
    Run,
    /// Grid-repair the raw tiles only
    Repair,
    /// Print a raster's georeferencing and statistics
    Inspect {
        /// GeoTIFF to inspect
        raster: PathBuf,
        /// Sample the raster at this x (requires --y)
        #[arg(long, requires = "y", allow_hyphen_values = true)]
        x: Option<f64>,
        /// Sample the raster at this y (requires --x)
        #[arg(long, requires = "x", allow_hyphen_values = true)]
        y: Option<f64>,
    },
}

#[derive(Debug, Error)]
enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mosaic(#[from] MosaicError),

    #[error(transparent)]
    Raster(#[from] RasterError),
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    describe_metrics();

    match execute(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "topobathy failed");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn execute(args: &Args) -> Result<(), RunnerError> {
    match &args.command {
        Command::Run => run(&args.config),
        Command::Repair => repair(&args.config),
        Command::Inspect { raster, x, y } => inspect(raster, x.zip(*y)),
    }
}

fn run(config_path: &Path) -> Result<(), RunnerError> {
    let config = PipelineConfig::load(config_path)?;
    info!(
        config = %config_path.display(),
        crs = %config.canvas.crs,
        width = config.canvas.width(),
        height = config.canvas.height(),
        "Starting pipeline"
    );
    let summary = Pipeline::new(config).run()?;
    println!(
        "Merged {} tiles ({} rounding collisions)",
        summary.tiles_merged,
        summary.repair.collisions()
    );
    println!("Bathymetry: {} ({})", summary.bathymetry.path.display(), summary.bathymetry_stats);
    println!("Combined:   {} ({})", summary.combined.path.display(), summary.combined_stats);
    Ok(())
}

fn repair(config_path: &Path) -> Result<(), RunnerError> {
    let config = PipelineConfig::load(config_path)?;
    let report = Pipeline::new(config).repair()?;
    for tile in &report.repaired {
        println!(
            "{} -> {} ({} records, {} collisions)",
            tile.source.display(),
            tile.output.display(),
            tile.records,
            tile.collisions
        );
    }
    for (path, e) in &report.failures {
        eprintln!("{}: {}", path.display(), e);
    }
    report.require_complete()?;
    Ok(())
}

fn inspect(path: &Path, point: Option<(f64, f64)>) -> Result<(), RunnerError> {
    let raster = read_geotiff(path)?;
    let bounds = raster.bounds();
    let t = raster.transform();

    println!("File:       {}", path.display());
    println!("Size:       {} x {} pixels", raster.width(), raster.height());
    println!("Pixel size: {} x {}", t.pixel_width, t.pixel_height);
    println!(
        "Bounds:     x {} .. {}, y {} .. {}",
        bounds.xmin, bounds.xmax, bounds.ymin, bounds.ymax
    );
    match raster.crs() {
        Some(crs) => println!("CRS:        {}", crs),
        None => println!("CRS:        none"),
    }
    println!("Nodata:     {}", raster.nodata());
    println!("Stats:      {}", raster.stats());

    if let Some((x, y)) = point {
        match raster.sample_nearest(x, y) {
            Some(value) => println!("Value at ({}, {}): {}", x, y, value),
            None => println!("Value at ({}, {}): missing", x, y),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_inspect_with_negative_coordinates() {
        let args = Args::try_parse_from(["topobathy", "inspect", "dem.tif", "--x", "-120.5", "--y", "35"]).unwrap();
        match args.command {
            Command::Inspect { raster, x, y } => {
                assert_eq!(raster, PathBuf::from("dem.tif"));
                assert_eq!(x.zip(y), Some((-120.5, 35.0)));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_inspect_requires_both_coordinates() {
        assert!(Args::try_parse_from(["topobathy", "inspect", "dem.tif", "--x", "1"]).is_err());
    }
}
