//! End-to-end assembly of the topo-bathymetric raster.
//!
//! Stages run strictly in sequence, each fully materialized before the next:
//! grid repair, tile merge, sign inversion, intermediate write, topography
//! read and floor clipping, alignment to the canvas, priority compositing,
//! nodata/CRS stamping, final write.

use std::path::Path;
use std::time::Instant;
use topobathy_dem::{read_geotiff, write_geotiff, GeoRaster, RasterStats, WriteSummary};
use tracing::info;

use crate::config::PipelineConfig;
use crate::metrics::metric_defs;
use crate::{
    align_to_canvas, clip_floor, composite, invert_sign, load_tile, merge_tiles, repair_directory, stamp,
    RepairReport, Result, TileCatalog,
};

/// What a pipeline run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// Grid repair outcome.
    pub repair: RepairReport,
    /// Tiles folded into the bathymetry mosaic.
    pub tiles_merged: usize,
    /// Intermediate bathymetry raster.
    pub bathymetry: WriteSummary,
    /// Statistics of the bathymetry raster.
    pub bathymetry_stats: RasterStats,
    /// Final combined raster.
    pub combined: WriteSummary,
    /// Statistics of the combined raster.
    pub combined_stats: RasterStats,
}

/// Runs the configured stages.
///
/// # Example
///
/// ```no_run
/// use topobathy_mosaic::{Pipeline, PipelineConfig};
///
/// let config = PipelineConfig::load("topobathy.yaml")?;
/// let summary = Pipeline::new(config).run()?;
/// println!("combined raster: {}", summary.combined_stats);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Wrap a validated configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Grid-repair every raw tile into the repaired directory.
    pub fn repair(&self) -> Result<RepairReport> {
        timed("repair", || {
            let raw = TileCatalog::scan(&self.config.paths.raw_tiles, &self.config.tiles.extensions)?;
            raw.require_tiles()?;
            repair_directory(&raw, &self.config.paths.repaired_tiles, &self.config.repair)
        })
    }

    /// Merge repaired tiles onto the canvas and convert depths to elevations.
    pub fn build_bathymetry(&self, catalog: &TileCatalog) -> Result<GeoRaster> {
        catalog.require_tiles()?;
        let crs = self.config.tile_crs();
        let nodata = self.config.output.nodata;
        let merged = timed("merge", || {
            let tiles = catalog.iter().map(|path| load_tile(path, crs, nodata));
            merge_tiles(self.config.canvas, nodata, self.config.tiles.resampling, tiles)
        })?;
        let bathymetry = invert_sign(merged)?;
        info!(stats = %bathymetry.stats(), "Bathymetry mosaic ready");
        Ok(bathymetry)
    }

    /// Read the topography raster, clip it to the floor and align it to the canvas.
    pub fn build_topography(&self) -> Result<GeoRaster> {
        timed("topography", || {
            let dem = read_geotiff(&self.config.paths.topography)?;
            let clipped = clip_floor(dem, self.config.topography.floor)?;
            let aligned = align_to_canvas(clipped, self.config.canvas, self.config.topography.resampling)?;
            info!(stats = %aligned.stats(), "Topography aligned to canvas");
            Ok(aligned)
        })
    }

    /// Run every stage.
    ///
    /// Refuses to merge if any tile failed repair.
    pub fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let paths = &self.config.paths;

        let repair = self.repair()?;
        repair.require_complete()?;
        let catalog = repair.catalog(&paths.repaired_tiles);

        let bathymetry = self.build_bathymetry(&catalog)?;
        let tiles_merged = catalog.len();
        let bathymetry_stats = bathymetry.stats();
        let bathymetry_summary = self.write("write_bathymetry", &bathymetry, &paths.bathymetry_output)?;

        let topography = self.build_topography()?;
        let combined = timed("composite", || {
            let combined = composite(bathymetry, topography)?;
            stamp(combined, self.config.output.nodata, self.config.canvas.crs)
        })?;
        let combined_stats = combined.stats();
        let combined_summary = self.write("write_combined", &combined, &paths.combined_output)?;

        info!(
            elapsed_s = started.elapsed().as_secs_f64(),
            output = %paths.combined_output.display(),
            stats = %combined_stats,
            "Pipeline complete"
        );

        Ok(RunSummary {
            repair,
            tiles_merged,
            bathymetry: bathymetry_summary,
            bathymetry_stats,
            combined: combined_summary,
            combined_stats,
        })
    }

    fn write(&self, stage: &'static str, raster: &GeoRaster, path: &Path) -> Result<WriteSummary> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| crate::MosaicError::Resource {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let summary = timed(stage, || Ok(write_geotiff(raster, path, &self.config.output.write)?))?;
        metrics::counter!(metric_defs::BYTES_WRITTEN.name).increment(summary.bytes);
        Ok(summary)
    }
}

/// Run `f`, recording its wall time under the `stage` label.
fn timed<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    metrics::histogram!(metric_defs::STAGE_DURATION.name, "stage" => stage).record(elapsed.as_secs_f64());
    info!(stage, elapsed_ms = elapsed.as_millis() as u64, ok = result.is_ok(), "Stage finished");
    result
}
