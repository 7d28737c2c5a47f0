//! Error types for the mosaic pipeline.

use std::path::PathBuf;
use thiserror::Error;
use topobathy_dem::RasterError;

use crate::config::ConfigError;

/// Errors that can occur while repairing, merging or compositing tiles.
#[derive(Debug, Error)]
pub enum MosaicError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the raster layer (GeoTIFF I/O, CRS, dtype policy).
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Invalid or inconsistent configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A line of a point tile is not an `x y z` record.
    #[error("{}:{line}: malformed record: {reason}", path.display())]
    MalformedRecord {
        /// Tile file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// A tile's points do not form a regular lattice.
    #[error("Cannot grid tile {tile}: {reason}")]
    Gridding {
        /// Tile name or path.
        tile: String,
        /// Why the lattice is inconsistent.
        reason: String,
    },

    /// Two rasters expected to share a pixel grid do not.
    #[error("Raster grids do not match: {0}")]
    GridMismatch(String),

    /// A valid value would become indistinguishable from the nodata sentinel.
    #[error("Value {value} collides with nodata sentinel {nodata}")]
    SentinelCollision {
        /// The offending value after transformation.
        value: f64,
        /// The sentinel it would be mistaken for.
        nodata: f64,
    },

    /// No tiles were found to merge.
    #[error("No tiles found in {}", .0.display())]
    EmptyCatalog(PathBuf),

    /// Grid repair failed for some tiles, so the mosaic would be incomplete.
    #[error("Grid repair failed for {failed} of {total} tiles")]
    RepairFailed {
        /// Number of tiles that failed.
        failed: usize,
        /// Number of tiles attempted.
        total: usize,
    },

    /// Writing a repaired tile failed; no partial file is left behind.
    #[error("Failed to write {}: {source}", path.display())]
    Resource {
        /// Target path of the write.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

impl MosaicError {
    /// Whether this error reports a raster without a coordinate reference system.
    pub fn is_missing_projection(&self) -> bool {
        matches!(self, MosaicError::Raster(RasterError::MissingProjection { .. }))
    }
}
