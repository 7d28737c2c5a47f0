//! Error types for the raster crate.

use std::path::PathBuf;
use thiserror::Error;

use crate::dtype::RasterDtype;

/// Errors that can occur when working with georeferenced rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF encode or decode error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or inconsistent georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Unsupported sample layout in the TIFF file.
    #[error("Unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// A raster reached an operation that needs a coordinate reference system
    /// but none was assigned.
    #[error("Raster has no coordinate reference system: {context}")]
    MissingProjection {
        /// What was being attempted.
        context: String,
    },

    /// The EPSG code is not in the CRS definition database.
    #[error("Unsupported CRS EPSG:{0}")]
    UnsupportedCrs(u16),

    /// A CRS identifier could not be parsed.
    #[error("Invalid CRS identifier '{0}' (expected EPSG:<code>)")]
    InvalidCrs(String),

    /// Reprojecting a coordinate failed.
    #[error("Reprojection from {from} to {to} failed: {reason}")]
    Reprojection {
        /// Source CRS.
        from: String,
        /// Target CRS.
        to: String,
        /// Underlying failure.
        reason: String,
    },

    /// Requested output dtype cannot hold a value of the raster.
    #[error("Cannot store value {value} as {dtype}: {reason}")]
    DtypePrecision {
        /// Requested storage dtype.
        dtype: RasterDtype,
        /// First offending value.
        value: f64,
        /// Why the value does not fit.
        reason: &'static str,
    },

    /// Writing an artifact failed; no partial file is left at `path`.
    #[error("Failed to write {}: {source}", path.display())]
    Resource {
        /// Target path of the write.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Array shape and geotransform disagree, or the shape is degenerate.
    #[error("Invalid raster geometry: {0}")]
    InvalidGeometry(String),

    /// Invalid writer options.
    #[error("Invalid output options: {0}")]
    InvalidOptions(String),

    /// LZW compression of a tile failed.
    #[error("LZW compression failed: {0}")]
    Lzw(String),
}
