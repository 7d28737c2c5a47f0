//! # topobathy-dem
//!
//! Georeferenced elevation rasters for the topo-bathymetric mosaic pipeline.
//!
//! This crate provides:
//! - [`GeoRaster`]: a single-band `f64` array with its [`GeoTransform`],
//!   optional [`Crs`] and nodata sentinel
//! - [`Reprojector`]: point reprojection between EPSG coordinate systems,
//!   backed by `proj4rs` and the `crs-definitions` database
//! - [`read_geotiff`]: GeoTIFF reading (strips or tiles, any codec the
//!   `tiff` crate decodes, classic or BigTIFF)
//! - [`write_geotiff`]: tiled, compressed GeoTIFF writing with an explicit
//!   GDAL nodata tag, GeoKeys, a checked storage [`RasterDtype`] and atomic
//!   replace-on-write
//!
//! ## Example
//!
//! ```no_run
//! use topobathy_dem::{read_geotiff, write_geotiff, WriteOptions};
//!
//! let raster = read_geotiff("topography.tif")?;
//! println!("{}x{} pixels, {}", raster.width(), raster.height(), raster.stats());
//!
//! let summary = write_geotiff(&raster, "copy.tif", &WriteOptions::default())?;
//! println!("wrote {} bytes", summary.bytes);
//! # Ok::<(), topobathy_dem::RasterError>(())
//! ```

mod crs;
mod dtype;
mod error;
mod geometry;
mod geotiff;
mod raster;
mod reader;
mod writer;

pub use crs::{Crs, Reprojector};
pub use dtype::RasterDtype;
pub use error::RasterError;
pub use geometry::{Bounds, GeoTransform};
pub use raster::{is_nodata, GeoRaster, RasterStats};
pub use reader::read_geotiff;
pub use writer::{write_geotiff, Compression, WriteOptions, WriteSummary};

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
