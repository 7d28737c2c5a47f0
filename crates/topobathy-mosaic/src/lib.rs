//! # topobathy-mosaic
//!
//! Assembly of a seamless topo-bathymetric elevation raster from point-grid
//! bathymetry tiles and a topography GeoTIFF.
//!
//! The stages, leaves first:
//! - [`repair_directory`]: snap noisy tile coordinates onto the integer lattice
//! - [`load_tile`]: grid a repaired tile into a [`GeoRaster`]
//! - [`merge_tiles`]: first-wins mosaicking onto a fixed [`Canvas`]
//! - [`invert_sign`], [`clip_floor`], [`stamp`]: per-pixel value transforms
//! - [`composite`]: bathymetry over topography
//! - [`Pipeline`]: the whole run, driven by a [`PipelineConfig`]
//!
//! Writing goes through [`topobathy_dem::write_geotiff`].
//!
//! ## Example
//!
//! ```no_run
//! use topobathy_mosaic::{merge_tiles, load_tile, Canvas, Resampling, TileCatalog};
//! use topobathy_dem::{Bounds, Crs};
//!
//! let crs = Crs::from_epsg(32633)?;
//! let canvas = Canvas::new(Bounds::new(500000.0, 4000000.0, 510000.0, 4010000.0)?, 10.0, crs)?;
//! let catalog = TileCatalog::scan("data/repaired", &["xyz".to_string()])?;
//! let tiles = catalog.iter().map(|p| load_tile(p, crs, -9999.0));
//! let mosaic = merge_tiles(canvas, -9999.0, Resampling::Nearest, tiles)?;
//! println!("{}", mosaic.stats());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod canvas;
mod catalog;
mod composite;
pub mod config;
mod error;
mod loader;
mod merge;
pub mod metrics;
mod pipeline;
mod repair;
mod transform;
mod xyz;

pub use canvas::Canvas;
pub use catalog::TileCatalog;
pub use composite::composite;
pub use config::{ConfigError, OutputOptions, PipelineConfig};
pub use error::MosaicError;
pub use loader::{grid_points, load_tile};
pub use merge::{align_to_canvas, merge_tiles, Mosaic, Resampling};
pub use pipeline::{Pipeline, RunSummary};
pub use repair::{repair_directory, repair_text, repair_tile, round_coordinate, RepairOptions, RepairReport, RepairedTile};
pub use transform::{clip_floor, invert_sign, stamp};
pub use xyz::{parse_points, read_points, PointRecord};

pub use topobathy_dem::GeoRaster;

/// Result type for mosaic operations.
pub type Result<T> = std::result::Result<T, MosaicError>;
