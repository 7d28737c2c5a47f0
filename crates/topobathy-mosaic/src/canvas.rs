//! The target grid every tile is folded onto.

use serde::{Deserialize, Serialize};
use topobathy_dem::{Bounds, Crs, GeoRaster, GeoTransform, RasterError};

use crate::Result;

/// Fixed bounds, square resolution and CRS of the output raster.
///
/// The grid origin is the north-west corner `(xmin, ymax)`; the pixel counts
/// are the rounded ratios of extent to resolution, so bounds that are not an
/// exact multiple of the resolution are snapped at the east and south edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    /// World extent in canvas CRS units.
    pub bounds: Bounds,
    /// Pixel edge length in canvas CRS units.
    pub resolution: f64,
    /// Coordinate reference system of the canvas.
    pub crs: Crs,
}

impl Canvas {
    /// Build and validate a canvas.
    pub fn new(bounds: Bounds, resolution: f64, crs: Crs) -> Result<Self> {
        let canvas = Self {
            bounds,
            resolution,
            crs,
        };
        canvas.validate()?;
        Ok(canvas)
    }

    /// Reject non-positive resolutions and grids with no pixels.
    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(RasterError::InvalidGeometry(format!(
                "resolution must be positive, got {}",
                self.resolution
            ))
            .into());
        }
        if self.width() == 0 || self.height() == 0 {
            return Err(RasterError::InvalidGeometry(format!(
                "canvas {:?} at resolution {} has no pixels",
                self.bounds, self.resolution
            ))
            .into());
        }
        Ok(())
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        (self.bounds.width() / self.resolution).round() as usize
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        (self.bounds.height() / self.resolution).round() as usize
    }

    /// Array shape `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// North-up transform anchored at `(xmin, ymax)`.
    pub fn transform(&self) -> Result<GeoTransform> {
        Ok(GeoTransform::new(
            self.bounds.xmin,
            self.bounds.ymax,
            self.resolution,
            self.resolution,
        )?)
    }

    /// An all-missing raster covering the canvas.
    pub fn empty_raster(&self, nodata: f64) -> Result<GeoRaster> {
        Ok(GeoRaster::empty(
            self.width(),
            self.height(),
            self.transform()?,
            Some(self.crs),
            nodata,
        )?)
    }
}
