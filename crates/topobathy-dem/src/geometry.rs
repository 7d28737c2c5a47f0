//! North-up affine geotransforms and bounding boxes.

use crate::{RasterError, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// West edge.
    pub xmin: f64,
    /// South edge.
    pub ymin: f64,
    /// East edge.
    pub xmax: f64,
    /// North edge.
    pub ymax: f64,
}

impl Bounds {
    /// Create bounds, rejecting empty or inverted boxes.
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self> {
        let bounds = Self { xmin, ymin, xmax, ymax };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Check that the box is finite and has positive area.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.xmax <= self.xmin || self.ymax <= self.ymin {
            return Err(RasterError::InvalidGeometry(format!(
                "bounds ({}, {}, {}, {}) must be finite with xmin < xmax and ymin < ymax",
                self.xmin, self.ymin, self.xmax, self.ymax
            )));
        }
        Ok(())
    }

    /// Check if a coordinate is within the bounds (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Width of the box in world units.
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height of the box in world units.
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Grow the box to include a point.
    pub fn expand_to(&mut self, x: f64, y: f64) {
        self.xmin = self.xmin.min(x);
        self.ymin = self.ymin.min(y);
        self.xmax = self.xmax.max(x);
        self.ymax = self.ymax.max(y);
    }
}

/// Mapping from pixel indices to world coordinates for a north-up raster.
///
/// Equivalent to the GDAL geotransform
/// `[origin_x, pixel_width, 0, origin_y, 0, -pixel_height]`. The origin is
/// the outer corner of the top-left pixel; rotation terms are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the west edge of column 0.
    pub origin_x: f64,
    /// Y coordinate of the north edge of row 0.
    pub origin_y: f64,
    /// Pixel width in world units (positive).
    pub pixel_width: f64,
    /// Pixel height in world units (positive; rows increase southward).
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a transform, rejecting non-positive or non-finite pixel sizes.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Result<Self> {
        let transform = Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        };
        transform.validate()?;
        Ok(transform)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let ok = self.origin_x.is_finite()
            && self.origin_y.is_finite()
            && self.pixel_width.is_finite()
            && self.pixel_height.is_finite()
            && self.pixel_width > 0.0
            && self.pixel_height > 0.0;
        if !ok {
            return Err(RasterError::InvalidGeometry(format!(
                "geotransform {:?} needs a finite origin and positive pixel sizes",
                self
            )));
        }
        Ok(())
    }

    /// World coordinate of the centre of pixel (`col`, `row`).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel position `(col, row)` of a world coordinate.
    ///
    /// Integer parts index the pixel containing the point.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Bounds covered by a `width` x `height` pixel grid.
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        Bounds {
            xmin: self.origin_x,
            ymin: self.origin_y - height as f64 * self.pixel_height,
            xmax: self.origin_x + width as f64 * self.pixel_width,
            ymax: self.origin_y,
        }
    }

    /// Whether two transforms describe the same pixel grid within a relative
    /// tolerance of the pixel size.
    pub fn approx_eq(&self, other: &GeoTransform, rel_tol: f64) -> bool {
        let scale = self.pixel_width.abs().max(self.pixel_height.abs());
        let tol = rel_tol * scale.max(f64::MIN_POSITIVE);
        (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
            && (self.pixel_width - other.pixel_width).abs() <= tol
            && (self.pixel_height - other.pixel_height).abs() <= tol
    }
}
