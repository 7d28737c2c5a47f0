//! In-memory georeferenced raster.

use crate::{Bounds, Crs, GeoTransform, RasterError, Result};
use ndarray::Array2;
use std::fmt;

/// A single-band raster with its georeferencing.
///
/// Values are held as `f64` in row-major order (row 0 is the northern edge).
/// A pixel is missing when it equals the nodata sentinel or is NaN; a NaN
/// sentinel therefore means "only NaN is missing".
#[derive(Debug, Clone)]
pub struct GeoRaster {
    data: Array2<f64>,
    transform: GeoTransform,
    crs: Option<Crs>,
    nodata: f64,
}

impl GeoRaster {
    /// Wrap an array with its georeferencing.
    pub fn new(data: Array2<f64>, transform: GeoTransform, crs: Option<Crs>, nodata: f64) -> Result<Self> {
        transform.validate()?;
        let (height, width) = data.dim();
        if width == 0 || height == 0 {
            return Err(RasterError::InvalidGeometry(format!(
                "raster must have at least one pixel, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            data,
            transform,
            crs,
            nodata,
        })
    }

    /// A raster of the given size with every pixel missing.
    pub fn empty(width: usize, height: usize, transform: GeoTransform, crs: Option<Crs>, nodata: f64) -> Result<Self> {
        Self::new(Array2::from_elem((height, width), nodata), transform, crs, nodata)
    }

    /// Pixel values, indexed `[row, col]`.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Mutable pixel values.
    pub fn data_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    /// The geotransform.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// The coordinate reference system, if one is assigned.
    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    /// Assign a coordinate reference system.
    pub fn set_crs(&mut self, crs: Crs) {
        self.crs = Some(crs);
    }

    /// Builder form of [`set_crs`](Self::set_crs).
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    /// The CRS, or a `MissingProjection` error naming `context`.
    pub fn require_crs(&self, context: &str) -> Result<Crs> {
        self.crs.ok_or_else(|| RasterError::MissingProjection {
            context: context.to_string(),
        })
    }

    /// The nodata sentinel.
    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    /// Replace the sentinel, rewriting every missing pixel to the new value.
    pub fn replace_nodata(&mut self, nodata: f64) {
        let old = self.nodata;
        self.data.mapv_inplace(|v| if is_nodata(v, old) { nodata } else { v });
        self.nodata = nodata;
    }

    /// Whether `value` counts as missing under this raster's sentinel.
    #[inline]
    pub fn is_missing(&self, value: f64) -> bool {
        is_nodata(value, self.nodata)
    }

    /// Apply `f` to every valid pixel in place; missing pixels are untouched.
    pub fn map_valid<F: Fn(f64) -> f64>(&mut self, f: F) {
        let nodata = self.nodata;
        self.data.mapv_inplace(|v| if is_nodata(v, nodata) { v } else { f(v) });
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// World bounds of the raster.
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.width(), self.height())
    }

    /// Whether two rasters share the same pixel grid and CRS.
    pub fn same_grid(&self, other: &GeoRaster) -> bool {
        self.data.dim() == other.data.dim()
            && self.crs == other.crs
            && self.transform.approx_eq(&other.transform, 1e-9)
    }

    /// Value of pixel (`col`, `row`), or `None` if out of range or missing.
    pub fn value_at(&self, col: usize, row: usize) -> Option<f64> {
        let value = *self.data.get((row, col))?;
        (!self.is_missing(value)).then_some(value)
    }

    /// Value of the pixel containing a world coordinate.
    pub fn sample_nearest(&self, x: f64, y: f64) -> Option<f64> {
        let (col, row) = self.transform.world_to_pixel(x, y);
        if col < 0.0 || row < 0.0 {
            return None;
        }
        self.value_at(col.floor() as usize, row.floor() as usize)
    }

    /// Bilinear interpolation between the four nearest pixel centres.
    ///
    /// Falls back to the nearest pixel when any neighbour is missing, so
    /// nodata never bleeds into valid values.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<f64> {
        let (col, row) = self.transform.world_to_pixel(x, y);
        if col < 0.0 || row < 0.0 || col >= self.width() as f64 || row >= self.height() as f64 {
            return None;
        }

        // Pixel centres sit at half-integer positions
        let u = (col - 0.5).max(0.0);
        let v = (row - 0.5).max(0.0);
        let x0 = u.floor() as usize;
        let y0 = v.floor() as usize;
        let x1 = (x0 + 1).min(self.width() - 1);
        let y1 = (y0 + 1).min(self.height() - 1);
        let fx = u - x0 as f64;
        let fy = v - y0 as f64;

        let corners = (
            self.value_at(x0, y0),
            self.value_at(x1, y0),
            self.value_at(x0, y1),
            self.value_at(x1, y1),
        );
        match corners {
            (Some(v00), Some(v10), Some(v01), Some(v11)) => Some(
                v00 * (1.0 - fx) * (1.0 - fy)
                    + v10 * fx * (1.0 - fy)
                    + v01 * (1.0 - fx) * fy
                    + v11 * fx * fy,
            ),
            _ => self.sample_nearest(x, y),
        }
    }

    /// Summary statistics over the valid pixels.
    pub fn stats(&self) -> RasterStats {
        let mut stats = RasterStats::default();
        let mut sum = 0.0;
        for &value in self.data.iter() {
            if self.is_missing(value) {
                stats.missing += 1;
                continue;
            }
            if stats.valid == 0 {
                stats.min = value;
                stats.max = value;
            } else {
                stats.min = stats.min.min(value);
                stats.max = stats.max.max(value);
            }
            stats.valid += 1;
            sum += value;
        }
        if stats.valid > 0 {
            stats.mean = sum / stats.valid as f64;
        }
        stats
    }
}

/// Whether `value` is missing under the sentinel `nodata` (NaN always is).
#[inline]
pub fn is_nodata(value: f64, nodata: f64) -> bool {
    value.is_nan() || value == nodata
}

/// Summary of the valid pixels of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterStats {
    /// Number of valid pixels.
    pub valid: usize,
    /// Number of missing pixels.
    pub missing: usize,
    /// Smallest valid value (0 when there are none).
    pub min: f64,
    /// Largest valid value (0 when there are none).
    pub max: f64,
    /// Mean of the valid values (0 when there are none).
    pub mean: f64,
}

impl RasterStats {
    /// Fraction of pixels that are valid.
    pub fn coverage(&self) -> f64 {
        let total = self.valid + self.missing;
        if total == 0 {
            0.0
        } else {
            self.valid as f64 / total as f64
        }
    }
}

impl fmt::Display for RasterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} valid / {} missing ({:.1}% coverage), min {:.3}, max {:.3}, mean {:.3}",
            self.valid,
            self.missing,
            self.coverage() * 100.0,
            self.min,
            self.max,
            self.mean
        )
    }
}
