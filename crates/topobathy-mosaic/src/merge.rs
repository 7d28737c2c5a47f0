//! First-wins mosaicking of tiles onto a canvas.
//!
//! The canvas starts with every pixel missing. Tiles are folded in one at a
//! time; a pixel takes the first valid value any tile offers and is then
//! resolved, so later tiles never overwrite it. Each tile is dropped once
//! folded, keeping peak memory at one canvas plus one tile.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use topobathy_dem::{Bounds, Crs, GeoRaster, Reprojector};
use tracing::{debug, info};

use crate::canvas::Canvas;
use crate::metrics::metric_defs;
use crate::Result;

/// Points sampled along each edge of a reprojected tile footprint.
const EDGE_SAMPLES: usize = 32;

/// How a canvas pixel centre is sampled from a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Value of the tile pixel containing the point.
    #[default]
    Nearest,
    /// Interpolation between the four surrounding pixel centres, falling back
    /// to nearest when any of them is missing.
    Bilinear,
}

/// Pixel rectangle on the canvas, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    col0: usize,
    col1: usize,
    row0: usize,
    row1: usize,
}

/// A canvas being filled tile by tile.
#[derive(Debug)]
pub struct Mosaic {
    canvas: Canvas,
    raster: GeoRaster,
    resolved: Array2<bool>,
    resampling: Resampling,
    tiles_merged: usize,
    pixels_resolved: usize,
}

impl Mosaic {
    /// An all-missing mosaic over `canvas`.
    pub fn new(canvas: Canvas, nodata: f64, resampling: Resampling) -> Result<Self> {
        canvas.validate()?;
        let raster = canvas.empty_raster(nodata)?;
        Ok(Self {
            canvas,
            resolved: Array2::from_elem(canvas.shape(), false),
            raster,
            resampling,
            tiles_merged: 0,
            pixels_resolved: 0,
        })
    }

    /// Fold one tile into the mosaic, returning how many pixels it resolved.
    ///
    /// The tile must carry a CRS; it is reprojected onto the canvas on the
    /// fly when the CRSs differ.
    pub fn add(&mut self, tile: GeoRaster) -> Result<usize> {
        let tile_crs = tile.require_crs("merging a tile")?;
        let to_tile = Reprojector::new(self.canvas.crs, tile_crs)?;
        let Some(window) = self.footprint(&tile, tile_crs)? else {
            self.tiles_merged += 1;
            metrics::counter!(metric_defs::TILES_MERGED.name).increment(1);
            debug!(tile = self.tiles_merged, "Tile does not overlap the canvas");
            return Ok(0);
        };

        let transform = *self.raster.transform();
        let mut resolved = 0;
        for row in window.row0..window.row1 {
            for col in window.col0..window.col1 {
                if self.resolved[[row, col]] {
                    continue;
                }
                let (x, y) = transform.pixel_center(col, row);
                // Points outside the tile projection's domain cannot be covered
                let Ok((tx, ty)) = to_tile.transform(x, y) else {
                    continue;
                };
                let sample = match self.resampling {
                    Resampling::Nearest => tile.sample_nearest(tx, ty),
                    Resampling::Bilinear => tile.sample_bilinear(tx, ty),
                };
                if let Some(value) = sample {
                    self.raster.data_mut()[[row, col]] = value;
                    self.resolved[[row, col]] = true;
                    resolved += 1;
                }
            }
        }

        self.tiles_merged += 1;
        self.pixels_resolved += resolved;
        metrics::counter!(metric_defs::TILES_MERGED.name).increment(1);
        metrics::counter!(metric_defs::PIXELS_RESOLVED.name).increment(resolved as u64);
        debug!(
            tile = self.tiles_merged,
            resolved,
            cols = window.col1 - window.col0,
            rows = window.row1 - window.row0,
            "Merged tile"
        );
        Ok(resolved)
    }

    /// Tiles folded so far.
    pub fn tiles_merged(&self) -> usize {
        self.tiles_merged
    }

    /// Percentage of canvas pixels resolved so far.
    pub fn coverage_percent(&self) -> f64 {
        100.0 * self.pixels_resolved as f64 / self.resolved.len() as f64
    }

    /// The finished canvas raster. Unresolved pixels hold the sentinel.
    pub fn finish(self) -> GeoRaster {
        let coverage = self.coverage_percent();
        metrics::gauge!(metric_defs::CANVAS_COVERAGE.name).set(coverage);
        info!(
            tiles = self.tiles_merged,
            resolved = self.pixels_resolved,
            coverage_pct = coverage,
            "Mosaic complete"
        );
        self.raster
    }

    /// Canvas pixels that may take values from `tile`, or `None` when the
    /// tile lies entirely off the canvas.
    fn footprint(&self, tile: &GeoRaster, tile_crs: Crs) -> Result<Option<Window>> {
        let (bounds, pad) = if tile_crs == self.canvas.crs {
            (Some(tile.bounds()), 0)
        } else {
            (projected_bounds(&tile.bounds(), tile_crs, self.canvas.crs)?, 1)
        };
        let Some(bounds) = bounds else {
            // No boundary point survived projection; scan the whole canvas
            return Ok(Some(Window {
                col0: 0,
                col1: self.canvas.width(),
                row0: 0,
                row1: self.canvas.height(),
            }));
        };
        Ok(self.window_for(&bounds, pad))
    }

    fn window_for(&self, bounds: &Bounds, pad: usize) -> Option<Window> {
        let t = self.raster.transform();
        let (width, height) = (self.canvas.width() as f64, self.canvas.height() as f64);
        let pad = pad as f64;
        let clamp = |v: f64, max: f64| v.clamp(0.0, max) as usize;

        let col0 = clamp(((bounds.xmin - t.origin_x) / t.pixel_width).floor() - pad, width);
        let col1 = clamp(((bounds.xmax - t.origin_x) / t.pixel_width).ceil() + pad, width);
        let row0 = clamp(((t.origin_y - bounds.ymax) / t.pixel_height).floor() - pad, height);
        let row1 = clamp(((t.origin_y - bounds.ymin) / t.pixel_height).ceil() + pad, height);

        (col0 < col1 && row0 < row1).then_some(Window { col0, col1, row0, row1 })
    }
}

/// Bounding box, in `to`, of a densified boundary of `bounds` in `from`.
fn projected_bounds(bounds: &Bounds, from: Crs, to: Crs) -> Result<Option<Bounds>> {
    let reprojector = Reprojector::new(from, to)?;
    let mut out: Option<Bounds> = None;

    for i in 0..=EDGE_SAMPLES {
        let f = i as f64 / EDGE_SAMPLES as f64;
        let x = bounds.xmin + f * bounds.width();
        let y = bounds.ymin + f * bounds.height();
        let edge_points = [
            (x, bounds.ymin),
            (x, bounds.ymax),
            (bounds.xmin, y),
            (bounds.xmax, y),
        ];
        for (px, py) in edge_points {
            let Ok((qx, qy)) = reprojector.transform(px, py) else {
                continue;
            };
            if !(qx.is_finite() && qy.is_finite()) {
                continue;
            }
            match out.as_mut() {
                Some(b) => b.expand_to(qx, qy),
                None => {
                    out = Some(Bounds {
                        xmin: qx,
                        ymin: qy,
                        xmax: qx,
                        ymax: qy,
                    })
                }
            }
        }
    }
    Ok(out)
}

/// Mosaic a sequence of tiles onto `canvas` in the order given.
///
/// Tiles are produced lazily so only one is held at a time; the first error
/// aborts the merge.
pub fn merge_tiles<I>(canvas: Canvas, nodata: f64, resampling: Resampling, tiles: I) -> Result<GeoRaster>
where
    I: IntoIterator<Item = Result<GeoRaster>>,
{
    let mut mosaic = Mosaic::new(canvas, nodata, resampling)?;
    for tile in tiles {
        mosaic.add(tile?)?;
    }
    Ok(mosaic.finish())
}

/// Resample a single raster onto `canvas`, keeping its nodata sentinel.
pub fn align_to_canvas(raster: GeoRaster, canvas: Canvas, resampling: Resampling) -> Result<GeoRaster> {
    let nodata = raster.nodata();
    merge_tiles(canvas, nodata, resampling, std::iter::once(Ok(raster)))
}
