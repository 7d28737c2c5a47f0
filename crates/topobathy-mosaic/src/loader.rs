//! Turn a repaired point tile into a georeferenced raster.

use ndarray::Array2;
use std::path::Path;
use topobathy_dem::{Crs, GeoRaster, GeoTransform};
use tracing::debug;

use crate::xyz::{read_points, PointRecord};
use crate::{MosaicError, Result};

/// Relative tolerance when checking that a coordinate step is a whole
/// number of lattice spacings.
const SPACING_TOLERANCE: f64 = 1e-6;

/// Largest lattice one tile may span, in cells (2 GiB of `f64`).
const MAX_TILE_CELLS: usize = 1 << 28;

/// Load a repaired tile and attach `crs`.
///
/// The file is read and closed before gridding; cells without a point hold
/// `nodata`.
pub fn load_tile<P: AsRef<Path>>(path: P, crs: Crs, nodata: f64) -> Result<GeoRaster> {
    let path = path.as_ref();
    let points = read_points(path)?;
    let raster = grid_points(&points, Some(crs), nodata, &path.display().to_string())?;
    debug!(
        tile = %path.display(),
        points = points.len(),
        width = raster.width(),
        height = raster.height(),
        "Loaded tile"
    );
    Ok(raster)
}

/// Arrange points on the regular lattice they imply.
///
/// Each point is the centre of one pixel. The spacing along each axis is the
/// smallest gap between distinct coordinates and every other gap must be a
/// multiple of it. When two points share a cell the later one wins.
pub fn grid_points(points: &[PointRecord], crs: Option<Crs>, nodata: f64, tile: &str) -> Result<GeoRaster> {
    let gridding = |reason: String| MosaicError::Gridding {
        tile: tile.to_string(),
        reason,
    };
    if points.is_empty() {
        return Err(gridding("tile has no records".to_string()));
    }

    let xs = distinct(points.iter().map(|p| p.x));
    let ys = distinct(points.iter().map(|p| p.y));
    let dx = spacing(&xs, "x").map_err(gridding)?;
    let dy = spacing(&ys, "y").map_err(gridding)?;

    let (xmin, xmax) = (xs[0], xs[xs.len() - 1]);
    let (ymin, ymax) = (ys[0], ys[ys.len() - 1]);
    let width = cells_along(xmax - xmin, dx)
        .ok_or_else(|| gridding(format!("x extent {} spans too many cells", xmax - xmin)))?;
    let height = cells_along(ymax - ymin, dy)
        .ok_or_else(|| gridding(format!("y extent {} spans too many cells", ymax - ymin)))?;
    match width.checked_mul(height) {
        Some(cells) if cells <= MAX_TILE_CELLS => {}
        _ => {
            return Err(gridding(format!(
                "lattice of {}x{} cells for {} points exceeds {} cells",
                width,
                height,
                points.len(),
                MAX_TILE_CELLS
            )))
        }
    }

    let mut data = Array2::from_elem((height, width), nodata);
    for p in points {
        let col = ((p.x - xmin) / dx).round() as usize;
        let row = ((ymax - p.y) / dy).round() as usize;
        data[[row, col]] = p.z;
    }

    let transform = GeoTransform::new(xmin - dx / 2.0, ymax + dy / 2.0, dx, dy)?;
    Ok(GeoRaster::new(data, transform, crs, nodata)?)
}

/// Number of lattice cells covering `extent` at `step`, both ends included.
fn cells_along(extent: f64, step: f64) -> Option<usize> {
    let steps = (extent / step).round();
    if !steps.is_finite() || steps < 0.0 || steps >= MAX_TILE_CELLS as f64 {
        return None;
    }
    (steps as usize).checked_add(1)
}

fn distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

fn spacing(sorted: &[f64], axis: &str) -> std::result::Result<f64, String> {
    if sorted.len() < 2 {
        return Err(format!(
            "needs at least two distinct {} values to derive a spacing, found {}",
            axis,
            sorted.len()
        ));
    }
    let step = sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(f64::INFINITY, f64::min);

    for w in sorted.windows(2) {
        let gap = w[1] - w[0];
        let multiple = gap / step;
        if (multiple - multiple.round()).abs() > SPACING_TOLERANCE * multiple.max(1.0) {
            return Err(format!(
                "irregular {} spacing: gap {} between {} and {} is not a multiple of {}",
                axis, gap, w[0], w[1], step
            ));
        }
    }
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn pts(raw: &[(f64, f64, f64)]) -> Vec<PointRecord> {
        raw.iter().map(|&(x, y, z)| PointRecord { x, y, z }).collect()
    }

    #[test]
    fn test_grid_full_lattice() {
        let points = pts(&[
            (0.0, 10.0, 1.0),
            (10.0, 10.0, 2.0),
            (0.0, 0.0, 3.0),
            (10.0, 0.0, 4.0),
        ]);
        let raster = grid_points(&points, Some(Crs::WGS84), -9999.0, "t").unwrap();
        assert_eq!(raster.data(), &array![[1.0, 2.0], [3.0, 4.0]]);
        let t = raster.transform();
        assert_eq!((t.origin_x, t.origin_y), (-5.0, 15.0));
        assert_eq!((t.pixel_width, t.pixel_height), (10.0, 10.0));
        assert_eq!(raster.crs(), Some(Crs::WGS84));
    }

    #[test]
    fn test_holes_hold_nodata() {
        let points = pts(&[(0.0, 0.0, 1.0), (30.0, 0.0, 3.0), (10.0, 5.0, 4.0)]);
        let raster = grid_points(&points, None, -9999.0, "t").unwrap();
        assert_eq!(
            raster.data(),
            &array![[-9999.0, 4.0, -9999.0, -9999.0], [1.0, -9999.0, -9999.0, 3.0]]
        );
    }

    #[test]
    fn test_duplicate_point_later_wins() {
        let points = pts(&[(0.0, 0.0, 1.0), (1.0, 0.0, 2.0), (0.0, 1.0, 3.0), (0.0, 0.0, 9.0)]);
        let raster = grid_points(&points, None, f64::NAN, "t").unwrap();
        assert_eq!(raster.data()[[1, 0]], 9.0);
    }

    #[test]
    fn test_irregular_spacing_fails() {
        let points = pts(&[(0.0, 0.0, 1.0), (2.0, 0.0, 1.0), (5.0, 0.0, 1.0), (0.0, 2.0, 1.0)]);
        let err = grid_points(&points, None, -9999.0, "t").unwrap_err();
        assert!(matches!(err, MosaicError::Gridding { .. }));
    }

    #[test]
    fn test_single_row_cannot_be_gridded() {
        let points = pts(&[(0.0, 0.0, 1.0), (1.0, 0.0, 1.0)]);
        assert!(matches!(
            grid_points(&points, None, -9999.0, "t"),
            Err(MosaicError::Gridding { .. })
        ));
        assert!(grid_points(&[], None, -9999.0, "t").is_err());
    }

    #[test]
    fn test_runaway_lattice_is_rejected() {
        let far = pts(&[(0.0, 0.0, 1.0), (1.0, 0.0, 2.0), (0.0, 1.0, 3.0), (1e20, 0.0, 4.0)]);
        assert!(matches!(
            grid_points(&far, None, -9999.0, "t"),
            Err(MosaicError::Gridding { .. })
        ));

        // Each axis fits on its own but the product does not
        let wide = pts(&[(0.0, 0.0, 1.0), (1.0, 0.0, 1.0), (20_000.0, 0.0, 1.0), (0.0, 1.0, 1.0), (0.0, 20_000.0, 1.0)]);
        assert!(matches!(
            grid_points(&wide, None, -9999.0, "t"),
            Err(MosaicError::Gridding { .. })
        ));
    }
}
