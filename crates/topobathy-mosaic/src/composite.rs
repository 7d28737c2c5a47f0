//! Priority compositing of two aligned rasters.

use topobathy_dem::{is_nodata, GeoRaster};
use tracing::debug;

use crate::{MosaicError, Result};

/// Overlay `primary` on `secondary`.
///
/// Both rasters must already share a pixel grid and CRS. Each output pixel
/// is the primary value when valid, else the secondary value when valid,
/// else the primary's sentinel. The primary's buffer is reused for the
/// output.
pub fn composite(primary: GeoRaster, secondary: GeoRaster) -> Result<GeoRaster> {
    let primary_crs = primary.require_crs("compositing the primary raster")?;
    let secondary_crs = secondary.require_crs("compositing the secondary raster")?;
    if primary_crs != secondary_crs {
        return Err(MosaicError::GridMismatch(format!(
            "primary is in {}, secondary in {}",
            primary_crs, secondary_crs
        )));
    }
    if (primary.width(), primary.height()) != (secondary.width(), secondary.height()) {
        return Err(MosaicError::GridMismatch(format!(
            "primary is {}x{}, secondary {}x{}",
            primary.width(),
            primary.height(),
            secondary.width(),
            secondary.height()
        )));
    }
    if !primary.same_grid(&secondary) {
        return Err(MosaicError::GridMismatch(format!(
            "transforms differ: {:?} vs {:?}",
            primary.transform(),
            secondary.transform()
        )));
    }

    let mut out = primary;
    let nodata = out.nodata();
    let fallback = secondary.nodata();
    let mut filled = 0usize;
    for (p, &s) in out.data_mut().iter_mut().zip(secondary.data().iter()) {
        if !is_nodata(*p, nodata) {
            continue;
        }
        if is_nodata(s, fallback) {
            *p = nodata;
        } else {
            *p = s;
            filled += 1;
        }
    }
    debug!(filled, "Filled primary gaps from secondary");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use proptest::prelude::*;
    use topobathy_dem::{Crs, GeoTransform};

    fn raster(data: Array2<f64>, nodata: f64) -> GeoRaster {
        let t = GeoTransform::new(0.0, 10.0, 1.0, 1.0).unwrap();
        GeoRaster::new(data, t, Some(Crs::WGS84), nodata).unwrap()
    }

    #[test]
    fn test_primary_wins_then_secondary_then_sentinel() {
        let bathy = raster(array![[-5.0, -9999.0, f64::NAN, -9999.0]], -9999.0);
        let topo = raster(array![[3.0, 7.0, 8.0, f64::NAN]], f64::NAN);
        let out = composite(bathy, topo).unwrap();
        assert_eq!(out.data(), &array![[-5.0, 7.0, 8.0, -9999.0]]);
        assert_eq!(out.nodata(), -9999.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = raster(array![[1.0, 2.0]], -9999.0);
        let b = raster(array![[1.0], [2.0]], -9999.0);
        assert!(matches!(composite(a, b), Err(MosaicError::GridMismatch(_))));
    }

    #[test]
    fn test_transform_mismatch() {
        let a = raster(array![[1.0]], -9999.0);
        let t = GeoTransform::new(0.5, 10.0, 1.0, 1.0).unwrap();
        let b = GeoRaster::new(array![[1.0]], t, Some(Crs::WGS84), -9999.0).unwrap();
        assert!(matches!(composite(a, b), Err(MosaicError::GridMismatch(_))));
    }

    #[test]
    fn test_crs_required_and_matching() {
        let a = raster(array![[1.0]], -9999.0);
        let t = *a.transform();
        let bare = GeoRaster::new(array![[1.0]], t, None, -9999.0).unwrap();
        assert!(composite(a.clone(), bare).unwrap_err().is_missing_projection());

        let other = raster(array![[1.0]], -9999.0).with_crs(Crs::from_epsg(3857).unwrap());
        assert!(matches!(composite(a, other), Err(MosaicError::GridMismatch(_))));
    }

    fn cell() -> impl Strategy<Value = f64> {
        prop_oneof![Just(-9999.0), Just(f64::NAN), -500.0f64..500.0]
    }

    proptest! {
        #[test]
        fn prop_composite_rule(pairs in prop::collection::vec((cell(), cell()), 1..40)) {
            let (p, s): (Vec<f64>, Vec<f64>) = pairs.iter().copied().unzip();
            let n = pairs.len();
            let out = composite(
                raster(Array2::from_shape_vec((1, n), p.clone()).unwrap(), -9999.0),
                raster(Array2::from_shape_vec((1, n), s.clone()).unwrap(), -9999.0),
            )
            .unwrap();
            for i in 0..n {
                let expected = if !is_nodata(p[i], -9999.0) {
                    p[i]
                } else if !is_nodata(s[i], -9999.0) {
                    s[i]
                } else {
                    -9999.0
                };
                prop_assert_eq!(out.data()[[0, i]], expected);
            }
        }
    }
}
