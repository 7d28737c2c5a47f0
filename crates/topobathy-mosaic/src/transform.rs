//! Per-pixel value transforms.
//!
//! Each transform takes ownership of a raster, rewrites it in place and hands
//! it back. Missing pixels pass through untouched.

use topobathy_dem::{is_nodata, Crs, GeoRaster};
use tracing::debug;

use crate::{MosaicError, Result};

/// Negate every valid value, turning depths into elevations.
///
/// Applying it twice restores the input exactly. Fails if a negated value
/// would equal the sentinel and so silently become missing.
pub fn invert_sign(mut raster: GeoRaster) -> Result<GeoRaster> {
    let nodata = raster.nodata();
    if let Some(&value) = raster.data().iter().find(|&&v| !is_nodata(v, nodata) && -v == nodata) {
        return Err(MosaicError::SentinelCollision { value, nodata });
    }
    raster.map_valid(|v| -v);
    debug!("Inverted sign of valid pixels");
    Ok(raster)
}

/// Raise every valid value below `floor` to exactly `floor`.
///
/// Idempotent. Fails if `floor` is itself the sentinel and some value would
/// be raised onto it.
pub fn clip_floor(mut raster: GeoRaster, floor: f64) -> Result<GeoRaster> {
    let nodata = raster.nodata();
    if floor == nodata && raster.data().iter().any(|&v| !is_nodata(v, nodata) && v < floor) {
        return Err(MosaicError::SentinelCollision { value: floor, nodata });
    }
    raster.map_valid(|v| if v < floor { floor } else { v });
    debug!(floor, "Clipped valid pixels to floor");
    Ok(raster)
}

/// Rewrite every missing pixel to `nodata` and assign `crs`.
///
/// A raster that already carries a different CRS is rejected rather than
/// relabelled. So is a valid value equal to the new sentinel, which would
/// otherwise turn into a hole.
pub fn stamp(mut raster: GeoRaster, nodata: f64, crs: Crs) -> Result<GeoRaster> {
    if let Some(existing) = raster.crs() {
        if existing != crs {
            return Err(MosaicError::GridMismatch(format!(
                "raster is in {}, cannot stamp it as {}",
                existing, crs
            )));
        }
    }
    let old = raster.nodata();
    if let Some(&value) = raster
        .data()
        .iter()
        .find(|&&v| !is_nodata(v, old) && is_nodata(v, nodata))
    {
        return Err(MosaicError::SentinelCollision { value, nodata });
    }

    raster.replace_nodata(nodata);
    raster.set_crs(crs);
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use proptest::prelude::*;
    use topobathy_dem::GeoTransform;

    const NODATA: f64 = -9999.0;

    fn raster(data: Array2<f64>) -> GeoRaster {
        let t = GeoTransform::new(0.0, 0.0, 1.0, 1.0).unwrap();
        GeoRaster::new(data, t, None, NODATA).unwrap()
    }

    #[test]
    fn test_invert_sign_skips_missing() {
        let out = invert_sign(raster(array![[5.0, NODATA], [-2.5, f64::NAN]])).unwrap();
        assert_eq!(out.data()[[0, 0]], -5.0);
        assert_eq!(out.data()[[0, 1]], NODATA);
        assert_eq!(out.data()[[1, 0]], 2.5);
        assert!(out.data()[[1, 1]].is_nan());
    }

    #[test]
    fn test_invert_sign_refuses_to_create_sentinel() {
        let err = invert_sign(raster(array![[9999.0]])).unwrap_err();
        assert!(matches!(err, MosaicError::SentinelCollision { .. }));
    }

    #[test]
    fn test_clip_floor() {
        let out = clip_floor(raster(array![[-2.0, 3.0], [NODATA, 0.0]]), 0.0).unwrap();
        assert_eq!(out.data(), &array![[0.0, 3.0], [NODATA, 0.0]]);
    }

    #[test]
    fn test_stamp_rewrites_missing_and_sets_crs() {
        let out = stamp(raster(array![[1.0, NODATA, f64::NAN]]), -32768.0, Crs::WGS84).unwrap();
        assert_eq!(out.data(), &array![[1.0, -32768.0, -32768.0]]);
        assert_eq!(out.nodata(), -32768.0);
        assert_eq!(out.crs(), Some(Crs::WGS84));
    }

    #[test]
    fn test_stamp_rejects_conflicting_crs() {
        let r = raster(array![[1.0]]).with_crs(Crs::from_epsg(3857).unwrap());
        assert!(matches!(stamp(r, NODATA, Crs::WGS84), Err(MosaicError::GridMismatch(_))));
    }

    #[test]
    fn test_stamp_rejects_value_equal_to_new_sentinel() {
        let r = raster(array![[0.0, NODATA]]);
        assert!(matches!(
            stamp(r, 0.0, Crs::WGS84),
            Err(MosaicError::SentinelCollision { .. })
        ));
    }

    fn valid_values() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(
            prop_oneof![Just(NODATA), Just(f64::NAN), -1.0e4f64..1.0e4],
            1..32,
        )
        .prop_filter("no value negates onto the sentinel", |v| v.iter().all(|&x| x != 9999.0))
    }

    proptest! {
        #[test]
        fn prop_invert_sign_is_self_inverse(values in valid_values()) {
            let input = raster(Array2::from_shape_vec((1, values.len()), values.clone()).unwrap());
            let twice = invert_sign(invert_sign(input).unwrap()).unwrap();
            for (a, b) in twice.data().iter().zip(values.iter()) {
                prop_assert!(a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()));
            }
        }

        #[test]
        fn prop_clip_floor_is_idempotent(values in valid_values(), floor in -100.0f64..100.0) {
            let input = raster(Array2::from_shape_vec((1, values.len()), values).unwrap());
            let once = clip_floor(input, floor).unwrap();
            let twice = clip_floor(once.clone(), floor).unwrap();
            for (a, b) in once.data().iter().zip(twice.data().iter()) {
                prop_assert!(a.to_bits() == b.to_bits());
            }
            for &v in once.data().iter() {
                prop_assert!(once.is_missing(v) || v >= floor);
            }
        }
    }
}
