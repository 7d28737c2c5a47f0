//! GeoTIFF tag numbers and GeoKey directory encoding.

use crate::Crs;
use tiff::tags::Tag;

/// ModelPixelScaleTag.
pub(crate) const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
/// ModelTiepointTag.
pub(crate) const TAG_MODEL_TIEPOINT: u16 = 33922;
/// ModelTransformationTag.
pub(crate) const TAG_MODEL_TRANSFORMATION: u16 = 34264;
/// GeoKeyDirectoryTag.
pub(crate) const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
/// GDAL_NODATA, ASCII.
pub(crate) const TAG_GDAL_NODATA: u16 = 42113;

/// Resolve a GeoTIFF tag number to the decoder's tag.
///
/// The decoder reports known numbers as named variants, so a bare
/// `Tag::Unknown(code)` would never match them.
pub(crate) fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

const GEO_KEY_MODEL_TYPE: u16 = 1024;
const GEO_KEY_RASTER_TYPE: u16 = 1025;
const GEO_KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const GEO_KEY_PROJECTED_CRS: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Encode a GeoKey directory declaring `crs` with pixel-is-area semantics.
///
/// Layout: a 4-entry header `[version, revision, minor, key_count]` followed
/// by `[key_id, tag_location, count, value]` per key, sorted by key id.
pub(crate) fn build_geokey_directory(crs: Crs) -> Vec<u16> {
    let (model_type, crs_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEO_KEY_GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, GEO_KEY_PROJECTED_CRS)
    };

    vec![
        1, 1, 0, 3, //
        GEO_KEY_MODEL_TYPE, 0, 1, model_type, //
        GEO_KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA, //
        crs_key, 0, 1, crs.epsg(),
    ]
}

/// Extract the EPSG code from a GeoKey directory.
///
/// Only inline (tag location 0) keys are considered; user-defined CRSs
/// (32767) are treated as absent.
pub(crate) fn parse_geokey_crs(keys: &[u16]) -> Option<u16> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;

    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == 32767 {
            continue;
        }
        match key_id {
            // A projected CRS wins over its base geographic CRS
            GEO_KEY_PROJECTED_CRS => return Some(value),
            GEO_KEY_GEOGRAPHIC_TYPE => geographic = Some(value),
            _ => {}
        }
    }
    geographic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projected_geokeys_round_trip() {
        let crs = Crs::from_epsg(32633).unwrap();
        let keys = build_geokey_directory(crs);
        assert_eq!(keys.len(), 16);
        assert_eq!(&keys[12..], &[GEO_KEY_PROJECTED_CRS, 0, 1, 32633]);
        assert_eq!(parse_geokey_crs(&keys), Some(32633));
    }

    #[test]
    fn test_geographic_geokeys_round_trip() {
        let keys = build_geokey_directory(Crs::WGS84);
        assert_eq!(&keys[4..8], &[GEO_KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC]);
        assert_eq!(parse_geokey_crs(&keys), Some(4326));
    }

    #[test]
    fn test_projected_key_preferred_over_geographic() {
        let keys = [1, 1, 0, 2, 2048, 0, 1, 4269, 3072, 0, 1, 26915];
        assert_eq!(parse_geokey_crs(&keys), Some(26915));
    }

    #[test]
    fn test_user_defined_or_truncated_directory() {
        assert_eq!(parse_geokey_crs(&[1, 1, 0, 1, 3072, 0, 1, 32767]), None);
        assert_eq!(parse_geokey_crs(&[1, 1]), None);
    }
}
