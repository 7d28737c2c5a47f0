//! GeoTIFF reading.

use crate::geotiff::{
    geo_tag, parse_geokey_crs, TAG_GDAL_NODATA, TAG_GEO_KEY_DIRECTORY, TAG_MODEL_PIXEL_SCALE, TAG_MODEL_TIEPOINT,
    TAG_MODEL_TRANSFORMATION,
};
use crate::{Crs, GeoRaster, GeoTransform, RasterError, Result};
use ndarray::Array2;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tracing::debug;

/// Load a single-band GeoTIFF into memory.
///
/// The transform comes from ModelTiepoint + ModelPixelScale, or from a
/// ModelTransformation matrix without rotation. The CRS comes from the
/// GeoKey directory and is `None` when the file carries no EPSG code. A
/// missing `GDAL_NODATA` tag yields a NaN sentinel.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<GeoRaster> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    // Topography rasters for a whole region easily exceed the default limits
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 4 * 1024 * 1024 * 1024; // 4 GB
    limits.intermediate_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.ifd_value_size = 1024 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    let transform = read_geotransform(&mut decoder, width, height)?;
    let crs = read_crs(&mut decoder)?;
    let nodata = read_nodata_value(&mut decoder);
    let values = decode_samples(&mut decoder)?;

    let expected = width as usize * height as usize;
    if values.len() != expected {
        return Err(RasterError::UnsupportedDataType(format!(
            "expected {} samples for a single-band {}x{} image, got {}",
            expected,
            width,
            height,
            values.len()
        )));
    }

    debug!(
        path = %path.display(),
        width,
        height,
        crs = ?crs.map(|c| c.to_string()),
        nodata,
        "read GeoTIFF"
    );

    let data = Array2::from_shape_vec((height as usize, width as usize), values)
        .map_err(|e| RasterError::InvalidGeometry(e.to_string()))?;
    GeoRaster::new(data, transform, crs, nodata)
}

/// Read the geotransform from GeoTIFF tags.
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>, width: u32, height: u32) -> Result<GeoTransform> {
    let tiepoint = decoder.get_tag_f64_vec(geo_tag(TAG_MODEL_TIEPOINT));
    let pixel_scale = decoder.get_tag_f64_vec(geo_tag(TAG_MODEL_PIXEL_SCALE));

    if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            // Tiepoint format: [i, j, k, x, y, z] ties raster (i, j) to world (x, y)
            let (i, j) = (tiepoint[0], tiepoint[1]);
            let origin_x = tiepoint[3] - i * scale[0];
            let origin_y = tiepoint[4] + j * scale[1];
            return GeoTransform::new(origin_x, origin_y, scale[0], scale[1]);
        }
    }

    if let Ok(matrix) = decoder.get_tag_f64_vec(geo_tag(TAG_MODEL_TRANSFORMATION)) {
        if matrix.len() >= 8 {
            // Row-major 4x4: x = m0*i + m1*j + m3, y = m4*i + m5*j + m7
            if matrix[1] != 0.0 || matrix[4] != 0.0 {
                return Err(RasterError::InvalidGeoTiff(
                    "rotated ModelTransformation is not supported".to_string(),
                ));
            }
            return GeoTransform::new(matrix[3], matrix[7], matrix[0], -matrix[5]);
        }
    }

    Err(RasterError::InvalidGeoTiff(format!(
        "{}x{} image has neither tiepoint/pixel-scale nor transformation tags",
        width, height
    )))
}

/// Read the EPSG code from the GeoKey directory, if any.
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<Crs>> {
    match decoder.get_tag_u16_vec(geo_tag(TAG_GEO_KEY_DIRECTORY)) {
        Ok(keys) => match parse_geokey_crs(&keys) {
            Some(epsg) => Ok(Some(Crs::from_epsg(epsg)?)),
            None => Ok(None),
        },
        Err(_) => Ok(None),
    }
}

/// Decode sample data from the TIFF decoder.
fn decode_samples<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f64>> {
    let result = decoder.read_image()?;

    match result {
        DecodingResult::F32(data) => Ok(data.into_iter().map(f64::from).collect()),
        DecodingResult::F64(data) => Ok(data),
        DecodingResult::I16(data) => Ok(data.into_iter().map(f64::from).collect()),
        DecodingResult::I32(data) => Ok(data.into_iter().map(f64::from).collect()),
        DecodingResult::U16(data) => Ok(data.into_iter().map(f64::from).collect()),
        DecodingResult::U32(data) => Ok(data.into_iter().map(f64::from).collect()),
        DecodingResult::U8(data) => Ok(data.into_iter().map(f64::from).collect()),
        DecodingResult::I8(data) => Ok(data.into_iter().map(f64::from).collect()),
        DecodingResult::U64(data) => Ok(data.into_iter().map(|v| v as f64).collect()),
        DecodingResult::I64(data) => Ok(data.into_iter().map(|v| v as f64).collect()),
    }
}

/// Try to read the no-data value from the GDAL_NODATA tag.
fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> f64 {
    // GDAL_NODATA is stored as an ASCII string
    decoder
        .get_tag_ascii_string(geo_tag(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse().ok())
        .unwrap_or(f64::NAN)
}
