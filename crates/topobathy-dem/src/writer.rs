//! Tiled, compressed GeoTIFF writing.
//!
//! Output is always block-tiled with edge tiles padded by the nodata
//! sentinel. BigTIFF layout is used by default so artifacts may exceed the
//! 4 GiB offset limit of classic TIFF. Files are written to a temporary path
//! next to the target and renamed into place only after the last byte is on
//! disk, so a failed write never leaves a partial artifact behind.

use crate::geotiff::{
    build_geokey_directory, geo_tag, TAG_GDAL_NODATA, TAG_GEO_KEY_DIRECTORY, TAG_MODEL_PIXEL_SCALE, TAG_MODEL_TIEPOINT,
};
use crate::{Crs, GeoRaster, RasterDtype, RasterError, Result};
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tiff::encoder::{TiffEncoder, TiffKind};
use tiff::tags::{CompressionMethod, PhotometricInterpretation, PlanarConfiguration, SampleFormat, Tag};
use tiff::TiffError;
use tracing::{debug, info};

/// Block compression for written tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Uncompressed tiles.
    None,
    /// TIFF LZW (lossless).
    #[default]
    Lzw,
    /// zlib/Deflate (lossless).
    Deflate,
}

impl Compression {
    fn tag_value(&self) -> u16 {
        match self {
            Compression::None => CompressionMethod::None.to_u16(),
            Compression::Lzw => CompressionMethod::LZW.to_u16(),
            Compression::Deflate => CompressionMethod::Deflate.to_u16(),
        }
    }

    fn compress(&self, block: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(block.to_vec()),
            Compression::Lzw => weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                .encode(block)
                .map_err(|e| RasterError::Lzw(e.to_string())),
            Compression::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::with_capacity(block.len() / 2), flate2::Compression::default());
                encoder.write_all(block)?;
                Ok(encoder.finish()?)
            }
        }
    }
}

/// Storage options for [`write_geotiff`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Sample type stored in the file.
    pub dtype: RasterDtype,
    /// Tile compression.
    pub compression: Compression,
    /// Tile edge length in pixels (a multiple of 16).
    pub tile_size: u32,
    /// Write BigTIFF (64-bit offsets).
    pub bigtiff: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            dtype: RasterDtype::Float32,
            compression: Compression::Lzw,
            tile_size: 256,
            bigtiff: true,
        }
    }
}

impl WriteOptions {
    /// Check the options against the TIFF tiling rules.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 || self.tile_size % 16 != 0 {
            return Err(RasterError::InvalidOptions(format!(
                "tile_size must be a positive multiple of 16, got {}",
                self.tile_size
            )));
        }
        Ok(())
    }
}

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Final artifact path.
    pub path: PathBuf,
    /// File size in bytes.
    pub bytes: u64,
    /// Number of tiles written.
    pub tiles: usize,
}

/// Write a raster as a tiled GeoTIFF.
///
/// Fails before touching the filesystem if the raster has no CRS or if any
/// value (or the sentinel) cannot be stored in `options.dtype`.
pub fn write_geotiff<P: AsRef<Path>>(raster: &GeoRaster, path: P, options: &WriteOptions) -> Result<WriteSummary> {
    let path = path.as_ref();
    options.validate()?;
    let crs = raster.require_crs(&format!("writing {}", path.display()))?;
    check_dtype(raster, options.dtype)?;

    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let resource = |source: std::io::Error| RasterError::Resource {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(resource)?;
    let tiles = {
        let mut buffered = BufWriter::new(tmp.as_file_mut());
        let tiles = if options.bigtiff {
            let mut encoder = TiffEncoder::new_big(&mut buffered).map_err(|e| tiff_error(e, path))?;
            encode(&mut encoder, raster, crs, options, true).map_err(|e| lift_io(e, path))?
        } else {
            let mut encoder = TiffEncoder::new(&mut buffered).map_err(|e| tiff_error(e, path))?;
            encode(&mut encoder, raster, crs, options, false).map_err(|e| lift_io(e, path))?
        };
        buffered.flush().map_err(resource)?;
        tiles
    };
    tmp.as_file().sync_all().map_err(resource)?;
    let bytes = tmp.as_file().metadata().map_err(resource)?.len();

    // Dropping `tmp` on any earlier error removes the temporary file
    tmp.persist(path).map_err(|e| resource(e.error))?;

    info!(
        path = %path.display(),
        bytes,
        tiles,
        dtype = %options.dtype,
        crs = %crs,
        "wrote GeoTIFF"
    );

    Ok(WriteSummary {
        path: path.to_path_buf(),
        bytes,
        tiles,
    })
}

fn check_dtype(raster: &GeoRaster, dtype: RasterDtype) -> Result<()> {
    dtype.check_sentinel(raster.nodata())?;
    for &value in raster.data().iter() {
        if !raster.is_missing(value) {
            dtype.check_stored(value, raster.nodata())?;
        }
    }
    Ok(())
}

fn encode<W: Write + Seek, K: TiffKind>(
    encoder: &mut TiffEncoder<W, K>,
    raster: &GeoRaster,
    crs: Crs,
    options: &WriteOptions,
    big: bool,
) -> Result<usize> {
    let (width, height) = (raster.width(), raster.height());
    let tile = options.tile_size as usize;
    let tiles_across = width.div_ceil(tile);
    let tiles_down = height.div_ceil(tile);
    let dtype = options.dtype;
    let nodata = raster.nodata();
    let data = raster.data();

    let mut dir = encoder.new_directory()?;
    let mut offsets = Vec::with_capacity(tiles_across * tiles_down);
    let mut byte_counts = Vec::with_capacity(tiles_across * tiles_down);
    let mut block = Vec::with_capacity(tile * tile * dtype.byte_width());

    // Tiles are stored row by row, left to right
    for tile_row in 0..tiles_down {
        for tile_col in 0..tiles_across {
            block.clear();
            for r in 0..tile {
                let row = tile_row * tile + r;
                for c in 0..tile {
                    let col = tile_col * tile + c;
                    let value = if row < height && col < width {
                        let v = data[[row, col]];
                        if raster.is_missing(v) {
                            nodata
                        } else {
                            v
                        }
                    } else {
                        nodata
                    };
                    dtype.push_ne_bytes(value, &mut block);
                }
            }

            let compressed = options.compression.compress(&block)?;
            let offset = dir.write_data(&compressed[..])?;
            offsets.push(offset);
            byte_counts.push(compressed.len() as u64);
        }
    }
    debug!(tiles = offsets.len(), "encoded tile blocks");

    let transform = raster.transform();
    let sample_format = if dtype.is_float() {
        SampleFormat::IEEEFP
    } else {
        SampleFormat::Int
    };

    dir.write_tag(Tag::ImageWidth, width as u32)?;
    dir.write_tag(Tag::ImageLength, height as u32)?;
    dir.write_tag(Tag::BitsPerSample, (dtype.byte_width() * 8) as u16)?;
    dir.write_tag(Tag::Compression, options.compression.tag_value())?;
    dir.write_tag(Tag::PhotometricInterpretation, PhotometricInterpretation::BlackIsZero.to_u16())?;
    dir.write_tag(Tag::SamplesPerPixel, 1u16)?;
    dir.write_tag(Tag::PlanarConfiguration, PlanarConfiguration::Chunky.to_u16())?;
    dir.write_tag(Tag::SampleFormat, sample_format.to_u16())?;
    dir.write_tag(Tag::TileWidth, options.tile_size)?;
    dir.write_tag(Tag::TileLength, options.tile_size)?;

    if big {
        dir.write_tag(Tag::TileOffsets, &offsets[..])?;
        dir.write_tag(Tag::TileByteCounts, &byte_counts[..])?;
    } else {
        let offsets = narrow_offsets(&offsets)?;
        let byte_counts = narrow_offsets(&byte_counts)?;
        dir.write_tag(Tag::TileOffsets, &offsets[..])?;
        dir.write_tag(Tag::TileByteCounts, &byte_counts[..])?;
    }

    let pixel_scale = [transform.pixel_width, transform.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    let geokeys = build_geokey_directory(crs);
    let nodata_text = format_nodata(nodata);

    dir.write_tag(geo_tag(TAG_MODEL_PIXEL_SCALE), &pixel_scale[..])?;
    dir.write_tag(geo_tag(TAG_MODEL_TIEPOINT), &tiepoint[..])?;
    dir.write_tag(geo_tag(TAG_GEO_KEY_DIRECTORY), &geokeys[..])?;
    dir.write_tag(geo_tag(TAG_GDAL_NODATA), nodata_text.as_str())?;

    dir.finish()?;
    Ok(offsets.len())
}

fn narrow_offsets(values: &[u64]) -> Result<Vec<u32>> {
    values
        .iter()
        .map(|&v| {
            u32::try_from(v).map_err(|_| {
                RasterError::InvalidOptions("output exceeds the 4 GiB classic TIFF limit; enable bigtiff".to_string())
            })
        })
        .collect()
}

/// GDAL writes the sentinel as plain decimal text, `nan` for NaN.
fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", nodata)
    }
}

fn tiff_error(err: TiffError, path: &Path) -> RasterError {
    match err {
        TiffError::IoError(source) => RasterError::Resource {
            path: path.to_path_buf(),
            source,
        },
        other => RasterError::Tiff(other),
    }
}

fn lift_io(err: RasterError, path: &Path) -> RasterError {
    match err {
        RasterError::Tiff(e) => tiff_error(e, path),
        RasterError::Io(source) => RasterError::Resource {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{read_geotiff, GeoTransform};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn sample_raster() -> GeoRaster {
        let mut data = Array2::from_shape_fn((37, 53), |(r, c)| (r as f64) * 10.0 - (c as f64) * 0.25);
        data[[5, 7]] = -9999.0;
        data[[36, 52]] = f64::NAN;
        let transform = GeoTransform::new(500_000.0, 4_200_000.0, 30.0, 30.0).unwrap();
        GeoRaster::new(data, transform, Some(Crs::from_epsg(32633).unwrap()), -9999.0).unwrap()
    }

    fn options(compression: Compression, bigtiff: bool) -> WriteOptions {
        WriteOptions {
            dtype: RasterDtype::Float32,
            compression,
            tile_size: 16,
            bigtiff,
        }
    }

    fn assert_round_trip(compression: Compression, bigtiff: bool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let raster = sample_raster();

        let summary = write_geotiff(&raster, &path, &options(compression, bigtiff)).unwrap();
        assert_eq!(summary.tiles, 4 * 3);
        assert!(summary.bytes > 0);

        let back = read_geotiff(&path).unwrap();
        assert_eq!(back.width(), 53);
        assert_eq!(back.height(), 37);
        assert_eq!(back.crs(), raster.crs());
        assert_eq!(back.nodata(), -9999.0);
        assert!(back.transform().approx_eq(raster.transform(), 1e-9));
        for ((r, c), &v) in raster.data().indexed_iter() {
            let got = back.data()[[r, c]];
            if raster.is_missing(v) {
                assert_eq!(got, -9999.0, "pixel ({}, {}) should be nodata", r, c);
            } else {
                assert_relative_eq!(got, v, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_round_trip_lzw_bigtiff() {
        assert_round_trip(Compression::Lzw, true);
    }

    #[test]
    fn test_round_trip_deflate_classic() {
        assert_round_trip(Compression::Deflate, false);
    }

    #[test]
    fn test_round_trip_uncompressed() {
        assert_round_trip(Compression::None, true);
    }

    #[test]
    fn test_missing_crs_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let transform = GeoTransform::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let raster = GeoRaster::new(Array2::zeros((2, 2)), transform, None, -9999.0).unwrap();

        let err = write_geotiff(&raster, &path, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, RasterError::MissingProjection { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_narrowing_error_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let mut raster = sample_raster();
        raster.data_mut()[[0, 0]] = 0.5;
        let opts = WriteOptions {
            dtype: RasterDtype::Int16,
            ..WriteOptions::default()
        };

        let err = write_geotiff(&raster, &path, &opts).unwrap_err();
        assert!(matches!(err, RasterError::DtypePrecision { .. }));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_value_narrowing_onto_sentinel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let transform = GeoTransform::new(0.0, 1.0, 1.0, 1.0).unwrap();
        let data = Array2::from_shape_vec((1, 2), vec![-9999.0001, 5.0]).unwrap();
        let raster = GeoRaster::new(data, transform, Some(Crs::WGS84), -9999.0).unwrap();

        let err = write_geotiff(&raster, &path, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, RasterError::DtypePrecision { .. }));
        assert!(!path.exists());

        let float64 = WriteOptions {
            dtype: RasterDtype::Float64,
            ..WriteOptions::default()
        };
        write_geotiff(&raster, &path, &float64).unwrap();
        assert_eq!(read_geotiff(&path).unwrap().data()[[0, 0]], -9999.0001);
    }

    #[test]
    fn test_int16_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.tif");
        let transform = GeoTransform::new(0.0, 3.0, 1.0, 1.0).unwrap();
        let data = Array2::from_shape_vec((3, 3), vec![-5.0, 0.0, 7.0, 12.0, -32768.0, 3.0, 1.0, 2.0, 3.0]).unwrap();
        let raster = GeoRaster::new(data.clone(), transform, Some(Crs::WGS84), -32768.0).unwrap();
        let opts = WriteOptions {
            dtype: RasterDtype::Int16,
            compression: Compression::Lzw,
            tile_size: 16,
            bigtiff: true,
        };

        write_geotiff(&raster, &path, &opts).unwrap();
        let back = read_geotiff(&path).unwrap();
        assert_eq!(back.data(), &data);
        assert_eq!(back.crs(), Some(Crs::WGS84));
        assert_eq!(back.nodata(), -32768.0);
    }

    #[test]
    fn test_overwrite_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        std::fs::write(&path, b"stale").unwrap();

        write_geotiff(&sample_raster(), &path, &options(Compression::Lzw, true)).unwrap();
        assert!(read_geotiff(&path).is_ok());
    }

    #[test]
    fn test_invalid_tile_size() {
        let opts = WriteOptions {
            tile_size: 100,
            ..WriteOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_format_nodata() {
        assert_eq!(format_nodata(-9999.0), "-9999");
        assert_eq!(format_nodata(-3.5), "-3.5");
        assert_eq!(format_nodata(f64::NAN), "nan");
    }
}
