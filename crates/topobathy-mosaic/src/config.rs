//! Pipeline configuration.
//!
//! Loaded from a YAML file with `paths`, `canvas`, `tiles`, `topography`,
//! `output` and `repair` sections:
//!
//! ```yaml
//! paths:
//!   raw_tiles: data/raw
//!   repaired_tiles: data/repaired
//!   topography: data/dem.tif
//!   bathymetry_output: out/bathymetry.tif
//!   combined_output: out/topobathy.tif
//! canvas:
//!   bounds: { xmin: 500000, ymin: 4000000, xmax: 510000, ymax: 4010000 }
//!   resolution: 10
//!   crs: "EPSG:32633"
//! output:
//!   nodata: -9999
//!   dtype: float32
//! ```
//!
//! Selected fields can be overridden from the environment, see
//! [`PipelineConfig::apply_env_overrides`]. The configuration is validated
//! once and then treated as fixed for the run.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use topobathy_dem::{Bounds, Crs, RasterDtype, WriteOptions};
use tracing::debug;

use crate::canvas::Canvas;
use crate::merge::Resampling;
use crate::repair::RepairOptions;

/// Target resolution override.
pub const ENV_RESOLUTION: &str = "TOPOBATHY_RESOLUTION";
/// Target CRS override (`EPSG:n`).
pub const ENV_CRS: &str = "TOPOBATHY_CRS";
/// Canvas bounds override (`xmin,ymin,xmax,ymax`).
pub const ENV_BOUNDS: &str = "TOPOBATHY_BOUNDS";
/// Nodata sentinel override.
pub const ENV_NODATA: &str = "TOPOBATHY_NODATA";
/// Output dtype override.
pub const ENV_DTYPE: &str = "TOPOBATHY_DTYPE";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for [`PipelineConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },

    /// The configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of raw point-grid tiles. Never modified.
    pub raw_tiles: PathBuf,
    /// Directory receiving grid-repaired tiles.
    pub repaired_tiles: PathBuf,
    /// Topography GeoTIFF.
    pub topography: PathBuf,
    /// Intermediate bathymetry mosaic.
    pub bathymetry_output: PathBuf,
    /// Final combined raster.
    pub combined_output: PathBuf,
}

/// How point tiles are discovered and sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilesConfig {
    /// CRS of the tile coordinates. Defaults to the canvas CRS.
    pub crs: Option<Crs>,
    /// File extensions treated as tiles (case-insensitive).
    pub extensions: Vec<String>,
    /// Sampling used when folding tiles onto the canvas.
    pub resampling: Resampling,
}

impl Default for TilesConfig {
    fn default() -> Self {
        Self {
            crs: None,
            extensions: vec!["xyz".to_string()],
            resampling: Resampling::Nearest,
        }
    }
}

/// How the topography raster is prepared before compositing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopographyConfig {
    /// Values below this floor are raised to it.
    pub floor: f64,
    /// Sampling used when aligning the raster to the canvas.
    pub resampling: Resampling,
}

impl Default for TopographyConfig {
    fn default() -> Self {
        Self {
            floor: 0.0,
            resampling: Resampling::Nearest,
        }
    }
}

/// Sentinel and storage options for written rasters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Nodata sentinel stamped on every artifact.
    pub nodata: f64,
    /// GeoTIFF storage options.
    #[serde(flatten)]
    pub write: WriteOptions,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            nodata: -9999.0,
            write: WriteOptions::default(),
        }
    }
}

/// Complete configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input and output locations.
    pub paths: PathsConfig,
    /// Target grid.
    pub canvas: Canvas,
    /// Tile discovery and sampling.
    #[serde(default)]
    pub tiles: TilesConfig,
    /// Topography preparation.
    #[serde(default)]
    pub topography: TopographyConfig,
    /// Output sentinel and storage.
    #[serde(default)]
    pub output: OutputOptions,
    /// Grid repair options.
    #[serde(default)]
    pub repair: RepairOptions,
}

impl PipelineConfig {
    /// Read, apply environment overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_yaml_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file without overrides or validation.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_yaml_str(&text)
    }

    /// Parse YAML text without overrides or validation.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `TOPOBATHY_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_RESOLUTION) {
            self.canvas.resolution = parse_env(ENV_RESOLUTION, &value)?;
        }
        if let Some(value) = lookup(ENV_CRS) {
            self.canvas.crs = parse_env(ENV_CRS, &value)?;
        }
        if let Some(value) = lookup(ENV_BOUNDS) {
            self.canvas.bounds = parse_bounds(&value)?;
        }
        if let Some(value) = lookup(ENV_NODATA) {
            self.output.nodata = parse_env(ENV_NODATA, &value)?;
        }
        if let Some(value) = lookup(ENV_DTYPE) {
            self.output.write.dtype = parse_env::<RasterDtype>(ENV_DTYPE, &value)?;
        }
        Ok(())
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.canvas
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("canvas: {}", e)))?;
        self.output
            .write
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("output: {}", e)))?;
        self.output
            .write
            .dtype
            .check_sentinel(self.output.nodata)
            .map_err(|e| ConfigError::Invalid(format!("output: {}", e)))?;
        if !self.topography.floor.is_finite() {
            return Err(ConfigError::Invalid("topography.floor must be finite".to_string()));
        }
        self.repair.validate()?;

        let paths = &self.paths;
        if paths.raw_tiles == paths.repaired_tiles {
            return Err(ConfigError::Invalid(
                "paths.repaired_tiles must differ from paths.raw_tiles".to_string(),
            ));
        }
        let artifacts = [&paths.bathymetry_output, &paths.combined_output, &paths.topography];
        for (i, a) in artifacts.iter().enumerate() {
            if artifacts[i + 1..].contains(a) {
                return Err(ConfigError::Invalid(format!(
                    "{} is used for more than one raster",
                    a.display()
                )));
            }
        }
        Ok(())
    }

    /// CRS attached to loaded tiles.
    pub fn tile_crs(&self) -> Crs {
        self.tiles.crs.unwrap_or(self.canvas.crs)
    }
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bounds(value: &str) -> Result<Bounds, ConfigError> {
    let invalid = |reason: String| ConfigError::Env {
        var: ENV_BOUNDS,
        value: value.to_string(),
        reason,
    };
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(e.to_string()))?;
    if parts.len() != 4 {
        return Err(invalid(format!("expected xmin,ymin,xmax,ymax, got {} values", parts.len())));
    }
    Bounds::new(parts[0], parts[1], parts[2], parts[3]).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use topobathy_dem::Compression;

    const YAML: &str = r#"
paths:
  raw_tiles: raw
  repaired_tiles: repaired
  topography: dem.tif
  bathymetry_output: bathy.tif
  combined_output: combined.tif
canvas:
  bounds: { xmin: 0, ymin: 0, xmax: 100, ymax: 50 }
  resolution: 10
  crs: "EPSG:32633"
output:
  nodata: -32768
  dtype: int16
  compression: deflate
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = PipelineConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.canvas.crs.epsg(), 32633);
        assert_eq!(config.output.nodata, -32768.0);
        assert_eq!(config.output.write.dtype, RasterDtype::Int16);
        assert_eq!(config.output.write.compression, Compression::Deflate);
        assert_eq!(config.output.write.tile_size, 256);
        assert!(config.output.write.bigtiff);
        assert_eq!(config.tiles.extensions, vec!["xyz".to_string()]);
        assert_eq!(config.repair.delimiter, " ");
        assert!(config.repair.detect_collisions);
        assert_eq!(config.topography.floor, 0.0);
        assert_eq!(config.tile_crs(), config.canvas.crs);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::from_yaml_str(YAML).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_RESOLUTION, "5"),
            (ENV_CRS, "EPSG:4326"),
            (ENV_BOUNDS, "1, 2, 3, 4"),
            (ENV_NODATA, "nan"),
            (ENV_DTYPE, "float64"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.canvas.resolution, 5.0);
        assert_eq!(config.canvas.crs, Crs::WGS84);
        assert_eq!(config.canvas.bounds, Bounds::new(1.0, 2.0, 3.0, 4.0).unwrap());
        assert!(config.output.nodata.is_nan());
        assert_eq!(config.output.write.dtype, RasterDtype::Float64);
    }

    #[test]
    fn test_bad_override_names_variable() {
        let mut config = PipelineConfig::from_yaml_str(YAML).unwrap();
        let err = config
            .apply_overrides(|name| (name == ENV_BOUNDS).then(|| "1,2,3".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_BOUNDS, .. }));
    }

    #[test]
    fn test_validate_rejects_unrepresentable_sentinel() {
        let mut config = PipelineConfig::from_yaml_str(YAML).unwrap();
        config.output.nodata = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_in_place_repair() {
        let mut config = PipelineConfig::from_yaml_str(YAML).unwrap();
        config.paths.repaired_tiles = config.paths.raw_tiles.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_output_path() {
        let mut config = PipelineConfig::from_yaml_str(YAML).unwrap();
        config.paths.combined_output = config.paths.bathymetry_output.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unparseable_delimiter() {
        let mut config = PipelineConfig::from_yaml_str(YAML).unwrap();
        config.repair.delimiter = ",".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.repair.delimiter = "\t".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_yaml_file("/nonexistent/topobathy.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
