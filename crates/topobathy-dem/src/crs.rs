//! Coordinate reference systems and point reprojection.
//!
//! CRSs are identified by EPSG code. Definitions come from the
//! `crs-definitions` database and coordinates are transformed with `proj4rs`,
//! so no native PROJ installation is needed.

use crate::{RasterError, Result};
use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    epsg: u16,
}

impl Crs {
    /// WGS 84 longitude/latitude.
    pub const WGS84: Crs = Crs { epsg: 4326 };

    /// Create a CRS from an EPSG code.
    ///
    /// Fails if the code is unknown to the definition database, since such a
    /// CRS could neither be reprojected nor written as a GeoKey.
    pub fn from_epsg(epsg: u16) -> Result<Self> {
        if crs_definitions::from_code(epsg).is_none() {
            return Err(RasterError::UnsupportedCrs(epsg));
        }
        Ok(Self { epsg })
    }

    /// The EPSG code.
    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    /// PROJ.4 definition string from the EPSG database.
    pub fn proj_string(&self) -> Result<&'static str> {
        crs_definitions::from_code(self.epsg)
            .map(|def| def.proj4)
            .ok_or(RasterError::UnsupportedCrs(self.epsg))
    }

    /// Whether this CRS is geographic (longitude/latitude in degrees).
    pub fn is_geographic(&self) -> bool {
        match self.proj_string() {
            Ok(proj) => proj.contains("+proj=longlat"),
            // Geographic CRS codes are mostly in the 4000-4999 range
            Err(_) => (4000..5000).contains(&self.epsg),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl FromStr for Crs {
    type Err = RasterError;

    /// Parse `EPSG:32633`, `epsg:32633` or a bare `32633`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(RasterError::InvalidCrs(s.to_string())),
            None => trimmed,
        };
        let epsg: u16 = code
            .trim()
            .parse()
            .map_err(|_| RasterError::InvalidCrs(s.to_string()))?;
        Crs::from_epsg(epsg)
    }
}

impl TryFrom<String> for Crs {
    type Error = RasterError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// Transforms points between two CRSs.
///
/// Projections are parsed once at construction and reused for every point.
/// When source and target are the same CRS, points pass through unchanged.
pub struct Reprojector {
    from: Crs,
    to: Crs,
    projs: Option<(Proj, Proj)>,
}

impl fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reprojector")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("identity", &self.projs.is_none())
            .finish()
    }
}

impl Reprojector {
    /// Build a reprojector from `from` to `to`.
    pub fn new(from: Crs, to: Crs) -> Result<Self> {
        if from == to {
            return Ok(Self { from, to, projs: None });
        }

        let parse = |crs: Crs| -> Result<Proj> {
            Proj::from_proj_string(crs.proj_string()?).map_err(|e| RasterError::Reprojection {
                from: from.to_string(),
                to: to.to_string(),
                reason: format!("invalid projection {}: {:?}", crs, e),
            })
        };

        Ok(Self {
            from,
            to,
            projs: Some((parse(from)?, parse(to)?)),
        })
    }

    /// Transform a single point.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some((source, target)) = &self.projs else {
            return Ok((x, y));
        };

        // proj4rs works in radians for geographic coordinates
        let mut point = if self.from.is_geographic() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        proj4rs::transform::transform(source, target, &mut point).map_err(|e| {
            RasterError::Reprojection {
                from: self.from.to_string(),
                to: self.to.to_string(),
                reason: format!("{:?}", e),
            }
        })?;

        if self.to.is_geographic() {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_crs_identifiers() {
        assert_eq!("EPSG:3857".parse::<Crs>().unwrap().epsg(), 3857);
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!(" 32633 ".parse::<Crs>().unwrap().epsg(), 32633);
        assert!("ESRI:102001".parse::<Crs>().is_err());
        assert!("EPSG:abc".parse::<Crs>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let crs = Crs::from_epsg(32633).unwrap();
        assert_eq!(crs.to_string(), "EPSG:32633");
        assert_eq!(crs.to_string().parse::<Crs>().unwrap(), crs);
    }

    #[test]
    fn test_geographic_detection() {
        assert!(Crs::WGS84.is_geographic());
        assert!(!Crs::from_epsg(3857).unwrap().is_geographic());
    }

    #[test]
    fn test_identity_reprojection() {
        let r = Reprojector::new(Crs::WGS84, Crs::WGS84).unwrap();
        assert_eq!(r.transform(12.5, -3.25).unwrap(), (12.5, -3.25));
    }

    #[test]
    fn test_wgs84_to_web_mercator() {
        let mercator = Crs::from_epsg(3857).unwrap();
        let forward = Reprojector::new(Crs::WGS84, mercator).unwrap();
        let (x, y) = forward.transform(0.0, 0.0).unwrap();
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);

        let (x, _) = forward.transform(180.0, 0.0).unwrap();
        assert_abs_diff_eq!(x, 20_037_508.342789244, epsilon = 1e-3);

        let back = Reprojector::new(mercator, Crs::WGS84).unwrap();
        let (x, y) = forward.transform(10.0, 45.0).unwrap();
        let (lon, lat) = back.transform(x, y).unwrap();
        assert_abs_diff_eq!(lon, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(lat, 45.0, epsilon = 1e-6);
    }
}
