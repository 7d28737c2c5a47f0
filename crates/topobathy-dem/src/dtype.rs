//! Storage data types for written rasters and the narrowing policy.
//!
//! Rasters are held in memory as `f64`. Writing to a narrower type is allowed
//! when every value survives the cast meaningfully:
//!
//! - `float32` keeps about 7 significant decimal digits. Mantissa rounding is
//!   accepted; finite values beyond `f32::MAX` are rejected.
//! - `int16`/`int32` accept only integral values inside the type's range.
//!
//! The nodata sentinel must convert exactly, otherwise missing pixels would no
//! longer match the sentinel recorded in the file. A valid value whose stored
//! form lands on the sentinel is rejected as well.

use crate::{is_nodata, RasterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric storage type of a written raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterDtype {
    /// 32-bit IEEE float.
    #[default]
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
}

impl RasterDtype {
    /// Size of one sample in bytes.
    pub const fn byte_width(&self) -> usize {
        match self {
            RasterDtype::Float32 => 4,
            RasterDtype::Float64 => 8,
            RasterDtype::Int16 => 2,
            RasterDtype::Int32 => 4,
        }
    }

    /// Whether this is a floating point type.
    pub const fn is_float(&self) -> bool {
        matches!(self, RasterDtype::Float32 | RasterDtype::Float64)
    }

    /// Returns the name used in configuration files.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RasterDtype::Float32 => "float32",
            RasterDtype::Float64 => "float64",
            RasterDtype::Int16 => "int16",
            RasterDtype::Int32 => "int32",
        }
    }

    /// Check that a data value can be stored without truncation.
    pub fn check_value(&self, value: f64) -> Result<()> {
        let reason = match self {
            RasterDtype::Float64 => None,
            RasterDtype::Float32 => {
                if value.is_finite() && value.abs() > f32::MAX as f64 {
                    Some("outside the float32 range")
                } else {
                    None
                }
            }
            RasterDtype::Int16 => integer_reason(value, i16::MIN as f64, i16::MAX as f64),
            RasterDtype::Int32 => integer_reason(value, i32::MIN as f64, i32::MAX as f64),
        };

        match reason {
            Some(reason) => Err(RasterError::DtypePrecision {
                dtype: *self,
                value,
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Check that a valid value is still valid once stored next to `nodata`.
    pub fn check_stored(&self, value: f64, nodata: f64) -> Result<()> {
        self.check_value(value)?;
        if is_nodata(self.stored(value), nodata) {
            return Err(RasterError::DtypePrecision {
                dtype: *self,
                value,
                reason: "value narrows onto the nodata sentinel",
            });
        }
        Ok(())
    }

    /// The value read back after storing `value` in this type.
    fn stored(&self, value: f64) -> f64 {
        match self {
            RasterDtype::Float32 => (value as f32) as f64,
            RasterDtype::Float64 => value,
            RasterDtype::Int16 => (value as i16) as f64,
            RasterDtype::Int32 => (value as i32) as f64,
        }
    }

    /// Check that the nodata sentinel converts exactly.
    pub fn check_sentinel(&self, nodata: f64) -> Result<()> {
        self.check_value(nodata)?;
        let exact = match self {
            RasterDtype::Float64 | RasterDtype::Int16 | RasterDtype::Int32 => true,
            RasterDtype::Float32 => nodata.is_nan() || (nodata as f32) as f64 == nodata,
        };
        if !exact {
            return Err(RasterError::DtypePrecision {
                dtype: *self,
                value: nodata,
                reason: "nodata sentinel is not exactly representable",
            });
        }
        Ok(())
    }

    /// Append the native-endian bytes of `value` cast to this type.
    ///
    /// Callers validate with [`check_value`](Self::check_value) first.
    pub(crate) fn push_ne_bytes(&self, value: f64, out: &mut Vec<u8>) {
        match self {
            RasterDtype::Float32 => out.extend_from_slice(&(value as f32).to_ne_bytes()),
            RasterDtype::Float64 => out.extend_from_slice(&value.to_ne_bytes()),
            RasterDtype::Int16 => out.extend_from_slice(&(value as i16).to_ne_bytes()),
            RasterDtype::Int32 => out.extend_from_slice(&(value as i32).to_ne_bytes()),
        }
    }
}

fn integer_reason(value: f64, min: f64, max: f64) -> Option<&'static str> {
    if !value.is_finite() {
        Some("non-finite values have no integer representation")
    } else if value.fract() != 0.0 {
        Some("fractional value would be truncated")
    } else if value < min || value > max {
        Some("outside the integer range")
    } else {
        None
    }
}

impl fmt::Display for RasterDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RasterDtype {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "f32" => Ok(RasterDtype::Float32),
            "float64" | "f64" => Ok(RasterDtype::Float64),
            "int16" | "i16" => Ok(RasterDtype::Int16),
            "int32" | "i32" => Ok(RasterDtype::Int32),
            other => Err(format!("unknown dtype '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_float32_narrowing() {
        let dtype = RasterDtype::Float32;
        assert!(dtype.check_value(-1234.5678).is_ok());
        assert!(dtype.check_value(f64::NAN).is_ok());
        assert!(dtype.check_value(1e300).is_err());
        assert!(dtype.check_value(-1e300).is_err());
    }

    #[test]
    fn test_integer_truncation_is_rejected() {
        assert!(RasterDtype::Int16.check_value(-5.0).is_ok());
        assert!(RasterDtype::Int16.check_value(-5.5).is_err());
        assert!(RasterDtype::Int16.check_value(40_000.0).is_err());
        assert!(RasterDtype::Int32.check_value(40_000.0).is_ok());
        assert!(RasterDtype::Int32.check_value(f64::NAN).is_err());
    }

    #[test]
    fn test_sentinel_must_be_exact() {
        assert!(RasterDtype::Float32.check_sentinel(-9999.0).is_ok());
        assert!(RasterDtype::Float32.check_sentinel(f64::NAN).is_ok());
        // 0.1 is not exactly representable as f32
        assert!(RasterDtype::Float32.check_sentinel(0.1).is_err());
        assert!(RasterDtype::Int16.check_sentinel(f64::NAN).is_err());
    }

    #[test]
    fn test_valid_value_must_not_become_the_sentinel() {
        let dtype = RasterDtype::Float32;
        assert!(matches!(
            dtype.check_stored(-9999.0001, -9999.0),
            Err(RasterError::DtypePrecision { value, .. }) if value == -9999.0001
        ));
        assert!(dtype.check_stored(-9998.5, -9999.0).is_ok());
        assert!(dtype.check_stored(-9999.0001, f64::NAN).is_ok());
        assert!(RasterDtype::Float64.check_stored(-9999.0001, -9999.0).is_ok());
    }

    #[test]
    fn test_parse_dtype() {
        assert_eq!("Float32".parse::<RasterDtype>().unwrap(), RasterDtype::Float32);
        assert_eq!("i16".parse::<RasterDtype>().unwrap(), RasterDtype::Int16);
        assert!("uint8".parse::<RasterDtype>().is_err());
    }

    fn sentinel() -> impl Strategy<Value = f64> {
        prop_oneof![Just(-9999.0), Just(0.0), Just(f64::NAN)]
    }

    proptest! {
        #[test]
        fn prop_float32_accepts_only_values_that_stay_valid(value in -1e5f64..1e5, nodata in sentinel()) {
            prop_assume!(!is_nodata(value, nodata));
            let stored = (value as f32) as f64;
            match RasterDtype::Float32.check_stored(value, nodata) {
                Ok(()) => prop_assert!(!is_nodata(stored, nodata)),
                Err(_) => prop_assert_eq!(stored, nodata),
            }
        }
    }
}
