//! Whitespace-delimited `x y z` point records.

use std::path::Path;

use crate::{MosaicError, Result};

/// One point of a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    /// Easting in tile CRS units.
    pub x: f64,
    /// Northing in tile CRS units.
    pub y: f64,
    /// Depth or elevation.
    pub z: f64,
}

/// A parsed line that still borrows its original `z` token.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParsedLine<'a> {
    pub record: PointRecord,
    pub z_text: &'a str,
}

/// Parse one line. Blank lines yield `None`.
///
/// `line_no` is 1-based and only used for error reporting.
pub(crate) fn parse_line<'a>(line: &'a str, path: &Path, line_no: usize) -> Result<Option<ParsedLine<'a>>> {
    let malformed = |reason: String| MosaicError::MalformedRecord {
        path: path.to_path_buf(),
        line: line_no,
        reason,
    };

    let mut fields = line.split_whitespace();
    let (x_text, y_text, z_text) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (None, ..) => return Ok(None),
        (Some(x), Some(y), Some(z), None) => (x, y, z),
        _ => {
            let count = line.split_whitespace().count();
            return Err(malformed(format!("expected 3 fields, found {}", count)));
        }
    };

    let number = |name: &str, text: &str| -> Result<f64> {
        text.parse::<f64>()
            .map_err(|e| malformed(format!("{} {:?}: {}", name, text, e)))
    };
    let x = number("x", x_text)?;
    let y = number("y", y_text)?;
    let z = number("z", z_text)?;
    if !x.is_finite() || !y.is_finite() {
        return Err(malformed(format!("non-finite coordinate ({}, {})", x_text, y_text)));
    }

    Ok(Some(ParsedLine {
        record: PointRecord { x, y, z },
        z_text,
    }))
}

/// Read every record of a point file.
///
/// The file is read in one go and closed before parsing.
pub fn read_points<P: AsRef<Path>>(path: P) -> Result<Vec<PointRecord>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| MosaicError::Resource {
        path: path.to_path_buf(),
        source,
    })?;
    parse_points(&text, path)
}

/// Parse the records of an in-memory point file.
pub fn parse_points(text: &str, path: &Path) -> Result<Vec<PointRecord>> {
    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(parsed) = parse_line(line, path, i + 1)? {
            points.push(parsed.record);
        }
    }
    Ok(points)
}
