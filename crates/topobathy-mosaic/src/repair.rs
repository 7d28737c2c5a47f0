//! Grid repair: snap point coordinates onto the integer lattice.
//!
//! Raw tiles carry coordinates such as `10.4 20.6` where the survey lattice
//! is integral; the rounding noise defeats regular gridding. Repair rounds x
//! and y to the nearest integer (half away from zero) and copies the depth
//! token unchanged, writing the result into a separate directory. The raw
//! file is never modified, and repairing a repaired file is a no-op.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::metrics::metric_defs;
use crate::xyz::parse_line;
use crate::{MosaicError, Result, TileCatalog};

/// Coordinates beyond this magnitude lose integer precision in `f64`.
const MAX_COORDINATE: f64 = 9_007_199_254_740_992.0;

/// Options for grid repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairOptions {
    /// Separator written between the fields of each output record.
    ///
    /// Spaces and tabs only, so repaired tiles parse like raw ones.
    pub delimiter: String,
    /// Count records whose rounded coordinate was already used.
    ///
    /// Detection only reports; output is identical either way.
    pub detect_collisions: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            delimiter: " ".to_string(),
            detect_collisions: true,
        }
    }
}

impl RepairOptions {
    /// Check that repaired output stays parseable.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.delimiter.is_empty() {
            return Err(ConfigError::Invalid("repair.delimiter must not be empty".to_string()));
        }
        if !self.delimiter.chars().all(|c| c == ' ' || c == '\t') {
            return Err(ConfigError::Invalid(format!(
                "repair.delimiter must be spaces or tabs, got {:?}",
                self.delimiter
            )));
        }
        Ok(())
    }
}

/// Result of repairing one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairedTile {
    /// Raw input file.
    pub source: PathBuf,
    /// Repaired output file.
    pub output: PathBuf,
    /// Number of records written.
    pub records: usize,
    /// Records that rounded onto an already-used coordinate (0 when
    /// detection is disabled).
    pub collisions: usize,
}

/// Outcome of a batch repair.
#[derive(Debug, Default)]
pub struct RepairReport {
    /// Tiles repaired successfully, in catalog order.
    pub repaired: Vec<RepairedTile>,
    /// Tiles whose repair failed, with the reason.
    pub failures: Vec<(PathBuf, MosaicError)>,
}

impl RepairReport {
    /// Number of tiles attempted.
    pub fn total(&self) -> usize {
        self.repaired.len() + self.failures.len()
    }

    /// Total collisions over all repaired tiles.
    pub fn collisions(&self) -> usize {
        self.repaired.iter().map(|t| t.collisions).sum()
    }

    /// Whether every tile was repaired.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fail with `RepairFailed` unless every tile was repaired.
    pub fn require_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(MosaicError::RepairFailed {
                failed: self.failures.len(),
                total: self.total(),
            })
        }
    }

    /// Catalog of the repaired outputs, in the original order.
    pub fn catalog<P: AsRef<Path>>(&self, dir: P) -> TileCatalog {
        TileCatalog::from_paths(dir, self.repaired.iter().map(|t| t.output.clone()).collect())
    }
}

/// Round a coordinate to the nearest integer, halves away from zero.
pub fn round_coordinate(value: f64) -> Option<i64> {
    let rounded = value.round();
    (rounded.is_finite() && rounded.abs() <= MAX_COORDINATE).then_some(rounded as i64)
}

/// Repair the text of one tile.
///
/// Returns the repaired text and the number of collisions. `path` is only
/// used for error reporting.
pub fn repair_text(text: &str, path: &Path, options: &RepairOptions) -> Result<(String, usize)> {
    options.validate()?;
    let mut out = String::with_capacity(text.len());
    let mut seen = HashSet::new();
    let mut collisions = 0;

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let Some(parsed) = parse_line(line, path, line_no)? else {
            continue;
        };
        let (x, y) = match (round_coordinate(parsed.record.x), round_coordinate(parsed.record.y)) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(MosaicError::MalformedRecord {
                    path: path.to_path_buf(),
                    line: line_no,
                    reason: "coordinate out of integer range".to_string(),
                })
            }
        };

        if options.detect_collisions && !seen.insert((x, y)) {
            collisions += 1;
            debug!(path = %path.display(), line = line_no, x, y, "Rounded coordinate collision");
        }

        let d = &options.delimiter;
        // Writing to a String cannot fail
        let _ = writeln!(out, "{x}{d}{y}{d}{}", parsed.z_text);
    }

    Ok((out, collisions))
}

/// Repair one tile file into `output`.
///
/// The output is written to a temporary file next to it and renamed into
/// place, so a failure never leaves a partial file.
pub fn repair_tile<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &RepairOptions,
) -> Result<RepairedTile> {
    let (input, output) = (input.as_ref(), output.as_ref());
    if input == output {
        return Err(MosaicError::Resource {
            path: output.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "repair output would overwrite its input",
            ),
        });
    }

    let text = std::fs::read_to_string(input).map_err(|source| MosaicError::Resource {
        path: input.to_path_buf(),
        source,
    })?;
    let (repaired, collisions) = repair_text(&text, input, options)?;
    let records = repaired.lines().count();
    write_atomic(output, repaired.as_bytes())?;

    if collisions > 0 {
        warn!(
            tile = %input.display(),
            collisions,
            "Rounding collapsed records onto existing coordinates; later records win"
        );
        metrics::counter!(metric_defs::ROUNDING_COLLISIONS.name).increment(collisions as u64);
    }
    metrics::counter!(metric_defs::TILES_REPAIRED.name).increment(1);
    debug!(tile = %input.display(), output = %output.display(), records, "Repaired tile");

    Ok(RepairedTile {
        source: input.to_path_buf(),
        output: output.to_path_buf(),
        records,
        collisions,
    })
}

/// Repair every tile of `catalog` into `output_dir`, keeping file names.
///
/// Each tile is repaired independently; failures are collected in the
/// report and do not stop the remaining tiles. Only failing to prepare the
/// output directory is an error here.
pub fn repair_directory<P: AsRef<Path>>(
    catalog: &TileCatalog,
    output_dir: P,
    options: &RepairOptions,
) -> Result<RepairReport> {
    let output_dir = output_dir.as_ref();
    if output_dir == catalog.directory() {
        return Err(MosaicError::Resource {
            path: output_dir.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "repaired tiles must go to a different directory than the raw tiles",
            ),
        });
    }
    std::fs::create_dir_all(output_dir).map_err(|source| MosaicError::Resource {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut report = RepairReport::default();
    for input in catalog {
        let Some(name) = input.file_name() else {
            continue;
        };
        match repair_tile(input, output_dir.join(name), options) {
            Ok(tile) => report.repaired.push(tile),
            Err(e) => {
                warn!(tile = %input.display(), error = %e, "Grid repair failed");
                metrics::counter!(metric_defs::REPAIR_FAILURES.name).increment(1);
                report.failures.push((input.clone(), e));
            }
        }
    }

    info!(
        repaired = report.repaired.len(),
        failed = report.failures.len(),
        collisions = report.collisions(),
        "Grid repair finished"
    );
    Ok(report)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let resource = |source: std::io::Error| MosaicError::Resource {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(resource)?;
    tmp.write_all(bytes).map_err(resource)?;
    tmp.as_file().sync_all().map_err(resource)?;
    tmp.persist(path).map_err(|e| resource(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn repair(text: &str) -> (String, usize) {
        repair_text(text, Path::new("t.xyz"), &RepairOptions::default()).unwrap()
    }

    #[test]
    fn test_rounds_coordinates_and_keeps_depth_text() {
        let (out, collisions) = repair("10.4 20.6 -5.250\n");
        assert_eq!(out, "10 21 -5.250\n");
        assert_eq!(collisions, 0);
    }

    #[test]
    fn test_half_rounds_away_from_zero() {
        assert_eq!(round_coordinate(2.5), Some(3));
        assert_eq!(round_coordinate(-2.5), Some(-3));
        assert_eq!(round_coordinate(-0.4), Some(0));
        assert_eq!(round_coordinate(1e300), None);
    }

    #[test]
    fn test_idempotent() {
        let (once, _) = repair("0.49 1.51 3\n\n1.2\t1.7\t-4e1\r\n");
        let (twice, _) = repair(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "0 2 3\n1 2 -4e1\n");
    }

    #[test]
    fn test_collisions_counted_not_dropped() {
        let (out, collisions) = repair("1.2 1 5\n0.8 1 6\n2 1 7\n");
        assert_eq!(collisions, 1);
        assert_eq!(out.lines().count(), 3);

        let options = RepairOptions {
            detect_collisions: false,
            ..Default::default()
        };
        let (silent, none) = repair_text("1.2 1 5\n0.8 1 6\n2 1 7\n", Path::new("t"), &options).unwrap();
        assert_eq!(none, 0);
        assert_eq!(silent, out);
    }

    #[test]
    fn test_tab_delimited_output_stays_loadable() {
        let options = RepairOptions {
            delimiter: "\t".to_string(),
            ..Default::default()
        };
        let (out, _) = repair_text("1.1 2.9 3\n2.2 3.1 4\n", Path::new("t"), &options).unwrap();
        assert_eq!(out, "1\t3\t3\n2\t3\t4\n");

        let (again, _) = repair_text(&out, Path::new("t"), &options).unwrap();
        assert_eq!(again, out);
        let points = crate::parse_points(&out, Path::new("t")).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!((points[1].x, points[1].y, points[1].z), (2.0, 3.0, 4.0));
    }

    #[test]
    fn test_non_whitespace_delimiter_is_rejected() {
        for delimiter in [",", ";", "", "\n"] {
            let options = RepairOptions {
                delimiter: delimiter.to_string(),
                ..Default::default()
            };
            let err = repair_text("1.1 2.9 3\n", Path::new("t"), &options).unwrap_err();
            assert!(matches!(err, MosaicError::Config(ConfigError::Invalid(_))), "{:?}", delimiter);
        }
    }

    #[test]
    fn test_malformed_line_fails_file() {
        let err = repair_text("1 2 3\n1 2\n", Path::new("t"), &RepairOptions::default()).unwrap_err();
        assert!(matches!(err, MosaicError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_repair_directory_collects_failures() {
        let raw = TempDir::new().unwrap();
        let fixed = raw.path().join("fixed");
        fs::write(raw.path().join("a.xyz"), "0.1 0.2 1\n").unwrap();
        fs::write(raw.path().join("b.xyz"), "garbage\n").unwrap();
        fs::write(raw.path().join("c.xyz"), "2.6 3.4 5\n").unwrap();

        let catalog = TileCatalog::scan(raw.path(), &["xyz".to_string()]).unwrap();
        let report = repair_directory(&catalog, &fixed, &RepairOptions::default()).unwrap();

        assert_eq!(report.repaired.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].0.ends_with("b.xyz"));
        assert!(matches!(
            report.require_complete(),
            Err(MosaicError::RepairFailed { failed: 1, total: 3 })
        ));
        assert_eq!(fs::read_to_string(fixed.join("c.xyz")).unwrap(), "3 3 5\n");
        assert!(!fixed.join("b.xyz").exists());
        // Raw input untouched
        assert_eq!(fs::read_to_string(raw.path().join("a.xyz")).unwrap(), "0.1 0.2 1\n");

        let repaired = report.catalog(&fixed);
        assert_eq!(repaired.len(), 2);
        assert!(repaired.tiles()[1].ends_with("c.xyz"));
    }

    #[test]
    fn test_refuses_in_place_repair() {
        let raw = TempDir::new().unwrap();
        let catalog = TileCatalog::scan(raw.path(), &[]).unwrap();
        assert!(repair_directory(&catalog, raw.path(), &RepairOptions::default()).is_err());

        let tile = raw.path().join("t.xyz");
        fs::write(&tile, "1 1 1\n").unwrap();
        assert!(repair_tile(&tile, &tile, &RepairOptions::default()).is_err());
    }
}
