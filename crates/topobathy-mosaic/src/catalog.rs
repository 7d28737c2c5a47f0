//! Ordered index of tile files in a directory.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{MosaicError, Result};

/// Tile files found in one directory, in merge order.
///
/// Order is lexicographic by file name. Since the merger keeps the first
/// valid value it sees for each pixel, this order decides which tile wins
/// where tiles overlap.
///
/// # Example
///
/// ```no_run
/// use topobathy_mosaic::TileCatalog;
///
/// let catalog = TileCatalog::scan("data/raw", &["xyz".to_string()])?;
/// for tile in catalog.iter() {
///     println!("{}", tile.display());
/// }
/// # Ok::<(), topobathy_mosaic::MosaicError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCatalog {
    directory: PathBuf,
    tiles: Vec<PathBuf>,
}

impl TileCatalog {
    /// Index regular files in `dir` whose extension matches one of
    /// `extensions` (case-insensitive). Sub-directories are not searched.
    ///
    /// An empty extension list accepts every file.
    pub fn scan<P: AsRef<Path>>(dir: P, extensions: &[String]) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| MosaicError::Resource {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut tiles = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if matches_extension(&path, extensions) {
                tiles.push(path);
            }
        }
        tiles.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        debug!(dir = %dir.display(), tiles = tiles.len(), "Indexed tile directory");
        Ok(Self {
            directory: dir.to_path_buf(),
            tiles,
        })
    }

    /// A catalog with an explicit tile order.
    pub fn from_paths<P: AsRef<Path>>(dir: P, tiles: Vec<PathBuf>) -> Self {
        Self {
            directory: dir.as_ref().to_path_buf(),
            tiles,
        }
    }

    /// The indexed directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Tile paths in merge order.
    pub fn tiles(&self) -> &[PathBuf] {
        &self.tiles
    }

    /// Iterate over tile paths in merge order.
    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.tiles.iter()
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether no tiles were found.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Fail with `EmptyCatalog` when no tiles were found.
    pub fn require_tiles(&self) -> Result<()> {
        if self.is_empty() {
            return Err(MosaicError::EmptyCatalog(self.directory.clone()));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a TileCatalog {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
