//! Per-scene scratch storage.
//!
//! Each scene owns one directory below the scratch root. Cached rasters are
//! stored as `.npy` files and published atomically: the array is written to a
//! temporary file in the same directory and then renamed over the final name,
//! so a concurrent reader sees either nothing or a complete file.

use crate::types::{QualityMask, TileError, TileResult};
use ndarray::Array2;
use ndarray_npy::{read_npy, ReadableElement, WritableElement, WriteNpyExt};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const MASK_FILE: &str = "MASK.npy";

/// Scratch directory owned by a single scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Resolve `root/name` and create it if absent
    pub fn create<P: AsRef<Path>>(root: P, name: &str) -> TileResult<Self> {
        if name.is_empty() || name.contains(std::path::MAIN_SEPARATOR) {
            return Err(TileError::InvalidScratchPath(format!(
                "Invalid scratch directory name: '{}'",
                name
            )));
        }
        let path = root.as_ref().join(name);
        std::fs::create_dir_all(&path)?;
        log::debug!("Scratch directory ready: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mask_path(&self) -> PathBuf {
        self.path.join(MASK_FILE)
    }

    /// Cache file of a band resampled to `height`x`width`
    pub fn resampled_path(&self, band: &str, shape: (usize, usize)) -> PathBuf {
        self.path.join(format!("{}_{}x{}.npy", band, shape.0, shape.1))
    }

    pub fn has_mask(&self) -> bool {
        self.mask_path().is_file()
    }

    pub fn load_mask(&self) -> TileResult<QualityMask> {
        self.load(&self.mask_path())
    }

    pub fn store_mask(&self, mask: &QualityMask) -> TileResult<PathBuf> {
        let path = self.mask_path();
        self.store(&path, mask)?;
        Ok(path)
    }

    pub fn load<T: ReadableElement>(&self, path: &Path) -> TileResult<Array2<T>> {
        read_npy(path).map_err(|e| TileError::Cache(format!("Failed to read {}: {}", path.display(), e)))
    }

    /// Write `array` to `path` via a temporary file and an atomic rename
    pub fn store<T: WritableElement>(&self, path: &Path, array: &Array2<T>) -> TileResult<()> {
        let dir = path.parent().unwrap_or(&self.path);
        let temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            array
                .write_npy(&mut writer)
                .map_err(|e| TileError::Cache(format!("Failed to write {}: {}", path.display(), e)))?;
            writer.flush()?;
        }
        temp.persist(path)
            .map_err(|e| TileError::Cache(format!("Failed to publish {}: {}", path.display(), e.error)))?;
        log::debug!("Cached {}", path.display());
        Ok(())
    }

    /// Delete the directory and everything cached in it
    pub fn remove(&self) -> TileResult<()> {
        if self.path.exists() {
            std::fs::remove_dir_all(&self.path)?;
            log::debug!("Removed scratch directory {}", self.path.display());
        }
        Ok(())
    }
}
