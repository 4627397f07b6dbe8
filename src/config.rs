//! Run configuration

use crate::core::time_series::WindowMode;
use crate::types::{Mission, TileError, TileResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options recognised by a processing run.
///
/// Everything the core needs is passed through this struct; nothing is read
/// from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Mission of the dataset (`S2` or `Landsat`)
    pub sensor: Mission,
    /// Label used in output directory names
    pub tilename: String,
    /// Years to process, e.g. `["2021", "2022"]`
    pub years: Vec<String>,
    /// Dataset root scanned by the tile registry
    pub data_path: PathBuf,
    /// Main working directory; scratch storage lives below it
    pub main_dir: PathBuf,
    pub output_path: PathBuf,
    /// Remove per-scene scratch directories once the run finishes
    pub delete_scratch: bool,
    /// Cap on scenes per year per tile, clearest first (`None` = all)
    pub max_scenes: Option<usize>,
    pub window_mode: WindowMode,
    /// Days added on both sides of each yearly window
    pub buffer_days: Option<i64>,
    /// Suffix of the derived index rasters
    pub index_suffix: String,
    /// Worker threads for the parallel stages (`None` = all cores)
    pub num_workers: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            sensor: Mission::Landsat,
            tilename: "tile".to_string(),
            years: Vec::new(),
            data_path: PathBuf::new(),
            main_dir: PathBuf::new(),
            output_path: PathBuf::new(),
            delete_scratch: false,
            max_scenes: None,
            window_mode: WindowMode::Calendar,
            buffer_days: None,
            index_suffix: "NDI".to_string(),
            num_workers: None,
        }
    }
}

impl ProcessingConfig {
    /// Load a JSON configuration; absent fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> TileResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TileError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> TileResult<Self> {
        serde_json::from_str(text).map_err(|e| TileError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Check required fields and return the parsed years
    pub fn validate(&self) -> TileResult<Vec<i32>> {
        if self.data_path.as_os_str().is_empty() {
            return Err(TileError::Config("data_path is not set".to_string()));
        }
        if self.main_dir.as_os_str().is_empty() {
            return Err(TileError::Config("main_dir is not set".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(TileError::Config("output_path is not set".to_string()));
        }
        if self.index_suffix.is_empty() {
            return Err(TileError::Config("index_suffix must not be empty".to_string()));
        }
        if self.max_scenes == Some(0) {
            return Err(TileError::Config("max_scenes must be at least 1".to_string()));
        }
        if self.num_workers == Some(0) {
            return Err(TileError::Config("num_workers must be at least 1".to_string()));
        }
        if let Some(buffer) = self.buffer_days {
            if buffer < 0 {
                return Err(TileError::Config(format!("buffer_days must not be negative: {}", buffer)));
            }
        }

        self.years
            .iter()
            .map(|year| {
                year.trim()
                    .parse::<i32>()
                    .map_err(|_| TileError::Config(format!("Invalid year: '{}'", year)))
            })
            .collect()
    }

    /// Root of all per-scene scratch directories
    pub fn scratch_root(&self) -> PathBuf {
        self.main_dir.join("scratch")
    }

    /// Output directory for one year, named `{tilename}_{year}`
    pub fn year_output_dir(&self, year: i32) -> PathBuf {
        self.output_path.join(format!("{}_{}", self.tilename, year))
    }
}
