//! Two-stage processing run.
//!
//! Stage 1 builds one time series per tile found in the dataset root. Stage 2
//! computes spectral indices for every (tile, year) pair. Tasks within a stage
//! are independent; each stage ends with a join.

use crate::config::ProcessingConfig;
use crate::core::indices::{IndexDefinition, IndexReport, SpectralIndexEngine};
use crate::core::time_series::{SkippedScene, TimeSeries};
use crate::core::workers::WorkDistributor;
#[cfg(feature = "parallel")]
use crate::core::workers::ThreadPoolDistributor;
use crate::io::raster::{GdalRasterIo, RasterIo};
use crate::io::registry;
use crate::types::{TileError, TileResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Sub-directory of each year's output directory holding the index rasters
pub const FEATURES_DIR: &str = "Features";

/// File written to the output directory at the end of a run
pub const SUMMARY_FILE: &str = "run_summary.json";

/// What a run did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tiles found in the dataset root
    pub tiles: Vec<String>,
    /// Index rasters written
    pub processed: Vec<PathBuf>,
    pub skipped: Vec<SkippedScene>,
    pub elapsed_seconds: f64,
}

impl RunSummary {
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    fn log(&self) {
        log::info!(
            "Run finished in {:.1}s: {} tile(s), {} scene(s) processed, {} skipped",
            self.elapsed_seconds,
            self.tiles.len(),
            self.processed.len(),
            self.skipped.len()
        );
        for skipped in &self.skipped {
            log::warn!("  skipped {}: {}", skipped.path.display(), skipped.reason);
        }
    }
}

/// Configured processing run
pub struct Pipeline {
    config: ProcessingConfig,
    io: Arc<dyn RasterIo>,
    engine: SpectralIndexEngine,
}

impl Pipeline {
    pub fn new(config: ProcessingConfig, io: Arc<dyn RasterIo>) -> Self {
        let engine = SpectralIndexEngine::new(IndexDefinition::default_set(), &config.index_suffix);
        Self { config, io, engine }
    }

    /// Pipeline reading and writing GeoTIFFs through GDAL
    pub fn with_gdal(config: ProcessingConfig) -> Self {
        Self::new(config, Arc::new(GdalRasterIo::new()))
    }

    pub fn with_definitions(mut self, definitions: Vec<IndexDefinition>) -> Self {
        self.engine = SpectralIndexEngine::new(definitions, &self.config.index_suffix);
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Stage 1: one time series per tile
    pub fn build_time_series<D: WorkDistributor>(
        &self,
        distributor: &D,
    ) -> TileResult<(Vec<TimeSeries>, Vec<SkippedScene>)> {
        let tiles = registry::scan(&self.config.data_path, self.config.sensor)?;
        let scratch_root = self.config.scratch_root();
        std::fs::create_dir_all(&scratch_root)?;

        log::info!(
            "Stage 1: building {} tile time series with {} worker(s)",
            tiles.len(),
            distributor.parallelism()
        );

        let tasks: Vec<(String, Vec<PathBuf>)> = tiles.into_iter().collect();
        let results = distributor.map(tasks, |(tile, dirs)| {
            log::debug!("Reading tile {} ({} scene directories)", tile, dirs.len());
            TimeSeries::from_scene_dirs(self.config.sensor, &dirs, &scratch_root, self.io.clone())
        });

        let mut series = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for result in results {
            let (ts, tile_skipped) = result?;
            skipped.extend(tile_skipped);
            if !ts.is_empty() {
                series.push(ts);
            }
        }
        Ok((series, skipped))
    }

    /// Stage 2: index rasters for every (tile, year) pair
    pub fn compute_years<D: WorkDistributor>(
        &self,
        distributor: &D,
        series: &[TimeSeries],
        years: &[i32],
    ) -> TileResult<IndexReport> {
        let tasks: Vec<(&TimeSeries, i32)> = series
            .iter()
            .flat_map(|ts| years.iter().map(move |&year| (ts, year)))
            .collect();
        log::info!("Stage 2: {} (tile, year) task(s)", tasks.len());

        let results = distributor.map(tasks, |(ts, year)| self.compute_year(ts, year));

        let mut report = IndexReport::default();
        for result in results {
            let year_report = result?;
            report.written.extend(year_report.written);
            report.skipped.extend(year_report.skipped);
        }
        Ok(report)
    }

    fn compute_year(&self, ts: &TimeSeries, year: i32) -> TileResult<IndexReport> {
        let (window_ts, window) = ts.window_for_year(year, self.config.window_mode, self.config.buffer_days)?;
        let tile = ts.tile().unwrap_or_default();
        if window_ts.is_empty() {
            log::info!("Tile {}: no scenes between {} and {}", tile, window.start, window.end);
            return Ok(IndexReport::default());
        }

        let output_dir = self.config.year_output_dir(year).join(FEATURES_DIR);
        log::info!(
            "Tile {}, year {}: {} scene(s) between {} and {}",
            tile,
            year,
            window_ts.len(),
            window.start,
            window.end
        );
        self.engine.compute(&window_ts, &output_dir, self.config.max_scenes)
    }

    /// Run both stages and write the run summary
    pub fn run<D: WorkDistributor>(&self, distributor: &D) -> TileResult<RunSummary> {
        let start = Instant::now();
        let years = self.config.validate()?;
        std::fs::create_dir_all(&self.config.output_path)?;

        let (series, mut skipped) = self.build_time_series(distributor)?;
        let report = self.compute_years(distributor, &series, &years)?;
        skipped.extend(report.skipped);

        if self.config.delete_scratch {
            for ts in &series {
                ts.release_scratch()?;
            }
            let scratch_root = self.config.scratch_root();
            if let Err(e) = std::fs::remove_dir(&scratch_root) {
                log::debug!("Keeping scratch root {}: {}", scratch_root.display(), e);
            }
        }

        let summary = RunSummary {
            tiles: series.iter().filter_map(|ts| ts.tile().map(str::to_string)).collect(),
            processed: report.written,
            skipped,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        };
        summary.log();
        self.write_summary(&summary)?;
        Ok(summary)
    }

    /// [`Self::run`] on a thread pool sized by `num_workers`
    #[cfg(feature = "parallel")]
    pub fn run_parallel(&self) -> TileResult<RunSummary> {
        self.config.validate()?;
        let pool = ThreadPoolDistributor::new(self.config.num_workers)?;
        self.run(&pool)
    }

    fn write_summary(&self, summary: &RunSummary) -> TileResult<()> {
        let path = self.config.output_path.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| TileError::Processing(format!("Cannot serialize run summary: {}", e)))?;
        std::fs::write(&path, json)?;
        log::debug!("Run summary written to {}", path.display());
        Ok(())
    }
}
