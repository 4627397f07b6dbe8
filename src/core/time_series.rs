//! Per-tile time series of scenes.

use crate::core::scene::SceneDescriptor;
use crate::io::raster::RasterIo;
use crate::types::{Mission, TileError, TileResult};
use chrono::{Datelike, Duration, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a processing year maps to a date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// January 1 to December 31
    #[default]
    Calendar,
    /// November 11 of the previous year to November 10, one growing season
    Farming,
}

/// Inclusive date window of one processing year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl YearWindow {
    pub fn for_year(year: i32, mode: WindowMode, buffer_days: Option<i64>) -> TileResult<Self> {
        let (start, end) = match mode {
            WindowMode::Calendar => (
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year, 12, 31),
            ),
            WindowMode::Farming => (
                NaiveDate::from_ymd_opt(year - 1, 11, 11),
                NaiveDate::from_ymd_opt(year, 11, 10),
            ),
        };
        let (mut start, mut end) = match (start, end) {
            (Some(start), Some(end)) => (start, end),
            _ => return Err(TileError::Config(format!("Year {} is out of range", year))),
        };

        if let Some(days) = buffer_days {
            let buffer = Duration::days(days);
            start = start
                .checked_sub_signed(buffer)
                .ok_or_else(|| TileError::Config(format!("Buffer of {} days is out of range", days)))?;
            end = end
                .checked_add_signed(buffer)
                .ok_or_else(|| TileError::Config(format!("Buffer of {} days is out of range", days)))?;
        }

        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Both bounds rendered with a `strftime` pattern
    pub fn format(&self, fmt: &str) -> (String, String) {
        (self.start.format(fmt).to_string(), self.end.format(fmt).to_string())
    }
}

/// Date filter; unset fields match anything, set fields are ANDed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
}

impl DateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    pub fn hour(mut self, hour: u32) -> Self {
        self.hour = Some(hour);
        self
    }

    pub fn minute(mut self, minute: u32) -> Self {
        self.minute = Some(minute);
        self
    }

    pub fn second(mut self, second: u32) -> Self {
        self.second = Some(second);
        self
    }

    /// A scene without time of day never matches a time field
    pub fn matches(&self, scene: &SceneDescriptor) -> bool {
        let date = scene.date();
        let date_ok = self.year.map_or(true, |y| date.year() == y)
            && self.month.map_or(true, |m| date.month() == m)
            && self.day.map_or(true, |d| date.day() == d);
        if !date_ok {
            return false;
        }

        if self.hour.is_none() && self.minute.is_none() && self.second.is_none() {
            return true;
        }
        match scene.time() {
            Some(time) => {
                self.hour.map_or(true, |h| time.hour() == h)
                    && self.minute.map_or(true, |m| time.minute() == m)
                    && self.second.map_or(true, |s| time.second() == s)
            }
            None => false,
        }
    }
}

/// Scene left out of processing, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedScene {
    pub path: PathBuf,
    pub reason: String,
}

/// Ordered collection of scenes of one tile and one mission
#[derive(Debug, Clone)]
pub struct TimeSeries {
    mission: Mission,
    tile: Option<String>,
    scratch_root: PathBuf,
    scenes: Vec<Arc<SceneDescriptor>>,
}

impl TimeSeries {
    pub fn new<P: AsRef<Path>>(mission: Mission, scratch_root: P) -> Self {
        Self {
            mission,
            tile: None,
            scratch_root: scratch_root.as_ref().to_path_buf(),
            scenes: Vec::new(),
        }
    }

    /// Build a sorted series from scene directories.
    ///
    /// Scenes failing with a scene-local error are skipped and reported;
    /// any other error aborts. Scenes sharing an acquisition date are all
    /// kept, each with its own scratch directory.
    pub fn from_scene_dirs<P: AsRef<Path>>(
        mission: Mission,
        dirs: &[P],
        scratch_root: &Path,
        io: Arc<dyn RasterIo>,
    ) -> TileResult<(Self, Vec<SkippedScene>)> {
        let mut series = Self::new(mission, scratch_root);
        let mut skipped = Vec::new();
        let mut used_names: HashSet<String> = HashSet::new();

        for dir in dirs {
            let dir = dir.as_ref();
            match series.load_scene(mission, dir, &mut used_names, io.clone()) {
                Ok(()) => {}
                Err(e) if e.is_scene_local() => {
                    log::warn!("Skipping scene {}: {}", dir.display(), e);
                    skipped.push(SkippedScene {
                        path: dir.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        series.sort_by_date();
        log::info!(
            "Time series for tile {}: {} scene(s), {} skipped",
            series.tile().unwrap_or("<empty>"),
            series.len(),
            skipped.len()
        );
        Ok((series, skipped))
    }

    fn load_scene(
        &mut self,
        mission: Mission,
        dir: &Path,
        used_names: &mut HashSet<String>,
        io: Arc<dyn RasterIo>,
    ) -> TileResult<()> {
        let files = crate::core::scene::collect_raster_files(dir);
        if files.is_empty() {
            return Err(TileError::EmptyFeatureSet(dir.display().to_string()));
        }
        let mut scene = SceneDescriptor::parse(mission, &files, io)?;

        let base = scene.name();
        if used_names.contains(&base) {
            log::warn!("Duplicate acquisition {} in {}", base, dir.display());
            let code = scene.sensor().code();
            let mut suffix = code.to_string();
            let mut counter = 2;
            while used_names.contains(&format!("{}_{}", base, suffix)) {
                suffix = format!("{}_{}", code, counter);
                counter += 1;
            }
            scene = scene.with_duplicate_suffix(&suffix);
        }

        let scene = scene.with_scratch(&self.scratch_root, None)?;
        let id = scene.id();
        self.append(scene)?;
        used_names.insert(id);
        Ok(())
    }

    /// Add a scene; the series is left unchanged on error
    pub fn append<S: Into<Arc<SceneDescriptor>>>(&mut self, scene: S) -> TileResult<()> {
        let scene = scene.into();
        if scene.mission() != self.mission {
            return Err(TileError::TypeMismatch {
                expected: self.mission,
                found: scene.mission(),
            });
        }
        match &self.tile {
            Some(tile) if tile != scene.tile() => {
                return Err(TileError::TileMismatch {
                    expected: tile.clone(),
                    found: scene.tile().to_string(),
                });
            }
            Some(_) => {}
            None => self.tile = Some(scene.tile().to_string()),
        }
        self.scenes.push(scene);
        Ok(())
    }

    pub fn mission(&self) -> Mission {
        self.mission
    }

    pub fn tile(&self) -> Option<&str> {
        self.tile.as_deref()
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<SceneDescriptor>> {
        self.scenes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SceneDescriptor>> {
        self.scenes.iter()
    }

    pub fn scenes(&self) -> &[Arc<SceneDescriptor>] {
        &self.scenes
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.scenes.iter().map(|scene| scene.date()).collect()
    }

    /// Stable in-place sort by acquisition date and time
    pub fn sort_by_date(&mut self) {
        self.scenes.sort_by_key(|scene| scene.datetime());
    }

    /// Scenes ordered by distance in days from `reference`, closest first
    pub fn nearest(&self, reference: NaiveDate) -> Vec<Arc<SceneDescriptor>> {
        let mut ordered = self.scenes.clone();
        ordered.sort_by_key(|scene| (scene.date() - reference).num_days().abs());
        ordered
    }

    /// Day offsets of the (re-sorted) scenes.
    ///
    /// Offsets count from the day before `anchor`, or the day before the
    /// earliest acquisition, so the first scene is day 1.
    pub fn days_since_first(&mut self, anchor: Option<NaiveDate>) -> Vec<i64> {
        self.sort_by_date();
        let first = match anchor.or_else(|| self.scenes.first().map(|scene| scene.date())) {
            Some(first) => first,
            None => return Vec::new(),
        };
        self.scenes
            .iter()
            .map(|scene| (scene.date() - first).num_days() + 1)
            .collect()
    }

    pub fn find(&self, query: &DateQuery) -> Vec<Arc<SceneDescriptor>> {
        self.scenes
            .iter()
            .filter(|scene| query.matches(scene))
            .cloned()
            .collect()
    }

    /// Narrow the series to one processing year.
    ///
    /// The returned series shares mission, tile and scratch root with `self`.
    pub fn window_for_year(
        &self,
        year: i32,
        mode: WindowMode,
        buffer_days: Option<i64>,
    ) -> TileResult<(TimeSeries, YearWindow)> {
        let window = YearWindow::for_year(year, mode, buffer_days)?;
        let scenes = self
            .scenes
            .iter()
            .filter(|scene| window.contains(scene.date()))
            .cloned()
            .collect();

        let narrowed = TimeSeries {
            mission: self.mission,
            tile: self.tile.clone(),
            scratch_root: self.scratch_root.clone(),
            scenes,
        };
        log::debug!(
            "Window {} to {}: {} of {} scene(s)",
            window.start,
            window.end,
            narrowed.len(),
            self.len()
        );
        Ok((narrowed, window))
    }

    /// Delete the scratch directory of every scene
    pub fn release_scratch(&self) -> TileResult<()> {
        for scene in &self.scenes {
            scene.release_scratch()?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a TimeSeries {
    type Item = &'a Arc<SceneDescriptor>;
    type IntoIter = std::slice::Iter<'a, Arc<SceneDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenes.iter()
    }
}
