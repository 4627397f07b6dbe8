//! Normalized-difference spectral indices.
//!
//! Each selected scene yields one multi-band Float32 raster, one band per
//! [`IndexDefinition`] in declaration order. Zero reflectance is treated as
//! no-data (NaN) and every valid output lies in [-1, 1].

use crate::core::scene::SceneDescriptor;
use crate::core::time_series::{SkippedScene, TimeSeries};
use crate::types::{FloatRaster, TileError, TileResult};
use ndarray::Zip;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Substituted for a zero denominator
pub const DENOMINATOR_EPSILON: f32 = 1e-8;

/// Band whose grid and georeferencing the output rasters inherit
pub const DEFAULT_REFERENCE_BAND: &str = "RED";

/// `(band_a - band_b) / (band_a + band_b)` over two canonical band names or aliases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub label: String,
    pub band_a: String,
    pub band_b: String,
}

impl IndexDefinition {
    pub fn new(label: &str, band_a: &str, band_b: &str) -> Self {
        Self {
            label: label.to_string(),
            band_a: band_a.to_string(),
            band_b: band_b.to_string(),
        }
    }

    pub fn ndvi() -> Self {
        Self::new("NDVI", "NIR", "RED")
    }

    /// Moisture index (NIR, SWIR1)
    pub fn ndmi() -> Self {
        Self::new("NDMI", "NIR", "SWIR1")
    }

    pub fn ndwi() -> Self {
        Self::new("NDWI", "GREEN", "NIR")
    }

    pub fn nbr() -> Self {
        Self::new("NBR", "NIR", "SWIR2")
    }

    /// SWIR2 against blue
    pub fn swir2_blue() -> Self {
        Self::new("SWIR2_BLUE", "SWIR2", "BLUE")
    }

    /// The standard three-band product: NDMI, NDVI, SWIR2/Blue
    pub fn default_set() -> Vec<Self> {
        vec![Self::ndmi(), Self::ndvi(), Self::swir2_blue()]
    }
}

#[inline]
fn normalized_difference_pixel(a: f32, b: f32) -> f32 {
    if a == 0.0 || b == 0.0 {
        return f32::NAN;
    }
    let mut denominator = a + b;
    if denominator == 0.0 {
        denominator = DENOMINATOR_EPSILON;
    }
    // clamp keeps NaN
    ((a - b) / denominator).clamp(-1.0, 1.0)
}

/// Per-pixel normalized difference of two equally shaped rasters
pub fn normalized_difference(band_a: &FloatRaster, band_b: &FloatRaster) -> TileResult<FloatRaster> {
    if band_a.dim() != band_b.dim() {
        return Err(TileError::ShapeMismatch(format!(
            "Index inputs differ in shape: {:?} vs {:?}",
            band_a.dim(),
            band_b.dim()
        )));
    }

    #[cfg(feature = "parallel")]
    let index = Zip::from(band_a)
        .and(band_b)
        .par_map_collect(|&a, &b| normalized_difference_pixel(a, b));
    #[cfg(not(feature = "parallel"))]
    let index = Zip::from(band_a)
        .and(band_b)
        .map_collect(|&a, &b| normalized_difference_pixel(a, b));

    Ok(index)
}

/// Outcome of one index run
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<SkippedScene>,
}

/// Writes index rasters for the clearest scenes of a time series
#[derive(Debug, Clone)]
pub struct SpectralIndexEngine {
    definitions: Vec<IndexDefinition>,
    reference_band: String,
    suffix: String,
}

impl Default for SpectralIndexEngine {
    fn default() -> Self {
        Self::new(IndexDefinition::default_set(), "NDI")
    }
}

impl SpectralIndexEngine {
    pub fn new(definitions: Vec<IndexDefinition>, suffix: &str) -> Self {
        Self {
            definitions,
            reference_band: DEFAULT_REFERENCE_BAND.to_string(),
            suffix: suffix.to_string(),
        }
    }

    pub fn with_reference_band(mut self, band: &str) -> Self {
        self.reference_band = band.to_string();
        self
    }

    pub fn definitions(&self) -> &[IndexDefinition] {
        &self.definitions
    }

    /// `{tile}_{YYYYMMDD}[T{HHMMSS}][_{duplicate}]_{suffix}.tif`, see [`SceneDescriptor::id`]
    pub fn output_name(&self, scene: &SceneDescriptor) -> String {
        format!("{}_{}.tif", scene.id(), self.suffix)
    }

    /// Up to `max_scenes` scenes ordered by ascending invalid-pixel count.
    ///
    /// Scenes whose quality mask cannot be produced are reported as skipped;
    /// errors that are not local to one scene abort the selection.
    pub fn select_scenes(
        &self,
        ts: &TimeSeries,
        max_scenes: Option<usize>,
    ) -> TileResult<(Vec<Arc<SceneDescriptor>>, Vec<SkippedScene>)> {
        let mut ranked = Vec::with_capacity(ts.len());
        let mut skipped = Vec::new();

        for scene in ts {
            match scene.invalid_pixel_count() {
                Ok(invalid) => ranked.push((invalid, scene.clone())),
                Err(e) if e.is_scene_local() => {
                    log::warn!("Skipping scene {}: {}", scene.id(), e);
                    skipped.push(skipped_scene(scene, &e));
                }
                Err(e) => return Err(e),
            }
        }

        ranked.sort_by_key(|(invalid, _)| *invalid);
        let limit = max_scenes.unwrap_or(ranked.len());
        let selected = ranked.into_iter().take(limit).map(|(_, scene)| scene).collect();
        Ok((selected, skipped))
    }

    /// Compute every index of one scene, in declaration order
    pub fn scene_indices(&self, scene: &SceneDescriptor) -> TileResult<Vec<FloatRaster>> {
        let reference = scene.resolve(&self.reference_band)?;
        let path = scene
            .feature_path(reference)
            .ok_or_else(|| TileError::MissingBand(format!("scene {} has no {} file", scene.name(), reference)))?;
        let (width, height) = scene.io().raster_size(path)?;
        let shape = (height, width);

        let mut bands = Vec::with_capacity(self.definitions.len());
        for definition in &self.definitions {
            log::debug!("Computing {} for {}", definition.label, scene.name());
            let a = scene.feature_aligned(&definition.band_a, shape)?;
            let b = scene.feature_aligned(&definition.band_b, shape)?;
            bands.push(normalized_difference(&a, &b)?);
        }
        Ok(bands)
    }

    /// Write the index raster of one scene into `output_dir`
    pub fn write_scene(&self, scene: &SceneDescriptor, output_dir: &Path) -> TileResult<PathBuf> {
        let bands = self.scene_indices(scene)?;
        let georef = scene.georeference(&self.reference_band)?;
        let path = output_dir.join(self.output_name(scene));
        scene.io().write_f32_bands(&path, &bands, &georef)?;
        Ok(path)
    }

    /// Index rasters for the clearest `max_scenes` scenes of `ts` (all if `None`).
    ///
    /// Scene-local failures skip the scene; other errors abort.
    pub fn compute(&self, ts: &TimeSeries, output_dir: &Path, max_scenes: Option<usize>) -> TileResult<IndexReport> {
        if self.definitions.is_empty() {
            return Err(TileError::Config("No index definitions given".to_string()));
        }
        std::fs::create_dir_all(output_dir)?;

        let (selected, mut skipped) = self.select_scenes(ts, max_scenes)?;
        log::info!(
            "Extracting {} index band(s) for {} scene(s) into {}",
            self.definitions.len(),
            selected.len(),
            output_dir.display()
        );

        let mut written = Vec::with_capacity(selected.len());
        for (i, scene) in selected.iter().enumerate() {
            match self.write_scene(scene, output_dir) {
                Ok(path) => {
                    log::debug!("{}/{}: {}", i + 1, selected.len(), path.display());
                    written.push(path);
                }
                Err(e) if e.is_scene_local() => {
                    log::warn!("Skipping scene {}: {}", scene.id(), e);
                    skipped.push(skipped_scene(scene, &e));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(IndexReport { written, skipped })
    }
}

fn skipped_scene(scene: &SceneDescriptor, error: &TileError) -> SkippedScene {
    let path = scene
        .scratch_dir()
        .map(|scratch| scratch.path().to_path_buf())
        .unwrap_or_else(|_| PathBuf::from(scene.id()));
    SkippedScene {
        path,
        reason: error.to_string(),
    }
}

/// Convenience wrapper: [`SpectralIndexEngine::compute`] with the given definitions
pub fn compute_indices(
    ts: &TimeSeries,
    output_dir: &Path,
    definitions: &[IndexDefinition],
    max_scenes: Option<usize>,
    suffix: &str,
) -> TileResult<IndexReport> {
    SpectralIndexEngine::new(definitions.to_vec(), suffix).compute(ts, output_dir, max_scenes)
}
