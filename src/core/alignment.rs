//! Common-footprint cropping of a time series.
//!
//! Scenes of one tile rarely cover exactly the same ground. Cropping every
//! band to the intersection of all footprints yields stacks whose pixels line
//! up across dates.

use crate::core::bands::Band;
use crate::core::scene::SceneDescriptor;
use crate::core::time_series::TimeSeries;
use crate::types::{BoundingBox, GeoTransform, Georeference, TileError, TileResult};
use std::path::{Path, PathBuf};

/// Pixel window of a raster: offset (col, row) and size (width, height)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    /// Window of a raster with transform `gt` and size `raster` = (width, height) covering `bbox`
    pub fn covering(gt: &GeoTransform, raster: (usize, usize), bbox: &BoundingBox) -> TileResult<Self> {
        if gt.pixel_width == 0.0 || gt.pixel_height == 0.0 {
            return Err(TileError::Processing("Degenerate geotransform".to_string()));
        }

        let left = ((bbox.min_x - gt.top_left_x) / gt.pixel_width).round();
        let right = ((bbox.max_x - gt.top_left_x) / gt.pixel_width).round();
        let top = ((bbox.max_y - gt.top_left_y) / gt.pixel_height).round();
        let bottom = ((bbox.min_y - gt.top_left_y) / gt.pixel_height).round();

        let col0 = left.min(right).max(0.0) as usize;
        let col1 = (left.max(right).max(0.0) as usize).min(raster.0);
        let row0 = top.min(bottom).max(0.0) as usize;
        let row1 = (top.max(bottom).max(0.0) as usize).min(raster.1);

        if col1 <= col0 || row1 <= row0 {
            return Err(TileError::Processing("Footprint does not overlap the raster".to_string()));
        }

        Ok(Self {
            col: col0,
            row: row0,
            width: col1 - col0,
            height: row1 - row0,
        })
    }
}

fn reference_footprint(scene: &SceneDescriptor, band: Band) -> TileResult<BoundingBox> {
    let path = scene
        .feature_path(band)
        .ok_or_else(|| TileError::MissingBand(format!("scene {} has no {} file", scene.name(), band)))?;
    let (width, height) = scene.io().raster_size(path)?;
    Ok(scene.io().georeference(path)?.geo_transform.footprint(width, height))
}

/// Intersection of the footprints of `reference` across all scenes
pub fn common_footprint(ts: &TimeSeries, reference: &str) -> TileResult<BoundingBox> {
    let mut common: Option<BoundingBox> = None;
    for scene in ts {
        let footprint = reference_footprint(scene, scene.resolve(reference)?)?;
        common = Some(match common {
            None => footprint,
            Some(bbox) => bbox.intersection(&footprint).ok_or_else(|| {
                TileError::Processing(format!("Scene {} does not overlap the time series", scene.name()))
            })?,
        });
    }
    common.ok_or_else(|| TileError::Processing("Cannot align an empty time series".to_string()))
}

/// Crop every band of one scene to `bbox`, writing `savepath/{scene id}/{file}.tif`
pub fn crop_scene(scene: &SceneDescriptor, bbox: &BoundingBox, savepath: &Path) -> TileResult<PathBuf> {
    let dir = savepath.join(scene.id());
    std::fs::create_dir_all(&dir)?;

    for (band, path) in scene.feature_paths() {
        let georef = scene.io().georeference(path)?;
        let size = scene.io().raster_size(path)?;
        let window = PixelWindow::covering(&georef.geo_transform, size, bbox)?;

        let data = scene.io().read_f32_window(
            path,
            1,
            (window.col, window.row),
            (window.width, window.height),
        )?;
        let cropped = Georeference {
            geo_transform: georef.geo_transform.shifted(window.row, window.col),
            projection: georef.projection,
        };

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_else(|| band.as_str());
        let output = dir.join(format!("{}.tif", stem));
        log::debug!("Cropping {} to {}x{}", band, window.width, window.height);
        scene.io().write_f32_bands(&output, &[data], &cropped)?;
    }

    Ok(dir)
}

/// Crop all scenes of `ts` to their common footprint.
///
/// Returns the per-scene output directories in series order.
pub fn crop_to_common_footprint(ts: &TimeSeries, reference: &str, savepath: &Path) -> TileResult<Vec<PathBuf>> {
    let bbox = common_footprint(ts, reference)?;
    log::info!(
        "Cropping {} scene(s) to [{:.1}, {:.1}] x [{:.1}, {:.1}]",
        ts.len(),
        bbox.min_x,
        bbox.max_x,
        bbox.min_y,
        bbox.max_y
    );

    let mut dirs = Vec::with_capacity(ts.len());
    for (i, scene) in ts.iter().enumerate() {
        log::debug!("Cropping {}/{}", i + 1, ts.len());
        dirs.push(crop_scene(scene, &bbox, savepath)?);
    }
    Ok(dirs)
}
