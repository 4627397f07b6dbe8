//! Scene descriptor: one acquisition of one tile.
//!
//! Metadata (sensor, tile, acquisition date/time, band paths) is parsed once
//! from the file names. The quality mask is decoded lazily on first access and
//! cached in the scene's scratch directory, which later accesses (and later
//! runs) reuse.

use crate::core::bands::{Band, BandTranslator};
use crate::core::qa_mask::{DecodedMask, QualityMaskDecoder};
use crate::io::raster::RasterIo;
use crate::io::scratch::ScratchDir;
use crate::types::{
    FloatRaster, Georeference, Mission, PixelStatistics, QualityMask, Sensor, TileError, TileResult,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ndarray::Array2;
use num_traits::NumCast;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use walkdir::WalkDir;

/// Substring identifying the Landsat quality band
const LANDSAT_QA_MARKER: &str = "QA_PIXEL";
/// Substring identifying the Sentinel-2 scene classification layer
const SENTINEL2_QA_MARKER: &str = "_SCL";

const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff", "jp2"];

/// Pixel types a feature can be read as
pub trait PixelValue: Copy + NumCast + Send + Sync + 'static {
    const NAME: &'static str;

    fn read(io: &dyn RasterIo, path: &Path) -> TileResult<Array2<Self>>;
}

impl PixelValue for u8 {
    const NAME: &'static str = "u8";

    fn read(io: &dyn RasterIo, path: &Path) -> TileResult<Array2<Self>> {
        cast_raster(&io.read_u16(path, 1)?)
    }
}

impl PixelValue for u16 {
    const NAME: &'static str = "u16";

    fn read(io: &dyn RasterIo, path: &Path) -> TileResult<Array2<Self>> {
        io.read_u16(path, 1)
    }
}

impl PixelValue for f32 {
    const NAME: &'static str = "f32";

    fn read(io: &dyn RasterIo, path: &Path) -> TileResult<Array2<Self>> {
        io.read_f32(path, 1)
    }
}

impl PixelValue for f64 {
    const NAME: &'static str = "f64";

    fn read(io: &dyn RasterIo, path: &Path) -> TileResult<Array2<Self>> {
        Ok(io.read_f32(path, 1)?.mapv(|v| v as f64))
    }
}

/// Convert every pixel, failing if one does not fit the target type
pub fn cast_raster<S: PixelValue, T: PixelValue>(raster: &Array2<S>) -> TileResult<Array2<T>> {
    let mut values = Vec::with_capacity(raster.len());
    for &value in raster.iter() {
        let cast = <T as NumCast>::from(value).ok_or(TileError::TypeCast {
            from: S::NAME,
            to: T::NAME,
        })?;
        values.push(cast);
    }
    Array2::from_shape_vec(raster.raw_dim(), values)
        .map_err(|e| TileError::Processing(format!("Failed to reshape cast raster: {}", e)))
}

/// Nearest-neighbour resampling to `shape` = (rows, cols)
pub fn resample_nearest(raster: &FloatRaster, shape: (usize, usize)) -> FloatRaster {
    let (src_rows, src_cols) = raster.dim();
    if src_rows == 0 || src_cols == 0 {
        return FloatRaster::from_elem(shape, f32::NAN);
    }
    Array2::from_shape_fn(shape, |(row, col)| {
        let src_row = (row * src_rows / shape.0).min(src_rows - 1);
        let src_col = (col * src_cols / shape.1).min(src_cols - 1);
        raster[[src_row, src_col]]
    })
}

/// All raster files below `dir`, sorted by path
pub fn collect_raster_files<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir.as_ref())
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| RASTER_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

fn mgrs_tile_pattern() -> TileResult<Regex> {
    Regex::new(r"^T\d{2}[A-Z]{3}$").map_err(|e| TileError::Processing(format!("Regex error: {}", e)))
}

/// Metadata carried by one feature file name
#[derive(Debug, Clone, PartialEq)]
struct FileInfo {
    sensor: Sensor,
    tile: String,
    date: NaiveDate,
    time: Option<NaiveTime>,
    /// Raw band token, `None` for auxiliary files
    raw_band: Option<String>,
    /// Ground resolution in metres when the name carries one
    resolution: Option<u32>,
}

fn parse_error(path: &Path, reason: impl Into<String>) -> TileError {
    TileError::MetadataParse {
        file: path.display().to_string(),
        reason: reason.into(),
    }
}

fn file_stem(path: &Path) -> TileResult<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| parse_error(path, "file name is not valid UTF-8"))
}

/// `LXSS_LLLL_PPPRRR_YYYYMMDD_yyyymmdd_CC_TX[_...]`
fn parse_landsat_file(path: &Path) -> TileResult<FileInfo> {
    let stem = file_stem(path)?;
    let tokens: Vec<&str> = stem.split('_').collect();
    if tokens.len() < 7 {
        return Err(parse_error(path, "expected at least 7 '_'-separated tokens"));
    }

    let sensor = Sensor::from_landsat_token(tokens[0])?;

    let tile = tokens[2];
    if tile.len() != 6 || !tile.chars().all(|c| c.is_ascii_digit()) {
        return Err(parse_error(path, format!("invalid WRS path/row '{}'", tile)));
    }
    let date = NaiveDate::parse_from_str(tokens[3], "%Y%m%d")
        .map_err(|e| parse_error(path, format!("invalid acquisition date '{}': {}", tokens[3], e)))?;

    let raw_band = if stem.contains(LANDSAT_QA_MARKER) {
        Some(LANDSAT_QA_MARKER.to_string())
    } else {
        tokens
            .last()
            .filter(|token| {
                token.len() > 1
                    && token.starts_with(['B', 'b'])
                    && token[1..].chars().all(|c| c.is_ascii_digit())
            })
            .map(|token| token.to_string())
    };

    Ok(FileInfo {
        sensor,
        tile: tile.to_string(),
        date,
        time: None,
        raw_band,
        resolution: Some(30),
    })
}

/// `TxxXXX_YYYYMMDDTHHMMSS_BAND[_RESm]`
///
/// Files not starting with an MGRS tile id (`QI_DATA/MSK_*`, previews) are
/// auxiliary products of the `.SAFE` and yield `None`.
fn parse_sentinel2_file(path: &Path) -> TileResult<Option<FileInfo>> {
    let stem = file_stem(path)?;
    let tokens: Vec<&str> = stem.split('_').collect();
    if tokens.len() < 3 || !mgrs_tile_pattern()?.is_match(tokens[0]) {
        return Ok(None);
    }

    let tile = tokens[0];
    let sensing = NaiveDateTime::parse_from_str(tokens[1], "%Y%m%dT%H%M%S")
        .map_err(|e| parse_error(path, format!("invalid sensing time '{}': {}", tokens[1], e)))?;

    let raw_band = if stem.contains(SENTINEL2_QA_MARKER) {
        "SCL".to_string()
    } else {
        tokens[2].to_string()
    };
    let resolution = tokens
        .get(3)
        .and_then(|token| token.strip_suffix('m'))
        .and_then(|metres| metres.parse::<u32>().ok());

    Ok(Some(FileInfo {
        sensor: Sensor::Sentinel2Msi,
        tile: tile.to_string(),
        date: sensing.date(),
        time: Some(sensing.time()),
        raw_band: Some(raw_band),
        resolution,
    }))
}

/// `None` for auxiliary files that follow no feature naming convention
fn parse_feature_file(mission: Mission, path: &Path) -> TileResult<Option<FileInfo>> {
    match mission {
        Mission::Landsat => parse_landsat_file(path).map(Some),
        Mission::Sentinel2 => parse_sentinel2_file(path),
    }
}

/// One satellite acquisition and its derived products
pub struct SceneDescriptor {
    sensor: Sensor,
    tile: String,
    date: NaiveDate,
    time: Option<NaiveTime>,
    features: BTreeMap<Band, PathBuf>,
    /// Set when another scene of the same series shares this acquisition name
    duplicate_suffix: Option<String>,
    scratch: Option<ScratchDir>,
    statistics: OnceLock<PixelStatistics>,
    io: Arc<dyn RasterIo>,
}

impl std::fmt::Debug for SceneDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneDescriptor")
            .field("sensor", &self.sensor)
            .field("tile", &self.tile)
            .field("date", &self.date)
            .field("time", &self.time)
            .field("features", &self.features)
            .field("duplicate_suffix", &self.duplicate_suffix)
            .field("scratch", &self.scratch)
            .finish()
    }
}

impl SceneDescriptor {
    /// Parse scene metadata from its feature files without touching scratch storage.
    ///
    /// Auxiliary files and files whose band token the sensor does not know
    /// are skipped with a warning. When a band exists at several resolutions the finest is kept.
    pub fn parse<P: AsRef<Path>>(mission: Mission, files: &[P], io: Arc<dyn RasterIo>) -> TileResult<Self> {
        let mut header: Option<FileInfo> = None;
        let mut features: BTreeMap<Band, PathBuf> = BTreeMap::new();
        let mut resolutions: BTreeMap<Band, u32> = BTreeMap::new();

        for path in files {
            let path = path.as_ref();
            let info = match parse_feature_file(mission, path)? {
                Some(info) => info,
                None => {
                    log::warn!("Skipping auxiliary file: {}", path.display());
                    continue;
                }
            };

            if let Some(first) = &header {
                if first.sensor != info.sensor || first.tile != info.tile || first.date != info.date {
                    return Err(parse_error(
                        path,
                        format!("belongs to a different acquisition than {}_{}", first.tile, first.date),
                    ));
                }
            }

            let translator = BandTranslator::for_sensor(info.sensor);
            let band = match info.raw_band.as_deref().and_then(|raw| translator.translate(raw)) {
                Some(band) => band,
                None => {
                    log::warn!("Skipping unrecognized feature file: {}", path.display());
                    continue;
                }
            };

            let resolution = info.resolution.unwrap_or(u32::MAX);
            let finer = resolutions.get(&band).map_or(true, |&current| resolution < current);
            if finer {
                features.insert(band, path.to_path_buf());
                resolutions.insert(band, resolution);
            }

            if header.is_none() {
                header = Some(info);
            }
        }

        let header = match header {
            Some(header) if !features.is_empty() => header,
            _ => {
                let location = files
                    .first()
                    .and_then(|path| path.as_ref().parent())
                    .map(|dir| dir.display().to_string())
                    .unwrap_or_else(|| "<no files>".to_string());
                return Err(TileError::EmptyFeatureSet(location));
            }
        };

        log::debug!(
            "Parsed scene {}_{} ({}) with {} feature(s)",
            header.tile,
            header.date.format("%Y%m%d"),
            header.sensor,
            features.len()
        );

        Ok(Self {
            sensor: header.sensor,
            tile: header.tile,
            date: header.date,
            time: header.time,
            features,
            duplicate_suffix: None,
            scratch: None,
            statistics: OnceLock::new(),
            io,
        })
    }

    /// Parse metadata and initialise scratch storage below `scratch_root`.
    ///
    /// The scratch directory is named after the scene (see [`Self::name`]).
    pub fn populate<P: AsRef<Path>>(
        mission: Mission,
        files: &[P],
        scratch_root: &Path,
        io: Arc<dyn RasterIo>,
    ) -> TileResult<Self> {
        Self::parse(mission, files, io)?.with_scratch(scratch_root, None)
    }

    /// Build a scene from every raster file found below `dir`
    pub fn from_scene_dir<P: AsRef<Path>>(
        mission: Mission,
        dir: P,
        scratch_root: &Path,
        scratch_name: Option<&str>,
        io: Arc<dyn RasterIo>,
    ) -> TileResult<Self> {
        let files = collect_raster_files(dir.as_ref());
        if files.is_empty() {
            return Err(TileError::EmptyFeatureSet(dir.as_ref().display().to_string()));
        }
        Self::parse(mission, &files, io)?.with_scratch(scratch_root, scratch_name)
    }

    /// Tell this scene apart from another acquisition with the same name.
    ///
    /// The suffix becomes part of [`Self::id`], and with it of the default
    /// scratch directory and of output file names.
    pub fn with_duplicate_suffix(mut self, suffix: &str) -> Self {
        self.duplicate_suffix = Some(suffix.to_string());
        self
    }

    /// Attach scratch storage at `root/name` (default name: [`Self::id`])
    pub fn with_scratch(mut self, root: &Path, name: Option<&str>) -> TileResult<Self> {
        let name = name.map(str::to_string).unwrap_or_else(|| self.id());
        self.scratch = Some(ScratchDir::create(root, &name)?);
        Ok(self)
    }

    pub fn sensor(&self) -> Sensor {
        self.sensor
    }

    pub fn mission(&self) -> Mission {
        self.sensor.mission()
    }

    pub fn tile(&self) -> &str {
        &self.tile
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time
    }

    /// Acquisition date and time; midnight when the product carries no time
    pub fn datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time.unwrap_or(NaiveTime::MIN))
    }

    /// `{tile}_{YYYYMMDD}` plus `T{HHMMSS}` when a time of day is known
    pub fn name(&self) -> String {
        match self.time {
            Some(time) => format!("{}_{}T{}", self.tile, self.date.format("%Y%m%d"), time.format("%H%M%S")),
            None => format!("{}_{}", self.tile, self.date.format("%Y%m%d")),
        }
    }

    /// [`Self::name`] plus the duplicate suffix, if any; unique within a series
    pub fn id(&self) -> String {
        match &self.duplicate_suffix {
            Some(suffix) => format!("{}_{}", self.name(), suffix),
            None => self.name(),
        }
    }

    pub fn translator(&self) -> BandTranslator {
        BandTranslator::for_sensor(self.sensor)
    }

    pub fn feature_paths(&self) -> &BTreeMap<Band, PathBuf> {
        &self.features
    }

    pub fn feature_path(&self, band: Band) -> Option<&Path> {
        self.features.get(&band).map(PathBuf::as_path)
    }

    pub fn io(&self) -> &Arc<dyn RasterIo> {
        &self.io
    }

    pub fn scratch_dir(&self) -> TileResult<&ScratchDir> {
        self.scratch.as_ref().ok_or_else(|| {
            TileError::InvalidScratchPath(format!("scratch storage of scene {} was never initialized", self.name()))
        })
    }

    /// Resolve a canonical band name or alias for this scene's sensor
    pub fn resolve(&self, name: &str) -> TileResult<Band> {
        self.translator()
            .translate(name)
            .ok_or_else(|| TileError::MissingBand(format!("{} has no band named '{}'", self.sensor, name)))
    }

    fn require_path(&self, band: Band) -> TileResult<&Path> {
        self.feature_path(band)
            .ok_or_else(|| TileError::MissingBand(format!("scene {} has no {} file", self.name(), band)))
    }

    /// Read a band (or the quality mask) as `T`
    pub fn feature<T: PixelValue>(&self, name: &str) -> TileResult<Array2<T>> {
        let band = self.resolve(name)?;
        if band == Band::Mask {
            return cast_raster(&self.mask()?);
        }
        T::read(self.io.as_ref(), self.require_path(band)?)
    }

    /// Read a band as Float32, resampled to `shape` when its native grid differs.
    ///
    /// Resampled bands are cached in scratch storage.
    pub fn feature_aligned(&self, name: &str, shape: (usize, usize)) -> TileResult<FloatRaster> {
        let band = self.resolve(name)?;
        if band == Band::Mask {
            let mask: FloatRaster = cast_raster(&self.mask()?)?;
            return Ok(if mask.dim() == shape { mask } else { resample_nearest(&mask, shape) });
        }

        let path = self.require_path(band)?;
        let (width, height) = self.io.raster_size(path)?;
        if (height, width) == shape {
            return self.io.read_f32(path, 1);
        }

        let scratch = self.scratch_dir()?;
        let cache = scratch.resampled_path(band.as_str(), shape);
        if cache.is_file() {
            return scratch.load(&cache);
        }

        log::debug!(
            "Resampling {} of {} from {}x{} to {}x{}",
            band,
            self.name(),
            height,
            width,
            shape.0,
            shape.1
        );
        let resampled = resample_nearest(&self.io.read_f32(path, 1)?, shape);
        scratch.store(&cache, &resampled)?;
        Ok(resampled)
    }

    /// Georeferencing of one of the scene's bands
    pub fn georeference(&self, name: &str) -> TileResult<Georeference> {
        let band = self.resolve(name)?;
        self.io.georeference(self.require_path(band)?)
    }

    /// Quality mask, decoded and cached on first access
    pub fn mask(&self) -> TileResult<QualityMask> {
        let scratch = self.scratch_dir()?;
        if scratch.has_mask() {
            let mask = scratch.load_mask()?;
            if self.statistics.get().is_none() {
                let _ = self.statistics.set(PixelStatistics::from_mask(&mask));
            }
            return Ok(mask);
        }
        Ok(self.compute_mask()?.mask)
    }

    /// Decode the QA band and publish the mask to scratch storage, replacing any cached copy
    pub fn compute_mask(&self) -> TileResult<DecodedMask> {
        let scratch = self.scratch_dir()?;
        let qa = self.io.read_u16(self.require_path(Band::Qa)?, 1)?;
        let decoded = QualityMaskDecoder::for_sensor(self.sensor).decode(&qa);
        scratch.store_mask(&decoded.mask)?;
        let _ = self.statistics.set(decoded.statistics);

        log::info!(
            "Mask for {}: {}/{} invalid pixels ({} no-data, {} cloud)",
            self.name(),
            decoded.statistics.invalid,
            decoded.statistics.total,
            decoded.statistics.no_data,
            decoded.statistics.cloud
        );
        Ok(decoded)
    }

    /// Pixel statistics of the quality mask, computing the mask if needed
    pub fn statistics(&self) -> TileResult<PixelStatistics> {
        if let Some(stats) = self.statistics.get() {
            return Ok(*stats);
        }
        let mask = self.mask()?;
        Ok(self
            .statistics
            .get()
            .copied()
            .unwrap_or_else(|| PixelStatistics::from_mask(&mask)))
    }

    pub fn invalid_pixel_count(&self) -> TileResult<usize> {
        Ok(self.statistics()?.invalid)
    }

    pub fn no_data_pixel_count(&self) -> TileResult<usize> {
        Ok(self.statistics()?.no_data)
    }

    pub fn cloud_pixel_count(&self) -> TileResult<usize> {
        Ok(self.statistics()?.cloud)
    }

    pub fn total_pixel_count(&self) -> TileResult<usize> {
        Ok(self.statistics()?.total)
    }

    /// Delete the scene's scratch directory and everything cached in it
    pub fn release_scratch(&self) -> TileResult<()> {
        match &self.scratch {
            Some(scratch) => scratch.remove(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raster::MemoryRasterIo;
    use ndarray::array;
    use tempfile::TempDir;

    const PRODUCT: &str = "LC08_L2SP_190028_20220615_20220627_02_T1";

    fn landsat_files(dir: &Path) -> Vec<PathBuf> {
        ["SR_B2", "SR_B3", "SR_B4", "SR_B5", "QA_PIXEL", "ST_QA"]
            .iter()
            .map(|suffix| dir.join(format!("{}_{}.TIF", PRODUCT, suffix)))
            .collect()
    }

    fn memory_io(files: &[PathBuf]) -> Arc<MemoryRasterIo> {
        let io = Arc::new(MemoryRasterIo::new());
        for path in files {
            let name = path.to_string_lossy();
            if name.contains("QA_PIXEL") {
                io.insert_u16(path, array![[21824u16, 1], [1 << 3, 1 << 5]], Georeference::default())
                    .unwrap();
            } else {
                io.insert_u16(path, array![[100u16, 200], [300, 400]], Georeference::default())
                    .unwrap();
            }
        }
        io
    }

    #[test]
    fn test_parse_landsat_metadata() {
        let files = landsat_files(Path::new("/data/scene"));
        let scene = SceneDescriptor::parse(Mission::Landsat, &files, memory_io(&files)).unwrap();

        assert_eq!(scene.sensor(), Sensor::LandsatOli);
        assert_eq!(scene.tile(), "190028");
        assert_eq!(scene.date(), NaiveDate::from_ymd_opt(2022, 6, 15).unwrap());
        assert_eq!(scene.time(), None);
        assert_eq!(scene.name(), "190028_20220615");
        // ST_QA is not a recognised band
        assert_eq!(scene.feature_paths().len(), 5);
        assert!(scene.feature_path(Band::Qa).is_some());
        assert_eq!(scene.resolve("NIR").unwrap(), Band::B05);
    }

    #[test]
    fn test_parse_errors() {
        let io: Arc<dyn RasterIo> = Arc::new(MemoryRasterIo::new());

        let bad = vec![PathBuf::from("/d/LC08_L2SP_190028_2022XX15_20220627_02_T1_SR_B4.TIF")];
        assert!(matches!(
            SceneDescriptor::parse(Mission::Landsat, &bad, io.clone()),
            Err(TileError::MetadataParse { .. })
        ));

        let short = vec![PathBuf::from("/d/thumbnail.TIF")];
        assert!(matches!(
            SceneDescriptor::parse(Mission::Landsat, &short, io.clone()),
            Err(TileError::MetadataParse { .. })
        ));

        let s2_bad_time = vec![PathBuf::from("/s2/T32TQM_20221315T101559_B04_10m.jp2")];
        assert!(matches!(
            SceneDescriptor::parse(Mission::Sentinel2, &s2_bad_time, io.clone()),
            Err(TileError::MetadataParse { .. })
        ));

        let aux = vec![PathBuf::from(format!("/d/{}_SR_QA_AEROSOL.TIF", PRODUCT))];
        assert!(matches!(
            SceneDescriptor::parse(Mission::Landsat, &aux, io.clone()),
            Err(TileError::EmptyFeatureSet(_))
        ));

        let unknown = vec![PathBuf::from("/d/LX12_L2SP_190028_20220615_20220627_02_T1_SR_B4.TIF")];
        assert!(matches!(
            SceneDescriptor::parse(Mission::Landsat, &unknown, io),
            Err(TileError::UnsupportedSensor(_))
        ));
    }

    #[test]
    fn test_parse_sentinel2_keeps_finest_resolution() {
        let files: Vec<PathBuf> = [
            "T32TQM_20220615T101559_B04_10m.jp2",
            "T32TQM_20220615T101559_B04_20m.jp2",
            "T32TQM_20220615T101559_B11_20m.jp2",
            "T32TQM_20220615T101559_SCL_20m.jp2",
            "T32TQM_20220615T101559_TCI_10m.jp2",
        ]
        .iter()
        .map(|name| PathBuf::from("/s2/GRANULE").join(name))
        .collect();

        let io: Arc<dyn RasterIo> = Arc::new(MemoryRasterIo::new());
        let scene = SceneDescriptor::parse(Mission::Sentinel2, &files, io).unwrap();

        assert_eq!(scene.sensor(), Sensor::Sentinel2Msi);
        assert_eq!(scene.tile(), "T32TQM");
        assert_eq!(scene.time(), NaiveTime::from_hms_opt(10, 15, 59));
        assert_eq!(scene.name(), "T32TQM_20220615T101559");
        assert_eq!(scene.feature_path(Band::B04), Some(files[0].as_path()));
        assert_eq!(scene.feature_path(Band::Qa), Some(files[3].as_path()));
        assert_eq!(scene.feature_paths().len(), 3);
    }

    #[test]
    fn test_parse_sentinel2_skips_quality_indicator_files() {
        let granule = PathBuf::from("/s2/S2A.SAFE/GRANULE/L2A_T32TQM_A036456_20220615T101559");
        let files = vec![
            granule.join("IMG_DATA/R10m/T32TQM_20220615T101559_B04_10m.jp2"),
            granule.join("IMG_DATA/R20m/T32TQM_20220615T101559_SCL_20m.jp2"),
            granule.join("QI_DATA/MSK_CLDPRB_20m.jp2"),
            granule.join("QI_DATA/MSK_SNWPRB_60m.jp2"),
            granule.join("QI_DATA/T32TQM_20220615T101559_PVI.jp2"),
        ];

        let io: Arc<dyn RasterIo> = Arc::new(MemoryRasterIo::new());
        let scene = SceneDescriptor::parse(Mission::Sentinel2, &files, io.clone()).unwrap();
        assert_eq!(scene.tile(), "T32TQM");
        assert_eq!(scene.feature_paths().len(), 2);
        assert_eq!(scene.feature_path(Band::Qa), Some(files[1].as_path()));

        let only_aux = vec![granule.join("QI_DATA/MSK_CLDPRB_20m.jp2")];
        assert!(matches!(
            SceneDescriptor::parse(Mission::Sentinel2, &only_aux, io),
            Err(TileError::EmptyFeatureSet(_))
        ));
    }

    #[test]
    fn test_duplicate_suffix_names_scratch() {
        let temp = TempDir::new().unwrap();
        let files = landsat_files(Path::new("/data/scene"));
        let scene = SceneDescriptor::parse(Mission::Landsat, &files, memory_io(&files))
            .unwrap()
            .with_duplicate_suffix("ETM")
            .with_scratch(temp.path(), None)
            .unwrap();

        assert_eq!(scene.name(), "190028_20220615");
        assert_eq!(scene.id(), "190028_20220615_ETM");
        assert_eq!(scene.scratch_dir().unwrap().path(), temp.path().join("190028_20220615_ETM"));
    }

    #[test]
    fn test_mask_is_lazy_and_cached() {
        let temp = TempDir::new().unwrap();
        let files = landsat_files(Path::new("/data/scene"));
        let io = memory_io(&files);
        let scene = SceneDescriptor::populate(Mission::Landsat, &files, temp.path(), io.clone()).unwrap();

        let scratch = scene.scratch_dir().unwrap().clone();
        assert_eq!(scratch.path(), temp.path().join("190028_20220615"));
        assert!(!scratch.has_mask());

        let stats = scene.statistics().unwrap();
        assert!(scratch.has_mask());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.invalid, 3);
        assert_eq!(scene.no_data_pixel_count().unwrap(), 1);
        assert_eq!(scene.cloud_pixel_count().unwrap(), 1);
        assert_eq!(scene.total_pixel_count().unwrap(), 4);

        // The cached mask is reused even if the QA band changes afterwards
        let qa_path = scene.feature_path(Band::Qa).unwrap().to_path_buf();
        io.insert_u16(&qa_path, array![[0u16, 0], [0, 0]], Georeference::default())
            .unwrap();
        let mask: Array2<u8> = scene.feature("MASK").unwrap();
        assert_eq!(mask, array![[0u8, 2], [3, 5]]);

        // A fresh descriptor over the same scratch root hits the persisted cache
        let again = SceneDescriptor::populate(Mission::Landsat, &files, temp.path(), io).unwrap();
        assert_eq!(again.invalid_pixel_count().unwrap(), 3);

        scene.release_scratch().unwrap();
        assert!(!scratch.path().exists());
    }

    #[test]
    fn test_mask_requires_scratch() {
        let files = landsat_files(Path::new("/data/scene"));
        let scene = SceneDescriptor::parse(Mission::Landsat, &files, memory_io(&files)).unwrap();
        assert!(matches!(scene.mask(), Err(TileError::InvalidScratchPath(_))));
        assert!(matches!(
            scene.feature::<f32>("mask"),
            Err(TileError::InvalidScratchPath(_))
        ));
    }

    #[test]
    fn test_feature_types() {
        let files = landsat_files(Path::new("/data/scene"));
        let scene = SceneDescriptor::parse(Mission::Landsat, &files, memory_io(&files)).unwrap();

        let red: Array2<f32> = scene.feature("RED").unwrap();
        assert_eq!(red[[1, 1]], 400.0);
        let red: Array2<u16> = scene.feature("B04").unwrap();
        assert_eq!(red[[0, 0]], 100);
        let red: Array2<f64> = scene.feature("RED").unwrap();
        assert_eq!(red[[1, 0]], 300.0);

        // 300 and 400 do not fit into u8
        assert!(matches!(
            scene.feature::<u8>("red"),
            Err(TileError::TypeCast { from: "u16", to: "u8" })
        ));
        assert!(matches!(scene.feature::<f32>("B09"), Err(TileError::MissingBand(_))));
        assert!(matches!(scene.feature::<f32>("purple"), Err(TileError::MissingBand(_))));
    }

    #[test]
    fn test_feature_aligned_resamples_and_caches() {
        let temp = TempDir::new().unwrap();
        let files = vec![
            PathBuf::from("/s2/T32TQM_20220615T101559_B08_10m.jp2"),
            PathBuf::from("/s2/T32TQM_20220615T101559_B11_20m.jp2"),
        ];
        let io = Arc::new(MemoryRasterIo::new());
        io.insert_u16(&files[0], Array2::from_elem((4, 4), 10u16), Georeference::default())
            .unwrap();
        io.insert_u16(&files[1], array![[1u16, 2], [3, 4]], Georeference::default())
            .unwrap();

        let scene = SceneDescriptor::populate(Mission::Sentinel2, &files, temp.path(), io).unwrap();
        let swir = scene.feature_aligned("SWIR1", (4, 4)).unwrap();
        assert_eq!(swir.dim(), (4, 4));
        assert_eq!(swir[[0, 1]], 1.0);
        assert_eq!(swir[[3, 3]], 4.0);
        assert_eq!(swir[[2, 0]], 3.0);

        let cache = scene.scratch_dir().unwrap().resampled_path("B11", (4, 4));
        assert!(cache.is_file());
        assert_eq!(scene.feature_aligned("B11", (4, 4)).unwrap(), swir);
    }

    #[test]
    fn test_collect_raster_files() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("GRANULE/IMG_DATA");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("b.jp2"), b"").unwrap();
        std::fs::write(temp.path().join("a.TIF"), b"").unwrap();
        std::fs::write(temp.path().join("MTL.txt"), b"").unwrap();

        let files = collect_raster_files(temp.path());
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
    }
}
