use crate::types::{FloatRaster, GeoTransform, Georeference, TileError, TileResult};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use num_traits::ToPrimitive;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Raster I/O provider.
///
/// Everything the processing core reads or writes goes through this trait, so
/// the GDAL-backed implementation can be swapped for [`MemoryRasterIo`] in tests.
pub trait RasterIo: Send + Sync {
    /// Raster dimensions as (width, height)
    fn raster_size(&self, path: &Path) -> TileResult<(usize, usize)>;

    /// Read one band (1-indexed) as 16-bit unsigned integers
    fn read_u16(&self, path: &Path, band: usize) -> TileResult<Array2<u16>>;

    /// Read one band (1-indexed) as 32-bit floats
    fn read_f32(&self, path: &Path, band: usize) -> TileResult<FloatRaster>;

    /// Read a window of `size` = (width, height) pixels starting at `offset` = (col, row)
    fn read_f32_window(
        &self,
        path: &Path,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> TileResult<FloatRaster>;

    fn georeference(&self, path: &Path) -> TileResult<Georeference>;

    /// Create a multi-band Float32 raster, one band per array, in order
    fn write_f32_bands(&self, path: &Path, bands: &[FloatRaster], georef: &Georeference) -> TileResult<()>;
}

fn check_band_shapes(bands: &[FloatRaster]) -> TileResult<(usize, usize)> {
    let first = bands
        .first()
        .ok_or_else(|| TileError::RasterIo("No bands to write".to_string()))?;
    let dim = first.dim();
    if bands.iter().any(|band| band.dim() != dim) {
        return Err(TileError::ShapeMismatch(
            "All bands of an output raster must share one shape".to_string(),
        ));
    }
    Ok(dim)
}

/// GDAL-backed raster provider (GeoTIFF output, any GDAL-readable input)
#[derive(Debug, Clone, Default)]
pub struct GdalRasterIo;

impl GdalRasterIo {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> TileResult<Dataset> {
        if !path.exists() {
            return Err(TileError::RasterIo(format!("File not found: {}", path.display())));
        }
        Ok(Dataset::open(path)?)
    }

    fn read_window<T: gdal::raster::GdalType + Copy>(
        path: &Path,
        band: usize,
        offset: (usize, usize),
        size: Option<(usize, usize)>,
    ) -> TileResult<Array2<T>> {
        let dataset = Self::open(path)?;
        let (width, height) = size.unwrap_or_else(|| dataset.raster_size());

        log::debug!(
            "Reading band {} of {} ({}x{} at {:?})",
            band,
            path.display(),
            width,
            height,
            offset
        );

        let rasterband = dataset.rasterband(band as isize)?;
        let band_data = rasterband.read_as::<T>(
            (offset.0 as isize, offset.1 as isize),
            (width, height),
            (width, height),
            None,
        )?;

        Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| TileError::RasterIo(format!("Failed to reshape {}: {}", path.display(), e)))
    }
}

impl RasterIo for GdalRasterIo {
    fn raster_size(&self, path: &Path) -> TileResult<(usize, usize)> {
        Ok(Self::open(path)?.raster_size())
    }

    fn read_u16(&self, path: &Path, band: usize) -> TileResult<Array2<u16>> {
        Self::read_window::<u16>(path, band, (0, 0), None)
    }

    fn read_f32(&self, path: &Path, band: usize) -> TileResult<FloatRaster> {
        Self::read_window::<f32>(path, band, (0, 0), None)
    }

    fn read_f32_window(
        &self,
        path: &Path,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> TileResult<FloatRaster> {
        Self::read_window::<f32>(path, band, offset, Some(size))
    }

    fn georeference(&self, path: &Path) -> TileResult<Georeference> {
        let dataset = Self::open(path)?;
        Ok(Georeference {
            geo_transform: GeoTransform::from_gdal(dataset.geo_transform()?),
            projection: dataset.projection(),
        })
    }

    fn write_f32_bands(&self, path: &Path, bands: &[FloatRaster], georef: &Georeference) -> TileResult<()> {
        let (height, width) = check_band_shapes(bands)?;
        log::info!("Writing {} band(s) to {}", bands.len(), path.display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f32, _>(
            path,
            width as isize,
            height as isize,
            bands.len() as isize,
        )?;

        dataset.set_geo_transform(&georef.geo_transform.to_gdal())?;
        if !georef.projection.is_empty() {
            dataset.set_projection(&georef.projection)?;
        }

        for (index, band) in bands.iter().enumerate() {
            let mut rasterband = dataset.rasterband(index as isize + 1)?;
            let flat_data: Vec<f32> = band.iter().cloned().collect();
            let buffer = Buffer::new((width, height), flat_data);
            rasterband.write((0, 0), (width, height), &buffer)?;
            rasterband.set_no_data_value(Some(f32::NAN as f64))?;
        }

        Ok(())
    }
}

/// Pixel data held by [`MemoryRasterIo`]
#[derive(Debug, Clone)]
pub enum MemoryBand {
    U16(Array2<u16>),
    F32(FloatRaster),
}

impl MemoryBand {
    fn dim(&self) -> (usize, usize) {
        match self {
            MemoryBand::U16(data) => data.dim(),
            MemoryBand::F32(data) => data.dim(),
        }
    }

    fn to_f32(&self) -> FloatRaster {
        match self {
            MemoryBand::U16(data) => data.mapv(|v| v as f32),
            MemoryBand::F32(data) => data.clone(),
        }
    }

    /// Fails on float pixels that are not integers in the u16 range
    fn to_u16(&self) -> TileResult<Array2<u16>> {
        let data = match self {
            MemoryBand::U16(data) => return Ok(data.clone()),
            MemoryBand::F32(data) => data,
        };
        let mut values = Vec::with_capacity(data.len());
        for &value in data.iter() {
            let cast = if value.fract() == 0.0 { value.to_u16() } else { None };
            values.push(cast.ok_or(TileError::TypeCast { from: "f32", to: "u16" })?);
        }
        Array2::from_shape_vec(data.raw_dim(), values)
            .map_err(|e| TileError::Processing(format!("Failed to reshape cast raster: {}", e)))
    }
}

#[derive(Debug, Clone)]
struct MemoryRaster {
    bands: Vec<MemoryBand>,
    georef: Georeference,
}

/// In-memory raster store keyed by path, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryRasterIo {
    rasters: RwLock<HashMap<PathBuf, MemoryRaster>>,
}

impl MemoryRasterIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_u16<P: AsRef<Path>>(&self, path: P, data: Array2<u16>, georef: Georeference) -> TileResult<()> {
        self.insert(path.as_ref(), vec![MemoryBand::U16(data)], georef)
    }

    pub fn insert_f32<P: AsRef<Path>>(&self, path: P, data: FloatRaster, georef: Georeference) -> TileResult<()> {
        self.insert(path.as_ref(), vec![MemoryBand::F32(data)], georef)
    }

    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        self.rasters
            .read()
            .map(|rasters| rasters.contains_key(path.as_ref()))
            .unwrap_or(false)
    }

    /// All bands of a stored raster as Float32
    pub fn bands_f32<P: AsRef<Path>>(&self, path: P) -> TileResult<Vec<FloatRaster>> {
        let rasters = self.read_lock()?;
        let raster = Self::lookup(&rasters, path.as_ref())?;
        Ok(raster.bands.iter().map(MemoryBand::to_f32).collect())
    }

    fn insert(&self, path: &Path, bands: Vec<MemoryBand>, georef: Georeference) -> TileResult<()> {
        let mut rasters = self
            .rasters
            .write()
            .map_err(|_| TileError::RasterIo("Raster store lock poisoned".to_string()))?;
        rasters.insert(path.to_path_buf(), MemoryRaster { bands, georef });
        Ok(())
    }

    fn read_lock(&self) -> TileResult<std::sync::RwLockReadGuard<'_, HashMap<PathBuf, MemoryRaster>>> {
        self.rasters
            .read()
            .map_err(|_| TileError::RasterIo("Raster store lock poisoned".to_string()))
    }

    fn lookup<'a>(rasters: &'a HashMap<PathBuf, MemoryRaster>, path: &Path) -> TileResult<&'a MemoryRaster> {
        rasters
            .get(path)
            .ok_or_else(|| TileError::RasterIo(format!("File not found: {}", path.display())))
    }

    fn band<'a>(raster: &'a MemoryRaster, path: &Path, band: usize) -> TileResult<&'a MemoryBand> {
        band.checked_sub(1)
            .and_then(|index| raster.bands.get(index))
            .ok_or_else(|| TileError::RasterIo(format!("{} has no band {}", path.display(), band)))
    }
}

impl RasterIo for MemoryRasterIo {
    fn raster_size(&self, path: &Path) -> TileResult<(usize, usize)> {
        let rasters = self.read_lock()?;
        let raster = Self::lookup(&rasters, path)?;
        let (height, width) = Self::band(raster, path, 1)?.dim();
        Ok((width, height))
    }

    fn read_u16(&self, path: &Path, band: usize) -> TileResult<Array2<u16>> {
        let rasters = self.read_lock()?;
        let raster = Self::lookup(&rasters, path)?;
        Self::band(raster, path, band)?.to_u16()
    }

    fn read_f32(&self, path: &Path, band: usize) -> TileResult<FloatRaster> {
        let rasters = self.read_lock()?;
        let raster = Self::lookup(&rasters, path)?;
        Ok(Self::band(raster, path, band)?.to_f32())
    }

    fn read_f32_window(
        &self,
        path: &Path,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> TileResult<FloatRaster> {
        let full = self.read_f32(path, band)?;
        let (col, row) = offset;
        let (width, height) = size;
        if row + height > full.nrows() || col + width > full.ncols() {
            return Err(TileError::RasterIo(format!(
                "Window {:?}+{:?} outside {}",
                offset,
                size,
                path.display()
            )));
        }
        Ok(full
            .slice(ndarray::s![row..row + height, col..col + width])
            .to_owned())
    }

    fn georeference(&self, path: &Path) -> TileResult<Georeference> {
        let rasters = self.read_lock()?;
        Ok(Self::lookup(&rasters, path)?.georef.clone())
    }

    fn write_f32_bands(&self, path: &Path, bands: &[FloatRaster], georef: &Georeference) -> TileResult<()> {
        check_band_shapes(bands)?;
        self.insert(
            path,
            bands.iter().cloned().map(MemoryBand::F32).collect(),
            georef.clone(),
        )
    }
}
