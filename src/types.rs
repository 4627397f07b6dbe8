use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// 8-bit categorical quality mask (see [`MaskCategory`])
pub type QualityMask = Array2<u8>;

/// Raw 16-bit quality-assurance raster
pub type QaRaster = Array2<u16>;

/// Reflectance or derived index raster
pub type FloatRaster = Array2<f32>;

/// Satellite mission a dataset belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mission {
    #[serde(rename = "Landsat", alias = "landsat")]
    Landsat,
    #[serde(rename = "S2", alias = "s2", alias = "Sentinel2")]
    Sentinel2,
}

impl Mission {
    pub fn parse(value: &str) -> TileResult<Self> {
        match value.trim().to_uppercase().as_str() {
            "LANDSAT" => Ok(Mission::Landsat),
            "S2" | "SENTINEL2" | "SENTINEL-2" => Ok(Mission::Sentinel2),
            _ => Err(TileError::UnsupportedSensor(value.to_string())),
        }
    }
}

impl std::fmt::Display for Mission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mission::Landsat => write!(f, "Landsat"),
            Mission::Sentinel2 => write!(f, "S2"),
        }
    }
}

/// Instrument that acquired a scene.
///
/// Band numbering and QA semantics are resolved per sensor: OLI (Landsat 8/9)
/// shifts every band by one relative to TM/ETM+ because of its extra coastal
/// aerosol band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    /// Landsat 8/9 Operational Land Imager
    LandsatOli,
    /// Landsat 7 Enhanced Thematic Mapper Plus
    LandsatEtm,
    /// Landsat 4/5 Thematic Mapper
    LandsatTm,
    /// Sentinel-2 MultiSpectral Instrument
    Sentinel2Msi,
}

impl Sensor {
    /// Resolve the leading token of a Landsat product name (`LC08`, `LE07`, ...)
    pub fn from_landsat_token(token: &str) -> TileResult<Self> {
        match token {
            "LC08" | "LC09" | "LO08" | "LO09" => Ok(Sensor::LandsatOli),
            "LE07" => Ok(Sensor::LandsatEtm),
            "LT04" | "LT05" => Ok(Sensor::LandsatTm),
            _ => Err(TileError::UnsupportedSensor(token.to_string())),
        }
    }

    pub fn mission(&self) -> Mission {
        match self {
            Sensor::Sentinel2Msi => Mission::Sentinel2,
            _ => Mission::Landsat,
        }
    }

    /// Short code used to disambiguate scratch directories
    pub fn code(&self) -> &'static str {
        match self {
            Sensor::LandsatOli => "OLI",
            Sensor::LandsatEtm => "ETM",
            Sensor::LandsatTm => "TM",
            Sensor::Sentinel2Msi => "MSI",
        }
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensor::LandsatOli => write!(f, "Landsat-8/9 OLI"),
            Sensor::LandsatEtm => write!(f, "Landsat-7 ETM+"),
            Sensor::LandsatTm => write!(f, "Landsat-4/5 TM"),
            Sensor::Sentinel2Msi => write!(f, "Sentinel-2 MSI"),
        }
    }
}

/// Values of a decoded quality mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaskCategory {
    Valid = 0,
    Fill = 2,
    Cloud = 3,
    CloudShadow = 4,
    Snow = 5,
}

impl MaskCategory {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Pixel counts derived from a quality mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelStatistics {
    /// Pixels with any non-valid category
    pub invalid: usize,
    /// Fill / no-data pixels
    pub no_data: usize,
    /// Cloud, cirrus and cloud-shadow pixels
    pub cloud: usize,
    pub total: usize,
}

impl PixelStatistics {
    pub fn from_mask(mask: &QualityMask) -> Self {
        let mut stats = PixelStatistics {
            total: mask.len(),
            ..Default::default()
        };

        for &value in mask.iter() {
            if value != MaskCategory::Valid.value() {
                stats.invalid += 1;
            }
            if value == MaskCategory::Fill.value() {
                stats.no_data += 1;
            }
            if value == MaskCategory::Cloud.value() || value == MaskCategory::CloudShadow.value() {
                stats.cloud += 1;
            }
        }

        stats
    }

    /// Share of usable pixels in [0, 1]
    pub fn valid_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total - self.invalid) as f64 / self.total as f64
    }
}

/// Geospatial bounding box in the raster's own coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let bbox = BoundingBox {
            min_x: self.min_x.max(other.min_x),
            max_x: self.max_x.min(other.max_x),
            min_y: self.min_y.max(other.min_y),
            max_y: self.max_y.min(other.max_y),
        };
        if bbox.min_x < bbox.max_x && bbox.min_y < bbox.max_y {
            Some(bbox)
        } else {
            None
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Footprint of a north-up raster of the given size
    pub fn footprint(&self, width: usize, height: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + self.pixel_width * width as f64;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + self.pixel_height * height as f64;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    /// Transform shifted so that pixel (row, col) becomes the origin
    pub fn shifted(&self, row: usize, col: usize) -> Self {
        Self {
            top_left_x: self.top_left_x + col as f64 * self.pixel_width,
            top_left_y: self.top_left_y + row as f64 * self.pixel_height,
            ..*self
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
    }
}

/// Georeferencing copied verbatim between rasters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Georeference {
    pub geo_transform: GeoTransform,
    /// Projection as WKT (may be empty)
    pub projection: String,
}

/// Error types for time-series processing
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("Metadata parse error for '{file}': {reason}")]
    MetadataParse { file: String, reason: String },

    #[error("No recognizable bands in scene: {0}")]
    EmptyFeatureSet(String),

    #[error("Type mismatch: expected a {expected} scene, found {found}")]
    TypeMismatch { expected: Mission, found: Mission },

    #[error("Tile mismatch: expected tile {expected}, found {found}")]
    TileMismatch { expected: String, found: String },

    #[error("Invalid scratch path: {0}")]
    InvalidScratchPath(String),

    #[error("Unsupported sensor: {0}")]
    UnsupportedSensor(String),

    #[error("Raster I/O error: {0}")]
    RasterIo(String),

    #[error("Band not available: {0}")]
    MissingBand(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scratch cache error: {0}")]
    Cache(String),

    #[error("Cannot represent {from} data as {to}")]
    TypeCast { from: &'static str, to: &'static str },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl TileError {
    /// Whether the failure only affects the scene being processed.
    ///
    /// Scene-local errors degrade to "scene skipped"; everything else aborts the run.
    pub fn is_scene_local(&self) -> bool {
        match self {
            TileError::MetadataParse { .. }
            | TileError::EmptyFeatureSet(_)
            | TileError::RasterIo(_)
            | TileError::MissingBand(_)
            | TileError::Gdal(_)
            | TileError::Io(_)
            | TileError::Cache(_)
            | TileError::TypeCast { .. }
            | TileError::ShapeMismatch(_)
            | TileError::Processing(_) => true,
            TileError::TypeMismatch { .. }
            | TileError::TileMismatch { .. }
            | TileError::InvalidScratchPath(_)
            | TileError::UnsupportedSensor(_)
            | TileError::Config(_) => false,
        }
    }
}

/// Result type for time-series operations
pub type TileResult<T> = Result<T, TileError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_statistics_from_mask() {
        let mask: QualityMask = array![[0, 2, 3], [4, 5, 0]];
        let stats = PixelStatistics::from_mask(&mask);

        assert_eq!(stats.total, 6);
        assert_eq!(stats.invalid, 4);
        assert_eq!(stats.no_data, 1);
        assert_eq!(stats.cloud, 2);
        assert!(stats.no_data <= stats.invalid);
        assert!(stats.cloud <= stats.invalid);
        assert!((stats.valid_fraction() - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_sensor_tokens() {
        assert_eq!(Sensor::from_landsat_token("LC09").unwrap(), Sensor::LandsatOli);
        assert_eq!(Sensor::from_landsat_token("LE07").unwrap(), Sensor::LandsatEtm);
        assert!(matches!(
            Sensor::from_landsat_token("XX01"),
            Err(TileError::UnsupportedSensor(_))
        ));
        assert_eq!(Mission::parse("s2").unwrap(), Mission::Sentinel2);
        assert!(Mission::parse("modis").is_err());
    }

    #[test]
    fn test_error_classification() {
        assert!(TileError::EmptyFeatureSet("x".into()).is_scene_local());
        assert!(TileError::RasterIo("x".into()).is_scene_local());
        assert!(!TileError::InvalidScratchPath("x".into()).is_scene_local());
        assert!(!TileError::UnsupportedSensor("x".into()).is_scene_local());
    }

    #[test]
    fn test_footprint_intersection() {
        let gt = GeoTransform::from_gdal([100.0, 30.0, 0.0, 1000.0, 0.0, -30.0]);
        let a = gt.footprint(10, 10);
        assert_eq!(a.min_x, 100.0);
        assert_eq!(a.max_y, 1000.0);
        assert_eq!(a.min_y, 700.0);

        let b = gt.shifted(2, 3).footprint(10, 10);
        let both = a.intersection(&b).unwrap();
        assert_eq!(both.min_x, 190.0);
        assert_eq!(both.max_y, 940.0);

        let far = GeoTransform::from_gdal([5000.0, 30.0, 0.0, 1000.0, 0.0, -30.0]).footprint(10, 10);
        assert!(a.intersection(&far).is_none());
    }
}
