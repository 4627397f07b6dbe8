//! tilechron: per-tile satellite time series
//!
//! Organizes Landsat Collection-2 Level-2 (L2SP) and Sentinel-2 L2A scenes
//! into per-tile time series, decodes their quality-assurance layers into
//! categorical cloud/shadow/snow/fill masks, and derives normalized-difference
//! spectral indices for the clearest scenes of each year.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::ProcessingConfig;
pub use types::{
    BoundingBox, FloatRaster, GeoTransform, Georeference, MaskCategory, Mission, PixelStatistics, QaRaster,
    QualityMask, Sensor, TileError, TileResult,
};

pub use crate::core::{
    Band, DateQuery, IndexDefinition, Pipeline, QualityMaskDecoder, RunSummary, SceneDescriptor, Sequential,
    TimeSeries, WindowMode, WorkDistributor,
};
pub use io::{GdalRasterIo, MemoryRasterIo, RasterIo};
