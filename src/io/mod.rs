//! Raster access, scratch storage and dataset discovery

pub mod raster;
pub mod registry;
pub mod scratch;

pub use raster::{GdalRasterIo, MemoryRasterIo, RasterIo};
pub use registry::{scan, SceneNameMatcher};
pub use scratch::ScratchDir;
