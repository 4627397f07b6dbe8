//! Core time-series processing modules

pub mod alignment;
pub mod bands;
pub mod indices;
pub mod pipeline;
pub mod qa_mask;
pub mod scene;
pub mod time_series;
pub mod workers;

// Re-export main types
pub use alignment::{common_footprint, crop_to_common_footprint, PixelWindow};
pub use bands::{Band, BandTranslator};
pub use indices::{compute_indices, normalized_difference, IndexDefinition, IndexReport, SpectralIndexEngine};
pub use pipeline::{Pipeline, RunSummary};
pub use qa_mask::{DecodedMask, QaLayout, QualityMaskDecoder};
pub use scene::{PixelValue, SceneDescriptor};
pub use time_series::{DateQuery, SkippedScene, TimeSeries, WindowMode, YearWindow};
pub use workers::{Sequential, WorkDistributor};
#[cfg(feature = "parallel")]
pub use workers::ThreadPoolDistributor;
