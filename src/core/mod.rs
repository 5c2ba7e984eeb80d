//! Coordinate mapping, binning and sampling

pub mod geometry;
pub mod coordinate_mapping;
pub mod binning;
pub mod volume_sampler;
pub mod pipeline;

// Re-export main types
pub use geometry::{TraceHeaderSummary, VolumeDescriptor, detect_fast_axis};
pub use coordinate_mapping::{CoordinateMapper, CoordinateTransform, RegressionStrategy, DEFAULT_RIDGE_ALPHAS};
pub use binning::{BinAligner, BinGrid, Cropper, NeighborhoodExpander};
pub use volume_sampler::{VolumeSampler, reconstruct_volume, extract_column};
pub use pipeline::{ExtractionPipeline, MappingOptions, PipelineState};
