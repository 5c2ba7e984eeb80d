//! Readers and writers for seismic volumes and well tables

pub mod segy;
pub mod volume_source;
pub mod well_table;

pub use segy::{HeaderByteLayout, SampleFormat, SegyFile, SegyTrace, SegyWriter};
pub use volume_source::{InMemoryVolumes, SegyFolder, VolumeId, VolumeSource};
pub use well_table::{ColumnSelection, read_well_table, write_result_table};
