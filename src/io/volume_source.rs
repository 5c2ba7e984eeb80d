use crate::core::geometry::TraceHeaderSummary;
use crate::io::segy::{HeaderByteLayout, SegyFile};
use crate::types::{ExtractError, ExtractResult, SurveyKind, TraceBlock};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default file name pattern of seismic volumes
pub const DEFAULT_VOLUME_PATTERN: &str = r"(?i)\.(sgy|segy)$";

/// Identifier of one source volume (its file name)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeId(String);

impl VolumeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Column name for values extracted from this volume: the file name without extension
    pub fn attribute_name(&self) -> &str {
        Path::new(&self.0)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider of volume geometry and trace data
pub trait VolumeSource: Send + Sync {
    fn survey_kind(&self) -> SurveyKind;

    /// Volumes in lexical order
    fn list_volumes(&self) -> ExtractResult<Vec<VolumeId>>;

    /// Coordinates and depth axis, traces in acquisition order
    fn read_header(&self, volume: &VolumeId) -> ExtractResult<TraceHeaderSummary>;

    /// Trace samples in the same order as `read_header`
    fn read_traces(&self, volume: &VolumeId) -> ExtractResult<TraceBlock>;
}

/// SEG-Y files in one folder
#[derive(Debug, Clone)]
pub struct SegyFolder {
    folder: PathBuf,
    kind: SurveyKind,
    layout: HeaderByteLayout,
    pattern: Regex,
}

impl SegyFolder {
    pub fn new<P: AsRef<Path>>(folder: P, kind: SurveyKind) -> ExtractResult<Self> {
        let folder = folder.as_ref().to_path_buf();
        if !folder.is_dir() {
            return Err(ExtractError::Path(format!("folder {} does not exist", folder.display())));
        }
        let pattern = Regex::new(DEFAULT_VOLUME_PATTERN)
            .map_err(|e| ExtractError::Schema(format!("invalid volume pattern: {}", e)))?;
        Ok(Self {
            folder,
            kind,
            layout: HeaderByteLayout::default(),
            pattern,
        })
    }

    pub fn with_layout(mut self, layout: HeaderByteLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> ExtractResult<Self> {
        self.pattern = Regex::new(pattern)
            .map_err(|e| ExtractError::Schema(format!("invalid volume pattern '{}': {}", pattern, e)))?;
        Ok(self)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn volume_path(&self, volume: &VolumeId) -> PathBuf {
        self.folder.join(volume.name())
    }
}

impl VolumeSource for SegyFolder {
    fn survey_kind(&self) -> SurveyKind {
        self.kind
    }

    fn list_volumes(&self) -> ExtractResult<Vec<VolumeId>> {
        let entries = std::fs::read_dir(&self.folder)
            .map_err(|e| ExtractError::Path(format!("cannot read folder {}: {}", self.folder.display(), e)))?;

        let mut volumes = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if self.pattern.is_match(name) {
                    volumes.push(VolumeId::new(name));
                }
            }
        }
        volumes.sort();
        Ok(volumes)
    }

    fn read_header(&self, volume: &VolumeId) -> ExtractResult<TraceHeaderSummary> {
        SegyFile::open(self.volume_path(volume))?.read_headers(self.kind, &self.layout)
    }

    fn read_traces(&self, volume: &VolumeId) -> ExtractResult<TraceBlock> {
        let started = std::time::Instant::now();
        let traces = SegyFile::open(self.volume_path(volume))?.read_traces()?;
        log::info!("File {} is read in {:.2} seconds", volume, started.elapsed().as_secs_f64());
        Ok(traces)
    }
}

/// Volumes held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryVolumes {
    kind: SurveyKind,
    volumes: Vec<(VolumeId, TraceHeaderSummary, TraceBlock)>,
}

impl InMemoryVolumes {
    pub fn new(kind: SurveyKind) -> Self {
        Self { kind, volumes: Vec::new() }
    }

    /// Add or replace a volume
    pub fn insert(&mut self, name: &str, headers: TraceHeaderSummary, traces: TraceBlock) {
        let id = VolumeId::new(name);
        self.volumes.retain(|(v, _, _)| v != &id);
        self.volumes.push((id, headers, traces));
        self.volumes.sort_by(|a, b| a.0.cmp(&b.0));
    }

    pub fn with_volume(mut self, name: &str, headers: TraceHeaderSummary, traces: TraceBlock) -> Self {
        self.insert(name, headers, traces);
        self
    }

    fn find(&self, volume: &VolumeId) -> ExtractResult<&(VolumeId, TraceHeaderSummary, TraceBlock)> {
        self.volumes
            .iter()
            .find(|(v, _, _)| v == volume)
            .ok_or_else(|| ExtractError::Path(format!("volume {} not found", volume)))
    }
}

impl VolumeSource for InMemoryVolumes {
    fn survey_kind(&self) -> SurveyKind {
        self.kind
    }

    fn list_volumes(&self) -> ExtractResult<Vec<VolumeId>> {
        Ok(self.volumes.iter().map(|(v, _, _)| v.clone()).collect())
    }

    fn read_header(&self, volume: &VolumeId) -> ExtractResult<TraceHeaderSummary> {
        Ok(self.find(volume)?.1.clone())
    }

    fn read_traces(&self, volume: &VolumeId) -> ExtractResult<TraceBlock> {
        Ok(self.find(volume)?.2.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_name_strips_extension() {
        assert_eq!(VolumeId::new("amplitude.sgy").attribute_name(), "amplitude");
        assert_eq!(VolumeId::new("rms.v2.segy").attribute_name(), "rms.v2");
        assert_eq!(VolumeId::new("noext").attribute_name(), "noext");
    }

    #[test]
    fn test_default_pattern() {
        let re = Regex::new(DEFAULT_VOLUME_PATTERN).unwrap();
        assert!(re.is_match("a.sgy"));
        assert!(re.is_match("B.SEGY"));
        assert!(!re.is_match("a.sgy.bak"));
        assert!(!re.is_match("wells.csv"));
    }

    #[test]
    fn test_missing_folder_is_path_error() {
        let result = SegyFolder::new("/nonexistent/seismic/folder", SurveyKind::Survey3D);
        assert!(matches!(result, Err(ExtractError::Path(_))));
    }
}
