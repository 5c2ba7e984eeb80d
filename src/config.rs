//! Parameter file for a complete extraction run
//!
//! A run is described by a TOML document, for example:
//!
//! ```toml
//! seismic_folder = "/data/seismic"
//! well_table = "/data/wells.csv"
//! result = "/data/result.csv"
//! survey = "3d"
//! start_depth = 1200.0
//! bin_averaging = true
//! expansion_radius = 50.0
//! drop_columns = ["x", "y"]
//!
//! [columns]
//! well = "WELL"
//! x = "X"
//! y = "Y"
//! depth = "TVDSS"
//! ```

use crate::core::pipeline::MappingOptions;
use crate::io::segy::HeaderByteLayout;
use crate::io::volume_source::DEFAULT_VOLUME_PATTERN;
use crate::io::well_table::ColumnSelection;
use crate::types::{ExtractError, ExtractResult, SurveyKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Header names of the well, coordinate and depth columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    #[serde(default)]
    pub well: Option<String>,
    pub x: String,
    pub y: String,
    pub depth: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Folder holding the seismic volumes
    pub seismic_folder: PathBuf,
    pub well_table: PathBuf,
    /// Output table path
    pub result: PathBuf,
    pub survey: SurveyKind,
    /// Columns by name; positional `well, x, y, depth` when absent
    pub columns: Option<ColumnNames>,
    /// Whether the positional layout starts with a well column
    pub require_well_column: bool,
    pub start_depth: Option<f64>,
    pub bin_averaging: bool,
    /// Neighbourhood radius in geographic units
    pub expansion_radius: f64,
    pub header_bytes: HeaderByteLayout,
    pub volume_pattern: String,
    pub drop_columns: Vec<String>,
    pub max_parallel: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            seismic_folder: PathBuf::new(),
            well_table: PathBuf::new(),
            result: PathBuf::new(),
            survey: SurveyKind::default(),
            columns: None,
            require_well_column: true,
            start_depth: None,
            bin_averaging: false,
            expansion_radius: 0.0,
            header_bytes: HeaderByteLayout::default(),
            volume_pattern: DEFAULT_VOLUME_PATTERN.to_string(),
            drop_columns: Vec::new(),
            max_parallel: 1,
        }
    }
}

impl ExtractionConfig {
    pub fn from_toml_str(text: &str) -> ExtractResult<Self> {
        let config: Self = toml::from_str(text)?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ExtractResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::Path(format!("cannot read config {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded parameters from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Reject parameter sets that cannot describe a run
    pub fn validate(&self) -> ExtractResult<()> {
        for (name, path) in [
            ("seismic_folder", &self.seismic_folder),
            ("well_table", &self.well_table),
            ("result", &self.result),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ExtractError::Schema(format!("parameter '{}' is not set", name)));
            }
        }
        if !(self.expansion_radius.is_finite() && self.expansion_radius >= 0.0) {
            return Err(ExtractError::Schema(format!(
                "expansion_radius must be a non-negative number, got {}",
                self.expansion_radius
            )));
        }
        if let Some(start) = self.start_depth {
            if !start.is_finite() {
                return Err(ExtractError::Schema(format!("start_depth must be finite, got {}", start)));
            }
        }
        if self.max_parallel == 0 {
            return Err(ExtractError::Schema("max_parallel must be at least 1".to_string()));
        }
        if let Some(columns) = &self.columns {
            if self.require_well_column && columns.well.is_none() {
                return Err(ExtractError::Schema(
                    "a well column name is required; set columns.well or require_well_column = false".to_string(),
                ));
            }
        }
        regex::Regex::new(&self.volume_pattern)
            .map_err(|e| ExtractError::Schema(format!("invalid volume_pattern: {}", e)))?;
        self.header_bytes.validate()?;
        Ok(())
    }

    pub fn column_selection(&self) -> ColumnSelection {
        match &self.columns {
            Some(names) => ColumnSelection::ByName {
                well: if self.require_well_column { names.well.clone() } else { None },
                x: names.x.clone(),
                y: names.y.clone(),
                depth: names.depth.clone(),
            },
            None => ColumnSelection::ByPosition { with_well: self.require_well_column },
        }
    }

    pub fn mapping_options(&self) -> MappingOptions {
        MappingOptions {
            bin_averaging: self.bin_averaging,
            expansion_radius: self.expansion_radius,
        }
    }
}
