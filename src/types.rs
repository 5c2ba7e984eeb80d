use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample value type stored in seismic traces
pub type TraceValue = f32;

/// Dense seismic cube indexed `[inline, crossline, depth]`
pub type SeismicVolume = Array3<TraceValue>;

/// Geographic point (x, y)
pub type GeoPoint = [f64; 2];

/// Grid point (inline, crossline)
pub type GridPoint = [f64; 2];

/// Inline value given to every trace of a 2D line
pub const LINE_2D_INLINE: f64 = 1.0;

/// Acquisition geometry of a seismic file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SurveyKind {
    /// Full 3D survey, grid coordinates read from trace headers
    #[default]
    #[serde(rename = "3d")]
    Survey3D,
    /// Single 2D line, inline fixed and crossline equal to the trace index
    #[serde(rename = "2d")]
    Line2D,
}

impl fmt::Display for SurveyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurveyKind::Survey3D => write!(f, "3D survey"),
            SurveyKind::Line2D => write!(f, "2D line"),
        }
    }
}

/// Axis whose index changes on every consecutive trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FastAxis {
    Inline,
    Crossline,
}

impl fmt::Display for FastAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FastAxis::Inline => write!(f, "Inline"),
            FastAxis::Crossline => write!(f, "Crossline"),
        }
    }
}

/// Regularly sampled depth (or time) axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthAxis {
    pub start: f64,
    pub step: f64,
    pub count: usize,
}

impl DepthAxis {
    pub fn new(start: f64, step: f64, count: usize) -> Self {
        Self { start, step, count }
    }

    pub fn value(&self, index: usize) -> f64 {
        self.start + index as f64 * self.step
    }

    pub fn values(&self) -> Vec<f64> {
        (0..self.count).map(|k| self.value(k)).collect()
    }

    pub fn min(&self) -> f64 {
        if self.step >= 0.0 { self.start } else { self.value(self.count.saturating_sub(1)) }
    }

    pub fn max(&self) -> f64 {
        if self.step >= 0.0 { self.value(self.count.saturating_sub(1)) } else { self.start }
    }

    /// Same sampling, ignoring the start value
    pub fn same_sampling(&self, other: &DepthAxis) -> bool {
        self.count == other.count && (self.step - other.step).abs() <= f64::EPSILON * self.step.abs().max(1.0)
    }
}

/// Flat trace samples of one volume, traces in header order
#[derive(Debug, Clone, PartialEq)]
pub struct TraceBlock {
    pub samples_per_trace: usize,
    pub data: Vec<TraceValue>,
}

impl TraceBlock {
    pub fn trace_count(&self) -> usize {
        if self.samples_per_trace == 0 { 0 } else { self.data.len() / self.samples_per_trace }
    }
}

/// Position of a sample on the inline/crossline grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPosition {
    pub inline: f64,
    pub crossline: f64,
}

/// One row of a well table
#[derive(Debug, Clone, PartialEq)]
pub struct WellSample {
    pub well: Option<String>,
    pub x: f64,
    pub y: f64,
    pub depth: f64,
    /// Filled by coordinate mapping
    pub grid: Option<GridPosition>,
    /// Values of the table's attribute columns, same order as the table names them
    pub attributes: Vec<f64>,
}

impl WellSample {
    pub fn new(well: Option<&str>, x: f64, y: f64, depth: f64) -> Self {
        Self {
            well: well.map(str::to_string),
            x,
            y,
            depth,
            grid: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<f64>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Grid position, or a schema error when the row has not been mapped yet
    pub fn grid(&self) -> ExtractResult<GridPosition> {
        self.grid.ok_or_else(|| {
            ExtractError::Schema("well sample has no grid coordinates; run coordinate mapping first".to_string())
        })
    }
}

/// Role of an input column in a well table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    Well,
    X,
    Y,
    Depth,
    /// Index into `WellSample::attributes`
    Attribute(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub role: ColumnRole,
}

/// Well samples plus the column layout they were loaded with
#[derive(Debug, Clone, PartialEq)]
pub struct WellTable {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<WellSample>,
}

impl WellTable {
    pub fn new(columns: Vec<TableColumn>, rows: Vec<WellSample>) -> Self {
        Self { columns, rows }
    }

    /// Table with the conventional `well, x, y, depth` layout and no attributes
    pub fn from_samples(rows: Vec<WellSample>) -> Self {
        let has_well = rows.iter().any(|r| r.well.is_some());
        let mut columns = Vec::with_capacity(4);
        if has_well {
            columns.push(TableColumn { name: "well".to_string(), role: ColumnRole::Well });
        }
        columns.push(TableColumn { name: "x".to_string(), role: ColumnRole::X });
        columns.push(TableColumn { name: "y".to_string(), role: ColumnRole::Y });
        columns.push(TableColumn { name: "depth".to_string(), role: ColumnRole::Depth });
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<(usize, &str)> = self
            .columns
            .iter()
            .filter_map(|c| match c.role {
                ColumnRole::Attribute(i) => Some((i, c.name.as_str())),
                _ => None,
            })
            .collect();
        names.sort_by_key(|(i, _)| *i);
        names.into_iter().map(|(_, n)| n).collect()
    }

    pub fn column_name(&self, role: &ColumnRole) -> Option<&str> {
        self.columns.iter().find(|c| &c.role == role).map(|c| c.name.as_str())
    }

    pub fn depth_column_name(&self) -> &str {
        self.column_name(&ColumnRole::Depth).unwrap_or("depth")
    }

    /// Distinct well identifiers in first-seen order
    pub fn wells(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for well in self.rows.iter().filter_map(|r| r.well.as_deref()) {
            if !seen.contains(&well) {
                seen.push(well);
            }
        }
        seen
    }
}

/// Values extracted from one source volume
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Final well table with one column per processed volume
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub table: WellTable,
    pub volumes: Vec<VolumeColumn>,
}

impl ResultTable {
    pub fn new(table: WellTable) -> Self {
        Self { table, volumes: Vec::new() }
    }

    /// Append a column; a column with the same name is replaced
    pub fn push_column(&mut self, column: VolumeColumn) -> ExtractResult<()> {
        if column.values.len() != self.table.len() {
            return Err(ExtractError::VolumeShape(format!(
                "column '{}' has {} values but the table has {} rows",
                column.name,
                column.values.len(),
                self.table.len()
            )));
        }
        if let Some(existing) = self.volumes.iter_mut().find(|c| c.name == column.name) {
            log::warn!("Column '{}' already present, replacing it", column.name);
            *existing = column;
        } else {
            self.volumes.push(column);
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.volumes.iter().find(|c| c.name == name).map(|c| c.values.as_slice())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Error types for extraction
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Spreadsheet read error: {0}")]
    SpreadsheetRead(#[from] calamine::Error),

    #[error("Spreadsheet write error: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Regression error: {0}")]
    Regression(String),

    #[error("Volume shape error: {0}")]
    VolumeShape(String),

    #[error("Query point outside volume: {axis} = {value}")]
    QueryOutOfBounds { axis: &'static str, value: f64 },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Cannot {operation} in state {state}")]
    InvalidState { operation: &'static str, state: String },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<ExtractError>,
    },
}

impl ExtractError {
    /// Innermost error, unwrapping stage wrappers
    pub fn root(&self) -> &ExtractError {
        match self {
            ExtractError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for extraction operations
pub type ExtractResult<T> = Result<T, ExtractError>;
