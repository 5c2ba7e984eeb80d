use crate::types::{
    ColumnRole, ExtractError, ExtractResult, ResultTable, TableColumn, WellSample, WellTable,
};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

/// Names of the grid columns appended to result tables
pub const INLINE_COLUMN: &str = "inline";
pub const CROSSLINE_COLUMN: &str = "xline";

/// Which input columns hold the well identifier and coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSelection {
    /// Columns looked up by header name
    ByName {
        well: Option<String>,
        x: String,
        y: String,
        depth: String,
    },
    /// `well, x, y, depth` (or `x, y, depth`) are the leading columns
    ByPosition { with_well: bool },
}

impl ColumnSelection {
    fn requires_well(&self) -> bool {
        match self {
            ColumnSelection::ByName { well, .. } => well.is_some(),
            ColumnSelection::ByPosition { with_well } => *with_well,
        }
    }

    /// Header index of well, x, y and depth
    fn resolve(&self, headers: &[String]) -> ExtractResult<(Option<usize>, usize, usize, usize)> {
        let required = if self.requires_well() { 4 } else { 3 };
        if headers.len() < required {
            return Err(ExtractError::Schema(format!(
                "table must have at least {} columns, found {}",
                required,
                headers.len()
            )));
        }
        match self {
            ColumnSelection::ByPosition { with_well: true } => Ok((Some(0), 1, 2, 3)),
            ColumnSelection::ByPosition { with_well: false } => Ok((None, 0, 1, 2)),
            ColumnSelection::ByName { well, x, y, depth } => {
                let find = |name: &str| {
                    headers.iter().position(|h| h == name).ok_or_else(|| {
                        ExtractError::Schema(format!("column '{}' is not present in the table", name))
                    })
                };
                let well = well.as_deref().map(find).transpose()?;
                Ok((well, find(x.as_str())?, find(y.as_str())?, find(depth.as_str())?))
            }
        }
    }
}

/// Storage family of a tabular file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Delimited(u8),
    Spreadsheet,
}

/// Pick the table format from the extension and header line
pub fn detect_format(path: &Path) -> ExtractResult<TableFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Ok(TableFormat::Spreadsheet),
        "tsv" | "tab" => Ok(TableFormat::Delimited(b'\t')),
        _ => {
            if !path.exists() {
                return Ok(TableFormat::Delimited(b','));
            }
            let mut first_line = String::new();
            BufReader::new(File::open(path)?).read_line(&mut first_line)?;
            Ok(TableFormat::Delimited(sniff_delimiter(&first_line)))
        }
    }
}

fn sniff_delimiter(header: &str) -> u8 {
    if header.contains(';') && !header.contains(',') {
        b';'
    } else if header.contains('\t') && !header.contains(',') {
        b'\t'
    } else {
        b','
    }
}

/// Load a well table from a delimited text file or the first sheet of a workbook
pub fn read_well_table<P: AsRef<Path>>(path: P, selection: &ColumnSelection) -> ExtractResult<WellTable> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ExtractError::Path(format!("file {} does not exist", path.display())));
    }
    let table = match detect_format(path)? {
        TableFormat::Delimited(delimiter) => parse_well_table(File::open(path)?, delimiter, selection)?,
        TableFormat::Spreadsheet => read_spreadsheet(path, selection)?,
    };
    log::info!(
        "Loaded {} samples of {} wells from {}",
        table.len(),
        table.wells().len(),
        path.display()
    );
    Ok(table)
}

fn parse_coordinate(value: &str, row: usize, column: &str) -> ExtractResult<f64> {
    value.parse::<f64>().map_err(|_| {
        ExtractError::Schema(format!(
            "row {}: value '{}' in column '{}' is not a number",
            row + 1,
            value,
            column
        ))
    })
}

/// Parse a well table from any reader
pub fn parse_well_table<R: Read>(reader: R, delimiter: u8, selection: &ColumnSelection) -> ExtractResult<WellTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    let records = csv_reader
        .records()
        .map(|r| r.map(|record| record.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;
    build_well_table(headers, records, selection)
}

/// Text of a workbook cell as it would appear in a delimited export
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Read the first worksheet; its first row holds the column names
fn read_spreadsheet(path: &Path, selection: &ColumnSelection) -> ExtractResult<WellTable> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractError::Schema(format!("workbook {} has no worksheets", path.display())))??;

    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<String>>());
    let headers = rows
        .next()
        .ok_or_else(|| ExtractError::Schema(format!("first worksheet of {} is empty", path.display())))?;
    let records: Vec<Vec<String>> = rows.filter(|r| r.iter().any(|c| !c.is_empty())).collect();
    build_well_table(headers, records, selection)
}

fn build_well_table(headers: Vec<String>, records: Vec<Vec<String>>, selection: &ColumnSelection) -> ExtractResult<WellTable> {
    let (well_idx, x_idx, y_idx, depth_idx) = selection.resolve(&headers)?;
    if records.is_empty() {
        return Err(ExtractError::Schema("well table is empty".to_string()));
    }

    // Remaining columns become numeric attributes when every cell parses
    let reserved = [Some(x_idx), Some(y_idx), Some(depth_idx), well_idx];
    let mut attribute_columns = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        if reserved.contains(&Some(idx)) {
            continue;
        }
        let numeric = records
            .iter()
            .all(|r| r.get(idx).map_or(true, |v| v.is_empty() || v.parse::<f64>().is_ok()));
        if numeric {
            attribute_columns.push(idx);
        } else {
            log::warn!("Column '{}' is not numeric and is ignored", name);
        }
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (idx, name) in headers.iter().enumerate() {
        let role = if Some(idx) == well_idx {
            ColumnRole::Well
        } else if idx == x_idx {
            ColumnRole::X
        } else if idx == y_idx {
            ColumnRole::Y
        } else if idx == depth_idx {
            ColumnRole::Depth
        } else if let Some(pos) = attribute_columns.iter().position(|&a| a == idx) {
            ColumnRole::Attribute(pos)
        } else {
            continue;
        };
        columns.push(TableColumn { name: name.clone(), role });
    }

    let mut rows = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let cell = |idx: usize| record.get(idx).map_or("", String::as_str);
        let well = well_idx.map(cell).filter(|w| !w.is_empty());
        let mut sample = WellSample::new(
            well,
            parse_coordinate(cell(x_idx), i, &headers[x_idx])?,
            parse_coordinate(cell(y_idx), i, &headers[y_idx])?,
            parse_coordinate(cell(depth_idx), i, &headers[depth_idx])?,
        );
        sample.attributes = attribute_columns
            .iter()
            .map(|&idx| cell(idx).parse::<f64>().unwrap_or(f64::NAN))
            .collect();
        rows.push(sample);
    }

    Ok(WellTable::new(columns, rows))
}

/// One output cell; NaN numbers are written as empty cells
enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v) if v.is_nan() => String::new(),
            Cell::Number(v) => v.to_string(),
        }
    }
}

/// Header and rows of a result table after dropping columns
fn result_cells(result: &ResultTable, drop_columns: &[String]) -> (Vec<String>, Vec<Vec<Cell>>) {
    let keep = |name: &str| !drop_columns.iter().any(|d| d == name);
    let table = &result.table;

    let input_columns: Vec<&TableColumn> = table.columns.iter().filter(|c| keep(&c.name)).collect();
    let write_inline = keep(INLINE_COLUMN);
    let write_crossline = keep(CROSSLINE_COLUMN);
    let volume_columns: Vec<_> = result.volumes.iter().filter(|c| keep(&c.name)).collect();

    let mut header: Vec<String> = input_columns.iter().map(|c| c.name.clone()).collect();
    if write_inline {
        header.push(INLINE_COLUMN.to_string());
    }
    if write_crossline {
        header.push(CROSSLINE_COLUMN.to_string());
    }
    header.extend(volume_columns.iter().map(|c| c.name.clone()));

    let mut rows = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        let mut record = Vec::with_capacity(header.len());
        for column in &input_columns {
            record.push(match column.role {
                ColumnRole::Well => Cell::Text(row.well.clone().unwrap_or_default()),
                ColumnRole::X => Cell::Number(row.x),
                ColumnRole::Y => Cell::Number(row.y),
                ColumnRole::Depth => Cell::Number(row.depth),
                ColumnRole::Attribute(a) => Cell::Number(row.attributes.get(a).copied().unwrap_or(f64::NAN)),
            });
        }
        if write_inline {
            record.push(Cell::Number(row.grid.map_or(f64::NAN, |g| g.inline)));
        }
        if write_crossline {
            record.push(Cell::Number(row.grid.map_or(f64::NAN, |g| g.crossline)));
        }
        for column in &volume_columns {
            record.push(Cell::Number(column.values.get(i).copied().unwrap_or(f64::NAN)));
        }
        rows.push(record);
    }
    (header, rows)
}

/// Save a result table, dropping the named columns
///
/// `.xlsx` paths get a workbook with one sheet; other extensions get
/// delimited text.
pub fn write_result_table<P: AsRef<Path>>(path: P, result: &ResultTable, drop_columns: &[String]) -> ExtractResult<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "xlsx" => write_result_workbook(path, result, drop_columns)?,
        "xls" | "xlsm" | "xlsb" | "ods" => {
            return Err(ExtractError::InvalidFormat(format!(
                "cannot write {}: only .xlsx workbooks are supported",
                path.display()
            )))
        }
        _ => {
            let delimiter = if ext == "tsv" || ext == "tab" { b'\t' } else { b',' };
            let file = File::create(path)
                .map_err(|e| ExtractError::Path(format!("cannot create {}: {}", path.display(), e)))?;
            write_result(file, delimiter, result, drop_columns)?;
        }
    }
    log::info!("File {} is successfully written", path.display());
    Ok(())
}

/// Serialise a result table as delimited text
pub fn write_result<W: Write>(writer: W, delimiter: u8, result: &ResultTable, drop_columns: &[String]) -> ExtractResult<()> {
    let (header, rows) = result_cells(result, drop_columns);
    let mut csv_writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(writer);
    csv_writer.write_record(&header)?;
    for row in &rows {
        csv_writer.write_record(row.iter().map(Cell::text))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Save a result table as an `.xlsx` workbook
pub fn write_result_workbook<P: AsRef<Path>>(path: P, result: &ResultTable, drop_columns: &[String]) -> ExtractResult<()> {
    let (header, rows) = result_cells(result, drop_columns);
    if header.len() > u16::MAX as usize || rows.len() >= u32::MAX as usize {
        return Err(ExtractError::InvalidFormat(format!(
            "{} rows x {} columns do not fit in a worksheet",
            rows.len(),
            header.len()
        )));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in header.iter().enumerate() {
        sheet.write_string(0, col as u16, name.as_str())?;
    }
    for (r, row) in rows.iter().enumerate() {
        let r = r as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(s) if !s.is_empty() => {
                    sheet.write_string(r, col as u16, s.as_str())?;
                }
                Cell::Number(v) if v.is_finite() => {
                    sheet.write_number(r, col as u16, *v)?;
                }
                _ => {}
            }
        }
    }
    workbook.save(path.as_ref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("well,x,y,z\n"), b',');
        assert_eq!(sniff_delimiter("well;x;y;z\n"), b';');
        assert_eq!(sniff_delimiter("well\tx\ty\tz\n"), b'\t');
    }

    #[test]
    fn test_spreadsheet_is_detected() {
        assert_eq!(detect_format(Path::new("wells.xlsx")).unwrap(), TableFormat::Spreadsheet);
        assert_eq!(detect_format(Path::new("wells.tsv")).unwrap(), TableFormat::Delimited(b'\t'));
    }

    #[test]
    fn test_too_few_columns() {
        let data = "x,y\n1,2\n";
        let result = parse_well_table(data.as_bytes(), b',', &ColumnSelection::ByPosition { with_well: false });
        assert!(matches!(result, Err(ExtractError::Schema(_))));
    }
}
