//! Tabular ingestion: uploaded spreadsheet bytes to headers and records.

use crate::cell::{CellValue, Record};
use crate::error::{Error, Result};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;
use tracing::debug;

/// Hard ceiling on upload size
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const XLS_MIME: &str = "application/vnd.ms-excel";
pub const CSV_MIME: &str = "text/csv";

pub const ACCEPTED_MIME_TYPES: [&str; 3] = [XLSX_MIME, XLS_MIME, CSV_MIME];

/// Name given to the only sheet of a CSV upload
pub const CSV_SHEET_NAME: &str = "Sheet1";

const EMPTY_MESSAGE: &str = "file is empty or invalid format";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// How rows are turned into records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Keys come from the header row, missing cells become `""`.
    #[default]
    Object,
    /// Header row is taken verbatim, falsy or missing cells become `null`.
    Positional,
}

impl FromStr for IngestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "object" => Ok(IngestMode::Object),
            "positional" => Ok(IngestMode::Positional),
            other => Err(Error::Config(format!("unknown ingest mode: {}", other))),
        }
    }
}

/// Result of decoding the first sheet of an upload
#[derive(Clone, Debug, PartialEq)]
pub struct Ingested {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
    pub sheet_names: Vec<String>,
    pub active_sheet: String,
}

/// First sheet of a workbook as a grid of cells, blank cells as `Null`
struct RawSheet {
    sheet_names: Vec<String>,
    active_sheet: String,
    grid: Vec<Vec<CellValue>>,
}

/// Spreadsheet loader with upload limits
#[derive(Clone, Debug)]
pub struct Loader {
    mode: IngestMode,
    max_upload_bytes: u64,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            mode: IngestMode::default(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: IngestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Lower the size limit. Values above [`MAX_UPLOAD_BYTES`] are clamped.
    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = max.min(MAX_UPLOAD_BYTES);
        self
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Reject an upload by type or size before any parsing happens.
    ///
    /// Returns the normalized MIME type.
    pub fn check_upload(&self, size: u64, mime_type: &str) -> Result<String> {
        let mime = normalize_mime(mime_type);
        if !ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(Error::validation(format!(
                "invalid file type {:?}, only Excel and CSV files are allowed",
                mime_type
            )));
        }
        if size > self.max_upload_bytes {
            return Err(Error::validation(format!(
                "file is {} bytes, the limit is {} bytes",
                size, self.max_upload_bytes
            )));
        }
        Ok(mime)
    }

    /// Decode the first sheet of an upload into headers and records
    pub fn ingest(&self, bytes: &[u8], mime_type: &str) -> Result<Ingested> {
        self.check_upload(bytes.len() as u64, mime_type)?;

        let sheet = read_first_sheet(bytes, self.mode)?;
        let (headers, rows) = match self.mode {
            IngestMode::Object => object_records(&sheet.grid),
            IngestMode::Positional => positional_records(&sheet.grid),
        };

        debug!(
            sheets = sheet.sheet_names.len(),
            active_sheet = %sheet.active_sheet,
            columns = headers.len(),
            rows = rows.len(),
            mode = ?self.mode,
            "decoded upload"
        );

        if rows.is_empty() {
            return Err(Error::validation(EMPTY_MESSAGE));
        }

        Ok(Ingested {
            headers,
            rows,
            sheet_names: sheet.sheet_names,
            active_sheet: sheet.active_sheet,
        })
    }
}

/// Lowercase the type and strip parameters such as `; charset=utf-8`
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Guess a MIME type from a file extension
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "xlsx" => Some(XLSX_MIME),
        "xls" => Some(XLS_MIME),
        "csv" => Some(CSV_MIME),
        _ => None,
    }
}

// Workbooks are recognised by signature rather than declared type, so a CSV
// labelled as a legacy Excel file still reads.
fn read_first_sheet(bytes: &[u8], mode: IngestMode) -> Result<RawSheet> {
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        read_workbook(bytes, mode)
    } else {
        read_csv(bytes, mode)
    }
}

fn read_workbook(bytes: &[u8], mode: IngestMode) -> Result<RawSheet> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| Error::validation(format!("{}: {}", EMPTY_MESSAGE, e)))?;

    let sheet_names = workbook.sheet_names();
    let active_sheet = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| Error::validation(EMPTY_MESSAGE))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::validation(EMPTY_MESSAGE))?
        .map_err(|e| Error::validation(format!("{}: {}", EMPTY_MESSAGE, e)))?;

    let grid = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|data| match (mode, data) {
                    // A boolean false is falsy like a zero, so positional mode drops it.
                    (IngestMode::Positional, Data::Bool(false)) => CellValue::Null,
                    _ => cell_from_data(data),
                })
                .collect()
        })
        .collect();

    Ok(RawSheet {
        sheet_names,
        active_sheet,
        grid,
    })
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Null,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) if s.is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::text(if *b { "TRUE" } else { "FALSE" }),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

fn read_csv(bytes: &[u8], mode: IngestMode) -> Result<RawSheet> {
    let content = String::from_utf8_lossy(bytes);
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut grid = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            Error::validation(format!("failed to parse CSV row {}: {}", index + 1, e))
        })?;
        grid.push(
            record
                .iter()
                .map(|field| match mode {
                    IngestMode::Positional if field.trim().eq_ignore_ascii_case("false") => {
                        CellValue::Null
                    }
                    _ => CellValue::from_field(field),
                })
                .collect(),
        );
    }

    Ok(RawSheet {
        sheet_names: vec![CSV_SHEET_NAME.to_string()],
        active_sheet: CSV_SHEET_NAME.to_string(),
        grid,
    })
}

fn object_records(grid: &[Vec<CellValue>]) -> (Vec<String>, Vec<Record>) {
    let Some((header_row, data_rows)) = grid.split_first() else {
        return (Vec::new(), Vec::new());
    };

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let headers = unique_headers(header_row, width);

    let rows = data_rows
        .iter()
        .filter(|row| row.iter().any(|cell| !cell.is_null()))
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(idx, header)| {
                    let value = match row.get(idx) {
                        Some(cell) if !cell.is_null() => cell.clone(),
                        _ => CellValue::empty(),
                    };
                    (header.clone(), value)
                })
                .collect()
        })
        .collect();

    (headers, rows)
}

// Blank header cells become `__EMPTY`, `__EMPTY_1`, ...; repeats get `_1`, `_2`.
fn unique_headers(header_row: &[CellValue], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut headers = Vec::with_capacity(width);

    for idx in 0..width {
        let base = match header_row.get(idx) {
            Some(CellValue::Null) | None => "__EMPTY".to_string(),
            Some(cell) => cell.to_string(),
        };

        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{}_{}", base, count);
        }
        seen.insert(name.clone(), 0);
        headers.push(name);
    }

    headers
}

fn positional_records(grid: &[Vec<CellValue>]) -> (Vec<String>, Vec<Record>) {
    let Some((header_row, data_rows)) = grid.split_first() else {
        return (Vec::new(), Vec::new());
    };

    let used = header_row
        .iter()
        .rposition(|cell| !cell.is_null())
        .map_or(0, |last| last + 1);
    let headers: Vec<String> = header_row[..used]
        .iter()
        .map(|cell| match cell {
            CellValue::Null => String::new(),
            other => other.to_string(),
        })
        .collect();

    let rows = data_rows
        .iter()
        .map(|row| {
            let mut record = Record::new();
            for (idx, header) in headers.iter().enumerate() {
                let value = match row.get(idx) {
                    Some(cell) if !cell.is_falsy() => cell.clone(),
                    _ => CellValue::Null,
                };
                record.insert(header.clone(), value);
            }
            record
        })
        .collect();

    (headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(content: &str) -> Vec<Vec<CellValue>> {
        read_csv(content.as_bytes(), IngestMode::Object).unwrap().grid
    }

    #[test]
    fn mime_parameters_are_ignored() {
        assert_eq!(normalize_mime("Text/CSV; charset=utf-8"), CSV_MIME);
    }

    #[test]
    fn repeated_and_blank_headers_are_renamed() {
        let grid = csv("a,,a,a\n1,2,3,4\n");
        let (headers, _) = object_records(&grid);
        assert_eq!(headers, vec!["a", "__EMPTY", "a_1", "a_2"]);
    }

    #[test]
    fn object_mode_skips_blank_rows_and_pads_short_ones() {
        let grid = csv("a,b,c\n1\n,,\n4,5,6\n");
        let (_, rows) = object_records(&grid);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["a"], CellValue::Number(1.0));
        assert_eq!(rows[0]["b"], CellValue::empty());
        assert_eq!(rows[0]["c"], CellValue::empty());
    }

    #[test]
    fn positional_mode_nulls_falsy_cells() {
        let grid = csv("a,b,c\n0,x\n");
        let (headers, rows) = positional_records(&grid);
        assert_eq!(headers, vec!["a", "b", "c"]);
        assert_eq!(rows[0]["a"], CellValue::Null);
        assert_eq!(rows[0]["b"], CellValue::text("x"));
        assert_eq!(rows[0]["c"], CellValue::Null);
    }

    #[test]
    fn positional_mode_drops_trailing_blank_headers() {
        let grid = csv("a,,b,,\n1,2,3,4,5\n");
        let (headers, rows) = positional_records(&grid);
        assert_eq!(headers, vec!["a", "", "b"]);
        assert_eq!(rows[0].len(), 3);
    }

    #[test]
    fn false_literal_is_falsy_only_in_positional_mode() {
        let positional = read_csv(b"a,b\nFALSE,TRUE\n", IngestMode::Positional).unwrap();
        let (_, rows) = positional_records(&positional.grid);
        assert_eq!(rows[0]["a"], CellValue::Null);
        assert_eq!(rows[0]["b"], CellValue::text("TRUE"));

        let (_, rows) = object_records(&csv("a,b\nFALSE,TRUE\n"));
        assert_eq!(rows[0]["a"], CellValue::text("FALSE"));
    }

    #[test]
    fn bom_is_stripped() {
        let grid = csv("\u{feff}name\nx\n");
        assert_eq!(grid[0][0], CellValue::text("name"));
    }

    #[test]
    fn ingest_mode_parses_from_settings_strings() {
        assert_eq!("Positional".parse::<IngestMode>().unwrap(), IngestMode::Positional);
        assert!("rows".parse::<IngestMode>().is_err());
    }
}
