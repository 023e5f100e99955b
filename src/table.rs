//! Tabular loading for feedback spreadsheets.
//!
//! Reads CSV and XLSX files into a [`FeedbackTable`] of typed cells and
//! classifies each column so callers can offer only text columns as
//! candidates for the feedback, episode, market and country roles.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, DataType, Reader};
use csv::ReaderBuilder;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Cell contents treated as missing, in addition to the empty string.
const NULL_MARKERS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

// ============================================================================
// Cells and columns
// ============================================================================

/// A single typed cell.
///
/// Typed cells keep the text they were read from, so a text column holding
/// `01` and `1` still yields two distinct values.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number { value: f64, raw: String },
    Bool { value: bool, raw: String },
    /// ISO-8601 date or date-time
    Date(String),
}

impl CellValue {
    /// Classify a raw CSV field.
    pub fn parse(raw: &str) -> Self {
        lazy_static::lazy_static! {
            static ref ISO_DATE: Regex =
                Regex::new(r"^\d{4}-\d{2}-\d{2}([ T]\d{2}:\d{2}(:\d{2}(\.\d+)?)?)?$").unwrap();
        }

        if raw.is_empty() || NULL_MARKERS.contains(&raw) {
            return CellValue::Empty;
        }
        let trimmed = raw.trim();
        let raw_text = raw.to_string();
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() {
                return CellValue::Number {
                    value,
                    raw: raw_text,
                };
            }
        }
        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Bool {
                value: trimmed.eq_ignore_ascii_case("true"),
                raw: raw_text,
            };
        }
        if ISO_DATE.is_match(trimmed) {
            return CellValue::Date(raw_text);
        }
        CellValue::Text(raw.to_string())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// String form of the cell, or `None` when it is missing.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) | CellValue::Date(s) => Some(s.clone()),
            CellValue::Number { raw, .. } | CellValue::Bool { raw, .. } => Some(raw.clone()),
        }
    }

    fn kind(&self) -> Option<ColumnKind> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(_) => Some(ColumnKind::Text),
            CellValue::Number { .. } => Some(ColumnKind::Numeric),
            CellValue::Bool { .. } => Some(ColumnKind::Boolean),
            CellValue::Date(_) => Some(ColumnKind::Date),
        }
    }

    /// A cell read from a spreadsheet number, rendered without a trailing `.0`.
    fn number(value: f64) -> Self {
        CellValue::Number {
            value,
            raw: format_number(value),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Inferred storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Numeric,
    Boolean,
    Date,
    /// Every cell is missing
    Empty,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::Text => "text",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Date => "date",
            ColumnKind::Empty => "empty",
        };
        f.write_str(s)
    }
}

/// Name, kind and fill count of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub non_empty: usize,
}

// ============================================================================
// Table
// ============================================================================

/// In-memory row/column table of feedback data.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl FeedbackTable {
    /// Build a table, padding short rows with empty cells.
    ///
    /// Header names are made unique (`name`, `name.1`, ...) and blank headers
    /// become `Unnamed: <index>`. Rows longer than the header are rejected.
    pub fn new(headers: Vec<String>, mut rows: Vec<Vec<CellValue>>) -> Result<Self> {
        let columns = normalize_headers(headers);
        for (i, row) in rows.iter_mut().enumerate() {
            if row.len() > columns.len() {
                anyhow::bail!(
                    "Row {} has {} fields but the header has {}",
                    i + 1,
                    row.len(),
                    columns.len()
                );
            }
            row.resize(columns.len(), CellValue::Empty);
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Look up a column index, failing with the column name if absent.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| anyhow::anyhow!("Column '{}' not found in table", name))
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        &self.rows[row][col]
    }

    /// Infer the kind of a column from its non-empty cells.
    ///
    /// A single text cell, or a mix of kinds, makes the column text.
    pub fn column_kind(&self, col: usize) -> ColumnKind {
        let mut seen: Option<ColumnKind> = None;
        for row in &self.rows {
            let Some(kind) = row[col].kind() else {
                continue;
            };
            if kind == ColumnKind::Text {
                return ColumnKind::Text;
            }
            match seen {
                None => seen = Some(kind),
                Some(prev) if prev != kind => return ColumnKind::Text,
                Some(_) => {}
            }
        }
        seen.unwrap_or(ColumnKind::Empty)
    }

    /// Columns usable as feedback or category roles, in header order.
    pub fn text_columns(&self) -> Vec<String> {
        (0..self.columns.len())
            .filter(|&i| self.column_kind(i) == ColumnKind::Text)
            .map(|i| self.columns[i].clone())
            .collect()
    }

    pub fn column_summaries(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnSummary {
                name: name.clone(),
                kind: self.column_kind(i),
                non_empty: self.rows.iter().filter(|r| !r[i].is_empty()).count(),
            })
            .collect()
    }
}

fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut used: HashSet<String> = HashSet::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(i, h)| {
            let base = if h.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                h
            };
            let n = counts.entry(base.clone()).or_insert(0);
            let mut name = base.clone();
            while used.contains(&name) {
                *n += 1;
                name = format!("{}.{}", base, n);
            }
            used.insert(name.clone());
            name
        })
        .collect()
}

// ============================================================================
// Loading
// ============================================================================

/// Load a CSV or XLSX file, choosing the parser from the file extension.
pub fn load_table(path: &Path) -> Result<FeedbackTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let table = match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" => read_xlsx(path),
        other => Err(anyhow::anyhow!(
            "Unsupported file type '{}': expected .csv or .xlsx",
            other
        )),
    }
    .with_context(|| format!("Error reading file {}", path.display()))?;

    log::info!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    Ok(table)
}

/// Read a comma-delimited CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<FeedbackTable> {
    let file = std::fs::File::open(path).context("Failed to open input file")?;
    read_csv_from(file)
}

/// Read CSV data from any reader.
pub fn read_csv_from<R: Read>(input: R) -> Result<FeedbackTable> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read CSV row")?;
        rows.push(record.iter().map(CellValue::parse).collect());
    }

    FeedbackTable::new(headers, rows)
}

/// Read the first worksheet of an XLSX workbook.
pub fn read_xlsx(path: &Path) -> Result<FeedbackTable> {
    let mut workbook = open_workbook_auto(path).context("Failed to open workbook")?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("The workbook does not contain any worksheets"))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .ok_or_else(|| anyhow::anyhow!("Unable to read worksheet '{}'", sheet_name))?
        .with_context(|| format!("Unable to read worksheet '{}'", sheet_name))?;

    let mut rows_iter = range.rows();
    let header_row = rows_iter
        .next()
        .ok_or_else(|| anyhow::anyhow!("Worksheet '{}' is empty", sheet_name))?;
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| match xlsx_cell(c).as_text() {
            Some(s) => s.trim().to_string(),
            None => String::new(),
        })
        .collect();

    let rows: Vec<Vec<CellValue>> = rows_iter
        .map(|row| row.iter().map(xlsx_cell).collect())
        .filter(|row: &Vec<CellValue>| row.iter().any(|c| !c.is_empty()))
        .collect();

    FeedbackTable::new(headers, rows)
}

fn xlsx_cell(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty | DataType::Error(_) => CellValue::Empty,
        DataType::String(s) if s.is_empty() || NULL_MARKERS.contains(&s.as_str()) => {
            CellValue::Empty
        }
        DataType::String(s) => CellValue::Text(s.clone()),
        DataType::Int(i) => CellValue::number(*i as f64),
        DataType::Float(f) => CellValue::number(*f),
        DataType::Bool(b) => CellValue::Bool {
            value: *b,
            raw: if *b { "True" } else { "False" }.to_string(),
        },
        DataType::DateTime(serial) => CellValue::Date(excel_serial_to_iso(*serial)),
        DataType::DateTimeIso(iso) => CellValue::Date(iso.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

/// Convert an Excel serial date (1900 date system) to ISO text.
fn excel_serial_to_iso(serial: f64) -> String {
    let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    let days = serial.trunc() as i64;
    let secs = ((serial.fract()) * 86_400.0).round() as i64;
    let dt = epoch.and_hms_opt(0, 0, 0).unwrap_or_default()
        + chrono::Duration::days(days)
        + chrono::Duration::seconds(secs);
    if secs == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> FeedbackTable {
        read_csv_from(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(CellValue::parse(""), CellValue::Empty);
        assert_eq!(CellValue::parse("N/A"), CellValue::Empty);
        assert_eq!(CellValue::parse("NA"), CellValue::Empty);
        assert_eq!(CellValue::parse("#N/A"), CellValue::Empty);
        assert_eq!(
            CellValue::parse("42"),
            CellValue::Number {
                value: 42.0,
                raw: "42".to_string()
            }
        );
        assert_eq!(
            CellValue::parse("TRUE"),
            CellValue::Bool {
                value: true,
                raw: "TRUE".to_string()
            }
        );
        assert_eq!(
            CellValue::parse("2024-03-01"),
            CellValue::Date("2024-03-01".to_string())
        );
        assert_eq!(
            CellValue::parse("too slow"),
            CellValue::Text("too slow".to_string())
        );
    }

    #[test]
    fn test_as_text() {
        assert_eq!(CellValue::number(3.0).as_text().unwrap(), "3");
        assert_eq!(CellValue::number(2.5).as_text().unwrap(), "2.5");
        assert_eq!(CellValue::parse("01").as_text().unwrap(), "01");
        assert_eq!(CellValue::parse("1.50").as_text().unwrap(), "1.50");
        assert_eq!(CellValue::parse("true").as_text().unwrap(), "true");
        assert_eq!(CellValue::Empty.as_text(), None);
    }

    #[test]
    fn test_xlsx_cells() {
        assert_eq!(xlsx_cell(&DataType::Int(7)).as_text().unwrap(), "7");
        assert_eq!(xlsx_cell(&DataType::Bool(true)).as_text().unwrap(), "True");
        assert_eq!(
            xlsx_cell(&DataType::DateTimeIso("2024-05-01T10:00:00".to_string())),
            CellValue::Date("2024-05-01T10:00:00".to_string())
        );
        assert_eq!(xlsx_cell(&DataType::String("NA".to_string())), CellValue::Empty);
    }

    #[test]
    fn test_text_columns_only_textual() {
        let t = table(
            "feedback,score,when,flag,blank,mixed\n\
             great app,5,2024-01-01,true,,1\n\
             crashes,2,2024-01-02,false,,x\n",
        );
        assert_eq!(t.text_columns(), vec!["feedback", "mixed"]);
        assert_eq!(t.column_kind(1), ColumnKind::Numeric);
        assert_eq!(t.column_kind(2), ColumnKind::Date);
        assert_eq!(t.column_kind(3), ColumnKind::Boolean);
        assert_eq!(t.column_kind(4), ColumnKind::Empty);
    }

    #[test]
    fn test_duplicate_and_blank_headers() {
        let t = table("a,a,,b\n1,2,3,4\n");
        assert_eq!(t.columns(), &["a", "a.1", "Unnamed: 2", "b"]);

        let t = table("a,a,a.1\n1,2,3\n");
        assert_eq!(t.columns(), &["a", "a.1", "a.1.1"]);
    }

    #[test]
    fn test_short_rows_padded() {
        let t = table("feedback,episode\nhello\n");
        assert_eq!(t.cell(0, 1), &CellValue::Empty);
    }

    #[test]
    fn test_long_row_rejected() {
        assert!(read_csv_from("a,b\n1,2,3\n".as_bytes()).is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_table(Path::new("feedback.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported file type"));
    }

    #[test]
    fn test_excel_serial_to_iso() {
        assert_eq!(excel_serial_to_iso(45292.0), "2024-01-01");
        assert_eq!(excel_serial_to_iso(45292.5), "2024-01-01 12:00:00");
    }
}
