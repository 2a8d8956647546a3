//! Cell grid access for measurement spreadsheets
//!
//! Every detection stage reads the sheet through [`Sheet::cell`], addressing
//! cells by 1-based row number and column label exactly as they appear in a
//! spreadsheet application. Native workbooks are read through calamine,
//! delimited text through the csv crate; both end up as the same grid.

use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use crate::common::errors::DetectionError;

static EMPTY_CELL: CellValue = CellValue::Empty;

/// Typed value of a single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl CellValue {
    /// True for empty cells and whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            CellValue::Number(_) | CellValue::Date(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Render the cell the way it reads in the sheet. Integral numbers lose
    /// their fractional part so that a pk of `1200` does not become `1200.0`.
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(value) => format_number(*value),
            CellValue::Date(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    fn from_data(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::String(text) => CellValue::Text(text.clone()),
            Data::Float(value) => CellValue::Number(*value),
            // Safe cast: cell integers are far below 2^53 in practice
            #[allow(clippy::cast_precision_loss)]
            Data::Int(value) => CellValue::Number(*value as f64),
            Data::Bool(value) => CellValue::Number(if *value { 1.0 } else { 0.0 }),
            Data::DateTime(value) => {
                if value.is_duration() {
                    CellValue::Number(value.as_f64())
                } else {
                    value
                        .as_datetime()
                        .map_or(CellValue::Number(value.as_f64()), CellValue::Date)
                }
            }
            Data::DateTimeIso(text) => parse_iso_datetime(text)
                .map_or_else(|| CellValue::Text(text.clone()), CellValue::Date),
            Data::DurationIso(text) => CellValue::Text(text.clone()),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        // Safe cast: integral and bounded above
        #[allow(clippy::cast_possible_truncation)]
        let integral = value as i64;
        integral.to_string()
    } else {
        value.to_string()
    }
}

fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Lines looked at when choosing a CSV delimiter; the header sits in here
const DELIMITER_SNIFF_LINES: usize = 20;

/// `;` when the first non-empty lines hold more semicolons than commas.
/// Title lines often have no separator at all, so one line is not enough.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let (semicolons, commas) = bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.trim_ascii().is_empty())
        .take(DELIMITER_SNIFF_LINES)
        .flatten()
        .fold((0usize, 0usize), |(semicolons, commas), b| match *b {
            b';' => (semicolons + 1, commas),
            b',' => (semicolons, commas + 1),
            _ => (semicolons, commas),
        });
    if semicolons > commas { b';' } else { b',' }
}

/// Spreadsheet column label (A, B, …, Z, AA, …) backed by a zero-based index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnLabel(u32);

impl ColumnLabel {
    pub const A: ColumnLabel = ColumnLabel::letter(b'A');
    pub const M: ColumnLabel = ColumnLabel::letter(b'M');
    pub const O: ColumnLabel = ColumnLabel::letter(b'O');

    #[cfg(test)]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Single-letter label; `letter` must be an ASCII uppercase letter
    pub const fn letter(letter: u8) -> Self {
        Self((letter - b'A') as u32)
    }

    pub const fn index(self) -> u32 {
        self.0
    }

    /// All labels from `self` to `last`, both inclusive
    pub fn through(self, last: ColumnLabel) -> impl Iterator<Item = ColumnLabel> {
        (self.0..=last.0).map(ColumnLabel)
    }
}

impl fmt::Display for ColumnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut remaining = self.0 + 1;
        while remaining > 0 {
            let offset = (remaining - 1) % 26;
            // Safe cast: offset < 26
            #[allow(clippy::cast_possible_truncation)]
            letters.push(char::from(b'A' + offset as u8));
            remaining = (remaining - 1) / 26;
        }
        letters.iter().rev().try_for_each(|letter| write!(f, "{letter}"))
    }
}

impl FromStr for ColumnLabel {
    type Err = String;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let label = label.trim();
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("Invalid column label: '{label}'"));
        }

        let mut number: u32 = 0;
        for letter in label.bytes().map(|b| b.to_ascii_uppercase()) {
            number = number
                .checked_mul(26)
                .and_then(|n| n.checked_add(u32::from(letter - b'A') + 1))
                .ok_or_else(|| format!("Column label too long: '{label}'"))?;
        }
        Ok(Self(number - 1))
    }
}

impl TryFrom<String> for ColumnLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnLabel> for String {
    fn from(value: ColumnLabel) -> Self {
        value.to_string()
    }
}

/// File formats accepted by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xlsx,
    Xlsm,
    Xlsb,
    Xls,
    Ods,
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "xlsx" => Some(Self::Xlsx),
            "xlsm" => Some(Self::Xlsm),
            "xlsb" => Some(Self::Xlsb),
            "xls" => Some(Self::Xls),
            "ods" => Some(Self::Ods),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Label stored as the upload's file type
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xlsx => "XLSX",
            Self::Xlsm => "XLSM",
            Self::Xlsb => "XLSB",
            Self::Xls => "XLS",
            Self::Ods => "ODS",
            Self::Csv => "CSV",
        }
    }
}

/// A single worksheet, stored from A1 regardless of where the source range starts
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    /// Cell at a 1-based row; anything outside the stored area is empty
    pub fn cell(&self, row: u32, column: ColumnLabel) -> &CellValue {
        row.checked_sub(1)
            .and_then(|r| self.rows.get(r as usize))
            .and_then(|cells| cells.get(column.index() as usize))
            .unwrap_or(&EMPTY_CELL)
    }

    #[cfg(test)]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Set a cell, growing the grid as needed
    #[cfg(test)]
    pub fn set(&mut self, row: u32, column: ColumnLabel, value: CellValue) {
        let Some(row_idx) = row.checked_sub(1).map(|r| r as usize) else {
            return;
        };
        let col_idx = column.index() as usize;
        if self.rows.len() <= row_idx {
            self.rows.resize_with(row_idx + 1, Vec::new);
        }
        let cells = &mut self.rows[row_idx];
        if cells.len() <= col_idx {
            cells.resize(col_idx + 1, CellValue::Empty);
        }
        cells[col_idx] = value;
    }

    /// Build from a calamine range, which starts at its first used cell
    pub fn from_range(range: &Range<Data>) -> Self {
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); start_row as usize];
        for source_row in range.rows() {
            let mut cells = vec![CellValue::Empty; start_col as usize];
            cells.extend(source_row.iter().map(CellValue::from_data));
            rows.push(cells);
        }
        Self { rows }
    }

    /// Parse delimited text. Semicolons are used when the leading lines hold
    /// more of them than commas, as spreadsheet exports in some locales do.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, DetectionError> {
        let delimiter = sniff_delimiter(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|e| DetectionError::UnreadableFile(e.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|field| {
                        let text = String::from_utf8_lossy(field);
                        if text.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::Text(text.into_owned())
                        }
                    })
                    .collect(),
            );
        }
        Ok(Self { rows })
    }

    /// Load the first worksheet of a file held in memory
    pub fn from_bytes(bytes: Vec<u8>, format: SourceFormat) -> Result<Self, DetectionError> {
        if format == SourceFormat::Csv {
            return Self::from_csv(&bytes);
        }

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| DetectionError::UnreadableFile(e.to_string()))?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(DetectionError::NoWorksheet)?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| DetectionError::UnreadableFile(e.to_string()))?;
        tracing::debug!(
            "Loaded worksheet '{sheet_name}' ({} x {})",
            range.height(),
            range.width()
        );
        Ok(Self::from_range(&range))
    }

    pub fn load(path: &Path) -> Result<Self, DetectionError> {
        let format = SourceFormat::from_path(path)
            .ok_or_else(|| DetectionError::UnsupportedFormat(path.display().to_string()))?;
        let bytes = std::fs::read(path).map_err(|e| DetectionError::UnreadableFile(e.to_string()))?;
        Self::from_bytes(bytes, format)
    }
}

/// Historical-layout report as .xlsx bytes: title in B3, a `dd/mm/yyyy`
/// date cell in F6, header on row 12 and three numeric pk rows from row 13
#[cfg(test)]
pub fn report_workbook() -> Vec<u8> {
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let date_format = Format::new().set_num_format("dd/mm/yyyy");
    let date = ExcelDateTime::from_ymd(2024, 12, 15).unwrap();

    worksheet.write_string(2, 1, "Informe de revanchas Muro Principal").unwrap();
    worksheet.write_string(5, 4, "Fecha:").unwrap();
    worksheet
        .write_datetime_with_format(5, 5, &date, &date_format)
        .unwrap();

    for (col, header) in [(0, "Sector"), (2, "Cota Coronamiento"), (4, "Revancha"), (8, "PK")] {
        worksheet.write_string(11, col, header).unwrap();
    }
    for (offset, (pk, revancha)) in [(1212.0, 1.5), (1232.0, 1.6), (1252.0, 1.7)].into_iter().enumerate() {
        let row = 12 + offset as u32;
        worksheet.write_number(row, 0, 1.0).unwrap();
        worksheet.write_number(row, 2, 745.2).unwrap();
        worksheet.write_number(row, 4, revancha).unwrap();
        worksheet.write_number(row, 8, pk).unwrap();
    }

    workbook.save_to_buffer().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("A", 0)]
    #[case("m", 12)]
    #[case("Z", 25)]
    #[case("AA", 26)]
    #[case("AZ", 51)]
    #[case("BA", 52)]
    fn test_column_label_round_trip(#[case] label: &str, #[case] index: u32) {
        let parsed: ColumnLabel = label.parse().unwrap();
        assert_eq!(parsed.index(), index);
        assert_eq!(parsed.to_string(), label.to_ascii_uppercase());
    }

    #[test]
    fn test_column_label_rejects_garbage() {
        assert!("".parse::<ColumnLabel>().is_err());
        assert!("A1".parse::<ColumnLabel>().is_err());
        assert!("É".parse::<ColumnLabel>().is_err());
    }

    #[test]
    fn test_column_span_is_inclusive() {
        let labels: Vec<String> = ColumnLabel::A
            .through(ColumnLabel::M)
            .map(|c| c.to_string())
            .collect();
        assert_eq!(labels.len(), 13);
        assert_eq!(labels.first().map(String::as_str), Some("A"));
        assert_eq!(labels.last().map(String::as_str), Some("M"));
    }

    #[test]
    fn test_cell_outside_grid_is_empty() {
        let mut sheet = Sheet::default();
        sheet.set(3, ColumnLabel::letter(b'C'), CellValue::Number(1.0));
        assert_eq!(sheet.height(), 3);
        assert_eq!(sheet.cell(3, ColumnLabel::letter(b'C')), &CellValue::Number(1.0));
        assert_eq!(sheet.cell(0, ColumnLabel::A), &CellValue::Empty);
        assert_eq!(sheet.cell(3, ColumnLabel::letter(b'D')), &CellValue::Empty);
        assert_eq!(sheet.cell(50, ColumnLabel::A), &CellValue::Empty);
    }

    #[test]
    fn test_range_offset_is_preserved() {
        let mut range = Range::new((2, 1), (3, 2));
        range.set_value((2, 1), Data::String("Sector".to_string()));
        range.set_value((3, 2), Data::Float(12.5));

        let sheet = Sheet::from_range(&range);
        assert_eq!(
            sheet.cell(3, ColumnLabel::letter(b'B')),
            &CellValue::Text("Sector".to_string())
        );
        assert_eq!(
            sheet.cell(4, ColumnLabel::letter(b'C')),
            &CellValue::Number(12.5)
        );
        assert!(sheet.cell(1, ColumnLabel::A).is_blank());
    }

    #[test]
    fn test_xlsx_cells_through_calamine() {
        let sheet = Sheet::from_bytes(report_workbook(), SourceFormat::Xlsx).unwrap();

        assert_eq!(
            sheet.cell(3, ColumnLabel::letter(b'B')),
            &CellValue::Text("Informe de revanchas Muro Principal".to_string())
        );
        let date = NaiveDate::from_ymd_opt(2024, 12, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(sheet.cell(6, ColumnLabel::letter(b'F')), &CellValue::Date(date));
        assert_eq!(
            sheet.cell(12, ColumnLabel::letter(b'I')),
            &CellValue::Text("PK".to_string())
        );

        let pk = sheet.cell(13, ColumnLabel::letter(b'I'));
        assert_eq!(pk, &CellValue::Number(1212.0));
        assert_eq!(pk.to_display_string(), "1212");
        assert!(sheet.cell(16, ColumnLabel::letter(b'I')).is_blank());
    }

    #[test]
    fn test_garbage_workbook_is_unreadable() {
        let result = Sheet::from_bytes(b"not a workbook".to_vec(), SourceFormat::Xlsx);
        assert!(matches!(result, Err(DetectionError::UnreadableFile(_))));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(CellValue::Number(1200.0).to_display_string(), "1200");
        assert_eq!(CellValue::Number(12.25).to_display_string(), "12.25");
        assert_eq!(CellValue::Text(" 0+100 ".into()).to_display_string(), " 0+100 ");
        let date = NaiveDate::from_ymd_opt(2024, 12, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            CellValue::Date(date).to_display_string(),
            "2024-12-15 00:00:00"
        );
    }

    #[test]
    fn test_blank_cells() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::Text("   ".into()).is_blank());
        assert!(!CellValue::Text("x".into()).is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_csv_with_semicolons() {
        let sheet = Sheet::from_csv(b"Sector;PK;Revancha\n1;0+100;2,5\n").unwrap();
        assert_eq!(sheet.height(), 2);
        assert_eq!(
            sheet.cell(1, ColumnLabel::letter(b'B')),
            &CellValue::Text("PK".to_string())
        );
        assert_eq!(
            sheet.cell(2, ColumnLabel::letter(b'C')),
            &CellValue::Text("2,5".to_string())
        );
    }

    #[rstest]
    #[case(b"Sector;PK;Revancha\n1;0+100;2,5\n".as_slice(), b';')]
    #[case(b"Reporte de revanchas Muro Este\n   \nFecha: 15/12/2024\nSector;PK;Revancha\n1;0+000;1,5\n1;0+020;1,6\n".as_slice(), b';')]
    #[case(b"Reporte de revanchas\nSector,PK,Revancha\n1,0+000,1.5\n".as_slice(), b',')]
    #[case(b"solo texto\n".as_slice(), b',')]
    fn test_delimiter_sniffing(#[case] bytes: &[u8], #[case] expected: u8) {
        assert_eq!(sniff_delimiter(bytes), expected);
    }

    #[test]
    fn test_csv_semicolons_below_a_bare_title() {
        let sheet = Sheet::from_csv(
            b"Reporte de revanchas Muro Este\nFecha: 15/12/2024\nSector;PK;Revancha\n1;0+000;1,5\n",
        )
        .unwrap();
        assert_eq!(
            sheet.cell(3, ColumnLabel::letter(b'B')),
            &CellValue::Text("PK".to_string())
        );
        assert_eq!(
            sheet.cell(4, ColumnLabel::letter(b'C')),
            &CellValue::Text("1,5".to_string())
        );
    }

    #[test]
    fn test_csv_ragged_rows_and_empty_fields() {
        let sheet = Sheet::from_csv(b"a,,c\nd\n").unwrap();
        assert_eq!(sheet.cell(1, ColumnLabel::letter(b'B')), &CellValue::Empty);
        assert_eq!(
            sheet.cell(2, ColumnLabel::A),
            &CellValue::Text("d".to_string())
        );
        assert_eq!(sheet.cell(2, ColumnLabel::letter(b'C')), &CellValue::Empty);
    }

    #[rstest]
    #[case("Reporte_Rev_MP_220113.xlsx", Some(SourceFormat::Xlsx))]
    #[case("REPORTE.XLS", Some(SourceFormat::Xls))]
    #[case("datos.csv", Some(SourceFormat::Csv))]
    #[case("notes.txt", None)]
    #[case("no_extension", None)]
    fn test_source_format_from_path(#[case] name: &str, #[case] expected: Option<SourceFormat>) {
        assert_eq!(SourceFormat::from_path(Path::new(name)), expected);
    }

    #[test]
    fn test_unsupported_file_is_rejected() {
        let result = Sheet::load(Path::new("report.pdf"));
        assert!(matches!(result, Err(DetectionError::UnsupportedFormat(_))));
    }
}
