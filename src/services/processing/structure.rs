//! Report structure detection
//!
//! Historical reports drift between years: the header row moves, columns are
//! inserted or renamed. This module finds the header row, maps header text to
//! canonical fields and works out which rows hold data, without assuming a
//! fixed layout. Walls with a known fixed layout skip detection entirely.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use super::grid::{ColumnLabel, Sheet};
use crate::common::errors::DetectionError;
use crate::services::models::{ExtractionWarning, Field};

/// Rows searched for the header
pub const HEADER_SEARCH_ROWS: RangeInclusive<u32> = 1..=20;
/// Rows read below the header when looking for the end of data
pub const DATA_SCAN_LIMIT: u32 = 100;
/// Header text containing "pk" only counts when shorter than this
const PK_HEADER_MAX_CHARS: usize = 10;

/// Field to column assignments, at most one column per field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMap(BTreeMap<Field, ColumnLabel>);

impl ColumnMap {
    pub fn get(&self, field: Field) -> Option<ColumnLabel> {
        self.0.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    /// Mapped column, or the field's historical default
    pub fn column_for(&self, field: Field) -> Option<ColumnLabel> {
        self.get(field).or_else(|| field.fallback_column())
    }

    /// Keeps the first assignment; returns false if the field was taken
    pub fn insert(&mut self, field: Field, column: ColumnLabel) -> bool {
        if self.contains(field) {
            return false;
        }
        self.0.insert(field, column);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, ColumnLabel)> + '_ {
        self.0.iter().map(|(field, column)| (*field, *column))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Required fields that are not mapped, in declaration order
    pub fn missing_required(&self) -> Vec<Field> {
        Field::REQUIRED
            .into_iter()
            .filter(|field| !self.contains(*field))
            .collect()
    }
}

impl FromIterator<(Field, ColumnLabel)> for ColumnMap {
    fn from_iter<I: IntoIterator<Item = (Field, ColumnLabel)>>(iter: I) -> Self {
        let mut map = ColumnMap::default();
        for (field, column) in iter {
            map.insert(field, column);
        }
        map
    }
}

/// One entry of the header keyword table
#[derive(Debug)]
pub struct KeywordRule {
    pub keywords: &'static [&'static str],
    /// Filled in order; later targets only once earlier ones are taken
    pub targets: &'static [Field],
    /// When every target is taken, swallow the cell instead of letting
    /// lower-priority rules look at it
    pub consume_when_full: bool,
}

/// Header rules in priority order; the first rule that claims a cell wins.
///
/// The two distance columns carry no distinguishing keyword, so they are
/// told apart purely by position: the first "dist" header is the
/// geomembrane-to-lama distance, the second the geomembrane-to-crest one.
pub const HEADER_RULES: [KeywordRule; 8] = [
    KeywordRule {
        keywords: &["sector"],
        targets: &[Field::Sector],
        consume_when_full: false,
    },
    KeywordRule {
        keywords: &["pk"],
        targets: &[Field::Pk],
        consume_when_full: false,
    },
    KeywordRule {
        keywords: &["coronamiento"],
        targets: &[Field::Coronamiento],
        consume_when_full: false,
    },
    KeywordRule {
        keywords: &["revancha"],
        targets: &[Field::Revancha],
        consume_when_full: false,
    },
    KeywordRule {
        keywords: &["lama"],
        targets: &[Field::Lama],
        consume_when_full: false,
    },
    KeywordRule {
        keywords: &["ancho"],
        targets: &[Field::Ancho],
        consume_when_full: false,
    },
    KeywordRule {
        keywords: &["geomembrana", "geo"],
        targets: &[Field::Geomembrana],
        consume_when_full: true,
    },
    KeywordRule {
        keywords: &["dist"],
        targets: &[Field::DistGeoLama, Field::DistGeoCoronamiento],
        consume_when_full: true,
    },
];

/// What the rule table makes of one header cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMatch {
    Assign(Field),
    /// Claimed by a full rule; `dist_overflow` marks a third distance column
    Ignored { dist_overflow: bool },
    Unmatched,
}

/// Classify lower-cased, trimmed header text against the rule table
pub fn classify_header(text: &str, mapped: &ColumnMap) -> HeaderMatch {
    for rule in &HEADER_RULES {
        if !rule.keywords.iter().any(|keyword| text.contains(keyword)) {
            continue;
        }
        if let Some(field) = rule.targets.iter().find(|field| !mapped.contains(**field)) {
            return HeaderMatch::Assign(*field);
        }
        if rule.consume_when_full {
            return HeaderMatch::Ignored {
                dist_overflow: rule.targets.len() > 1,
            };
        }
    }
    HeaderMatch::Unmatched
}

fn is_header_token(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("sector")
        || (lower.contains("pk") && text.trim().chars().count() < PK_HEADER_MAX_CHARS)
}

/// First row in the search window holding a "sector" or short "pk" cell
pub fn locate_header_row(sheet: &Sheet) -> Result<u32, DetectionError> {
    for row in HEADER_SEARCH_ROWS {
        let found = ColumnLabel::A
            .through(ColumnLabel::M)
            .filter_map(|column| sheet.cell(row, column).as_text())
            .any(is_header_token);
        if found {
            return Ok(row);
        }
    }
    Err(DetectionError::HeaderNotFound {
        first_row: *HEADER_SEARCH_ROWS.start(),
        last_row: *HEADER_SEARCH_ROWS.end(),
    })
}

/// Columns mapped from a header row, plus anything odd seen on the way
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub columns: ColumnMap,
    pub warnings: Vec<ExtractionWarning>,
}

/// Map header cells in columns A..=O to canonical fields
pub fn map_columns(sheet: &Sheet, header_row: u32) -> Result<ColumnMapping, DetectionError> {
    let mut columns = ColumnMap::default();
    let mut warnings = Vec::new();

    for column in ColumnLabel::A.through(ColumnLabel::O) {
        let Some(header) = sheet.cell(header_row, column).as_text() else {
            continue;
        };
        let text = header.to_lowercase();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        match classify_header(text, &columns) {
            HeaderMatch::Assign(field) => {
                columns.insert(field, column);
            }
            HeaderMatch::Ignored {
                dist_overflow: true,
            } => {
                tracing::warn!("Extra distance column {column} ('{header}') ignored");
                warnings.push(ExtractionWarning::ExtraDistanceColumn {
                    column,
                    header: header.trim().to_string(),
                });
            }
            HeaderMatch::Ignored { .. } | HeaderMatch::Unmatched => {}
        }
    }

    let missing = columns.missing_required();
    if !missing.is_empty() {
        return Err(DetectionError::MissingRequiredColumns(missing));
    }

    Ok(ColumnMapping { columns, warnings })
}

/// Inclusive row span holding measurement data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRange {
    pub start_row: u32,
    pub end_row: u32,
}

impl DataRange {
    pub fn rows(&self) -> RangeInclusive<u32> {
        self.start_row..=self.end_row
    }
}

/// Walk the pk column below the header. Leading blanks are skipped; the
/// first blank after any data ends the run, and nothing past it is read.
pub fn detect_data_range(sheet: &Sheet, header_row: u32, pk_column: ColumnLabel) -> DataRange {
    let start_row = header_row + 1;
    let mut last_filled = None;

    for row in start_row..start_row + DATA_SCAN_LIMIT {
        if sheet.cell(row, pk_column).is_blank() {
            if last_filled.is_some() {
                break;
            }
        } else {
            last_filled = Some(row);
        }
    }

    DataRange {
        start_row,
        end_row: last_filled.unwrap_or(start_row),
    }
}

/// Where a wall's reports keep their data
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum WallLayout {
    /// Find header, columns and data rows in every file
    #[default]
    Detect,
    /// Every file uses the same rows and columns
    Fixed {
        header_row: u32,
        data_start_row: u32,
        data_end_row: u32,
        columns: ColumnMap,
    },
}

impl WallLayout {
    pub fn validate(&self) -> Result<(), String> {
        let WallLayout::Fixed {
            header_row,
            data_start_row,
            data_end_row,
            columns,
        } = self
        else {
            return Ok(());
        };
        if data_start_row <= header_row {
            return Err(format!(
                "Data must start below the header (header {header_row}, data {data_start_row})"
            ));
        }
        if data_end_row < data_start_row {
            return Err(format!(
                "Data ends before it starts ({data_start_row} > {data_end_row})"
            ));
        }
        let missing = columns.missing_required();
        if !missing.is_empty() {
            return Err(DetectionError::MissingRequiredColumns(missing).to_string());
        }
        Ok(())
    }
}

/// Detected (or configured) layout of one report
#[derive(Debug, Clone, Serialize)]
pub struct ReportStructure {
    pub header_row: u32,
    pub columns: ColumnMap,
    pub data: DataRange,
    pub warnings: Vec<ExtractionWarning>,
}

impl ReportStructure {
    pub fn pk_column(&self) -> Option<ColumnLabel> {
        self.columns.get(Field::Pk)
    }
}

/// Find the header row, map its columns and measure the data run
pub fn detect_structure(sheet: &Sheet) -> Result<ReportStructure, DetectionError> {
    let header_row = locate_header_row(sheet)?;
    let ColumnMapping { columns, warnings } = map_columns(sheet, header_row)?;
    let pk_column = columns
        .get(Field::Pk)
        .ok_or_else(|| DetectionError::MissingRequiredColumns(vec![Field::Pk]))?;
    let data = detect_data_range(sheet, header_row, pk_column);

    tracing::debug!(
        "Header at row {header_row}, {} columns mapped, data rows {}-{}",
        columns.len(),
        data.start_row,
        data.end_row
    );

    Ok(ReportStructure {
        header_row,
        columns,
        data,
        warnings,
    })
}

/// Apply a wall's layout to a sheet
pub fn resolve_structure(
    sheet: &Sheet,
    layout: &WallLayout,
) -> Result<ReportStructure, DetectionError> {
    match layout {
        WallLayout::Detect => detect_structure(sheet),
        WallLayout::Fixed {
            header_row,
            data_start_row,
            data_end_row,
            columns,
        } => {
            let missing = columns.missing_required();
            if !missing.is_empty() {
                return Err(DetectionError::MissingRequiredColumns(missing));
            }
            Ok(ReportStructure {
                header_row: *header_row,
                columns: columns.clone(),
                data: DataRange {
                    start_row: *data_start_row,
                    end_row: *data_end_row,
                },
                warnings: Vec::new(),
            })
        }
    }
}

/// How two reports of the same wall differ in layout
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StructureDrift {
    /// Header rows of the first and second report, when they differ
    pub header_rows: Option<(u32, u32)>,
    /// Fields found in both reports but under different columns
    pub moved: Vec<(Field, ColumnLabel, ColumnLabel)>,
    pub only_first: Vec<Field>,
    pub only_second: Vec<Field>,
}

impl StructureDrift {
    /// Same header row and every shared field in the same column.
    /// Fields present in only one report do not count against this.
    pub fn is_consistent(&self) -> bool {
        self.header_rows.is_none() && self.moved.is_empty()
    }
}

pub fn compare_structures(first: &ReportStructure, second: &ReportStructure) -> StructureDrift {
    let mut drift = StructureDrift {
        header_rows: (first.header_row != second.header_row)
            .then_some((first.header_row, second.header_row)),
        ..StructureDrift::default()
    };

    for (field, column) in first.columns.iter() {
        match second.columns.get(field) {
            Some(other) if other != column => drift.moved.push((field, column, other)),
            Some(_) => {}
            None => drift.only_first.push(field),
        }
    }
    drift.only_second = second
        .columns
        .iter()
        .map(|(field, _)| field)
        .filter(|field| !first.columns.contains(*field))
        .collect();
    drift
}
