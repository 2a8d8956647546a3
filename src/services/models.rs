use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::processing::grid::ColumnLabel;

/// Canonical measurement fields recognised in report headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Sector,
    Pk,
    Coronamiento,
    Revancha,
    Lama,
    Ancho,
    Geomembrana,
    DistGeoLama,
    DistGeoCoronamiento,
}

impl Field {
    /// Fields that must be mapped for a header to be usable
    pub const REQUIRED: [Field; 3] = [Field::Sector, Field::Pk, Field::Revancha];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Sector => "sector",
            Field::Pk => "pk",
            Field::Coronamiento => "coronamiento",
            Field::Revancha => "revancha",
            Field::Lama => "lama",
            Field::Ancho => "ancho",
            Field::Geomembrana => "geomembrana",
            Field::DistGeoLama => "dist_geo_lama",
            Field::DistGeoCoronamiento => "dist_geo_coronamiento",
        }
    }

    /// Column read when the header did not name this field (the historical
    /// report layout). The pk column is always mapped, so it has none.
    pub fn fallback_column(self) -> Option<ColumnLabel> {
        let letter = match self {
            Field::Pk => return None,
            Field::Sector => b'A',
            Field::Coronamiento => b'C',
            Field::Revancha => b'E',
            Field::Lama => b'F',
            Field::Ancho => b'H',
            Field::Geomembrana => b'J',
            Field::DistGeoLama => b'K',
            Field::DistGeoCoronamiento => b'L',
        };
        Some(ColumnLabel::letter(letter))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of reading one numeric cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FieldValue {
    Value(f64),
    Blank,
    /// The cell held something that is not a finite number
    Uncoercible(String),
}

impl FieldValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            FieldValue::Value(value) => Some(*value),
            FieldValue::Blank | FieldValue::Uncoercible(_) => None,
        }
    }
}

/// Inclusive row interval assigned to one sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorRange {
    pub sector_id: u32,
    pub start_row: u32,
    pub end_row: u32,
}

impl SectorRange {
    pub fn contains(&self, row: u32) -> bool {
        (self.start_row..=self.end_row).contains(&row)
    }
}

/// How each data row gets its sector label
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "ranges")]
pub enum SectorResolution {
    /// Read the text of the mapped (or fallback) sector column
    #[default]
    ColumnText,
    /// Bucket rows by fixed row ranges; rows outside every range are dropped
    FixedRanges(Vec<SectorRange>),
}

impl SectorResolution {
    /// Ranges must be well-formed, ordered by start row and non-overlapping
    pub fn validate(&self) -> Result<(), String> {
        let SectorResolution::FixedRanges(ranges) = self else {
            return Ok(());
        };
        if ranges.is_empty() {
            return Err("Fixed sector ranges cannot be empty".to_string());
        }
        for range in ranges {
            if range.sector_id == 0 || range.start_row == 0 {
                return Err(format!(
                    "Sector {} has a zero id or start row",
                    range.sector_id
                ));
            }
            if range.start_row > range.end_row {
                return Err(format!(
                    "Sector {} starts after it ends ({} > {})",
                    range.sector_id, range.start_row, range.end_row
                ));
            }
        }
        for pair in ranges.windows(2) {
            if pair[1].start_row <= pair[0].end_row {
                return Err(format!(
                    "Sector {} overlaps or precedes sector {}",
                    pair[1].sector_id, pair[0].sector_id
                ));
            }
        }
        Ok(())
    }

    /// Sector label for a data row, if the row belongs to one
    pub fn label_for_row(&self, row: u32) -> Option<String> {
        match self {
            SectorResolution::ColumnText => None,
            SectorResolution::FixedRanges(ranges) => ranges
                .iter()
                .find(|range| range.contains(row))
                .map(|range| range.sector_id.to_string()),
        }
    }
}

/// One extracted data row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub row: u32,
    pub sector: String,
    pub pk: String,
    pub coronamiento: FieldValue,
    pub revancha: FieldValue,
    pub lama: FieldValue,
    pub ancho: FieldValue,
    pub geomembrana: FieldValue,
    pub dist_geo_lama: FieldValue,
    pub dist_geo_coronamiento: FieldValue,
}

/// Non-fatal findings collected while reading a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExtractionWarning {
    /// A numeric cell could not be read as a number and was stored as NULL
    NumericCoercionSkipped {
        row: u32,
        field: Field,
        raw: String,
    },
    /// More than two headers mention "dist"; only the first two are used
    ExtraDistanceColumn { column: ColumnLabel, header: String },
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionWarning::NumericCoercionSkipped { row, field, raw } => {
                write!(f, "Row {row}: '{raw}' in {field} is not a number")
            }
            ExtractionWarning::ExtraDistanceColumn { column, header } => {
                write!(f, "Column {column} ('{header}') ignored: only two distance columns are mapped")
            }
        }
    }
}

/// Everything extracted from one report file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub measurement_date: NaiveDate,
    pub measurements: Vec<Measurement>,
    pub total_count: usize,
    pub sectors: Vec<String>,
    pub warnings: Vec<ExtractionWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(sector_id: u32, start_row: u32, end_row: u32) -> SectorRange {
        SectorRange {
            sector_id,
            start_row,
            end_row,
        }
    }

    #[test]
    fn test_fixed_ranges_label_rows() {
        let sectors = SectorResolution::FixedRanges(vec![range(1, 13, 23), range(2, 24, 33)]);
        assert_eq!(sectors.label_for_row(13).as_deref(), Some("1"));
        assert_eq!(sectors.label_for_row(23).as_deref(), Some("1"));
        assert_eq!(sectors.label_for_row(24).as_deref(), Some("2"));
        assert_eq!(sectors.label_for_row(34), None);
        assert_eq!(SectorResolution::ColumnText.label_for_row(13), None);
    }

    #[test]
    fn test_sector_range_validation() {
        assert!(SectorResolution::ColumnText.validate().is_ok());
        assert!(
            SectorResolution::FixedRanges(vec![range(1, 10, 21), range(2, 22, 33)])
                .validate()
                .is_ok()
        );
        assert!(
            SectorResolution::FixedRanges(vec![range(1, 10, 21), range(2, 21, 33)])
                .validate()
                .is_err()
        );
        assert!(
            SectorResolution::FixedRanges(vec![range(1, 30, 21)])
                .validate()
                .is_err()
        );
        assert!(SectorResolution::FixedRanges(vec![]).validate().is_err());
    }

    #[test]
    fn test_fallback_columns() {
        assert_eq!(Field::Pk.fallback_column(), None);
        assert_eq!(
            Field::Revancha.fallback_column().map(|c| c.to_string()),
            Some("E".to_string())
        );
        assert_eq!(
            Field::DistGeoCoronamiento
                .fallback_column()
                .map(|c| c.to_string()),
            Some("L".to_string())
        );
    }

    #[test]
    fn test_field_value_hides_malformed_data() {
        assert_eq!(FieldValue::Value(2.5).value(), Some(2.5));
        assert_eq!(FieldValue::Blank.value(), None);
        assert_eq!(FieldValue::Uncoercible("n/a".into()).value(), None);
    }
}
