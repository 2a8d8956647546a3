//! Utility functions for cell value extraction
//!
//! Helpers shared by the row extractor: numeric coercion, pk normalisation
//! and sector text cleanup.

use super::grid::CellValue;
use crate::services::models::FieldValue;

/// Longest pk the measurements table accepts
pub const PK_MAX_CHARS: usize = 20;

/// Read a measurement value from a cell.
///
/// Numbers pass through, text is parsed after trimming. A lone comma is
/// accepted as the decimal separator ("2,5") since semicolon-delimited
/// exports write numbers that way. Anything else that is not a finite
/// number is kept as [`FieldValue::Uncoercible`] so it can be reported.
pub fn coerce_numeric(cell: &CellValue) -> FieldValue {
    match cell {
        CellValue::Empty => FieldValue::Blank,
        CellValue::Number(value) if value.is_finite() => FieldValue::Value(*value),
        CellValue::Number(value) => FieldValue::Uncoercible(value.to_string()),
        CellValue::Date(_) => FieldValue::Uncoercible(cell.to_display_string()),
        CellValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return FieldValue::Blank;
            }
            match parse_decimal(trimmed) {
                Some(value) => FieldValue::Value(value),
                None => FieldValue::Uncoercible(trimmed.to_string()),
            }
        }
    }
}

fn parse_decimal(text: &str) -> Option<f64> {
    let parsed = text.parse::<f64>().ok().or_else(|| {
        if text.matches(',').count() == 1 && !text.contains('.') {
            text.replace(',', ".").parse::<f64>().ok()
        } else {
            None
        }
    })?;
    parsed.is_finite().then_some(parsed)
}

/// Stringify, trim and truncate a pk cell; blank cells have no pk
pub fn normalize_pk(cell: &CellValue) -> Option<String> {
    if cell.is_blank() {
        return None;
    }
    let text = cell.to_display_string();
    let pk: String = text.trim().chars().take(PK_MAX_CHARS).collect();
    (!pk.is_empty()).then_some(pk)
}

/// Sector label as written in the sheet
pub fn sector_text(cell: &CellValue) -> String {
    cell.to_display_string().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    #[rstest]
    #[case(CellValue::Number(12.5), FieldValue::Value(12.5))]
    #[case(CellValue::Text(" 3.75 ".into()), FieldValue::Value(3.75))]
    #[case(CellValue::Text("2,5".into()), FieldValue::Value(2.5))]
    #[case(CellValue::Text("-1e2".into()), FieldValue::Value(-100.0))]
    #[case(CellValue::Empty, FieldValue::Blank)]
    #[case(CellValue::Text("   ".into()), FieldValue::Blank)]
    #[case(CellValue::Text("s/i".into()), FieldValue::Uncoercible("s/i".into()))]
    #[case(CellValue::Text("1,234.5".into()), FieldValue::Uncoercible("1,234.5".into()))]
    #[case(CellValue::Text("NaN".into()), FieldValue::Uncoercible("NaN".into()))]
    #[case(CellValue::Number(f64::INFINITY), FieldValue::Uncoercible("inf".into()))]
    fn test_coerce_numeric(#[case] cell: CellValue, #[case] expected: FieldValue) {
        assert_eq!(coerce_numeric(&cell), expected);
    }

    #[test]
    fn test_dates_are_not_numbers() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(matches!(
            coerce_numeric(&CellValue::Date(date)),
            FieldValue::Uncoercible(_)
        ));
    }

    #[test]
    fn test_pk_is_trimmed_and_truncated() {
        let cell = CellValue::Text("  12345678901234567890X ".into());
        assert_eq!(normalize_pk(&cell).as_deref(), Some("12345678901234567890"));
    }

    #[test]
    fn test_pk_truncation_counts_characters() {
        let cell = CellValue::Text("ÑÑÑÑÑÑÑÑÑÑÑÑÑÑÑÑÑÑÑÑÑÑ".into());
        let pk = normalize_pk(&cell).unwrap();
        assert_eq!(pk.chars().count(), PK_MAX_CHARS);
    }

    #[test]
    fn test_numeric_pk_has_no_fraction() {
        assert_eq!(normalize_pk(&CellValue::Number(1200.0)).as_deref(), Some("1200"));
        assert_eq!(normalize_pk(&CellValue::Number(0.0)).as_deref(), Some("0"));
    }

    #[test]
    fn test_blank_pk() {
        assert_eq!(normalize_pk(&CellValue::Empty), None);
        assert_eq!(normalize_pk(&CellValue::Text(" \t ".into())), None);
    }

    #[test]
    fn test_sector_text() {
        assert_eq!(sector_text(&CellValue::Number(3.0)), "3");
        assert_eq!(sector_text(&CellValue::Text(" S-2 ".into())), "S-2");
        assert_eq!(sector_text(&CellValue::Empty), "");
    }
}
