//! Measurement date extraction
//!
//! The report date sits somewhere in the title block (rows 6-7), either as a
//! real date cell or buried in text such as "Fecha: 15/12/2024".

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use super::grid::{CellValue, ColumnLabel, Sheet};
use crate::common::errors::DetectionError;

/// Title block rows holding the report date
pub const DATE_SEARCH_ROWS: [u32; 2] = [6, 7];
/// Years a report date may plausibly fall in
pub const ACCEPTED_YEARS: RangeInclusive<i32> = 2020..=2030;

static DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{1,2})[/-]([0-9]{1,2})[/-]([0-9]{4})").expect("valid day-first pattern")
});
static YEAR_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{4})[/-]([0-9]{1,2})[/-]([0-9]{1,2})").expect("valid year-first pattern")
});

fn accept(date: NaiveDate) -> Option<NaiveDate> {
    ACCEPTED_YEARS.contains(&date.year()).then_some(date)
}

fn capture_number<T: std::str::FromStr>(captures: &regex::Captures<'_>, idx: usize) -> Option<T> {
    captures.get(idx)?.as_str().parse().ok()
}

/// Find a plausible date in free text, trying D/M/YYYY before YYYY-M-D
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let day_first = DAY_FIRST.captures(text).and_then(|c| {
        NaiveDate::from_ymd_opt(
            capture_number(&c, 3)?,
            capture_number(&c, 2)?,
            capture_number(&c, 1)?,
        )
    });
    if let Some(date) = day_first.and_then(accept) {
        return Some(date);
    }

    YEAR_FIRST
        .captures(text)
        .and_then(|c| {
            NaiveDate::from_ymd_opt(
                capture_number(&c, 1)?,
                capture_number(&c, 2)?,
                capture_number(&c, 3)?,
            )
        })
        .and_then(accept)
}

/// Date carried by a single cell, if any
pub fn date_from_cell(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Empty => None,
        CellValue::Date(value) => accept(value.date()),
        CellValue::Text(_) | CellValue::Number(_) => parse_date_text(&cell.to_display_string()),
    }
}

/// Scan the title block row by row, left to right, for the report date
pub fn extract_measurement_date(sheet: &Sheet) -> Result<NaiveDate, DetectionError> {
    for row in DATE_SEARCH_ROWS {
        for column in ColumnLabel::A.through(ColumnLabel::M) {
            if let Some(date) = date_from_cell(sheet.cell(row, column)) {
                tracing::debug!("Measurement date {date} found in {column}{row}");
                return Ok(date);
            }
        }
    }
    Err(DetectionError::DateNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn col(label: &str) -> ColumnLabel {
        label.parse().unwrap()
    }

    #[rstest]
    #[case("15-12-2024", Some(ymd(2024, 12, 15)))]
    #[case("15/12/2024", Some(ymd(2024, 12, 15)))]
    #[case("2024-12-15", Some(ymd(2024, 12, 15)))]
    #[case("2024/1/5", Some(ymd(2024, 1, 5)))]
    #[case("Fecha: 5-1-2023 (turno noche)", Some(ymd(2023, 1, 5)))]
    #[case("15-12-1999", None)]
    #[case("2031-01-01", None)]
    #[case("31-02-2024", None)]
    #[case("Muro Principal", None)]
    fn test_parse_date_text(#[case] text: &str, #[case] expected: Option<NaiveDate>) {
        assert_eq!(parse_date_text(text), expected);
    }

    #[test]
    fn test_out_of_range_day_first_falls_back_to_year_first() {
        assert_eq!(
            parse_date_text("01-01-1999 / 2022-03-04"),
            Some(ymd(2022, 3, 4))
        );
    }

    #[test]
    fn test_native_date_cell() {
        let mut sheet = Sheet::default();
        sheet.set(
            6,
            col("F"),
            CellValue::Date(ymd(2022, 1, 13).and_hms_opt(8, 30, 0).unwrap()),
        );
        assert_eq!(extract_measurement_date(&sheet).unwrap(), ymd(2022, 1, 13));
    }

    #[test]
    fn test_rejected_date_continues_scan() {
        let mut sheet = Sheet::default();
        sheet.set(6, col("B"), CellValue::Text("15-12-1999".into()));
        sheet.set(
            6,
            col("C"),
            CellValue::Date(ymd(2019, 5, 1).and_hms_opt(0, 0, 0).unwrap()),
        );
        sheet.set(7, col("A"), CellValue::Text("2024-12-15".into()));
        assert_eq!(extract_measurement_date(&sheet).unwrap(), ymd(2024, 12, 15));
    }

    #[test]
    fn test_scan_order_is_row_major() {
        let mut sheet = Sheet::default();
        sheet.set(7, col("A"), CellValue::Text("01-01-2021".into()));
        sheet.set(6, col("M"), CellValue::Text("02-02-2022".into()));
        assert_eq!(extract_measurement_date(&sheet).unwrap(), ymd(2022, 2, 2));
    }

    #[test]
    fn test_dates_outside_window_are_ignored() {
        let mut sheet = Sheet::default();
        sheet.set(5, col("F"), CellValue::Text("15-12-2024".into()));
        sheet.set(8, col("F"), CellValue::Text("15-12-2024".into()));
        sheet.set(6, col("N"), CellValue::Text("15-12-2024".into()));
        assert_eq!(
            extract_measurement_date(&sheet),
            Err(DetectionError::DateNotFound)
        );
    }
}
