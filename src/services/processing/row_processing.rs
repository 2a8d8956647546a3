//! Row-by-row extraction of measurements
//!
//! Turns the data rows of a report into [`Measurement`]s once the structure
//! and date are known.

use std::collections::BTreeSet;

use super::{
    dates::extract_measurement_date,
    grid::Sheet,
    structure::{ReportStructure, resolve_structure},
    utils::{coerce_numeric, normalize_pk, sector_text},
};
use crate::common::errors::DetectionError;
use crate::config::WallConfig;
use crate::services::models::{
    ExtractionResult, ExtractionWarning, Field, FieldValue, Measurement, SectorResolution,
};

/// Build the measurement for one data row.
///
/// Returns `None` for rows without a pk and, under fixed sector ranges, for
/// rows that fall outside every range.
pub fn process_row(
    sheet: &Sheet,
    row: u32,
    structure: &ReportStructure,
    sectors: &SectorResolution,
    warnings: &mut Vec<ExtractionWarning>,
) -> Option<Measurement> {
    let pk = normalize_pk(sheet.cell(row, structure.pk_column()?))?;

    let sector = match sectors {
        SectorResolution::FixedRanges(_) => sectors.label_for_row(row)?,
        SectorResolution::ColumnText => structure
            .columns
            .column_for(Field::Sector)
            .map(|column| sector_text(sheet.cell(row, column)))
            .unwrap_or_default(),
    };

    let mut read = |field: Field| -> FieldValue {
        let Some(column) = structure.columns.column_for(field) else {
            return FieldValue::Blank;
        };
        let value = coerce_numeric(sheet.cell(row, column));
        if let FieldValue::Uncoercible(raw) = &value {
            warnings.push(ExtractionWarning::NumericCoercionSkipped {
                row,
                field,
                raw: raw.clone(),
            });
        }
        value
    };

    Some(Measurement {
        row,
        sector,
        pk,
        coronamiento: read(Field::Coronamiento),
        revancha: read(Field::Revancha),
        lama: read(Field::Lama),
        ancho: read(Field::Ancho),
        geomembrana: read(Field::Geomembrana),
        dist_geo_lama: read(Field::DistGeoLama),
        dist_geo_coronamiento: read(Field::DistGeoCoronamiento),
    })
}

/// Sorted, de-duplicated, non-empty sector labels
pub fn distinct_sectors(measurements: &[Measurement]) -> Vec<String> {
    measurements
        .iter()
        .map(|m| m.sector.as_str())
        .filter(|sector| !sector.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Run the whole detection pipeline over one sheet
pub fn extract_report(sheet: &Sheet, wall: &WallConfig) -> Result<ExtractionResult, DetectionError> {
    let structure = resolve_structure(sheet, &wall.layout)?;
    let measurement_date = extract_measurement_date(sheet)?;

    let mut warnings = structure.warnings.clone();
    let measurements: Vec<Measurement> = structure
        .data
        .rows()
        .filter_map(|row| process_row(sheet, row, &structure, &wall.sectors, &mut warnings))
        .collect();

    if measurements.is_empty() {
        return Err(DetectionError::NoValidMeasurements);
    }

    let sectors = distinct_sectors(&measurements);
    tracing::debug!(
        "{}: {} measurements on {measurement_date} across sectors {sectors:?}",
        wall.name,
        measurements.len()
    );

    Ok(ExtractionResult {
        measurement_date,
        total_count: measurements.len(),
        measurements,
        sectors,
        warnings,
    })
}
