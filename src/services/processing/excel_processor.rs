//! Report processor for revancha measurement files
//!
//! Runs one file through loading, detection, extraction and (unless this is a
//! dry run) the replace upload, and folds the outcome into a [`FileReport`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    database::{MeasurementStore, NewUpload, UploadReceipt, replace_upload},
    grid::{Sheet, SourceFormat},
    row_processing::extract_report,
};
use crate::common::errors::{DetectionError, FailureKind, ProcessingError, UploadError};
use crate::common::models::ProcessingStatus;
use crate::config::WallConfig;
use crate::services::models::ExtractionResult;

/// Result of processing one report file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file_name: String,
    pub wall: String,
    pub status: ProcessingStatus,
    pub measurement_date: Option<NaiveDate>,
    pub records: usize,
    pub sectors: Vec<String>,
    pub upload_id: Option<Uuid>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub warnings: Vec<String>,
    pub processing_time_ms: u128,
}

/// Processes report files one at a time against an optional store
#[derive(Clone)]
pub struct ReportProcessor {
    store: Option<Arc<dyn MeasurementStore>>,
    uploaded_by: Option<i32>,
}

impl ReportProcessor {
    pub fn new(store: Arc<dyn MeasurementStore>, uploaded_by: Option<i32>) -> Self {
        Self {
            store: Some(store),
            uploaded_by,
        }
    }

    /// Extract only; nothing is written
    pub fn dry_run() -> Self {
        Self {
            store: None,
            uploaded_by: None,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.store.is_none()
    }

    /// Process one file. Failures are reported in the result, never returned.
    pub async fn process_file(&self, wall: &WallConfig, path: &Path) -> FileReport {
        let start_time = std::time::Instant::now();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut report = FileReport {
            file_name: file_name.clone(),
            wall: wall.name.clone(),
            status: ProcessingStatus::Failed,
            measurement_date: None,
            records: 0,
            sectors: Vec::new(),
            upload_id: None,
            error: None,
            failure: None,
            warnings: Vec::new(),
            processing_time_ms: 0,
        };

        match self.process_file_direct(wall, path, &file_name).await {
            Ok((extraction, receipt)) => {
                report.status = match receipt {
                    None => ProcessingStatus::Validated,
                    Some(receipt) if receipt.replaced() => ProcessingStatus::Replaced,
                    Some(_) => ProcessingStatus::Success,
                };
                report.upload_id = receipt.map(|receipt| receipt.upload_id);
                report.measurement_date = Some(extraction.measurement_date);
                report.records = extraction.total_count;
                report.warnings = extraction.warnings.iter().map(ToString::to_string).collect();
                report.sectors = extraction.sectors;
            }
            Err(err) => {
                tracing::warn!("{}/{file_name}: {err}", wall.name);
                report.failure = Some(err.failure_kind());
                if let ProcessingError::Upload(UploadError::PartialWrite { upload_id, .. }) = &err {
                    report.upload_id = Some(*upload_id);
                }
                report.error = Some(err.to_string());
            }
        }

        report.processing_time_ms = start_time.elapsed().as_millis();
        report
    }

    async fn process_file_direct(
        &self,
        wall: &WallConfig,
        path: &Path,
        file_name: &str,
    ) -> Result<(ExtractionResult, Option<UploadReceipt>), ProcessingError> {
        let format = SourceFormat::from_path(path)
            .ok_or_else(|| DetectionError::UnsupportedFormat(file_name.to_string()))?;
        let file_data = tokio::fs::read(path)
            .await
            .map_err(|e| DetectionError::UnreadableFile(e.to_string()))?;

        let sheet = Sheet::from_bytes(file_data, format)?;
        let extraction = extract_report(&sheet, wall)?;

        let Some(store) = &self.store else {
            return Ok((extraction, None));
        };

        let upload = NewUpload {
            wall: wall.name.clone(),
            measurement_date: extraction.measurement_date,
            file_name: file_name.to_string(),
            file_type: format,
            total_records: extraction.total_count,
            sectors: extraction.sectors.clone(),
            uploaded_by: self.uploaded_by,
        };
        let receipt = replace_upload(store.as_ref(), &upload, &extraction.measurements).await?;
        tracing::info!(
            "Stored {} measurements for {} {} as upload {}",
            extraction.total_count,
            wall.name,
            extraction.measurement_date,
            receipt.upload_id
        );

        Ok((extraction, Some(receipt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::processing::database::{MemoryStore, StoreOp};
    use crate::services::processing::grid::report_workbook;
    use std::fs;
    use tempfile::TempDir;

    const REPORT_CSV: &str = "Reporte de revanchas,,,\n\
        ,,,\n\
        ,,,\n\
        ,,,\n\
        ,,,\n\
        Fecha:,15-12-2024,,\n\
        ,,,\n\
        Sector,PK,Revancha,Coronamiento\n\
        1,0+000,1.5,745.2\n\
        1,0+020,1.6,745.3\n\
        2,0+040,s/m,745.4\n";

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_then_replace() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "revanchas_2024-12-15.csv", REPORT_CSV);
        let store = Arc::new(MemoryStore::default());
        let processor = ReportProcessor::new(store.clone(), Some(3));
        let wall = WallConfig::detected("Este");

        let first = processor.process_file(&wall, &path).await;
        assert_eq!(first.status, ProcessingStatus::Success);
        assert_eq!(first.records, 3);
        assert_eq!(first.sectors, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(first.measurement_date, NaiveDate::from_ymd_opt(2024, 12, 15));
        assert_eq!(first.warnings.len(), 1);

        let second = processor.process_file(&wall, &path).await;
        assert_eq!(second.status, ProcessingStatus::Replaced);

        let stored = store.uploads();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1.file_type, SourceFormat::Csv);
        assert_eq!(stored[0].1.uploaded_by, Some(3));
        assert_eq!(Some(stored[0].0), second.upload_id);
    }

    #[tokio::test]
    async fn test_dry_run_validates_only() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "report.csv", REPORT_CSV);
        let processor = ReportProcessor::dry_run();
        assert!(processor.is_dry_run());

        let report = processor
            .process_file(&WallConfig::detected("Oeste"), &path)
            .await;
        assert_eq!(report.status, ProcessingStatus::Validated);
        assert_eq!(report.records, 3);
        assert!(report.upload_id.is_none());
    }

    #[tokio::test]
    async fn test_detection_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "broken.csv", "Sector,PK,Cota\n1,0+000,3\n");
        let processor = ReportProcessor::dry_run();

        let report = processor
            .process_file(&WallConfig::detected("Oeste"), &path)
            .await;
        assert_eq!(report.status, ProcessingStatus::Failed);
        assert_eq!(report.failure, Some(FailureKind::Validation));
        assert_eq!(
            report.error.as_deref(),
            Some("Missing required columns: revancha")
        );
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.txt", "hello");
        let report = ReportProcessor::dry_run()
            .process_file(&WallConfig::detected("Este"), &path)
            .await;
        assert_eq!(report.failure, Some(FailureKind::Validation));
        assert!(report.error.unwrap().contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_partial_write_is_classified() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "report.csv", REPORT_CSV);
        let store = Arc::new(MemoryStore::failing_on(StoreOp::InsertChildren));
        let processor = ReportProcessor::new(store.clone(), None);

        let report = processor
            .process_file(&WallConfig::detected("Principal"), &path)
            .await;
        assert_eq!(report.status, ProcessingStatus::Failed);
        assert_eq!(report.failure, Some(FailureKind::PartialWrite));
        assert_eq!(report.upload_id, Some(store.uploads()[0].0));
    }

    #[tokio::test]
    async fn test_xlsx_report_is_stored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Reporte_Rev_MP_241215.xlsx");
        fs::write(&path, report_workbook()).unwrap();
        let store = Arc::new(MemoryStore::default());
        let processor = ReportProcessor::new(store.clone(), None);

        let report = processor
            .process_file(&WallConfig::detected("Principal"), &path)
            .await;
        assert_eq!(report.status, ProcessingStatus::Success, "{:?}", report.error);
        assert_eq!(report.measurement_date, NaiveDate::from_ymd_opt(2024, 12, 15));
        assert_eq!(report.records, 3);

        let stored = store.uploads();
        assert_eq!(stored[0].1.file_type, SourceFormat::Xlsx);
        assert_eq!(stored[0].1.file_name, "Reporte_Rev_MP_241215.xlsx");
        assert_eq!(store.children(stored[0].0), 3);
    }
}
