use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::services::models::Field;

/// Why a report file could not be turned into measurements.
///
/// All variants are fatal for the file and not worth retrying: the file is
/// reported and the run moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("Could not read file: {0}")]
    UnreadableFile(String),
    #[error("Workbook has no worksheets")]
    NoWorksheet,
    #[error("No header row found (looked for 'sector' or 'pk' in rows {first_row}-{last_row})")]
    HeaderNotFound { first_row: u32, last_row: u32 },
    #[error("Missing required columns: {}", join_fields(.0))]
    MissingRequiredColumns(Vec<Field>),
    #[error("Could not find a measurement date in rows 6-7")]
    DateNotFound,
    #[error("No valid measurements found")]
    NoValidMeasurements,
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure while replacing a (wall, date) record in the store
#[derive(Debug, Error)]
pub enum UploadError {
    /// Nothing new was written; any prior record may already be gone
    #[error("Store write failed during {stage}: {message}")]
    StoreWriteFailed { stage: UploadStage, message: String },
    /// The parent record exists but its measurements could not be inserted
    #[error("Partial write: upload {upload_id} has no measurements ({message})")]
    PartialWrite { upload_id: Uuid, message: String },
}

/// Step of the replace protocol that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Lookup,
    Delete,
    InsertParent,
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStage::Lookup => write!(f, "lookup"),
            UploadStage::Delete => write!(f, "delete"),
            UploadStage::InsertParent => write!(f, "parent insert"),
        }
    }
}

/// Coarse failure class written to the run summary so operators can tell
/// a bad file from a store problem from a half-written upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Store,
    PartialWrite,
}

impl From<&UploadError> for FailureKind {
    fn from(err: &UploadError) -> Self {
        match err {
            UploadError::StoreWriteFailed { .. } => FailureKind::Store,
            UploadError::PartialWrite { .. } => FailureKind::PartialWrite,
        }
    }
}

/// Anything that stops one file from being stored
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl ProcessingError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ProcessingError::Detection(_) => FailureKind::Validation,
            ProcessingError::Upload(err) => FailureKind::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_names_fields() {
        let err = DetectionError::MissingRequiredColumns(vec![Field::Sector, Field::Revancha]);
        assert_eq!(err.to_string(), "Missing required columns: sector, revancha");
    }

    #[test]
    fn test_upload_errors_map_to_failure_kinds() {
        let store = UploadError::StoreWriteFailed {
            stage: UploadStage::InsertParent,
            message: "connection reset".to_string(),
        };
        let partial = UploadError::PartialWrite {
            upload_id: Uuid::new_v4(),
            message: "value too long".to_string(),
        };
        assert_eq!(FailureKind::from(&store), FailureKind::Store);
        assert_eq!(FailureKind::from(&partial), FailureKind::PartialWrite);
        assert!(store.to_string().contains("parent insert"));
    }

    #[test]
    fn test_detection_errors_are_validation_failures() {
        let err = ProcessingError::from(DetectionError::DateNotFound);
        assert_eq!(err.failure_kind(), FailureKind::Validation);
        assert_eq!(err.to_string(), "Could not find a measurement date in rows 6-7");
    }
}
