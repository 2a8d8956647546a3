use serde::{Deserialize, Serialize};

/// What happened to one report file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Stored as a new upload
    Success,
    /// Stored, replacing the upload for the same wall and date
    Replaced,
    /// Extracted without storing (dry run)
    Validated,
    Failed,
}

impl ProcessingStatus {
    /// Whether the file's data is now in the store
    pub fn is_stored(self) -> bool {
        matches!(self, ProcessingStatus::Success | ProcessingStatus::Replaced)
    }
}
