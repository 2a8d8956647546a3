//! Wall folder scanning and post-run archiving

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::services::processing::grid::SourceFormat;
use crate::services::report::RunSummary;

/// Sub-folder of each wall folder that stored files are moved into
pub const ARCHIVE_DIR: &str = "_SUBIDOS";

/// Supported report files directly inside a wall folder, sorted by name.
/// Sub-folders (the archive included) and Office lock files are skipped.
pub fn list_report_files(wall_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(wall_dir)
        .with_context(|| format!("Failed to list {}", wall_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list {}", wall_dir.display()))?
            .path();
        let is_lock_file = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("~$"));
        if path.is_file() && !is_lock_file && SourceFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// What the archive step did
#[derive(Debug, Default)]
pub struct ArchiveOutcome {
    pub moved: Vec<PathBuf>,
    /// Stored files that were no longer where the run found them
    pub missing: Vec<PathBuf>,
}

/// Move every stored file of a run into its wall's archive folder
pub fn archive_stored_files(base_dir: &Path, summary: &RunSummary) -> Result<ArchiveOutcome> {
    let mut outcome = ArchiveOutcome::default();

    for report in summary.files.iter().filter(|report| report.status.is_stored()) {
        let wall_dir = base_dir.join(&report.wall);
        let origin = wall_dir.join(&report.file_name);
        if !origin.is_file() {
            outcome.missing.push(origin);
            continue;
        }

        let archive = wall_dir.join(ARCHIVE_DIR);
        fs::create_dir_all(&archive)
            .with_context(|| format!("Failed to create {}", archive.display()))?;
        let destination = archive.join(&report.file_name);
        fs::rename(&origin, &destination).with_context(|| {
            format!(
                "Failed to move {} to {}",
                origin.display(),
                destination.display()
            )
        })?;
        tracing::debug!("Archived {}", destination.display());
        outcome.moved.push(destination);
    }

    Ok(outcome)
}

/// Files left in a wall folder and files in its archive
pub fn wall_file_counts(wall_dir: &Path) -> Result<(usize, usize)> {
    let remaining = if wall_dir.is_dir() {
        list_report_files(wall_dir)?.len()
    } else {
        0
    };
    let archive = wall_dir.join(ARCHIVE_DIR);
    let archived = if archive.is_dir() {
        list_report_files(&archive)?.len()
    } else {
        0
    };
    Ok((remaining, archived))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::ProcessingStatus;
    use crate::services::processing::excel_processor::FileReport;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    fn report(wall: &str, file_name: &str, status: ProcessingStatus) -> FileReport {
        FileReport {
            file_name: file_name.to_string(),
            wall: wall.to_string(),
            status,
            measurement_date: None,
            records: 0,
            sectors: Vec::new(),
            upload_id: None,
            error: None,
            failure: None,
            warnings: Vec::new(),
            processing_time_ms: 0,
        }
    }

    #[test]
    fn test_list_report_files() {
        let dir = TempDir::new().unwrap();
        for name in ["b.xlsx", "a.CSV", "c.xls", "notes.txt", "~$b.xlsx"] {
            touch(dir.path(), name);
        }
        fs::create_dir(dir.path().join(ARCHIVE_DIR)).unwrap();
        touch(&dir.path().join(ARCHIVE_DIR), "old.xlsx");

        let names: Vec<_> = list_report_files(dir.path())
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.CSV", "b.xlsx", "c.xls"]);
    }

    #[test]
    fn test_missing_wall_folder_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(list_report_files(&dir.path().join("Norte")).is_err());
    }

    #[test]
    fn test_archive_moves_only_stored_files() {
        let base = TempDir::new().unwrap();
        let este = base.path().join("Este");
        fs::create_dir(&este).unwrap();
        for name in ["ok.xlsx", "again.xlsx", "bad.xlsx", "checked.xlsx"] {
            touch(&este, name);
        }

        let mut summary = RunSummary::new(false);
        summary.record(report("Este", "ok.xlsx", ProcessingStatus::Success));
        summary.record(report("Este", "again.xlsx", ProcessingStatus::Replaced));
        summary.record(report("Este", "bad.xlsx", ProcessingStatus::Failed));
        summary.record(report("Este", "checked.xlsx", ProcessingStatus::Validated));
        summary.record(report("Este", "gone.xlsx", ProcessingStatus::Success));

        let outcome = archive_stored_files(base.path(), &summary).unwrap();
        assert_eq!(outcome.moved.len(), 2);
        assert_eq!(outcome.missing, vec![este.join("gone.xlsx")]);
        assert!(este.join(ARCHIVE_DIR).join("ok.xlsx").is_file());
        assert!(este.join("bad.xlsx").is_file());

        assert_eq!(wall_file_counts(&este).unwrap(), (2, 2));
    }
}
