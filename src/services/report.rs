//! Run summary and error detail listing
//!
//! The JSON summary is both the record of a load run and the input of the
//! archive step, which moves stored files out of the way.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::common::models::ProcessingStatus;
use crate::services::processing::excel_processor::FileReport;

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

const HOW_TO_FIX: &str = "\
======================================================================
HOW TO FIX
======================================================================

1. Open each file listed above
2. Check that rows 6-7 (usually cell F6) hold a valid date
3. Accepted date formats:
   - DD/MM/YYYY (e.g. 15/12/2024)
   - DD-MM-YYYY (e.g. 15-12-2024)
   - YYYY-MM-DD (e.g. 2024-12-15)
4. Check that a header row within the first 20 rows names the
   Sector, PK and Revancha columns
5. Save the file and run the load again
";

/// Per-wall file counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallTally {
    pub stored: usize,
    pub replaced: usize,
    pub validated: usize,
    pub failed: usize,
}

impl WallTally {
    pub fn succeeded(&self) -> usize {
        self.stored + self.replaced + self.validated
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
    pub walls: BTreeMap<String, WallTally>,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            files: Vec::new(),
            walls: BTreeMap::new(),
        }
    }

    /// Make sure a wall shows up in the counts even if it has no files
    pub fn register_wall(&mut self, wall: &str) {
        self.walls.entry(wall.to_string()).or_default();
    }

    pub fn record(&mut self, report: FileReport) {
        let tally = self.walls.entry(report.wall.clone()).or_default();
        match report.status {
            ProcessingStatus::Success => tally.stored += 1,
            ProcessingStatus::Replaced => tally.replaced += 1,
            ProcessingStatus::Validated => tally.validated += 1,
            ProcessingStatus::Failed => tally.failed += 1,
        }
        self.files.push(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> usize {
        self.walls.values().map(WallTally::succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.walls.values().map(|tally| tally.failed).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|report| report.status == ProcessingStatus::Failed)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary to {}", path.display()))
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run summary from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("{} is not a run summary", path.display()))
    }
}

/// Failed files grouped by wall, with what to check before re-running
pub fn render_error_details(summary: &RunSummary, base_dir: &Path) -> String {
    let mut by_wall: Vec<(&str, Vec<&FileReport>)> = Vec::new();
    for report in summary.failures() {
        match by_wall.iter_mut().find(|(wall, _)| *wall == report.wall) {
            Some((_, reports)) => reports.push(report),
            None => by_wall.push((report.wall.as_str(), vec![report])),
        }
    }

    let mut lines = vec![
        RULE.to_string(),
        "FILES WITH ERRORS".to_string(),
        RULE.to_string(),
        String::new(),
        format!("Total errors: {}", summary.failed()),
        String::new(),
    ];

    for (wall, reports) in &by_wall {
        lines.extend([
            String::new(),
            RULE.to_string(),
            format!("{} - {} errors", wall.to_uppercase(), reports.len()),
            RULE.to_string(),
            String::new(),
        ]);
        for report in reports {
            lines.push(format!("File:  {}", report.file_name));
            lines.push(format!(
                "Error: {}",
                report.error.as_deref().unwrap_or("unknown")
            ));
            if let Some(kind) = report.failure {
                lines.push(format!("Kind:  {kind:?}"));
            }
            lines.push(format!(
                "Path:  {}",
                base_dir.join(wall).join(&report.file_name).display()
            ));
            lines.push(THIN_RULE.to_string());
        }
    }

    lines.push(String::new());
    lines.push(HOW_TO_FIX.to_string());
    lines.join("\n")
}

pub fn write_error_details(summary: &RunSummary, base_dir: &Path, path: &Path) -> Result<()> {
    std::fs::write(path, render_error_details(summary, base_dir))
        .with_context(|| format!("Failed to write error details to {}", path.display()))
}
