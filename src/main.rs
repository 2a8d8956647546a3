mod common;
mod config;
mod services;
mod uploads;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::common::models::ProcessingStatus;
use crate::config::{Config, WallConfig};
use crate::services::files::{
    ARCHIVE_DIR, archive_stored_files, list_report_files, wall_file_counts,
};
use crate::services::processing::{
    database::SeaOrmStore,
    excel_processor::{FileReport, ReportProcessor},
    grid::Sheet,
    row_processing::extract_report,
    structure::{ReportStructure, compare_structures, detect_structure, resolve_structure},
};
use crate::services::report::{RunSummary, write_error_details};

const DEFAULT_SUMMARY: &str = "load_summary.json";
const DEFAULT_ERROR_DETAILS: &str = "load_errors.txt";

#[derive(Parser)]
#[command(
    name = "revancha-ingest",
    version,
    about = "Load historical revancha measurement reports into the database"
)]
struct Cli {
    /// Folder holding one sub-folder per wall (overrides REVANCHAS_BASE_DIR)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every report in the wall folders and store the results
    Load {
        /// Extract and validate only, without touching the database
        #[arg(long)]
        dry_run: bool,
        /// Walls to process, comma separated (overrides REVANCHAS_WALLS)
        #[arg(long, value_delimiter = ',')]
        walls: Vec<String>,
        /// Pause between files in milliseconds (overrides REVANCHAS_PAUSE_MS)
        #[arg(long)]
        pause_ms: Option<u64>,
        /// User id recorded on uploads (overrides REVANCHAS_USER_ID)
        #[arg(long)]
        user_id: Option<i32>,
        #[arg(long, default_value = DEFAULT_SUMMARY)]
        summary: PathBuf,
        #[arg(long, default_value = DEFAULT_ERROR_DETAILS)]
        error_details: PathBuf,
    },
    /// Show what would be extracted from a single file
    Inspect {
        file: PathBuf,
        /// Wall whose layout to use; defaults to the file's folder name
        #[arg(long)]
        wall: Option<String>,
    },
    /// Detect the layout of the first and last file of a wall and compare them
    Compare {
        #[arg(long)]
        wall: String,
    },
    /// Move stored files of a previous load into each wall's archive folder
    Organize {
        #[arg(long, default_value = DEFAULT_SUMMARY)]
        summary: PathBuf,
    },
    /// List the uploads stored in the database
    Status {
        /// Walls to list, comma separated (defaults to the configured walls)
        #[arg(long, value_delimiter = ',')]
        walls: Vec<String>,
        /// Uploads shown per wall
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up tracing/logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
    }

    match cli.command {
        Commands::Load {
            dry_run,
            walls,
            pause_ms,
            user_id,
            summary,
            error_details,
        } => {
            if !walls.is_empty() {
                config.select_walls(&walls)?;
            }
            if let Some(pause_ms) = pause_ms {
                config.pause = Duration::from_millis(pause_ms);
            }
            if user_id.is_some() {
                config.uploaded_by = user_id;
            }
            load(&config, dry_run, &summary, &error_details).await
        }
        Commands::Inspect { file, wall } => inspect(&config, &file, wall.as_deref()),
        Commands::Compare { wall } => compare(&config, &wall),
        Commands::Organize { summary } => organize(&config, &summary),
        Commands::Status { walls, limit } => {
            if !walls.is_empty() {
                config.select_walls(&walls)?;
            }
            status(&config, limit).await
        }
    }
}

async fn connect(config: &Config) -> Result<DatabaseConnection> {
    let db_url = config.db_url.as_deref().ok_or_else(|| {
        anyhow!("DB_URL (or DB_USER, DB_PASSWORD, DB_HOST and DB_NAME) must be set unless --dry-run is given")
    })?;

    let db = Database::connect(db_url)
        .await
        .context("Could not connect to the database")?;
    println!("Connected to the database");

    Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;
    println!("DB migrations complete");

    Ok(db)
}

fn status_line(report: &FileReport) -> String {
    let date = report
        .measurement_date
        .map(|date| date.to_string())
        .unwrap_or_default();
    match report.status {
        ProcessingStatus::Success => format!(
            "{} {}: {} records ({date})",
            style("✔").green(),
            report.file_name,
            report.records
        ),
        ProcessingStatus::Replaced => format!(
            "{} {}: {} records ({date}), replaced previous upload",
            style("✔").green(),
            report.file_name,
            report.records
        ),
        ProcessingStatus::Validated => format!(
            "{} {}: valid, {} records ({date})",
            style("✔").cyan(),
            report.file_name,
            report.records
        ),
        ProcessingStatus::Failed => format!(
            "{} {}: {}",
            style("✘").red(),
            report.file_name,
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

async fn load(config: &Config, dry_run: bool, summary_path: &Path, errors_path: &Path) -> Result<()> {
    println!("{}", style("Revancha bulk load").bold());
    println!("{}", style("━".repeat(40)).dim());
    println!("Base folder: {}", style(config.base_dir.display()).cyan());

    let processor = if dry_run {
        println!(
            "{} Dry run: files are validated, nothing is stored",
            style("!").yellow()
        );
        ReportProcessor::dry_run()
    } else {
        let db = connect(config).await?;
        ReportProcessor::new(Arc::new(SeaOrmStore::new(db)), config.uploaded_by)
    };

    let mut summary = RunSummary::new(processor.is_dry_run());

    for wall in &config.walls {
        summary.register_wall(&wall.name);
        let wall_dir = config.base_dir.join(&wall.name);
        if !wall_dir.is_dir() {
            println!(
                "{} Folder not found: {}",
                style("!").yellow(),
                wall_dir.display()
            );
            continue;
        }

        let files = list_report_files(&wall_dir)?;
        println!(
            "\n{} {} files",
            style(wall.name.to_uppercase()).bold(),
            files.len()
        );
        tracing::info!("Processing {} files for wall {}", files.len(), wall.name);

        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("##-"),
        );

        for path in &files {
            pb.set_message(
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            let report = processor.process_file(wall, path).await;
            pb.println(status_line(&report));
            summary.record(report);
            pb.inc(1);

            if !config.pause.is_zero() {
                tokio::time::sleep(config.pause).await;
            }
        }
        pb.finish_and_clear();
    }

    summary.finish();

    println!("\n{}", style("Summary").bold());
    println!("{}", style("━".repeat(40)).dim());
    println!("{} Succeeded: {}", style("✔").green(), summary.succeeded());
    println!("{} Failed:    {}", style("✘").red(), summary.failed());
    for (wall, tally) in &summary.walls {
        println!(
            "   {wall}: {} stored, {} replaced, {} validated, {} failed",
            tally.stored, tally.replaced, tally.validated, tally.failed
        );
    }

    summary.write_json(summary_path)?;
    println!("Summary written to {}", style(summary_path.display()).cyan());

    if summary.failed() > 0 {
        write_error_details(&summary, &config.base_dir, errors_path)?;
        println!(
            "Error details written to {}",
            style(errors_path.display()).cyan()
        );
    }

    Ok(())
}

fn inspect(config: &Config, file: &Path, wall: Option<&str>) -> Result<()> {
    let folder_name = file
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned());
    let wall_name = wall.map(str::to_string).or(folder_name);
    let wall = wall_name
        .as_deref()
        .and_then(|name| {
            config
                .walls
                .iter()
                .find(|wall| wall.name.eq_ignore_ascii_case(name))
                .cloned()
        })
        .unwrap_or_else(|| WallConfig::detected(wall_name.as_deref().unwrap_or("-")));

    println!("{} ({})", style(file.display()).bold(), wall.name);

    let sheet = Sheet::load(file)?;
    let structure = resolve_structure(&sheet, &wall.layout)?;
    print_structure(&structure);

    let result = extract_report(&sheet, &wall)?;
    println!("Date:       {}", result.measurement_date);
    println!("Records:    {}", result.total_count);
    println!("Sectors:    {}", result.sectors.join(", "));
    for warning in &result.warnings {
        println!("{} {warning}", style("!").yellow());
    }
    Ok(())
}

fn print_structure(structure: &ReportStructure) {
    println!("Header row: {}", structure.header_row);
    for (field, column) in structure.columns.iter() {
        println!("   {field:<22} {column}");
    }
    println!(
        "Data rows:  {}-{} ({} rows)",
        structure.data.start_row,
        structure.data.end_row,
        structure.data.end_row - structure.data.start_row + 1
    );
}

fn compare(config: &Config, wall: &str) -> Result<()> {
    let wall_dir = config.base_dir.join(wall);
    let files = list_report_files(&wall_dir)?;
    let (Some(first), Some(last)) = (files.first(), files.last()) else {
        return Err(anyhow!("No report files in {}", wall_dir.display()));
    };

    let mut structures = Vec::with_capacity(2);
    for path in [first, last] {
        println!("\n{}", style(path.display()).bold());
        let sheet = Sheet::load(path)?;
        let structure = detect_structure(&sheet)
            .with_context(|| format!("Detection failed for {}", path.display()))?;
        print_structure(&structure);
        structures.push(structure);
    }
    if files.len() == 1 {
        println!("\nOnly one file in {}; nothing to compare", wall_dir.display());
        return Ok(());
    }

    let drift = compare_structures(&structures[0], &structures[1]);
    println!("\n{}", style("Comparison").bold());
    println!("{}", style("━".repeat(40)).dim());
    if let Some((first_row, last_row)) = drift.header_rows {
        println!("{} Header row differs: {first_row} vs {last_row}", style("✘").red());
    }
    for (field, first_column, last_column) in &drift.moved {
        println!(
            "{} {field} moved: {first_column} vs {last_column}",
            style("✘").red()
        );
    }
    for field in &drift.only_first {
        println!("{} {field} only in the first file", style("!").yellow());
    }
    for field in &drift.only_second {
        println!("{} {field} only in the last file", style("!").yellow());
    }
    if drift.is_consistent() {
        println!(
            "{} Same header row and columns across {} files",
            style("✔").green(),
            files.len()
        );
    }
    Ok(())
}

async fn status(config: &Config, limit: usize) -> Result<()> {
    let store = SeaOrmStore::new(connect(config).await?);

    for wall in &config.walls {
        let uploads = store
            .list_uploads(&wall.name)
            .await
            .with_context(|| format!("Failed to list uploads for {}", wall.name))?;
        println!(
            "\n{} {} uploads",
            style(wall.name.to_uppercase()).bold(),
            uploads.len()
        );
        for upload in uploads.iter().take(limit) {
            println!(
                "   {}  {:>4} records  {}",
                upload.measurement_date, upload.total_records, upload.file_name
            );
        }
        if uploads.len() > limit {
            println!("   ... and {} more", uploads.len() - limit);
        }
    }
    Ok(())
}

fn organize(config: &Config, summary_path: &Path) -> Result<()> {
    let summary = RunSummary::read_json(summary_path)?;
    if summary.dry_run {
        println!(
            "{} {} comes from a dry run; nothing was stored, nothing to move",
            style("!").yellow(),
            summary_path.display()
        );
        return Ok(());
    }

    let outcome = archive_stored_files(&config.base_dir, &summary)?;
    for path in &outcome.moved {
        println!("{} {}", style("✔").green(), path.display());
    }
    for path in &outcome.missing {
        println!("{} Not found: {}", style("!").yellow(), path.display());
    }
    println!(
        "\n{} files moved to {ARCHIVE_DIR}, {} not found",
        outcome.moved.len(),
        outcome.missing.len()
    );

    for wall in &config.walls {
        let (remaining, archived) = wall_file_counts(&config.base_dir.join(&wall.name))?;
        println!(
            "   {}: {archived} archived, {remaining} left to fix",
            wall.name
        );
    }
    Ok(())
}
