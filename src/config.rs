use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::services::models::SectorResolution;
use crate::services::processing::structure::WallLayout;

const DEFAULT_WALLS: &str = "Oeste,Este,Principal";
const DEFAULT_PAUSE_MS: u64 = 100;

/// How the reports of one wall are read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallConfig {
    pub name: String,
    pub layout: WallLayout,
    pub sectors: SectorResolution,
}

impl WallConfig {
    /// Detect everything and read sectors from the sheet
    pub fn detected(name: &str) -> Self {
        Self {
            name: name.to_string(),
            layout: WallLayout::Detect,
            sectors: SectorResolution::ColumnText,
        }
    }
}

/// One entry of the wall layouts file
#[derive(Debug, Clone, Default, Deserialize)]
struct WallSettings {
    #[serde(default)]
    layout: WallLayout,
    #[serde(default)]
    sectors: SectorResolution,
}

/// Read a YAML file mapping wall names to layouts and sector resolution.
/// Keys are matched case-insensitively.
pub fn load_wall_layouts(path: &Path) -> Result<BTreeMap<String, (WallLayout, SectorResolution)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read wall layouts from {}", path.display()))?;
    let settings: BTreeMap<String, WallSettings> = serde_yml::from_str(&text)
        .with_context(|| format!("Invalid wall layouts in {}", path.display()))?;

    settings
        .into_iter()
        .map(|(wall, settings)| {
            settings
                .layout
                .validate()
                .and_then(|()| settings.sectors.validate())
                .map_err(|e| anyhow!("Wall '{wall}': {e}"))?;
            Ok::<_, anyhow::Error>((wall.to_lowercase(), (settings.layout, settings.sectors)))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    /// Folder holding one sub-folder per wall
    pub base_dir: PathBuf,
    pub walls: Vec<WallConfig>,
    /// User id recorded on every upload
    pub uploaded_by: Option<i32>,
    /// Pause between files
    pub pause: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load from .env file if available
        let db_url = env::var("DB_URL").ok().or_else(|| {
            Some(format!(
                "{}://{}:{}@{}:{}/{}",
                env::var("DB_PREFIX").unwrap_or_else(|_| "postgresql".to_string()),
                env::var("DB_USER").ok()?,
                env::var("DB_PASSWORD").ok()?,
                env::var("DB_HOST").ok()?,
                env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string()),
                env::var("DB_NAME").ok()?,
            ))
        });

        let base_dir = env::var("REVANCHAS_BASE_DIR").map_or_else(|_| PathBuf::from("."), PathBuf::from);

        let uploaded_by = env::var("REVANCHAS_USER_ID")
            .ok()
            .map(|id| id.trim().parse::<i32>())
            .transpose()
            .context("REVANCHAS_USER_ID must be an integer")?;

        let pause_ms = env::var("REVANCHAS_PAUSE_MS")
            .ok()
            .map(|ms| ms.trim().parse::<u64>())
            .transpose()
            .context("REVANCHAS_PAUSE_MS must be a number of milliseconds")?
            .unwrap_or(DEFAULT_PAUSE_MS);

        let wall_names = env::var("REVANCHAS_WALLS").unwrap_or_else(|_| DEFAULT_WALLS.to_string());
        let layouts = match env::var("REVANCHAS_LAYOUTS") {
            Ok(path) => load_wall_layouts(Path::new(&path))?,
            Err(_) => BTreeMap::new(),
        };

        Ok(Config {
            db_url,
            base_dir,
            walls: build_walls(&wall_names, &layouts),
            uploaded_by,
            pause: Duration::from_millis(pause_ms),
        })
    }

    /// Keep only the named walls, in the given order
    pub fn select_walls(&mut self, names: &[String]) -> Result<()> {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let wall = self
                .walls
                .iter()
                .find(|wall| wall.name.eq_ignore_ascii_case(name))
                .cloned()
                .unwrap_or_else(|| WallConfig::detected(name));
            selected.push(wall);
        }
        if selected.is_empty() {
            return Err(anyhow!("No walls selected"));
        }
        self.walls = selected;
        Ok(())
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            db_url: None,
            base_dir: PathBuf::from("."),
            walls: build_walls(DEFAULT_WALLS, &BTreeMap::new()),
            uploaded_by: Some(3),
            pause: Duration::ZERO,
        }
    }
}

fn build_walls(
    names: &str,
    layouts: &BTreeMap<String, (WallLayout, SectorResolution)>,
) -> Vec<WallConfig> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| match layouts.get(&name.to_lowercase()) {
            Some((layout, sectors)) => WallConfig {
                name: name.to_string(),
                layout: layout.clone(),
                sectors: sectors.clone(),
            },
            None => WallConfig::detected(name),
        })
        .collect()
}
