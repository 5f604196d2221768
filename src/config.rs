use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const CONFIG_DIR_NAME: &str = "imgcull";
const CONFIG_FILE_NAME: &str = "imgcull.conf";
const SECTIONS: [&str; 5] = ["cull", "scan", "thumbnails", "workers", "logging"];

pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 100;
pub const MAX_WORKER_THREADS: usize = 8;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CullConfig {
    /// Move files to the OS trash. `false` deletes them permanently.
    pub use_trash: bool,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self { use_trash: true }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ScanConfig {
    /// Lowercase extensions to accept. Empty accepts every format the
    /// decoder can read.
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ThumbnailConfig {
    pub height: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { height: DEFAULT_THUMBNAIL_HEIGHT }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct WorkerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    /// Log file used by the terminal UI. Defaults to the cache dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub cull: CullConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("No config dir found")?;
        Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Reads the config at `path`. A missing file is created with defaults;
    /// a file missing whole sections gets them written back.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file does not exist, creating new one at {:?}", path);
            let cfg = Config::default();
            cfg.write_to(path)?;
            return Ok(cfg);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        debug!("Loading config from {:?}", path);
        let cfg: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {:?}. Format might have changed.", path))?;

        let raw_value: toml::Table = toml::from_str(&content).unwrap_or_default();
        let missing: Vec<&str> = SECTIONS.iter().copied().filter(|s| !raw_value.contains_key(*s)).collect();
        if !missing.is_empty() {
            info!("Writing back defaults for missing sections {:?}", missing);
            cfg.write_to(path)?;
        }
        Ok(cfg)
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir {:?}", parent))?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_str).with_context(|| format!("Failed to write config {:?}", path))?;
        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.workers.threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
            .clamp(1, MAX_WORKER_THREADS)
    }

    pub fn thumbnail_height(&self) -> u32 {
        self.thumbnails.height.max(1)
    }
}
