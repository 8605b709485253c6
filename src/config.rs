use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root directory that scans walk for photos.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumb_cache_path")]
    pub path: PathBuf,

    /// JPEG quality for encoded thumbnails (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Worker threads per batch.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Photos per queued batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Thumbnail upserts committed per transaction.
    #[serde(default = "default_commit_batch_size")]
    pub commit_batch_size: usize,

    /// Photos between job payload refreshes (currentFile etc.).
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Delay before each batch so interactive regenerations are not
    /// starved of CPU and disk bandwidth.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fotovault")
        .join("fotovault.db")
}

fn default_source_dir() -> PathBuf {
    dirs::picture_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "tiff".to_string(),
        "tif".to_string(),
        "heic".to_string(),
        "heif".to_string(),
        "cr2".to_string(),
        "nef".to_string(),
        "arw".to_string(),
        "dng".to_string(),
        "raf".to_string(),
    ]
}

fn default_thumb_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("fotovault/thumbnails")
}

fn default_jpeg_quality() -> u8 {
    95
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    40
}

fn default_commit_batch_size() -> usize {
    10
}

fn default_progress_interval() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    500
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            image_extensions: default_image_extensions(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            path: default_thumb_cache_path(),
            jpeg_quality: default_jpeg_quality(),
            workers: default_workers(),
            batch_size: default_batch_size(),
            commit_batch_size: default_commit_batch_size(),
            progress_interval: default_progress_interval(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            library: LibraryConfig::default(),
            thumbnails: ThumbnailConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fotovault")
            .join("config.toml")
    }
}
