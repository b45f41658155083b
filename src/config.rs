//! Application configuration.
//!
//! Static wiring (paths, listen address, source endpoints) comes from the
//! environment at startup. Hot-reloadable knobs (cache quota, download
//! parallelism, scraper pacing) live in the `settings` table and are read
//! through the catalog store instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Base URL of the archive site the scraper drives.
pub const ARCHIVE_BASE_URL: &str = "https://www.metal-archives.com";

/// User agents rotated per browser session.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Edg/118.0.2088.46",
];

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub archive: ArchiveConfig,
}

impl AppConfig {
    /// Load configuration from environment variables with local defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            storage: StorageConfig::from_env(),
            archive: ArchiveConfig::default(),
        })
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("not a valid port number: {}", raw),
            })?,
            Err(_) => 8000,
        };
        Ok(Self { host, port })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Filesystem layout: database, covers, audio cache, scrape artifacts.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub covers_dir: PathBuf,
    pub audio_cache_dir: PathBuf,
}

impl StorageConfig {
    fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let covers_dir = std::env::var("COVERS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("covers"));
        let audio_cache_dir = std::env::var("AUDIO_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("youtube_cache"));
        Self {
            data_dir,
            covers_dir,
            audio_cache_dir,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("albums.db")
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.database_path().display())
    }

    /// Intermediate scrape artifact for one run, `albums_{DD-MM-YYYY}.json`.
    pub fn scrape_artifact_path(&self, date: chrono::NaiveDate) -> PathBuf {
        self.data_dir
            .join(format!("albums_{}.json", date.format("%d-%m-%Y")))
    }
}

/// Source-site endpoints and browser defaults.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub base_url: String,
    pub headless: bool,
}

impl ArchiveConfig {
    pub fn search_url(&self) -> String {
        format!("{}/search/ajax-advanced/searching/albums", self.base_url)
    }

    pub fn band_links_url(&self, band_id: &str) -> String {
        format!("{}/link/ajax-list/type/band/id/{}", self.base_url, band_id)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: ARCHIVE_BASE_URL.to_string(),
            headless: std::env::var("HEADLESS")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_uses_day_month_year() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("data"),
            covers_dir: PathBuf::from("covers"),
            audio_cache_dir: PathBuf::from("youtube_cache"),
        };
        let date = chrono::NaiveDate::from_ymd_opt(2025, 10, 7).unwrap();
        assert_eq!(
            storage.scrape_artifact_path(date),
            PathBuf::from("data/albums_07-10-2025.json")
        );
    }

    #[test]
    fn band_links_endpoint_embeds_id() {
        let archive = ArchiveConfig::default();
        assert!(archive.band_links_url("115").ends_with("/type/band/id/115"));
    }
}
