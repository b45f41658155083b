//! Settings records and the typed views over them.
//!
//! Settings are stored as JSON values keyed by name, grouped by category.
//! Components read them through the catalog store at task boundaries; the
//! cache and download manager additionally expose `update_*` methods so a
//! settings write takes effect immediately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: sqlx::types::Json<serde_json::Value>,
    pub category: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Setting categories.
pub mod category {
    pub const GENERAL: &str = "general";
    pub const PLATFORM_LINKS: &str = "platform_links";
    pub const CACHE: &str = "cache";
    pub const PLAYER: &str = "player";
}

/// Audio cache and download tunables, hot-reloadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub youtube_cache_max_size_gb: f64,
    pub youtube_parallel_downloads: u32,
    pub youtube_download_timeout: u64,
    pub youtube_post_scrape_downloads: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            youtube_cache_max_size_gb: 5.0,
            youtube_parallel_downloads: 3,
            youtube_download_timeout: 300,
            youtube_post_scrape_downloads: 2,
        }
    }
}

impl CacheSettings {
    pub fn validate(&self) -> Result<()> {
        if self.youtube_cache_max_size_gb <= 0.0 || self.youtube_cache_max_size_gb > 100.0 {
            return Err(AppError::invalid_input(
                "youtube_cache_max_size_gb must be in (0, 100]",
            ));
        }
        if !(1..=10).contains(&self.youtube_parallel_downloads) {
            return Err(AppError::invalid_input(
                "youtube_parallel_downloads must be between 1 and 10",
            ));
        }
        if !(60..=600).contains(&self.youtube_download_timeout) {
            return Err(AppError::invalid_input(
                "youtube_download_timeout must be between 60 and 600 seconds",
            ));
        }
        if !(1..=10).contains(&self.youtube_post_scrape_downloads) {
            return Err(AppError::invalid_input(
                "youtube_post_scrape_downloads must be between 1 and 10",
            ));
        }
        Ok(())
    }

    pub fn max_size_bytes(&self) -> u64 {
        (self.youtube_cache_max_size_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }
}

/// Player switches gating dynamic-playlist composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub player_youtube_enabled: bool,
    pub player_bandcamp_enabled: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            player_youtube_enabled: true,
            player_bandcamp_enabled: true,
        }
    }
}

/// UI visibility flags for the stored platform links. The catalog keeps all
/// seven regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLinkSettings {
    pub platform_link_visible_bandcamp: bool,
    pub platform_link_visible_youtube: bool,
    pub platform_link_visible_spotify: bool,
    pub platform_link_visible_discogs: bool,
    pub platform_link_visible_lastfm: bool,
    pub platform_link_visible_soundcloud: bool,
    pub platform_link_visible_tidal: bool,
}

impl Default for PlatformLinkSettings {
    fn default() -> Self {
        Self {
            platform_link_visible_bandcamp: true,
            platform_link_visible_youtube: true,
            platform_link_visible_spotify: true,
            platform_link_visible_discogs: true,
            platform_link_visible_lastfm: true,
            platform_link_visible_soundcloud: true,
            platform_link_visible_tidal: true,
        }
    }
}

/// Scraper pacing and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperSettings {
    pub request_delay_seconds: f64,
    pub request_timeout_seconds: u64,
    pub page_size: u32,
    pub max_retries: u32,
    pub retry_base_seconds: u64,
    pub cloudflare_max_wait_seconds: u64,
    pub cloudflare_retries: u32,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            request_delay_seconds: 3.0,
            request_timeout_seconds: 45,
            page_size: 200,
            max_retries: 7,
            retry_base_seconds: 10,
            cloudflare_max_wait_seconds: 30,
            cloudflare_retries: 3,
        }
    }
}

impl ScraperSettings {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > 200 {
            return Err(AppError::invalid_input("page_size must be between 1 and 200"));
        }
        if self.request_delay_seconds < 0.0 {
            return Err(AppError::invalid_input(
                "request_delay_seconds must not be negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_settings_reject_out_of_range_values() {
        let mut settings = CacheSettings::default();
        assert!(settings.validate().is_ok());

        settings.youtube_cache_max_size_gb = 0.0;
        assert!(settings.validate().is_err());
        settings.youtube_cache_max_size_gb = 150.0;
        assert!(settings.validate().is_err());

        settings = CacheSettings {
            youtube_parallel_downloads: 11,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        settings = CacheSettings {
            youtube_download_timeout: 30,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn fractional_quota_converts_to_bytes() {
        let settings = CacheSettings {
            youtube_cache_max_size_gb: 2.5,
            ..Default::default()
        };
        assert_eq!(settings.max_size_bytes(), (2.5 * 1024.0 * 1024.0 * 1024.0) as u64);
    }

    #[test]
    fn page_size_is_capped_at_200() {
        let settings = ScraperSettings {
            page_size: 500,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
