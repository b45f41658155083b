//! Playlists and playlist items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Playback platform a playlist item points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Bandcamp,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Bandcamp => "bandcamp",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "youtube" => Some(Platform::Youtube),
            "bandcamp" => Some(Platform::Bandcamp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Failed => "failed",
        }
    }
}

/// Embed flavor for verified playable URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    Video,
    Playlist,
}

impl EmbedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedKind::Video => "video",
            EmbedKind::Playlist => "playlist",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub item_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(flatten)]
    pub summary: PlaylistSummary,
    pub items: Vec<PlaylistItem>,
}

/// Playlist item joined with the display columns of its album.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistItem {
    pub id: i64,
    pub album_id: String,
    pub track_number: Option<String>,
    pub platform: String,
    pub playable_url: Option<String>,
    pub position: i64,
    pub verification_status: String,
    pub verification_score: Option<i64>,
    pub verified_title: Option<String>,
    pub embed_type: Option<String>,
    pub album_name: String,
    pub band_name: String,
    pub cover_art: Option<String>,
    pub cover_path: Option<String>,
}

/// One entry of a dynamically-composed playlist; not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DynamicPlaylistEntry {
    pub album_id: String,
    pub album_name: String,
    pub band_name: String,
    pub release_type: String,
    pub cover_art: Option<String>,
    pub cover_path: Option<String>,
    pub platform: Platform,
    pub playable_url: String,
    pub verified_title: Option<String>,
    pub verification_score: Option<i64>,
    pub embed_type: Option<String>,
}

// Request payloads

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlaylistRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AddPlaylistItemRequest {
    pub album_id: String,
    pub platform: Platform,
    pub track_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderPlaylistRequest {
    /// Item ids in their new order; positions become 1..N.
    pub item_ids: Vec<i64>,
}
