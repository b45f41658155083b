//! Album, track and band-fact records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Release type as reported by the archive. Stored as its canonical string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReleaseType {
    FullLength,
    Ep,
    Single,
    Demo,
    Compilation,
    Live,
    Split,
    BoxedSet,
    Other(String),
}

impl ReleaseType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "full-length" | "full length" => ReleaseType::FullLength,
            "ep" => ReleaseType::Ep,
            "single" => ReleaseType::Single,
            "demo" => ReleaseType::Demo,
            "compilation" => ReleaseType::Compilation,
            "live album" | "live" => ReleaseType::Live,
            "split" => ReleaseType::Split,
            "boxed set" => ReleaseType::BoxedSet,
            _ => ReleaseType::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReleaseType::FullLength => "Full-length",
            ReleaseType::Ep => "EP",
            ReleaseType::Single => "Single",
            ReleaseType::Demo => "Demo",
            ReleaseType::Compilation => "Compilation",
            ReleaseType::Live => "Live album",
            ReleaseType::Split => "Split",
            ReleaseType::BoxedSet => "Boxed set",
            ReleaseType::Other(raw) => raw,
        }
    }
}

impl From<String> for ReleaseType {
    fn from(raw: String) -> Self {
        ReleaseType::parse(&raw)
    }
}

impl From<ReleaseType> for String {
    fn from(value: ReleaseType) -> Self {
        value.as_str().to_string()
    }
}

/// One tracklist entry. Track numbers stay free-form strings (the archive
/// uses "1.", disc-prefixed numbers and similar).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Track {
    #[serde(alias = "track_number")]
    pub number: String,
    #[serde(alias = "track_name")]
    pub name: String,
    #[serde(default, alias = "track_length")]
    pub length: String,
    #[serde(default)]
    pub lyrics_url: Option<String>,
}

/// Band facts scraped from the band page and denormalized onto each album.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandFacts {
    #[serde(default)]
    pub country_of_origin: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub themes: String,
    #[serde(default)]
    pub current_label: String,
    #[serde(default)]
    pub years_active: String,
}

/// Canonical per-platform landing URLs collected from the band's related
/// links. All seven platforms are stored; UI visibility is a settings concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUrls {
    pub bandcamp_url: Option<String>,
    pub youtube_url: Option<String>,
    pub spotify_url: Option<String>,
    pub discogs_url: Option<String>,
    pub lastfm_url: Option<String>,
    pub soundcloud_url: Option<String>,
    pub tidal_url: Option<String>,
}

/// Fully-enriched album as produced by the scraper and persisted by the
/// orchestrator. Also the record shape of the `albums_{DD-MM-YYYY}.json`
/// artifact (band facts flattened).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub album_id: String,
    pub album_name: String,
    pub album_url: String,
    pub band_name: String,
    pub band_id: String,
    pub band_url: String,
    pub release_date: NaiveDate,
    pub release_date_raw: String,
    #[serde(rename = "type")]
    pub release_type: ReleaseType,
    pub cover_art: Option<String>,
    pub cover_path: Option<String>,
    #[serde(flatten)]
    pub platform_urls: PlatformUrls,
    #[serde(flatten)]
    pub band_facts: BandFacts,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub tracklist: Vec<Track>,
}

/// Album row as read back from the store, including verification state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Album {
    pub album_id: String,
    pub album_name: String,
    pub album_url: String,
    pub band_name: String,
    pub band_id: String,
    pub band_url: String,
    pub release_date: NaiveDate,
    pub release_date_raw: String,
    pub release_type: String,
    pub cover_art: Option<String>,
    pub cover_path: Option<String>,

    pub bandcamp_url: Option<String>,
    pub youtube_url: Option<String>,
    pub spotify_url: Option<String>,
    pub discogs_url: Option<String>,
    pub lastfm_url: Option<String>,
    pub soundcloud_url: Option<String>,
    pub tidal_url: Option<String>,

    pub youtube_embed_url: Option<String>,
    pub youtube_verified_title: Option<String>,
    pub youtube_verification_score: Option<i64>,
    pub youtube_embed_type: Option<String>,
    pub bandcamp_embed_url: Option<String>,
    pub bandcamp_verified_title: Option<String>,
    pub bandcamp_verification_score: Option<i64>,
    pub bandcamp_embed_code: Option<String>,
    pub playable_verified: bool,
    pub playable_verification_date: Option<DateTime<Utc>>,

    pub country_of_origin: String,
    pub location: String,
    pub genre: String,
    pub themes: String,
    pub current_label: String,
    pub years_active: String,

    pub details: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,

    #[sqlx(skip)]
    #[serde(default)]
    pub tracklist: Vec<Track>,
}

/// A verified embed for one platform, as produced by the verifier and
/// persisted onto the album row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedEmbed {
    pub embed_url: String,
    pub matched_title: String,
    /// Fuzzy match score, 0-100.
    pub match_score: i64,
    pub embed_kind: crate::models::playlist::EmbedKind,
    /// Full embed HTML when the platform exposes one (bandcamp share widget).
    pub embed_code: Option<String>,
}

/// Slim album projection used by the dynamic-playlist query.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlayableAlbum {
    pub album_id: String,
    pub album_name: String,
    pub band_name: String,
    pub release_type: String,
    pub release_date: NaiveDate,
    pub cover_art: Option<String>,
    pub cover_path: Option<String>,
    pub youtube_embed_url: Option<String>,
    pub youtube_verified_title: Option<String>,
    pub youtube_verification_score: Option<i64>,
    pub youtube_embed_type: Option<String>,
    pub bandcamp_embed_url: Option<String>,
    pub bandcamp_verified_title: Option<String>,
    pub bandcamp_verification_score: Option<i64>,
    pub playable_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_type_round_trips_known_values() {
        assert_eq!(ReleaseType::parse("Full-length"), ReleaseType::FullLength);
        assert_eq!(ReleaseType::parse("EP"), ReleaseType::Ep);
        assert_eq!(ReleaseType::parse("ep"), ReleaseType::Ep);
        assert_eq!(ReleaseType::FullLength.as_str(), "Full-length");
    }

    #[test]
    fn release_type_preserves_unknown_values() {
        let parsed = ReleaseType::parse("Demo / Rehearsal");
        assert_eq!(parsed.as_str(), "Demo / Rehearsal");
    }

    #[test]
    fn album_record_serializes_band_facts_flat() {
        let record = AlbumRecord {
            album_id: "123".into(),
            album_name: "Test".into(),
            album_url: String::new(),
            band_name: "Band".into(),
            band_id: "9".into(),
            band_url: String::new(),
            release_date: NaiveDate::from_ymd_opt(2025, 10, 7).unwrap(),
            release_date_raw: "October 7th, 2025".into(),
            release_type: ReleaseType::FullLength,
            cover_art: None,
            cover_path: None,
            platform_urls: PlatformUrls::default(),
            band_facts: BandFacts {
                country_of_origin: "Finland".into(),
                ..Default::default()
            },
            details: serde_json::json!({}),
            tracklist: vec![],
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["country_of_origin"], "Finland");
        assert_eq!(value["type"], "Full-length");
        assert!(value.get("band_facts").is_none());
    }
}
