//! Parsed-genre records and the derived taxonomy.

use serde::{Deserialize, Serialize};

/// Role a genre name plays within an album's parsed genre set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenreKind {
    Main,
    Modifier,
    Related,
}

impl GenreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenreKind::Main => "main",
            GenreKind::Modifier => "modifier",
            GenreKind::Related => "related",
        }
    }
}

/// Temporal qualifier attached to a genre ("Doom Metal (early)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenrePeriod {
    Early,
    Mid,
    Later,
}

impl GenrePeriod {
    /// Maps the qualifier vocabulary the archive uses onto the three periods.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "early" => Some(GenrePeriod::Early),
            "mid" | "middle" => Some(GenrePeriod::Mid),
            "later" | "late" | "now" | "current" | "recent" => Some(GenrePeriod::Later),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenrePeriod::Early => "early",
            GenrePeriod::Mid => "mid",
            GenrePeriod::Later => "later",
        }
    }
}

/// Structured result of parsing one genre segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedGenre {
    /// Primary genre, e.g. "Black Metal". Empty when the segment only named
    /// related non-metal genres.
    pub main: String,
    pub modifiers: Vec<String>,
    pub related: Vec<String>,
    pub period: Option<GenrePeriod>,
    /// Parsing confidence in [0, 1].
    pub confidence: f64,
}

/// One persisted `parsed_genres` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParsedGenreRow {
    pub genre_name: String,
    pub genre_type: String,
    pub confidence: f64,
    pub period: Option<String>,
}

impl ParsedGenreRow {
    pub fn new(
        name: impl Into<String>,
        kind: GenreKind,
        confidence: f64,
        period: Option<GenrePeriod>,
    ) -> Self {
        Self {
            genre_name: name.into(),
            genre_type: kind.as_str().to_string(),
            confidence,
            period: period.map(|p| p.as_str().to_string()),
        }
    }
}

/// Taxonomy entry, unique per genre name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GenreTaxonomyEntry {
    pub genre_name: String,
    pub normalized_name: String,
    pub parent_genre: Option<String>,
    /// 'base', 'modifier' or 'style'.
    pub genre_category: String,
    /// JSON array of alternative names.
    pub aliases: sqlx::types::Json<Vec<String>>,
    pub color_hex: Option<String>,
    #[sqlx(default)]
    pub album_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_vocabulary_maps_to_three_buckets() {
        assert_eq!(GenrePeriod::parse("early"), Some(GenrePeriod::Early));
        assert_eq!(GenrePeriod::parse("middle"), Some(GenrePeriod::Mid));
        assert_eq!(GenrePeriod::parse("late"), Some(GenrePeriod::Later));
        assert_eq!(GenrePeriod::parse("now"), Some(GenrePeriod::Later));
        assert_eq!(GenrePeriod::parse("sometimes"), None);
    }
}
