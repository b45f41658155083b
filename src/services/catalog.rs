//! Catalog store: the single owner of all relational state.
//!
//! Every mutation runs inside one transaction and rolls back on error.
//! Query methods never write. All other components go through this type;
//! nothing else touches the pool directly.

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::Sqlite;
use sqlx::types::Json;
use sqlx::{QueryBuilder, SqlitePool};
use std::collections::HashMap;

use crate::error::{AppError, Result};
use crate::models::{
    Album, AlbumRecord, ParsedGenreRow, PlayableAlbum, Playlist, PlaylistItem, PlaylistSummary,
    Setting, Track, VerificationStatus, VerifiedEmbed,
};

/// Period grouping for date listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Day,
    Week,
    Month,
}

impl PeriodKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "day" => Ok(PeriodKind::Day),
            "week" => Ok(PeriodKind::Week),
            "month" => Ok(PeriodKind::Month),
            _ => Err(AppError::invalid_input(
                "Invalid view mode. Must be 'day', 'week', or 'month'",
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Day => "day",
            PeriodKind::Week => "week",
            PeriodKind::Month => "month",
        }
    }

    /// strftime pattern producing this kind's period key.
    fn key_pattern(&self) -> &'static str {
        match self {
            PeriodKind::Day => "%Y-%m-%d",
            PeriodKind::Week => "%Y-W%W",
            PeriodKind::Month => "%Y-%m",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DateSummary {
    pub release_date: NaiveDate,
    pub album_count: i64,
    pub genres: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PeriodGroup {
    pub period_key: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_type: String,
    pub album_count: i64,
    pub dates_count: i64,
    pub genres: Option<String>,
}

/// One page of albums for a period query.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumPage {
    pub albums: Vec<Album>,
    pub total: i64,
    pub period_key: String,
    pub period_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_albums: i64,
    pub total_tracks: i64,
    pub top_genres: Vec<LabelCount>,
    pub top_countries: Vec<LabelCount>,
    pub recent_dates: Vec<DateSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSummary {
    pub total_albums: i64,
    pub total_tracks: i64,
    pub dates_count: usize,
    pub dates_data: Vec<DateSummary>,
    pub database_size_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenreStatistics {
    pub total_genres: i64,
    pub total_parsed_genres: i64,
    pub top_genres: Vec<LabelCount>,
    pub type_distribution: HashMap<String, i64>,
    pub temporal_distribution: HashMap<String, i64>,
}

/// Filters shared by the period page and dynamic playlist queries.
#[derive(Debug, Clone, Default)]
pub struct AlbumFilter {
    pub genres: Vec<String>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Albums
    // ------------------------------------------------------------------

    /// Insert or replace an album and its tracks in one transaction. A
    /// replaced row loses its verification state (the verify step fills it
    /// again); `created_at` survives.
    pub async fn upsert_album(&self, record: &AlbumRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO albums (
                album_id, album_name, album_url, band_name, band_id, band_url,
                release_date, release_date_raw, release_type, cover_art, cover_path,
                bandcamp_url, youtube_url, spotify_url, discogs_url, lastfm_url,
                soundcloud_url, tidal_url, country_of_origin, location, genre,
                themes, current_label, years_active, details
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(album_id) DO UPDATE SET
                album_name = excluded.album_name,
                album_url = excluded.album_url,
                band_name = excluded.band_name,
                band_id = excluded.band_id,
                band_url = excluded.band_url,
                release_date = excluded.release_date,
                release_date_raw = excluded.release_date_raw,
                release_type = excluded.release_type,
                cover_art = excluded.cover_art,
                cover_path = excluded.cover_path,
                bandcamp_url = excluded.bandcamp_url,
                youtube_url = excluded.youtube_url,
                spotify_url = excluded.spotify_url,
                discogs_url = excluded.discogs_url,
                lastfm_url = excluded.lastfm_url,
                soundcloud_url = excluded.soundcloud_url,
                tidal_url = excluded.tidal_url,
                country_of_origin = excluded.country_of_origin,
                location = excluded.location,
                genre = excluded.genre,
                themes = excluded.themes,
                current_label = excluded.current_label,
                years_active = excluded.years_active,
                details = excluded.details,
                youtube_embed_url = NULL,
                youtube_verified_title = NULL,
                youtube_verification_score = NULL,
                youtube_embed_type = NULL,
                bandcamp_embed_url = NULL,
                bandcamp_verified_title = NULL,
                bandcamp_verification_score = NULL,
                bandcamp_embed_code = NULL,
                playable_verified = 0,
                playable_verification_date = NULL
            "#,
        )
        .bind(&record.album_id)
        .bind(&record.album_name)
        .bind(&record.album_url)
        .bind(&record.band_name)
        .bind(&record.band_id)
        .bind(&record.band_url)
        .bind(record.release_date)
        .bind(&record.release_date_raw)
        .bind(record.release_type.as_str())
        .bind(&record.cover_art)
        .bind(&record.cover_path)
        .bind(&record.platform_urls.bandcamp_url)
        .bind(&record.platform_urls.youtube_url)
        .bind(&record.platform_urls.spotify_url)
        .bind(&record.platform_urls.discogs_url)
        .bind(&record.platform_urls.lastfm_url)
        .bind(&record.platform_urls.soundcloud_url)
        .bind(&record.platform_urls.tidal_url)
        .bind(&record.band_facts.country_of_origin)
        .bind(&record.band_facts.location)
        .bind(&record.band_facts.genre)
        .bind(&record.band_facts.themes)
        .bind(&record.band_facts.current_label)
        .bind(&record.band_facts.years_active)
        .bind(Json(&record.details))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tracks WHERE album_id = ?")
            .bind(&record.album_id)
            .execute(&mut *tx)
            .await?;

        for track in &record.tracklist {
            sqlx::query(
                r#"
                INSERT INTO tracks (album_id, track_number, track_name, track_length, lyrics_url)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.album_id)
            .bind(&track.number)
            .bind(&track.name)
            .bind(&track.length)
            .bind(&track.lyrics_url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete all albums on one day, cascading tracks, parsed genres and
    /// playlist items. Returns the number of albums removed; 0 is not an
    /// error.
    pub async fn delete_albums_by_date(&self, day: NaiveDate) -> Result<u64> {
        self.delete_albums_by_range(day, day).await
    }

    pub async fn delete_albums_by_range(&self, start: NaiveDate, end: NaiveDate) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let album_ids: Vec<String> = sqlx::query_scalar(
            "SELECT album_id FROM albums WHERE release_date >= ? AND release_date <= ?",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&mut *tx)
        .await?;

        if album_ids.is_empty() {
            return Ok(0);
        }

        for table in ["playlist_items", "tracks", "parsed_genres"] {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("DELETE FROM {} WHERE album_id IN (", table));
            let mut separated = qb.separated(", ");
            for id in &album_ids {
                separated.push_bind(id);
            }
            qb.push(")");
            qb.build().execute(&mut *tx).await?;
        }

        let deleted = sqlx::query("DELETE FROM albums WHERE release_date >= ? AND release_date <= ?")
            .bind(start)
            .bind(end)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        tracing::info!(deleted, %start, %end, "Deleted albums for date range");
        Ok(deleted)
    }

    /// All release dates with album counts, newest first.
    pub async fn available_dates(&self) -> Result<Vec<DateSummary>> {
        let rows = sqlx::query_as::<_, DateSummary>(
            r#"
            SELECT
                release_date,
                COUNT(*) as album_count,
                GROUP_CONCAT(DISTINCT genre) as genres
            FROM albums
            GROUP BY release_date
            ORDER BY release_date DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Album counts aggregated per day, ISO-ish week (`YYYY-Www`) or month
    /// (`YYYY-MM`), with the date range each period covers.
    pub async fn grouped_dates(&self, kind: PeriodKind) -> Result<Vec<PeriodGroup>> {
        let rows = sqlx::query_as::<_, PeriodGroup>(&format!(
            r#"
            SELECT
                strftime('{pattern}', release_date) as period_key,
                MIN(release_date) as start_date,
                MAX(release_date) as end_date,
                '{kind}' as period_type,
                COUNT(*) as album_count,
                COUNT(DISTINCT release_date) as dates_count,
                GROUP_CONCAT(DISTINCT genre) as genres
            FROM albums
            GROUP BY strftime('{pattern}', release_date)
            ORDER BY period_key DESC
            "#,
            pattern = kind.key_pattern(),
            kind = kind.as_str(),
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn albums_by_date(&self, day: NaiveDate) -> Result<Vec<Album>> {
        let mut albums = sqlx::query_as::<_, Album>(
            "SELECT * FROM albums WHERE release_date = ? ORDER BY band_name, album_name",
        )
        .bind(day)
        .fetch_all(&self.pool)
        .await?;
        self.attach_tracklists(&mut albums).await?;
        Ok(albums)
    }

    pub async fn album_by_id(&self, album_id: &str) -> Result<Option<Album>> {
        let album = sqlx::query_as::<_, Album>("SELECT * FROM albums WHERE album_id = ?")
            .bind(album_id)
            .fetch_optional(&self.pool)
            .await?;
        match album {
            Some(mut album) => {
                album.tracklist = self.tracks_for_album(&album.album_id).await?;
                Ok(Some(album))
            }
            None => Ok(None),
        }
    }

    pub async fn album_exists_for_date(&self, day: NaiveDate) -> Result<bool> {
        Ok(self.album_count_for_date(day).await? > 0)
    }

    pub async fn album_count_for_date(&self, day: NaiveDate) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM albums WHERE release_date = ?")
            .bind(day)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Public period resolution for callers composing their own queries
    /// (the dynamic-playlist endpoint).
    pub async fn resolve_period(
        &self,
        kind: PeriodKind,
        key: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>> {
        self.period_range(kind, key).await
    }

    /// Resolve a period key to its inclusive date range. Day keys parse
    /// directly; week and month keys resolve against stored dates.
    async fn period_range(
        &self,
        kind: PeriodKind,
        key: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>> {
        if let PeriodKind::Day = kind {
            let day = NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .map_err(|_| AppError::invalid_input(format!("Invalid day key: {}", key)))?;
            return Ok(Some((day, day)));
        }

        let range: Option<(Option<NaiveDate>, Option<NaiveDate>)> = sqlx::query_as(&format!(
            "SELECT MIN(release_date), MAX(release_date) FROM albums WHERE strftime('{}', release_date) = ?",
            kind.key_pattern(),
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match range {
            Some((Some(start), Some(end))) => Some((start, end)),
            _ => None,
        })
    }

    /// One page of albums for a period, with genre/search filters applied.
    /// Ordering is stable: release date descending, then band, then album.
    pub async fn albums_by_period(
        &self,
        kind: PeriodKind,
        key: &str,
        offset: i64,
        limit: i64,
        filter: &AlbumFilter,
    ) -> Result<AlbumPage> {
        let Some((start, end)) = self.period_range(kind, key).await? else {
            return Ok(AlbumPage {
                albums: vec![],
                total: 0,
                period_key: key.to_string(),
                period_type: kind.as_str().to_string(),
                start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                limit,
                offset,
                has_more: false,
            });
        };

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM albums");
        Self::push_album_filters(&mut count_qb, start, end, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM albums");
        Self::push_album_filters(&mut qb, start, end, filter);
        qb.push(" ORDER BY release_date DESC, band_name, album_name LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let mut albums: Vec<Album> = qb.build_query_as().fetch_all(&self.pool).await?;
        self.attach_tracklists(&mut albums).await?;

        let fetched = albums.len() as i64;
        Ok(AlbumPage {
            albums,
            total,
            period_key: key.to_string(),
            period_type: kind.as_str().to_string(),
            start_date: start,
            end_date: end,
            limit,
            offset,
            has_more: offset + fetched < total,
        })
    }

    fn push_album_filters(
        qb: &mut QueryBuilder<'_, Sqlite>,
        start: NaiveDate,
        end: NaiveDate,
        filter: &AlbumFilter,
    ) {
        qb.push(" WHERE release_date >= ")
            .push_bind(start)
            .push(" AND release_date <= ")
            .push_bind(end);

        if !filter.genres.is_empty() {
            qb.push(" AND (");
            for (i, genre) in filter.genres.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("genre LIKE ").push_bind(format!("%{}%", genre));
            }
            qb.push(")");
        }

        if let Some(search) = filter.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                let pattern = format!("%{}%", search);
                qb.push(" AND (album_name LIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR band_name LIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR genre LIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }
    }

    /// Free-text search over album, band and country with tracklists.
    pub async fn search_albums(
        &self,
        query: Option<&str>,
        genre: Option<&str>,
        country: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Album>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM albums WHERE 1=1");
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", q);
            qb.push(" AND (album_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR band_name LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(genre) = genre {
            qb.push(" AND genre LIKE ").push_bind(format!("%{}%", genre));
        }
        if let Some(country) = country {
            qb.push(" AND country_of_origin LIKE ")
                .push_bind(format!("%{}%", country));
        }
        qb.push(" ORDER BY release_date DESC, band_name, album_name LIMIT ")
            .push_bind(limit);

        let mut albums: Vec<Album> = qb.build_query_as().fetch_all(&self.pool).await?;
        self.attach_tracklists(&mut albums).await?;
        Ok(albums)
    }

    pub async fn database_stats(&self) -> Result<DatabaseStats> {
        let total_albums: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM albums")
            .fetch_one(&self.pool)
            .await?;
        let total_tracks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.pool)
            .await?;

        let top_genres: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT genre, COUNT(*) FROM albums
            WHERE genre != ''
            GROUP BY genre ORDER BY COUNT(*) DESC LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let top_countries: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT country_of_origin, COUNT(*) FROM albums
            WHERE country_of_origin != ''
            GROUP BY country_of_origin ORDER BY COUNT(*) DESC LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let recent_dates = sqlx::query_as::<_, DateSummary>(
            r#"
            SELECT release_date, COUNT(*) as album_count,
                   GROUP_CONCAT(DISTINCT genre) as genres
            FROM albums
            GROUP BY release_date ORDER BY release_date DESC LIMIT 5
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(DatabaseStats {
            total_albums,
            total_tracks,
            top_genres: top_genres
                .into_iter()
                .map(|(label, count)| LabelCount { label, count })
                .collect(),
            top_countries: top_countries
                .into_iter()
                .map(|(label, count)| LabelCount { label, count })
                .collect(),
            recent_dates,
        })
    }

    /// Admin-facing summary: totals, per-date counts and on-disk size.
    pub async fn data_summary(&self) -> Result<DataSummary> {
        let total_albums: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM albums")
            .fetch_one(&self.pool)
            .await?;
        let total_tracks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.pool)
            .await?;
        let dates_data = self.available_dates().await?;
        let database_size_bytes: i64 = sqlx::query_scalar(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DataSummary {
            total_albums,
            total_tracks,
            dates_count: dates_data.len(),
            dates_data,
            database_size_bytes,
        })
    }

    async fn tracks_for_album(&self, album_id: &str) -> Result<Vec<Track>> {
        let tracks = sqlx::query_as::<_, Track>(
            r#"
            SELECT track_number as number, track_name as name,
                   track_length as length, lyrics_url
            FROM tracks
            WHERE album_id = ?
            ORDER BY CAST(track_number AS INTEGER)
            "#,
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tracks)
    }

    async fn attach_tracklists(&self, albums: &mut [Album]) -> Result<()> {
        for album in albums.iter_mut() {
            album.tracklist = self.tracks_for_album(&album.album_id).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Verification state
    // ------------------------------------------------------------------

    /// Persist verified embeds for an album. `playable_verified` is set only
    /// when at least one platform matched.
    pub async fn update_album_playable_urls(
        &self,
        album_id: &str,
        youtube: Option<&VerifiedEmbed>,
        bandcamp: Option<&VerifiedEmbed>,
    ) -> Result<bool> {
        if youtube.is_none() && bandcamp.is_none() {
            return Ok(false);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE albums SET ");

        if let Some(embed) = youtube {
            qb.push("youtube_embed_url = ").push_bind(&embed.embed_url);
            qb.push(", youtube_verified_title = ").push_bind(&embed.matched_title);
            qb.push(", youtube_verification_score = ").push_bind(embed.match_score);
            qb.push(", youtube_embed_type = ").push_bind(embed.embed_kind.as_str());
        }
        if let Some(embed) = bandcamp {
            if youtube.is_some() {
                qb.push(", ");
            }
            qb.push("bandcamp_embed_url = ").push_bind(&embed.embed_url);
            qb.push(", bandcamp_verified_title = ").push_bind(&embed.matched_title);
            qb.push(", bandcamp_verification_score = ").push_bind(embed.match_score);
            qb.push(", bandcamp_embed_code = ")
                .push_bind(embed.embed_code.as_deref().unwrap_or(""));
        }

        qb.push(", playable_verified = 1, playable_verification_date = ")
            .push_bind(Utc::now());
        qb.push(" WHERE album_id = ").push_bind(album_id);

        let affected = qb.build().execute(&self.pool).await?.rows_affected();
        Ok(affected > 0)
    }

    /// Albums in a date range that still lack verified playable URLs.
    pub async fn albums_pending_verification(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Album>> {
        let albums = sqlx::query_as::<_, Album>(
            r#"
            SELECT * FROM albums
            WHERE release_date >= ? AND release_date <= ?
              AND playable_verified = 0
            ORDER BY band_name, album_name
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(albums)
    }

    // ------------------------------------------------------------------
    // Parsed genres, taxonomy, stats
    // ------------------------------------------------------------------

    /// Atomically replace the parsed genres of one album.
    pub async fn insert_parsed_genres(
        &self,
        album_id: &str,
        rows: &[ParsedGenreRow],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM parsed_genres WHERE album_id = ?")
            .bind(album_id)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO parsed_genres (album_id, genre_name, genre_type, confidence, period)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(album_id)
            .bind(&row.genre_name)
            .bind(&row.genre_type)
            .bind(row.confidence)
            .bind(&row.period)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn parsed_genres_for_album(&self, album_id: &str) -> Result<Vec<ParsedGenreRow>> {
        let rows = sqlx::query_as::<_, ParsedGenreRow>(
            r#"
            SELECT genre_name, genre_type, confidence, period
            FROM parsed_genres
            WHERE album_id = ?
            ORDER BY confidence DESC, genre_type
            "#,
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn upsert_genre_taxonomy(
        &self,
        genre_name: &str,
        normalized_name: &str,
        category: &str,
        parent_genre: Option<&str>,
        aliases: &[String],
        color_hex: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO genre_taxonomy
                (genre_name, normalized_name, parent_genre, genre_category, aliases, color_hex)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(genre_name)
        .bind(normalized_name)
        .bind(parent_genre)
        .bind(category)
        .bind(Json(aliases))
        .bind(color_hex)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recompute `genre_stats` wholesale from parsed genres joined to albums.
    pub async fn recompute_genre_stats(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM genre_stats").execute(&mut *tx).await?;
        sqlx::query(
            r#"
            INSERT INTO genre_stats (genre_name, album_count, date_range_start, date_range_end)
            SELECT
                pg.genre_name,
                COUNT(DISTINCT pg.album_id),
                MIN(a.release_date),
                MAX(a.release_date)
            FROM parsed_genres pg
            JOIN albums a ON pg.album_id = a.album_id
            GROUP BY pg.genre_name
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!("Genre statistics recomputed");
        Ok(())
    }

    pub async fn all_genres(
        &self,
        category: Option<&str>,
        limit: i64,
    ) -> Result<Vec<crate::models::GenreTaxonomyEntry>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT gt.genre_name, gt.normalized_name, gt.parent_genre, gt.genre_category,
                   gt.aliases, gt.color_hex, COALESCE(gs.album_count, 0) as album_count
            FROM genre_taxonomy gt
            LEFT JOIN genre_stats gs ON gt.genre_name = gs.genre_name
            "#,
        );
        if let Some(category) = category {
            qb.push(" WHERE gt.genre_category = ").push_bind(category);
        }
        qb.push(" ORDER BY album_count DESC, gt.genre_name LIMIT ")
            .push_bind(limit);

        let rows = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn search_genres(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<crate::models::GenreTaxonomyEntry>> {
        let pattern = format!("%{}%", query);
        let prefix = format!("{}%", query);
        let rows = sqlx::query_as::<_, crate::models::GenreTaxonomyEntry>(
            r#"
            SELECT gt.genre_name, gt.normalized_name, gt.parent_genre, gt.genre_category,
                   gt.aliases, gt.color_hex, COALESCE(gs.album_count, 0) as album_count
            FROM genre_taxonomy gt
            LEFT JOIN genre_stats gs ON gt.genre_name = gs.genre_name
            WHERE gt.genre_name LIKE ? OR gt.normalized_name LIKE ? OR gt.aliases LIKE ?
            ORDER BY
                CASE
                    WHEN gt.genre_name = ? THEN 1
                    WHEN gt.genre_name LIKE ? THEN 2
                    ELSE 3
                END,
                album_count DESC
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(query)
        .bind(&prefix)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn albums_by_genre(
        &self,
        genre_name: &str,
        date: Option<NaiveDate>,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Album>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT DISTINCT a.* FROM albums a
            JOIN parsed_genres pg ON a.album_id = pg.album_id
            WHERE pg.genre_name = "#,
        );
        qb.push_bind(genre_name);
        if let Some(day) = date {
            qb.push(" AND a.release_date = ").push_bind(day);
        } else {
            if let Some(from) = date_from {
                qb.push(" AND a.release_date >= ").push_bind(from);
            }
            if let Some(to) = date_to {
                qb.push(" AND a.release_date <= ").push_bind(to);
            }
        }
        qb.push(" ORDER BY a.release_date DESC, a.band_name, a.album_name LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let mut albums: Vec<Album> = qb.build_query_as().fetch_all(&self.pool).await?;
        self.attach_tracklists(&mut albums).await?;
        Ok(albums)
    }

    pub async fn genre_statistics(&self) -> Result<GenreStatistics> {
        let total_genres: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM genre_taxonomy")
            .fetch_one(&self.pool)
            .await?;
        let total_parsed_genres: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT genre_name) FROM parsed_genres")
                .fetch_one(&self.pool)
                .await?;

        let top_genres: Vec<(String, i64)> = sqlx::query_as(
            "SELECT genre_name, album_count FROM genre_stats ORDER BY album_count DESC LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await?;

        let type_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT genre_type, COUNT(*) FROM parsed_genres GROUP BY genre_type")
                .fetch_all(&self.pool)
                .await?;
        let temporal_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT period, COUNT(*) FROM parsed_genres WHERE period IS NOT NULL GROUP BY period",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(GenreStatistics {
            total_genres,
            total_parsed_genres,
            top_genres: top_genres
                .into_iter()
                .map(|(label, count)| LabelCount { label, count })
                .collect(),
            type_distribution: type_rows.into_iter().collect(),
            temporal_distribution: temporal_rows.into_iter().collect(),
        })
    }

    // ------------------------------------------------------------------
    // Dynamic playlist source
    // ------------------------------------------------------------------

    /// Albums feeding the dynamic-playlist endpoint. With `only_playable`
    /// set, restricts to verified albums that carry at least one embed.
    pub async fn albums_for_playlist(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: &AlbumFilter,
        only_playable: bool,
    ) -> Result<Vec<PlayableAlbum>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT album_id, album_name, band_name, release_type, release_date,
                   cover_art, cover_path,
                   youtube_embed_url, youtube_verified_title,
                   youtube_verification_score, youtube_embed_type,
                   bandcamp_embed_url, bandcamp_verified_title,
                   bandcamp_verification_score, playable_verified
            FROM albums
            "#,
        );
        Self::push_album_filters(&mut qb, start, end, filter);
        if only_playable {
            qb.push(
                " AND playable_verified = 1 AND (youtube_embed_url IS NOT NULL OR bandcamp_embed_url IS NOT NULL)",
            );
        }
        qb.push(" ORDER BY release_date DESC, band_name ASC");

        let albums = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(albums)
    }

    // ------------------------------------------------------------------
    // Playlists
    // ------------------------------------------------------------------

    pub async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
        is_public: bool,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO playlists (name, description, is_public) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(is_public)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let rows = sqlx::query_as::<_, PlaylistSummary>(
            r#"
            SELECT p.id, p.name, p.description, p.is_public, p.created_at, p.updated_at,
                   COUNT(pi.id) as item_count
            FROM playlists p
            LEFT JOIN playlist_items pi ON p.id = pi.playlist_id
            GROUP BY p.id
            ORDER BY p.updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_playlist(&self, playlist_id: i64) -> Result<Option<Playlist>> {
        let summary = sqlx::query_as::<_, PlaylistSummary>(
            r#"
            SELECT p.id, p.name, p.description, p.is_public, p.created_at, p.updated_at,
                   (SELECT COUNT(*) FROM playlist_items WHERE playlist_id = p.id) as item_count
            FROM playlists p WHERE p.id = ?
            "#,
        )
        .bind(playlist_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(summary) = summary else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, PlaylistItem>(
            r#"
            SELECT pi.id, pi.album_id, pi.track_number, pi.platform, pi.playable_url,
                   pi.position, pi.verification_status, pi.verification_score,
                   pi.verified_title, pi.embed_type,
                   a.album_name, a.band_name, a.cover_art, a.cover_path
            FROM playlist_items pi
            JOIN albums a ON pi.album_id = a.album_id
            WHERE pi.playlist_id = ?
            ORDER BY pi.position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Playlist { summary, items }))
    }

    pub async fn update_playlist(
        &self,
        playlist_id: i64,
        name: Option<&str>,
        description: Option<&str>,
        is_public: Option<bool>,
    ) -> Result<bool> {
        if name.is_none() && description.is_none() && is_public.is_none() {
            return Ok(false);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE playlists SET ");
        let mut first = true;
        if let Some(name) = name {
            qb.push("name = ").push_bind(name);
            first = false;
        }
        if let Some(description) = description {
            if !first {
                qb.push(", ");
            }
            qb.push("description = ").push_bind(description);
            first = false;
        }
        if let Some(is_public) = is_public {
            if !first {
                qb.push(", ");
            }
            qb.push("is_public = ").push_bind(is_public);
        }
        qb.push(", updated_at = ").push_bind(Utc::now());
        qb.push(" WHERE id = ").push_bind(playlist_id);

        let affected = qb.build().execute(&self.pool).await?.rows_affected();
        Ok(affected > 0)
    }

    /// Items cascade through the foreign key.
    pub async fn delete_playlist(&self, playlist_id: i64) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    /// Append an item with a verified playable URL; position is the next
    /// dense slot.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_playlist_item_verified(
        &self,
        playlist_id: i64,
        album_id: &str,
        platform: &str,
        playable_url: &str,
        verification_score: Option<i64>,
        verified_title: Option<&str>,
        embed_type: Option<&str>,
        track_number: Option<&str>,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM playlist_items WHERE playlist_id = ?",
        )
        .bind(playlist_id)
        .fetch_one(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO playlist_items
                (playlist_id, album_id, track_number, platform, playable_url, position,
                 verification_status, verification_score, verified_title, embed_type,
                 verification_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(playlist_id)
        .bind(album_id)
        .bind(track_number)
        .bind(platform)
        .bind(playable_url)
        .bind(position)
        .bind(VerificationStatus::Verified.as_str())
        .bind(verification_score)
        .bind(verified_title)
        .bind(embed_type)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE playlists SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn add_playlist_item_pending(
        &self,
        playlist_id: i64,
        album_id: &str,
        platform: &str,
        track_number: Option<&str>,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM playlist_items WHERE playlist_id = ?",
        )
        .bind(playlist_id)
        .fetch_one(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO playlist_items
                (playlist_id, album_id, track_number, platform, position, verification_status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(playlist_id)
        .bind(album_id)
        .bind(track_number)
        .bind(platform)
        .bind(position)
        .bind(VerificationStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn delete_playlist_item(&self, playlist_id: i64, item_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            "DELETE FROM playlist_items WHERE id = ? AND playlist_id = ?",
        )
        .bind(item_id)
        .bind(playlist_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected > 0 {
            // Close the position gap so items stay a dense 1..N permutation.
            let remaining: Vec<i64> = sqlx::query_scalar(
                "SELECT id FROM playlist_items WHERE playlist_id = ? ORDER BY position",
            )
            .bind(playlist_id)
            .fetch_all(&mut *tx)
            .await?;
            for (index, id) in remaining.iter().enumerate() {
                sqlx::query("UPDATE playlist_items SET position = ? WHERE id = ?")
                    .bind((index + 1) as i64)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query("UPDATE playlists SET updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(playlist_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(affected > 0)
    }

    /// Reorder a playlist in one transaction. The request must name every
    /// item of the playlist exactly once; positions become 1..N in the
    /// given order.
    pub async fn reorder_playlist_items(
        &self,
        playlist_id: i64,
        item_ids: &[i64],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let mut existing: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM playlist_items WHERE playlist_id = ?",
        )
        .bind(playlist_id)
        .fetch_all(&mut *tx)
        .await?;
        existing.sort_unstable();

        let mut requested = item_ids.to_vec();
        requested.sort_unstable();
        requested.dedup();

        if requested != existing {
            return Err(AppError::invalid_input(
                "Reorder must include every playlist item exactly once",
            ));
        }

        for (index, item_id) in item_ids.iter().enumerate() {
            sqlx::query(
                "UPDATE playlist_items SET position = ? WHERE id = ? AND playlist_id = ?",
            )
            .bind((index + 1) as i64)
            .bind(item_id)
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE playlists SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub async fn get_setting<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>> {
        let value: Option<Json<Value>> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        match value {
            Some(Json(value)) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set_setting<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        category: &str,
        description: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO settings (key, value, category, description, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(key)
        .bind(Json(serde_json::to_value(value)?))
        .bind(category)
        .bind(description)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn settings_by_category(&self, category: &str) -> Result<Vec<Setting>> {
        let rows = sqlx::query_as::<_, Setting>(
            "SELECT key, value, category, description, updated_at FROM settings WHERE category = ?",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Read a typed settings struct: defaults overlaid with whatever keys are
    /// stored under the category.
    pub async fn read_settings<T>(&self, category: &str) -> Result<T>
    where
        T: Serialize + serde::de::DeserializeOwned + Default,
    {
        let mut base = serde_json::to_value(T::default())
            .context("settings default must serialize to an object")?;
        let stored = self.settings_by_category(category).await?;
        if let Some(object) = base.as_object_mut() {
            for setting in stored {
                if object.contains_key(&setting.key) {
                    object.insert(setting.key.clone(), setting.value.0.clone());
                }
            }
        }
        Ok(serde_json::from_value(base)?)
    }

    /// Persist a typed settings struct as one row per field.
    pub async fn write_settings<T: Serialize>(&self, category: &str, settings: &T) -> Result<()> {
        let value = serde_json::to_value(settings)?;
        let object = value
            .as_object()
            .ok_or_else(|| AppError::invalid_input("settings must be an object"))?;
        for (key, field) in object {
            self.set_setting(key, field, category, None).await?;
        }
        Ok(())
    }
}
