//! Database pool creation and schema management.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Create the process-wide SQLite pool. The database file is created on
/// first run; foreign keys are enforced so playlist items cascade.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .context("Invalid database URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    Ok(pool)
}

/// In-memory pool for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Ensure the parent directory of the database file exists.
pub fn ensure_data_dir(database_path: &Path) -> Result<()> {
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    Ok(())
}

/// Create all tables and indexes if they do not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            album_id TEXT UNIQUE NOT NULL,
            album_name TEXT NOT NULL,
            album_url TEXT NOT NULL DEFAULT '',
            band_name TEXT NOT NULL,
            band_id TEXT NOT NULL DEFAULT '',
            band_url TEXT NOT NULL DEFAULT '',
            release_date DATE NOT NULL,
            release_date_raw TEXT NOT NULL DEFAULT '',
            release_type TEXT NOT NULL DEFAULT '',
            cover_art TEXT,
            cover_path TEXT,
            bandcamp_url TEXT,
            youtube_url TEXT,
            spotify_url TEXT,
            discogs_url TEXT,
            lastfm_url TEXT,
            soundcloud_url TEXT,
            tidal_url TEXT,
            youtube_embed_url TEXT,
            youtube_verified_title TEXT,
            youtube_verification_score INTEGER,
            youtube_embed_type TEXT,
            bandcamp_embed_url TEXT,
            bandcamp_verified_title TEXT,
            bandcamp_verification_score INTEGER,
            bandcamp_embed_code TEXT,
            playable_verified BOOLEAN NOT NULL DEFAULT 0,
            playable_verification_date TIMESTAMP,
            country_of_origin TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            genre TEXT NOT NULL DEFAULT '',
            themes TEXT NOT NULL DEFAULT '',
            current_label TEXT NOT NULL DEFAULT '',
            years_active TEXT NOT NULL DEFAULT '',
            details TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create albums table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            album_id TEXT NOT NULL,
            track_number TEXT NOT NULL,
            track_name TEXT NOT NULL,
            track_length TEXT NOT NULL DEFAULT '',
            lyrics_url TEXT,
            FOREIGN KEY (album_id) REFERENCES albums (album_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create tracks table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parsed_genres (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            album_id TEXT NOT NULL,
            genre_name TEXT NOT NULL,
            genre_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            period TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (album_id) REFERENCES albums (album_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create parsed_genres table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS genre_taxonomy (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            genre_name TEXT UNIQUE NOT NULL,
            normalized_name TEXT NOT NULL,
            parent_genre TEXT,
            genre_category TEXT NOT NULL DEFAULT 'base',
            aliases TEXT NOT NULL DEFAULT '[]',
            color_hex TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create genre_taxonomy table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS genre_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            genre_name TEXT NOT NULL,
            album_count INTEGER NOT NULL,
            date_range_start DATE,
            date_range_end DATE,
            last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create genre_stats table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT UNIQUE NOT NULL,
            value TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            description TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create settings table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            is_public BOOLEAN NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create playlists table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlist_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            playlist_id INTEGER NOT NULL,
            album_id TEXT NOT NULL,
            track_number TEXT,
            position INTEGER NOT NULL,
            platform TEXT NOT NULL,
            playable_url TEXT,
            verification_status TEXT NOT NULL DEFAULT 'pending',
            verification_score INTEGER,
            verified_title TEXT,
            verification_date TIMESTAMP,
            embed_type TEXT,
            added_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (playlist_id) REFERENCES playlists(id) ON DELETE CASCADE,
            FOREIGN KEY (album_id) REFERENCES albums(album_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create playlist_items table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS admin_auth (
            id INTEGER PRIMARY KEY,
            password_hash TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_login TIMESTAMP,
            login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create admin_auth table")?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_albums_release_date ON albums(release_date)",
        "CREATE INDEX IF NOT EXISTS idx_albums_band_name ON albums(band_name)",
        "CREATE INDEX IF NOT EXISTS idx_albums_genre ON albums(genre)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_album_id ON tracks(album_id)",
        "CREATE INDEX IF NOT EXISTS idx_parsed_genres_album_id ON parsed_genres(album_id)",
        "CREATE INDEX IF NOT EXISTS idx_parsed_genres_genre_name ON parsed_genres(genre_name)",
        "CREATE INDEX IF NOT EXISTS idx_genre_taxonomy_name ON genre_taxonomy(genre_name)",
        "CREATE INDEX IF NOT EXISTS idx_genre_stats_name ON genre_stats(genre_name)",
        "CREATE INDEX IF NOT EXISTS idx_playlist_items_playlist_id ON playlist_items(playlist_id)",
        "CREATE INDEX IF NOT EXISTS idx_playlist_items_position ON playlist_items(playlist_id, position)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create index: {}", statement))?;
    }

    tracing::info!("Database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM albums")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
