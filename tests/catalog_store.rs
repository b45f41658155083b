//! Integration tests for the catalog store over an in-memory database.

use chrono::NaiveDate;
use metal_albums_backend::database::{create_test_pool, run_migrations};
use metal_albums_backend::models::{
    AlbumRecord, BandFacts, CacheSettings, EmbedKind, GenreKind, ParsedGenreRow, PlatformUrls,
    ReleaseType, Track, VerifiedEmbed,
};
use metal_albums_backend::services::catalog::{AlbumFilter, CatalogStore, PeriodKind};

async fn store() -> CatalogStore {
    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    CatalogStore::new(pool)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn album(id: &str, band: &str, name: &str, release: NaiveDate) -> AlbumRecord {
    AlbumRecord {
        album_id: id.to_string(),
        album_name: name.to_string(),
        album_url: format!("https://archive.example/albums/{}/{}", band, id),
        band_name: band.to_string(),
        band_id: format!("b{}", id),
        band_url: format!("https://archive.example/bands/{}", band),
        release_date: release,
        release_date_raw: release.format("%B %d, %Y").to_string(),
        release_type: ReleaseType::FullLength,
        cover_art: None,
        cover_path: None,
        platform_urls: PlatformUrls::default(),
        band_facts: BandFacts {
            genre: "Black Metal".to_string(),
            country_of_origin: "Norway".to_string(),
            ..Default::default()
        },
        details: serde_json::json!({"label": "Test Records"}),
        tracklist: vec![
            Track {
                number: "1".into(),
                name: "Intro".into(),
                length: "1:30".into(),
                lyrics_url: None,
            },
            Track {
                number: "2".into(),
                name: "Outro".into(),
                length: "5:12".into(),
                lyrics_url: Some("https://archive.example/lyrics/1".into()),
            },
        ],
    }
}

fn youtube_embed() -> VerifiedEmbed {
    VerifiedEmbed {
        embed_url: "https://www.youtube-nocookie.com/embed/abc123".to_string(),
        matched_title: "Band - Album (Full Album)".to_string(),
        match_score: 95,
        embed_kind: EmbedKind::Video,
        embed_code: None,
    }
}

#[tokio::test]
async fn upsert_is_idempotent_for_albums_and_tracks() {
    let store = store().await;
    let record = album("1", "Testband", "First", date(2025, 10, 7));

    store.upsert_album(&record).await.unwrap();
    store.upsert_album(&record).await.unwrap();

    let albums = store.albums_by_date(date(2025, 10, 7)).await.unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].tracklist.len(), 2);
    assert_eq!(albums[0].tracklist[0].name, "Intro");
    assert_eq!(albums[0].details.0["label"], "Test Records");
}

#[tokio::test]
async fn rescrape_resets_verification_state() {
    let store = store().await;
    let record = album("1", "Testband", "First", date(2025, 10, 7));
    store.upsert_album(&record).await.unwrap();
    store
        .update_album_playable_urls("1", Some(&youtube_embed()), None)
        .await
        .unwrap();

    // Re-scraping replaces the row; the verify step fills embeds again.
    store.upsert_album(&record).await.unwrap();

    let row = store.album_by_id("1").await.unwrap().unwrap();
    assert!(!row.playable_verified);
    assert!(row.youtube_embed_url.is_none());
    assert!(row.playable_verification_date.is_none());
}

#[tokio::test]
async fn grouped_dates_by_month_aggregate_counts_and_ranges() {
    let store = store().await;
    // 2025-10-07 x3, 2025-10-23 x1, 2025-11-02 x2.
    for (i, day) in [(1, 7), (2, 7), (3, 7), (4, 23)] {
        store
            .upsert_album(&album(&i.to_string(), "Band", "Album", date(2025, 10, day)))
            .await
            .unwrap();
    }
    for i in [5, 6] {
        store
            .upsert_album(&album(&i.to_string(), "Band", "Album", date(2025, 11, 2)))
            .await
            .unwrap();
    }

    let groups = store.grouped_dates(PeriodKind::Month).await.unwrap();
    assert_eq!(groups.len(), 2);

    assert_eq!(groups[0].period_key, "2025-11");
    assert_eq!(groups[0].start_date, date(2025, 11, 2));
    assert_eq!(groups[0].end_date, date(2025, 11, 2));
    assert_eq!(groups[0].album_count, 2);

    assert_eq!(groups[1].period_key, "2025-10");
    assert_eq!(groups[1].start_date, date(2025, 10, 7));
    assert_eq!(groups[1].end_date, date(2025, 10, 23));
    assert_eq!(groups[1].album_count, 4);
}

#[tokio::test]
async fn period_page_is_ordered_and_filtered() {
    let store = store().await;
    let mut early = album("1", "Abbath", "Alpha", date(2025, 10, 7));
    early.band_facts.genre = "Black Metal".to_string();
    let mut late = album("2", "Zyklon", "Zeta", date(2025, 10, 23));
    late.band_facts.genre = "Death Metal".to_string();
    store.upsert_album(&early).await.unwrap();
    store.upsert_album(&late).await.unwrap();

    let page = store
        .albums_by_period(PeriodKind::Month, "2025-10", 0, 50, &AlbumFilter::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    // Release date descending.
    assert_eq!(page.albums[0].album_id, "2");
    assert!(!page.has_more);

    let filtered = store
        .albums_by_period(
            PeriodKind::Month,
            "2025-10",
            0,
            50,
            &AlbumFilter {
                genres: vec!["Black".to_string()],
                search: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.albums[0].album_id, "1");

    let searched = store
        .albums_by_period(
            PeriodKind::Month,
            "2025-10",
            0,
            50,
            &AlbumFilter {
                genres: vec![],
                search: Some("zyklon".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(searched.total, 1, "search must be case-insensitive");
    assert_eq!(searched.albums[0].album_id, "2");
}

#[tokio::test]
async fn delete_by_date_cascades_and_missing_rows_are_not_errors() {
    let store = store().await;
    let record = album("1", "Testband", "First", date(2025, 10, 7));
    store.upsert_album(&record).await.unwrap();
    store
        .insert_parsed_genres(
            "1",
            &[ParsedGenreRow::new("Black Metal", GenreKind::Main, 1.0, None)],
        )
        .await
        .unwrap();
    let playlist_id = store.create_playlist("Test", None, true).await.unwrap();
    store
        .add_playlist_item_pending(playlist_id, "1", "youtube", None)
        .await
        .unwrap();

    let deleted = store.delete_albums_by_date(date(2025, 10, 7)).await.unwrap();
    assert_eq!(deleted, 1);

    assert!(store.albums_by_date(date(2025, 10, 7)).await.unwrap().is_empty());
    assert!(store.parsed_genres_for_album("1").await.unwrap().is_empty());
    let playlist = store.get_playlist(playlist_id).await.unwrap().unwrap();
    assert!(playlist.items.is_empty());

    // A date with no albums deletes zero rows without failing.
    assert_eq!(store.delete_albums_by_date(date(1999, 1, 1)).await.unwrap(), 0);
}

#[tokio::test]
async fn playable_flag_requires_at_least_one_embed() {
    let store = store().await;
    store
        .upsert_album(&album("1", "Testband", "First", date(2025, 10, 7)))
        .await
        .unwrap();

    // No embeds: nothing changes.
    let updated = store.update_album_playable_urls("1", None, None).await.unwrap();
    assert!(!updated);
    let row = store.album_by_id("1").await.unwrap().unwrap();
    assert!(!row.playable_verified);

    // One embed flips the flag and records the timestamp.
    let embed = youtube_embed();
    let updated = store
        .update_album_playable_urls("1", Some(&embed), None)
        .await
        .unwrap();
    assert!(updated);
    let row = store.album_by_id("1").await.unwrap().unwrap();
    assert!(row.playable_verified);
    assert!(row.youtube_embed_url.is_some());
    assert!(row.playable_verification_date.is_some());
    assert_eq!(row.youtube_verification_score, Some(95));
    assert_eq!(row.youtube_embed_type.as_deref(), Some("video"));
}

#[tokio::test]
async fn genre_stats_are_a_pure_function_of_parsed_genres() {
    let store = store().await;
    store
        .upsert_album(&album("1", "A", "One", date(2025, 10, 7)))
        .await
        .unwrap();
    store
        .upsert_album(&album("2", "B", "Two", date(2025, 10, 23)))
        .await
        .unwrap();

    for id in ["1", "2"] {
        store
            .insert_parsed_genres(
                id,
                &[ParsedGenreRow::new("Black Metal", GenreKind::Main, 1.0, None)],
            )
            .await
            .unwrap();
    }
    store
        .insert_parsed_genres(
            "2",
            &[
                ParsedGenreRow::new("Black Metal", GenreKind::Main, 1.0, None),
                ParsedGenreRow::new("Doom Metal", GenreKind::Main, 0.9, None),
            ],
        )
        .await
        .unwrap();

    store.recompute_genre_stats().await.unwrap();
    let stats = store.genre_statistics().await.unwrap();

    let black = stats
        .top_genres
        .iter()
        .find(|g| g.label == "Black Metal")
        .unwrap();
    assert_eq!(black.count, 2);
    let doom = stats
        .top_genres
        .iter()
        .find(|g| g.label == "Doom Metal")
        .unwrap();
    assert_eq!(doom.count, 1);
}

#[tokio::test]
async fn reorder_round_trip_restores_original_positions() {
    let store = store().await;
    store
        .upsert_album(&album("1", "Testband", "First", date(2025, 10, 7)))
        .await
        .unwrap();
    let playlist_id = store.create_playlist("Order", None, true).await.unwrap();

    let mut item_ids = Vec::new();
    for _ in 0..4 {
        item_ids.push(
            store
                .add_playlist_item_pending(playlist_id, "1", "youtube", None)
                .await
                .unwrap(),
        );
    }

    // Positions start dense 1..4 in insertion order.
    let playlist = store.get_playlist(playlist_id).await.unwrap().unwrap();
    let positions: Vec<i64> = playlist.items.iter().map(|i| i.position).collect();
    assert_eq!(positions, [1, 2, 3, 4]);

    // Apply a permutation, then its inverse ordering.
    let permuted = vec![item_ids[2], item_ids[0], item_ids[3], item_ids[1]];
    store
        .reorder_playlist_items(playlist_id, &permuted)
        .await
        .unwrap();
    let playlist = store.get_playlist(playlist_id).await.unwrap().unwrap();
    let ordered: Vec<i64> = playlist.items.iter().map(|i| i.id).collect();
    assert_eq!(ordered, permuted);
    let positions: Vec<i64> = playlist.items.iter().map(|i| i.position).collect();
    assert_eq!(positions, [1, 2, 3, 4]);

    store
        .reorder_playlist_items(playlist_id, &item_ids)
        .await
        .unwrap();
    let playlist = store.get_playlist(playlist_id).await.unwrap().unwrap();
    let ordered: Vec<i64> = playlist.items.iter().map(|i| i.id).collect();
    assert_eq!(ordered, item_ids);
}

#[tokio::test]
async fn reorder_rejects_partial_item_lists() {
    let store = store().await;
    store
        .upsert_album(&album("1", "Testband", "First", date(2025, 10, 7)))
        .await
        .unwrap();
    let playlist_id = store.create_playlist("Strict", None, true).await.unwrap();
    let a = store
        .add_playlist_item_pending(playlist_id, "1", "youtube", None)
        .await
        .unwrap();
    let _b = store
        .add_playlist_item_pending(playlist_id, "1", "bandcamp", None)
        .await
        .unwrap();

    let err = store.reorder_playlist_items(playlist_id, &[a]).await;
    assert!(err.is_err(), "partial reorder must be rejected");
}

#[tokio::test]
async fn deleting_an_item_closes_the_position_gap() {
    let store = store().await;
    store
        .upsert_album(&album("1", "Testband", "First", date(2025, 10, 7)))
        .await
        .unwrap();
    let playlist_id = store.create_playlist("Gaps", None, true).await.unwrap();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(
            store
                .add_playlist_item_pending(playlist_id, "1", "youtube", None)
                .await
                .unwrap(),
        );
    }

    store.delete_playlist_item(playlist_id, ids[1]).await.unwrap();

    let playlist = store.get_playlist(playlist_id).await.unwrap().unwrap();
    let positions: Vec<i64> = playlist.items.iter().map(|i| i.position).collect();
    assert_eq!(positions, [1, 2]);
}

#[tokio::test]
async fn playlist_deletion_cascades_items() {
    let store = store().await;
    store
        .upsert_album(&album("1", "Testband", "First", date(2025, 10, 7)))
        .await
        .unwrap();
    let playlist_id = store.create_playlist("Doomed", None, true).await.unwrap();
    store
        .add_playlist_item_pending(playlist_id, "1", "youtube", None)
        .await
        .unwrap();

    assert!(store.delete_playlist(playlist_id).await.unwrap());
    assert!(store.get_playlist(playlist_id).await.unwrap().is_none());
    assert!(!store.delete_playlist(playlist_id).await.unwrap());
}

#[tokio::test]
async fn playlist_source_respects_only_playable() {
    let store = store().await;
    store
        .upsert_album(&album("1", "Verified", "Album", date(2025, 10, 7)))
        .await
        .unwrap();
    store
        .upsert_album(&album("2", "Unverified", "Album", date(2025, 10, 7)))
        .await
        .unwrap();
    store
        .update_album_playable_urls("1", Some(&youtube_embed()), None)
        .await
        .unwrap();

    let playable = store
        .albums_for_playlist(
            date(2025, 10, 7),
            date(2025, 10, 7),
            &AlbumFilter::default(),
            true,
        )
        .await
        .unwrap();
    assert_eq!(playable.len(), 1);
    assert_eq!(playable[0].album_id, "1");

    let all = store
        .albums_for_playlist(
            date(2025, 10, 7),
            date(2025, 10, 7),
            &AlbumFilter::default(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn settings_round_trip_with_defaults_overlay() {
    let store = store().await;

    // Nothing stored yet: defaults come back.
    let settings: CacheSettings = store.read_settings("cache").await.unwrap();
    assert_eq!(settings, CacheSettings::default());

    let custom = CacheSettings {
        youtube_cache_max_size_gb: 2.5,
        youtube_parallel_downloads: 5,
        youtube_download_timeout: 120,
        youtube_post_scrape_downloads: 4,
    };
    store.write_settings("cache", &custom).await.unwrap();

    let read_back: CacheSettings = store.read_settings("cache").await.unwrap();
    assert_eq!(read_back, custom);

    // Single-key access works too.
    let quota: f64 = store
        .get_setting("youtube_cache_max_size_gb")
        .await
        .unwrap()
        .unwrap();
    assert!((quota - 2.5).abs() < 1e-9);
}

#[tokio::test]
async fn taxonomy_upserts_are_unique_per_name() {
    let store = store().await;
    store
        .upsert_genre_taxonomy("Black Metal", "black metal", "base", Some("Metal"), &[], None)
        .await
        .unwrap();
    store
        .upsert_genre_taxonomy(
            "Black Metal",
            "black metal",
            "base",
            Some("Metal"),
            &["BM".to_string()],
            Some("#8b0000"),
        )
        .await
        .unwrap();

    let genres = store.all_genres(None, 100).await.unwrap();
    assert_eq!(genres.len(), 1);
    assert_eq!(genres[0].aliases.0, vec!["BM".to_string()]);
    assert_eq!(genres[0].color_hex.as_deref(), Some("#8b0000"));
}

#[tokio::test]
async fn search_albums_matches_album_band_and_country() {
    let store = store().await;
    store
        .upsert_album(&album("1", "Mayhem", "Daybreak", date(2025, 10, 7)))
        .await
        .unwrap();

    let by_band = store
        .search_albums(Some("mayhem"), None, None, 50)
        .await
        .unwrap();
    assert_eq!(by_band.len(), 1);

    let by_country = store
        .search_albums(None, None, Some("Norway"), 50)
        .await
        .unwrap();
    assert_eq!(by_country.len(), 1);

    let nothing = store
        .search_albums(Some("nonexistent"), None, None, 50)
        .await
        .unwrap();
    assert!(nothing.is_empty());
}
