//! Playlist CRUD and dynamic playlist composition.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{
    category, AddPlaylistItemRequest, CreatePlaylistRequest, DynamicPlaylistEntry, PlayableAlbum,
    Platform, PlayerSettings, ReorderPlaylistRequest, UpdatePlaylistRequest,
};
use crate::services::catalog::{AlbumFilter, PeriodKind};
use crate::AppState;

pub async fn list_playlists(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let playlists = state.store.list_playlists().await?;
    Ok(Json(json!({ "total": playlists.len(), "playlists": playlists })))
}

pub async fn create_playlist(
    State(state): State<AppState>,
    Json(request): Json<CreatePlaylistRequest>,
) -> Result<Json<serde_json::Value>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_input("Playlist name must not be empty"));
    }
    let id = state
        .store
        .create_playlist(name, request.description.as_deref(), request.is_public)
        .await?;
    Ok(Json(json!({ "id": id, "name": name })))
}

pub async fn get_playlist(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let playlist = state
        .store
        .get_playlist(id)
        .await?
        .ok_or_else(|| AppError::not_found("Playlist"))?;
    Ok(Json(serde_json::to_value(playlist)?))
}

pub async fn update_playlist(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePlaylistRequest>,
) -> Result<Json<serde_json::Value>> {
    let updated = state
        .store
        .update_playlist(
            id,
            request.name.as_deref(),
            request.description.as_deref(),
            request.is_public,
        )
        .await?;
    if !updated {
        return Err(AppError::not_found("Playlist"));
    }
    Ok(Json(json!({ "updated": true })))
}

pub async fn delete_playlist(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    if !state.store.delete_playlist(id).await? {
        return Err(AppError::not_found("Playlist"));
    }
    Ok(Json(json!({ "deleted": true })))
}

/// Add an album to a playlist. When the album already carries a verified
/// embed for the requested platform the item lands verified; otherwise it
/// is stored pending.
pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AddPlaylistItemRequest>,
) -> Result<Json<serde_json::Value>> {
    if state.store.get_playlist(id).await?.is_none() {
        return Err(AppError::not_found("Playlist"));
    }
    let album = state
        .store
        .album_by_id(&request.album_id)
        .await?
        .ok_or_else(|| AppError::not_found("Album"))?;

    let (embed_url, score, title, embed_type) = match request.platform {
        Platform::Youtube => (
            album.youtube_embed_url.clone(),
            album.youtube_verification_score,
            album.youtube_verified_title.clone(),
            album.youtube_embed_type.clone(),
        ),
        Platform::Bandcamp => (
            album.bandcamp_embed_url.clone(),
            album.bandcamp_verification_score,
            album.bandcamp_verified_title.clone(),
            None,
        ),
    };

    let item_id = match embed_url {
        Some(url) => {
            state
                .store
                .add_playlist_item_verified(
                    id,
                    &request.album_id,
                    request.platform.as_str(),
                    &url,
                    score,
                    title.as_deref(),
                    embed_type.as_deref(),
                    request.track_number.as_deref(),
                )
                .await?
        }
        None => {
            state
                .store
                .add_playlist_item_pending(
                    id,
                    &request.album_id,
                    request.platform.as_str(),
                    request.track_number.as_deref(),
                )
                .await?
        }
    };

    Ok(Json(json!({ "item_id": item_id })))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>> {
    if !state.store.delete_playlist_item(id, item_id).await? {
        return Err(AppError::not_found("Playlist item"));
    }
    Ok(Json(json!({ "deleted": true })))
}

pub async fn reorder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ReorderPlaylistRequest>,
) -> Result<Json<serde_json::Value>> {
    if state.store.get_playlist(id).await?.is_none() {
        return Err(AppError::not_found("Playlist"));
    }
    state.store.reorder_playlist_items(id, &request.item_ids).await?;
    Ok(Json(json!({ "reordered": true })))
}

// ----------------------------------------------------------------------
// Dynamic playlist
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DynamicPlaylistQuery {
    pub period_type: String,
    pub period_key: String,
    pub genres: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub shuffle: bool,
}

/// Compose playable entries from verified albums, honoring the player's
/// platform switches: one entry per album per enabled platform that has a
/// stored embed.
pub fn compose_dynamic_entries(
    albums: &[PlayableAlbum],
    player: &PlayerSettings,
) -> Vec<DynamicPlaylistEntry> {
    let mut entries = Vec::new();
    for album in albums {
        if player.player_youtube_enabled {
            if let Some(url) = &album.youtube_embed_url {
                entries.push(DynamicPlaylistEntry {
                    album_id: album.album_id.clone(),
                    album_name: album.album_name.clone(),
                    band_name: album.band_name.clone(),
                    release_type: album.release_type.clone(),
                    cover_art: album.cover_art.clone(),
                    cover_path: album.cover_path.clone(),
                    platform: Platform::Youtube,
                    playable_url: url.clone(),
                    verified_title: album.youtube_verified_title.clone(),
                    verification_score: album.youtube_verification_score,
                    embed_type: album.youtube_embed_type.clone(),
                });
            }
        }
        if player.player_bandcamp_enabled {
            if let Some(url) = &album.bandcamp_embed_url {
                entries.push(DynamicPlaylistEntry {
                    album_id: album.album_id.clone(),
                    album_name: album.album_name.clone(),
                    band_name: album.band_name.clone(),
                    release_type: album.release_type.clone(),
                    cover_art: album.cover_art.clone(),
                    cover_path: album.cover_path.clone(),
                    platform: Platform::Bandcamp,
                    playable_url: url.clone(),
                    verified_title: album.bandcamp_verified_title.clone(),
                    verification_score: album.bandcamp_verification_score,
                    embed_type: None,
                });
            }
        }
    }
    entries
}

pub async fn dynamic_playlist(
    State(state): State<AppState>,
    Query(query): Query<DynamicPlaylistQuery>,
) -> Result<Json<serde_json::Value>> {
    let kind = PeriodKind::parse(&query.period_type)?;
    let Some((start, end)) = state.store.resolve_period(kind, &query.period_key).await? else {
        return Ok(Json(json!({ "total": 0, "items": [] })));
    };

    let filter = AlbumFilter {
        genres: super::catalog::split_genres(query.genres.as_deref()),
        search: query.search.clone(),
    };
    let albums = state
        .store
        .albums_for_playlist(start, end, &filter, true)
        .await?;
    let player: PlayerSettings = state.store.read_settings(category::PLAYER).await?;

    let mut entries = compose_dynamic_entries(&albums, &player);
    if query.shuffle {
        entries.shuffle(&mut rand::thread_rng());
    }

    Ok(Json(json!({
        "period_type": kind.as_str(),
        "period_key": query.period_key,
        "total": entries.len(),
        "items": entries,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn playable(id: &str, youtube: Option<&str>, bandcamp: Option<&str>) -> PlayableAlbum {
        PlayableAlbum {
            album_id: id.to_string(),
            album_name: format!("Album {}", id),
            band_name: format!("Band {}", id),
            release_type: "Full-length".to_string(),
            release_date: NaiveDate::from_ymd_opt(2025, 10, 7).unwrap(),
            cover_art: None,
            cover_path: None,
            youtube_embed_url: youtube.map(str::to_string),
            youtube_verified_title: None,
            youtube_verification_score: Some(95),
            youtube_embed_type: Some("video".to_string()),
            bandcamp_embed_url: bandcamp.map(str::to_string),
            bandcamp_verified_title: None,
            bandcamp_verification_score: Some(92),
            playable_verified: true,
        }
    }

    #[test]
    fn player_switches_filter_platforms() {
        let albums = vec![
            playable("1", Some("https://yt/1"), Some("https://bc/1")),
            playable("2", Some("https://yt/2"), None),
            playable("3", None, Some("https://bc/3")),
        ];
        let player = PlayerSettings {
            player_youtube_enabled: false,
            player_bandcamp_enabled: true,
        };

        let entries = compose_dynamic_entries(&albums, &player);

        // Only bandcamp entries survive; album 2 has no bandcamp embed and
        // is omitted entirely.
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.platform == Platform::Bandcamp));
        let ids: Vec<&str> = entries.iter().map(|e| e.album_id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn both_platforms_enabled_yield_one_entry_each() {
        let albums = vec![playable("1", Some("https://yt/1"), Some("https://bc/1"))];
        let player = PlayerSettings::default();

        let entries = compose_dynamic_entries(&albums, &player);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].platform, Platform::Youtube);
        assert_eq!(entries[1].platform, Platform::Bandcamp);
    }
}
