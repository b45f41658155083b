//! Bearer-protected admin endpoints: scrape control, deletion, settings.

use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{category, CacheSettings, PlatformLinkSettings, PlayerSettings};
use crate::AppState;

/// Dates arrive from the admin UI as DD-MM-YYYY; the API also accepts ISO.
fn parse_flexible_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| {
            AppError::invalid_input(format!(
                "Invalid date: {} (expected DD-MM-YYYY or YYYY-MM-DD)",
                raw
            ))
        })
}

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub date: String,
    #[serde(default = "default_true")]
    pub download_covers: bool,
    #[serde(default)]
    pub force_rescrape: bool,
}

fn default_true() -> bool {
    true
}

pub async fn start_scrape(
    State(state): State<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<serde_json::Value>> {
    let date = parse_flexible_date(&request.date)?;

    if state.orchestrator.is_running().await {
        return Err(AppError::conflict("Scraping is already in progress"));
    }
    if !request.force_rescrape && state.store.album_exists_for_date(date).await? {
        return Err(AppError::conflict(format!(
            "Date {} has already been scraped; use force_rescrape to repeat",
            date
        )));
    }

    let orchestrator = state.orchestrator.clone();
    let covers = request.download_covers;
    tokio::spawn(async move {
        if let Err(err) = orchestrator.run_for_date(date, covers).await {
            tracing::error!(%date, error = %err, "Background scrape failed");
        }
    });

    Ok(Json(json!({
        "started": true,
        "date": date,
        "message": format!("Scrape started for {}", date),
    })))
}

pub async fn stop_scrape(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    if !state.orchestrator.is_running().await {
        return Err(AppError::conflict("No scrape is currently running"));
    }
    state.orchestrator.request_stop().await;
    Ok(Json(json!({ "stopping": true })))
}

pub async fn scrape_status(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let progress = state.orchestrator.progress().await;
    Ok(Json(serde_json::to_value(progress)?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteDateRequest {
    pub date: String,
}

pub async fn delete_date(
    State(state): State<AppState>,
    Json(request): Json<DeleteDateRequest>,
) -> Result<Json<serde_json::Value>> {
    let date = parse_flexible_date(&request.date)?;
    let deleted = state.store.delete_albums_by_date(date).await?;
    Ok(Json(json!({ "date": date, "deleted_albums": deleted })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRangeRequest {
    pub start_date: String,
    pub end_date: String,
}

pub async fn delete_range(
    State(state): State<AppState>,
    Json(request): Json<DeleteRangeRequest>,
) -> Result<Json<serde_json::Value>> {
    let start = parse_flexible_date(&request.start_date)?;
    let end = parse_flexible_date(&request.end_date)?;
    if start > end {
        return Err(AppError::invalid_input(
            "start_date must be before or equal to end_date",
        ));
    }
    let deleted = state.store.delete_albums_by_range(start, end).await?;
    Ok(Json(json!({
        "start_date": start,
        "end_date": end,
        "deleted_albums": deleted,
    })))
}

pub async fn data_summary(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let summary = state.store.data_summary().await?;
    Ok(Json(serde_json::to_value(summary)?))
}

#[derive(Debug, Deserialize)]
pub struct VerifyAlbumsRequest {
    pub date: String,
    /// Optional override; bulk runs may lower this to 75.
    pub min_similarity: Option<u32>,
}

/// Kick off re-verification of one date's unverified albums in the
/// background; the admin UI polls scrape status for progress.
pub async fn verify_albums(
    State(state): State<AppState>,
    Json(request): Json<VerifyAlbumsRequest>,
) -> Result<Json<serde_json::Value>> {
    let date = parse_flexible_date(&request.date)?;
    let min_similarity = request.min_similarity.unwrap_or(90);
    if !(1..=100).contains(&min_similarity) {
        return Err(AppError::invalid_input("min_similarity must be in [1, 100]"));
    }

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        match orchestrator.verify_date(date, min_similarity).await {
            Ok(stats) => tracing::info!(
                %date,
                verified = stats.verified,
                total = stats.total,
                "Background verification finished"
            ),
            Err(err) => tracing::error!(%date, error = %err, "Background verification failed"),
        }
    });

    Ok(Json(json!({
        "started": true,
        "date": date,
        "min_similarity": min_similarity,
    })))
}

// ----------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------

pub async fn get_platform_link_settings(
    State(state): State<AppState>,
) -> Result<Json<PlatformLinkSettings>> {
    let settings = state.store.read_settings(category::PLATFORM_LINKS).await?;
    Ok(Json(settings))
}

pub async fn set_platform_link_settings(
    State(state): State<AppState>,
    Json(settings): Json<PlatformLinkSettings>,
) -> Result<Json<serde_json::Value>> {
    state
        .store
        .write_settings(category::PLATFORM_LINKS, &settings)
        .await?;
    Ok(Json(json!({ "saved": true })))
}

pub async fn get_cache_settings(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let settings: CacheSettings = state.store.read_settings(category::CACHE).await?;
    let stats = state.cache.stats();
    Ok(Json(json!({ "settings": settings, "cache": stats })))
}

/// Validate and persist cache settings, applying them to the live cache and
/// download manager immediately.
pub async fn set_cache_settings(
    State(state): State<AppState>,
    Json(settings): Json<CacheSettings>,
) -> Result<Json<serde_json::Value>> {
    settings.validate()?;
    state.store.write_settings(category::CACHE, &settings).await?;

    state.cache.set_quota(settings.youtube_cache_max_size_gb);
    state
        .downloads
        .update_max_parallel(settings.youtube_parallel_downloads);
    state
        .downloads
        .update_download_timeout(settings.youtube_download_timeout);

    Ok(Json(json!({ "saved": true, "applied": true })))
}

pub async fn get_player_settings(State(state): State<AppState>) -> Result<Json<PlayerSettings>> {
    let settings = state.store.read_settings(category::PLAYER).await?;
    Ok(Json(settings))
}

pub async fn set_player_settings(
    State(state): State<AppState>,
    Json(settings): Json<PlayerSettings>,
) -> Result<Json<serde_json::Value>> {
    state.store.write_settings(category::PLAYER, &settings).await?;
    Ok(Json(json!({ "saved": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_parse_in_both_orders() {
        assert_eq!(
            parse_flexible_date("07-10-2025").unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 7).unwrap()
        );
        assert_eq!(
            parse_flexible_date("2025-10-07").unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 7).unwrap()
        );
        assert!(parse_flexible_date("10/07/2025").is_err());
    }
}
