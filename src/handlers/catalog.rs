//! Public catalog read endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::services::catalog::{AlbumFilter, PeriodKind};
use crate::AppState;

fn parse_iso_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::invalid_input(format!("Invalid date: {} (expected YYYY-MM-DD)", raw)))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_dates(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let dates = state.store.available_dates().await?;
    Ok(Json(json!({ "total": dates.len(), "dates": dates })))
}

#[derive(Debug, Deserialize)]
pub struct GroupedQuery {
    #[serde(default = "default_view")]
    view: String,
}

fn default_view() -> String {
    "day".to_string()
}

pub async fn get_dates_grouped(
    State(state): State<AppState>,
    Query(query): Query<GroupedQuery>,
) -> Result<Json<serde_json::Value>> {
    let kind = PeriodKind::parse(&query.view)?;
    let periods = state.store.grouped_dates(kind).await?;
    Ok(Json(json!({
        "total": periods.len(),
        "view": kind.as_str(),
        "periods": periods,
    })))
}

pub async fn get_albums_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let day = parse_iso_date(&date)?;
    let albums = state.store.albums_by_date(day).await?;
    Ok(Json(json!({
        "date": date,
        "total": albums.len(),
        "albums": albums,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    genres: Option<String>,
    search: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

pub async fn get_albums_by_period(
    State(state): State<AppState>,
    Path((period_type, period_key)): Path<(String, String)>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<serde_json::Value>> {
    let kind = PeriodKind::parse(&period_type)?;
    if query.page < 1 {
        return Err(AppError::invalid_input("page must be >= 1"));
    }
    if !(1..=200).contains(&query.limit) {
        return Err(AppError::invalid_input("limit must be between 1 and 200"));
    }

    let filter = AlbumFilter {
        genres: split_genres(query.genres.as_deref()),
        search: query.search.clone(),
    };
    let offset = (query.page - 1) * query.limit;
    let page = state
        .store
        .albums_by_period(kind, &period_key, offset, query.limit, &filter)
        .await?;

    let total_pages = (page.total + query.limit - 1) / query.limit;
    Ok(Json(json!({
        "albums": page.albums,
        "total": page.total,
        "period_key": page.period_key,
        "period_type": page.period_type,
        "start_date": page.start_date,
        "end_date": page.end_date,
        "limit": page.limit,
        "offset": page.offset,
        "has_more": page.has_more,
        "page": query.page,
        "total_pages": total_pages,
        "filters": { "genres": filter.genres, "search": filter.search },
    })))
}

pub fn split_genres(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    genre: Option<String>,
    country: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

pub async fn search_albums(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>> {
    let albums = state
        .store
        .search_albums(
            query.q.as_deref(),
            query.genre.as_deref(),
            query.country.as_deref(),
            query.limit.clamp(1, 200),
        )
        .await?;
    Ok(Json(json!({
        "total": albums.len(),
        "query": query.q,
        "albums": albums,
    })))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let stats = state.store.database_stats().await?;
    Ok(Json(serde_json::to_value(stats)?))
}

#[derive(Debug, Deserialize)]
pub struct GenresQuery {
    category: Option<String>,
    #[serde(default = "default_genre_limit")]
    limit: i64,
}

fn default_genre_limit() -> i64 {
    100
}

pub async fn get_genres(
    State(state): State<AppState>,
    Query(query): Query<GenresQuery>,
) -> Result<Json<serde_json::Value>> {
    let genres = state
        .store
        .all_genres(query.category.as_deref(), query.limit.clamp(1, 500))
        .await?;
    Ok(Json(json!({ "total": genres.len(), "genres": genres })))
}

#[derive(Debug, Deserialize)]
pub struct GenreSearchQuery {
    q: String,
    #[serde(default = "default_genre_search_limit")]
    limit: i64,
}

fn default_genre_search_limit() -> i64 {
    20
}

pub async fn search_genres(
    State(state): State<AppState>,
    Query(query): Query<GenreSearchQuery>,
) -> Result<Json<serde_json::Value>> {
    let genres = state
        .store
        .search_genres(&query.q, query.limit.clamp(1, 100))
        .await?;
    Ok(Json(json!({ "query": query.q, "genres": genres })))
}

pub async fn genre_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let stats = state.store.genre_statistics().await?;
    Ok(Json(serde_json::to_value(stats)?))
}

#[derive(Debug, Deserialize)]
pub struct AlbumsByGenreQuery {
    date: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

pub async fn albums_by_genre(
    State(state): State<AppState>,
    Path(genre_name): Path<String>,
    Query(query): Query<AlbumsByGenreQuery>,
) -> Result<Json<serde_json::Value>> {
    let date = query.date.as_deref().map(parse_iso_date).transpose()?;
    let date_from = query.date_from.as_deref().map(parse_iso_date).transpose()?;
    let date_to = query.date_to.as_deref().map(parse_iso_date).transpose()?;

    let albums = state
        .store
        .albums_by_genre(
            &genre_name,
            date,
            date_from,
            date_to,
            query.limit.clamp(1, 200),
            query.offset.max(0),
        )
        .await?;
    Ok(Json(json!({
        "genre": genre_name,
        "total": albums.len(),
        "albums": albums,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_lists_split_on_commas_and_trim() {
        assert_eq!(
            split_genres(Some("Black Metal, Doom , ,Death")),
            vec!["Black Metal", "Doom", "Death"]
        );
        assert!(split_genres(None).is_empty());
        assert!(split_genres(Some("")).is_empty());
    }

    #[test]
    fn iso_dates_parse_or_reject() {
        assert!(parse_iso_date("2025-10-07").is_ok());
        assert!(parse_iso_date("07-10-2025").is_err());
        assert!(parse_iso_date("yesterday").is_err());
    }
}
