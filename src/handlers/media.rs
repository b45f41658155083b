//! Media endpoints: cached audio streaming and download management.
//!
//! The audio endpoint never initiates a download; it serves what the cache
//! holds, answers 202 while the download manager is working on the id, and
//! 404 otherwise.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::AppState;

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("webm") => "audio/webm",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("opus") | Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

pub async fn get_audio(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Response> {
    if let Some(path) = state.cache.lookup(&video_id) {
        let bytes = tokio::fs::read(&path).await.map_err(|err| {
            tracing::error!(video_id, error = %err, "Failed to read cached file");
            AppError::Internal {
                message: Some("Failed to read cached file".to_string()),
            }
        })?;

        let headers = [
            (header::CONTENT_TYPE, content_type_for(&path)),
            (header::ACCEPT_RANGES, "bytes"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ];
        return Ok((StatusCode::OK, headers, bytes).into_response());
    }

    if state.downloads.is_downloading(&video_id) {
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "downloading",
                "message": "Audio is being downloaded, retry shortly",
                "video_id": video_id,
            })),
        )
            .into_response());
    }

    Err(AppError::not_found("Audio"))
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub video_ids: Vec<String>,
    #[serde(default)]
    pub current_index: usize,
}

pub async fn queue_downloads(
    State(state): State<AppState>,
    Json(request): Json<QueueRequest>,
) -> Result<Json<serde_json::Value>> {
    if request.video_ids.is_empty() {
        return Err(AppError::invalid_input("video_ids must not be empty"));
    }
    if request.current_index >= request.video_ids.len() {
        return Err(AppError::invalid_input(
            "current_index is out of bounds for video_ids",
        ));
    }

    state
        .downloads
        .download_playlist(&request.video_ids, request.current_index);
    Ok(Json(json!({
        "queued": request.video_ids.len(),
        "current_index": request.current_index,
    })))
}

pub async fn audio_info(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if let Some((_, size_bytes)) = state.cache.peek(&video_id) {
        return Ok(Json(json!({
            "video_id": video_id,
            "cached": true,
            "size_bytes": size_bytes,
        })));
    }

    let task = state.downloads.status(&video_id);
    let downloading = state.downloads.is_downloading(&video_id);
    Ok(Json(json!({
        "video_id": video_id,
        "cached": false,
        "downloading": downloading,
        "status": task.map(|t| t.status),
    })))
}

pub async fn download_status(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    match state.downloads.status(&video_id) {
        Some(task) => Ok(Json(serde_json::to_value(task)?)),
        None => Err(AppError::not_found("Download task")),
    }
}

pub async fn download_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let stats = state.downloads.statistics();
    let cache = state.cache.stats();
    Ok(Json(json!({ "downloads": stats, "cache": cache })))
}
