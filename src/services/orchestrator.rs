//! Pipeline orchestrator and daily scheduler.
//!
//! Coordinates the scrape -> persist -> parse-genres -> verify -> queue-
//! downloads pipeline for a single date. Only one pipeline runs at a time;
//! a second request is rejected with a conflict. Progress is observable by
//! the HTTP surface and cancellation is cooperative at pagination, album
//! and step boundaries.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::{ArchiveConfig, StorageConfig};
use crate::error::{AppError, Result};
use crate::models::{
    category, AlbumRecord, CacheSettings, GenreKind, ScraperSettings,
};
use crate::services::catalog::CatalogStore;
use crate::services::download_manager::DownloadManager;
use crate::services::genre_parser::{expand_to_rows, GenreParser};
use crate::services::scraper::ArchiveScraper;
use crate::services::verifier::{BatchVerifyStats, PlatformVerifier};

/// Pause between days of a range run.
const INTER_DAY_PAUSE: Duration = Duration::from_secs(30);
/// Strict similarity threshold for pipeline auto-verification.
const PIPELINE_MIN_SIMILARITY: u32 = 90;

/// Live progress of the running (or last) pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressReport {
    pub running: bool,
    pub current_date: Option<NaiveDate>,
    pub progress: usize,
    pub total: usize,
    pub message: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub rate_limited: bool,
    pub should_stop: bool,
}

/// Result of one day's pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct DailyRunResult {
    pub date: NaiveDate,
    pub success: bool,
    pub albums_scraped: usize,
    pub albums_verified: usize,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

pub struct PipelineOrchestrator {
    store: CatalogStore,
    downloads: Arc<DownloadManager>,
    storage: StorageConfig,
    archive: ArchiveConfig,
    progress: Arc<RwLock<ProgressReport>>,
    run_lock: tokio::sync::Mutex<()>,
    stop: Arc<AtomicBool>,
    last_run_date: RwLock<Option<NaiveDate>>,
}

impl PipelineOrchestrator {
    pub fn new(
        store: CatalogStore,
        downloads: Arc<DownloadManager>,
        storage: StorageConfig,
        archive: ArchiveConfig,
    ) -> Self {
        Self {
            store,
            downloads,
            storage,
            archive,
            progress: Arc::new(RwLock::new(ProgressReport::default())),
            run_lock: tokio::sync::Mutex::new(()),
            stop: Arc::new(AtomicBool::new(false)),
            last_run_date: RwLock::new(None),
        }
    }

    pub async fn progress(&self) -> ProgressReport {
        self.progress.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.progress.read().await.running
    }

    /// Request cooperative cancellation; observed at pagination, album and
    /// step boundaries.
    pub async fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.progress.write().await.should_stop = true;
        tracing::info!("Stop requested");
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    async fn update_progress<F: FnOnce(&mut ProgressReport)>(&self, apply: F) {
        let mut progress = self.progress.write().await;
        apply(&mut progress);
    }

    /// Run the full pipeline for one date. Single-flight: a concurrent call
    /// gets a Conflict.
    pub async fn run_for_date(&self, date: NaiveDate, with_covers: bool) -> Result<DailyRunResult> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| AppError::conflict("Scraping is already in progress"))?;

        self.stop.store(false, Ordering::SeqCst);
        let started = std::time::Instant::now();
        self.update_progress(|p| {
            *p = ProgressReport {
                running: true,
                current_date: Some(date),
                message: format!("Starting scrape for {}", date),
                start_time: Some(Utc::now()),
                ..Default::default()
            };
        })
        .await;

        let outcome = self.execute_pipeline(date, with_covers).await;
        let duration = started.elapsed().as_secs_f64();

        let result = match outcome {
            Ok((scraped, verified, rate_limited)) => {
                self.update_progress(|p| {
                    p.running = false;
                    p.end_time = Some(Utc::now());
                    p.rate_limited = rate_limited;
                    p.message = format!("Completed: {} albums for {}", scraped, date);
                })
                .await;
                *self.last_run_date.write().await = Some(date);
                tracing::info!(%date, scraped, verified, duration, "Pipeline completed");
                DailyRunResult {
                    date,
                    success: true,
                    albums_scraped: scraped,
                    albums_verified: verified,
                    duration_seconds: duration,
                    error: None,
                }
            }
            Err(err) => {
                let message = err.to_string();
                self.update_progress(|p| {
                    p.running = false;
                    p.end_time = Some(Utc::now());
                    p.error = Some(message.clone());
                    p.message = format!("Failed: {}", message);
                })
                .await;
                tracing::error!(%date, error = %message, "Pipeline failed");
                DailyRunResult {
                    date,
                    success: false,
                    albums_scraped: 0,
                    albums_verified: 0,
                    duration_seconds: duration,
                    error: Some(message),
                }
            }
        };

        Ok(result)
    }

    /// The pipeline steps for one date. A scrape failure aborts the date;
    /// verification and download-queueing failures do not.
    async fn execute_pipeline(
        &self,
        date: NaiveDate,
        with_covers: bool,
    ) -> Result<(usize, usize, bool)> {
        // Step 1: scrape.
        let scraper_settings: ScraperSettings = self.store.read_settings(category::GENERAL).await?;
        scraper_settings.validate()?;
        let mut scraper = ArchiveScraper::new(
            self.archive.clone(),
            scraper_settings,
            self.storage.covers_dir.clone(),
            Arc::clone(&self.stop),
        )
        .await
        .map_err(|e| AppError::upstream("archive", e.to_string()))?;

        self.update_progress(|p| p.message = format!("Scraping albums for {}", date))
            .await;
        let outcome = scraper.scrape_date(date, with_covers).await;
        scraper.close().await;

        let outcome = outcome.map_err(|e| AppError::upstream("archive", e.to_string()))?;
        let rate_limited = outcome.rate_limited;
        let artifact = self.storage.scrape_artifact_path(date);

        if outcome.stopped {
            // Persistence not reached: remove the partial artifact.
            let _ = std::fs::remove_file(&artifact);
            self.update_progress(|p| p.message = "Stopped before persistence".to_string())
                .await;
            return Ok((0, 0, rate_limited));
        }

        if outcome.albums.is_empty() {
            tracing::warn!(%date, "Empty source day, nothing to persist");
            return Ok((0, 0, true));
        }

        // Step 2: intermediate JSON artifact, then persist albums + tracks.
        self.write_artifact(&artifact, &outcome.albums)?;

        let total = outcome.albums.len();
        self.update_progress(|p| {
            p.total = total;
            p.progress = 0;
            p.message = format!("Persisting {} albums", total);
        })
        .await;

        for (index, album) in outcome.albums.iter().enumerate() {
            self.store.upsert_album(album).await?;
            self.update_progress(|p| p.progress = index + 1).await;
        }

        if self.stop_requested() {
            return Ok((total, 0, rate_limited));
        }

        // Step 3: parse genres and refresh the derived taxonomy and stats.
        self.update_progress(|p| p.message = "Parsing genres".to_string())
            .await;
        let parser = GenreParser::new();
        for album in &outcome.albums {
            self.parse_and_store_genres(&parser, album).await?;
        }
        self.store.recompute_genre_stats().await?;

        if self.stop_requested() {
            return Ok((total, 0, rate_limited));
        }

        // Step 4: verify playable URLs. Non-fatal.
        self.update_progress(|p| p.message = "Verifying playable URLs".to_string())
            .await;
        let verified = match self.verify_date(date, PIPELINE_MIN_SIMILARITY).await {
            Ok(stats) => stats.verified,
            Err(err) => {
                tracing::error!(error = %err, "Verification step failed, continuing");
                0
            }
        };

        // Step 5: queue downloads for verified video embeds. Non-fatal.
        self.update_progress(|p| p.message = "Queuing audio downloads".to_string())
            .await;
        if let Err(err) = self.queue_downloads(date).await {
            tracing::error!(error = %err, "Download queueing failed, continuing");
        }

        Ok((total, verified, rate_limited))
    }

    fn write_artifact(&self, path: &std::path::Path, albums: &[AlbumRecord]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create artifact directory")
                .map_err(AppError::from)?;
        }
        let json = serde_json::to_string_pretty(albums)?;
        std::fs::write(path, json)
            .context("Failed to write scrape artifact")
            .map_err(AppError::from)?;
        tracing::info!(path = %path.display(), "Wrote scrape artifact");
        Ok(())
    }

    async fn parse_and_store_genres(
        &self,
        parser: &GenreParser,
        album: &AlbumRecord,
    ) -> Result<()> {
        let parsed = parser.parse(&album.band_facts.genre);
        if parsed.is_empty() {
            return Ok(());
        }

        let rows = expand_to_rows(&parsed);
        self.store.insert_parsed_genres(&album.album_id, &rows).await?;

        for genre in &parsed {
            if !genre.main.is_empty() {
                self.store
                    .upsert_genre_taxonomy(
                        &genre.main,
                        &genre.main.to_lowercase(),
                        "base",
                        parser.parent_genre(&genre.main).as_deref(),
                        &[],
                        Some(&GenreParser::color_for(&genre.main)),
                    )
                    .await?;
            }
            for modifier in &genre.modifiers {
                self.store
                    .upsert_genre_taxonomy(
                        modifier,
                        &modifier.to_lowercase(),
                        GenreKind::Modifier.as_str(),
                        None,
                        &[],
                        Some(&GenreParser::color_for(modifier)),
                    )
                    .await?;
            }
            for related in &genre.related {
                self.store
                    .upsert_genre_taxonomy(
                        related,
                        &related.to_lowercase(),
                        "style",
                        None,
                        &[],
                        Some(&GenreParser::color_for(related)),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Verify unverified albums of one date and persist the embeds. Also
    /// used by the admin re-verification endpoint (which may lower the
    /// threshold for bulk runs).
    pub async fn verify_date(
        &self,
        date: NaiveDate,
        min_similarity: u32,
    ) -> Result<BatchVerifyStats> {
        let albums = self.store.albums_pending_verification(date, date).await?;
        let mut stats = BatchVerifyStats {
            total: albums.len(),
            ..Default::default()
        };
        if albums.is_empty() {
            tracing::info!(%date, "No albums pending verification");
            return Ok(stats);
        }

        let mut verifier = PlatformVerifier::new(self.archive.headless, min_similarity)
            .await
            .map_err(|e| AppError::upstream("verifier", e.to_string()))?;

        for (index, album) in albums.iter().enumerate() {
            if self.stop_requested() {
                break;
            }
            self.update_progress(|p| {
                p.message = format!("Verifying {}/{}: {}", index + 1, stats.total, album.album_name)
            })
            .await;

            let result = verifier.verify_album(album).await;
            if result.error.is_some() {
                stats.errors += 1;
            }
            if result.success {
                stats.verified += 1;
                if result.youtube.is_some() {
                    stats.youtube_count += 1;
                }
                if result.bandcamp.is_some() {
                    stats.bandcamp_count += 1;
                }
                self.store
                    .update_album_playable_urls(
                        &album.album_id,
                        result.youtube.as_ref(),
                        result.bandcamp.as_ref(),
                    )
                    .await?;
            } else {
                stats.failed += 1;
            }

            if index + 1 < albums.len() {
                verifier.pace().await;
            }
        }

        verifier.close().await;
        tracing::info!(
            verified = stats.verified,
            total = stats.total,
            errors = stats.errors,
            "Verification batch complete"
        );
        Ok(stats)
    }

    /// Queue audio downloads for every verified video embed of the date,
    /// at the post-scrape parallelism.
    async fn queue_downloads(&self, date: NaiveDate) -> Result<()> {
        let cache_settings: CacheSettings = self.store.read_settings(category::CACHE).await?;
        self.downloads
            .update_max_parallel(cache_settings.youtube_post_scrape_downloads);

        let albums = self.store.albums_by_date(date).await?;
        let mut queued = 0usize;
        for album in &albums {
            let Some(embed_url) = album.youtube_embed_url.as_deref() else {
                continue;
            };
            if let Some(video_id) = video_id_from_embed(embed_url) {
                if self.downloads.download(&video_id, false).is_none() {
                    queued += 1;
                }
            }
        }
        tracing::info!(queued, %date, "Queued post-scrape downloads");
        Ok(())
    }

    /// Run a date range sequentially, pausing between days; per-day
    /// failures do not stop the range.
    pub async fn run_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        with_covers: bool,
    ) -> Result<Vec<DailyRunResult>> {
        if start > end {
            return Err(AppError::invalid_input(
                "Start date must be before or equal to end date",
            ));
        }

        let mut results = Vec::new();
        let mut current = start;
        while current <= end {
            match self.run_for_date(current, with_covers).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::error!(date = %current, error = %err, "Day failed, continuing range");
                    results.push(DailyRunResult {
                        date: current,
                        success: false,
                        albums_scraped: 0,
                        albums_verified: 0,
                        duration_seconds: 0.0,
                        error: Some(err.to_string()),
                    });
                }
            }

            current = match current.succ_opt() {
                Some(next) => next,
                None => break,
            };
            if current <= end {
                tracing::info!("Waiting {}s before next date", INTER_DAY_PAUSE.as_secs());
                tokio::time::sleep(INTER_DAY_PAUSE).await;
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        tracing::info!(successful, total = results.len(), "Range run complete");
        Ok(results)
    }

    /// Daily trigger at the given wall-clock time. Runs immediately on
    /// startup when today has not been processed yet; duplicate runs for
    /// the same calendar day are suppressed.
    pub async fn run_daily_schedule(&self, at: NaiveTime, with_covers: bool) {
        tracing::info!(%at, "Scheduler started");

        if self.should_run_today().await {
            tracing::info!("No run recorded for today, executing immediately");
            self.run_scheduled(with_covers).await;
        }

        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let now = Utc::now().time();
            if now >= at && self.should_run_today().await {
                self.run_scheduled(with_covers).await;
            }
        }
    }

    async fn should_run_today(&self) -> bool {
        *self.last_run_date.read().await != Some(Utc::now().date_naive())
    }

    async fn run_scheduled(&self, with_covers: bool) {
        let today = Utc::now().date_naive();
        match self.run_for_date(today, with_covers).await {
            Ok(result) if result.success => {
                tracing::info!(%today, "Scheduled run completed");
            }
            Ok(result) => {
                tracing::error!(%today, error = ?result.error, "Scheduled run failed");
            }
            Err(err) => {
                // Conflict with a manual run counts as handled for today.
                tracing::warn!(%today, error = %err, "Scheduled run skipped");
            }
        }
    }
}

/// Recover the raw video id from a stored embed URL.
fn video_id_from_embed(embed_url: &str) -> Option<String> {
    if embed_url.contains("videoseries") {
        return None;
    }
    let tail = embed_url.rsplit('/').next()?;
    let id = tail.split(['?', '&']).next()?;
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_ids_recover_from_embed_urls() {
        assert_eq!(
            video_id_from_embed("https://www.youtube-nocookie.com/embed/abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            video_id_from_embed("https://www.youtube-nocookie.com/embed/videoseries?list=PL1"),
            None
        );
    }

    #[test]
    fn progress_report_defaults_to_idle() {
        let report = ProgressReport::default();
        assert!(!report.running);
        assert_eq!(report.progress, 0);
        assert!(report.error.is_none());
    }
}
