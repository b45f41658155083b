//! Browser-driven extractor for the archive site.
//!
//! Drives a Chromium session through the paginated listing endpoint, filters
//! to the requested day, then enriches every matching album from its detail
//! page, band page and the band's related-links endpoint. Respects the
//! pacing rules the site tolerates: jittered base delay, periodic longer
//! cool-downs, exponential backoff, and anti-bot interstitial waits.
//!
//! The scraper never writes to the store; the orchestrator persists.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rand::Rng;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ArchiveConfig;
use crate::models::{AlbumRecord, BandFacts, PlatformUrls, ReleaseType, ScraperSettings, Track};
use crate::services::browser::BrowserSession;

/// Hard cap on failure backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(300);
/// Fallback wait when a 429 carries no usable Retry-After.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Result of scraping one date.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub albums: Vec<AlbumRecord>,
    /// Set when the source answered 429 or returned suspiciously empty
    /// pages.
    pub rate_limited: bool,
    /// Set when a cooperative stop was observed before completion.
    pub stopped: bool,
}

/// Listing response shape of the archive's search endpoint.
#[derive(Debug, serde::Deserialize)]
struct ListingResponse {
    #[serde(rename = "aaData")]
    rows: Vec<Vec<String>>,
}

/// Basic album data parsed from one listing row, before enrichment.
#[derive(Debug)]
struct ListingRow {
    band_name: String,
    band_id: String,
    band_url: String,
    album_name: String,
    album_id: String,
    album_url: String,
    release_type: ReleaseType,
    release_date: Option<NaiveDate>,
    release_date_raw: String,
}

pub struct ArchiveScraper {
    session: BrowserSession,
    http: reqwest::Client,
    archive: ArchiveConfig,
    settings: ScraperSettings,
    covers_dir: PathBuf,
    stop: Arc<AtomicBool>,
    request_count: u64,
    last_request: Option<Instant>,
    rate_limited: bool,
}

impl ArchiveScraper {
    pub async fn new(
        archive: ArchiveConfig,
        settings: ScraperSettings,
        covers_dir: PathBuf,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        let session = BrowserSession::launch(archive.headless).await?;
        let http = reqwest::Client::builder()
            .user_agent(session.user_agent.clone())
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            session,
            http,
            archive,
            settings,
            covers_dir,
            stop,
            request_count: 0,
            last_request: None,
            rate_limited: false,
        })
    }

    pub async fn close(self) {
        self.session.close().await;
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Jittered pacing between navigations, with a longer cool-down every
    /// tenth request.
    async fn rate_limit(&mut self) {
        let (jitter, cooldown) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(0.8..=1.2), rng.gen_range(3.0..=6.0))
        };
        let delay = Duration::from_secs_f64(self.settings.request_delay_seconds * jitter);
        let wait = match self.last_request {
            Some(last) => delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        self.last_request = Some(Instant::now());
        self.request_count += 1;
        if self.request_count % 10 == 0 {
            tracing::debug!("Cool-down after {} requests", self.request_count);
            tokio::time::sleep(Duration::from_secs_f64(cooldown)).await;
        }
    }

    /// Navigate with retries, backoff, interstitial handling and 429
    /// detection. Returns the page HTML.
    async fn navigate(&mut self, url: &str) -> Result<String> {
        let timeout = Duration::from_secs(self.settings.request_timeout_seconds);
        let mut attempt: u32 = 0;

        loop {
            self.rate_limit().await;
            tracing::debug!(url, attempt, "Navigating");

            let outcome = self.session.goto(url, timeout).await;
            match outcome {
                Ok(content) => {
                    if self.session.challenge_present().await {
                        tracing::warn!(url, "Anti-bot challenge detected");
                        let max_wait =
                            Duration::from_secs(self.settings.cloudflare_max_wait_seconds);
                        if self.session.wait_for_challenge(max_wait).await {
                            return self
                                .session
                                .page()
                                .content()
                                .await
                                .context("Failed to read page after challenge");
                        }
                        // Unresolved challenge counts against the retry
                        // budget below.
                    } else if let Some(retry_after) = rate_limit_hint(&content) {
                        tracing::warn!(
                            url,
                            retry_after_secs = retry_after.as_secs(),
                            "Rate limited, honoring Retry-After"
                        );
                        self.rate_limited = true;
                        tokio::time::sleep(retry_after).await;
                        continue;
                    } else {
                        return Ok(content);
                    }
                }
                Err(err) => {
                    tracing::error!(url, error = %err, "Navigation error");
                }
            }

            attempt += 1;
            if attempt > self.settings.max_retries {
                return Err(anyhow!("Max retries exceeded for {}", url));
            }
            let backoff = Duration::from_secs(
                self.settings.retry_base_seconds * 2u64.pow(attempt.min(10)),
            )
            .min(MAX_BACKOFF);
            tracing::info!(
                url,
                attempt,
                max = self.settings.max_retries,
                backoff_secs = backoff.as_secs(),
                "Retrying navigation"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Scrape all albums released on `target`, fully enriched.
    pub async fn scrape_date(
        &mut self,
        target: NaiveDate,
        download_covers: bool,
    ) -> Result<ScrapeOutcome> {
        use chrono::Datelike;
        tracing::info!(%target, "Searching for albums");
        self.rate_limited = false;

        let mut outcome = ScrapeOutcome::default();
        let page_size = self.settings.page_size as usize;
        let mut display_start = 0usize;
        let mut page_count = 0usize;

        loop {
            if self.should_stop() {
                outcome.stopped = true;
                break;
            }

            let url = self.listing_url(target.year(), target.month(), display_start);
            tracing::info!(
                page = page_count + 1,
                from = display_start + 1,
                to = display_start + page_size,
                "Fetching listing page"
            );

            self.navigate(&url).await?;
            let listing = self.extract_listing().await?;
            if listing.rows.is_empty() {
                tracing::info!("No more albums in listing");
                break;
            }

            let fetched = listing.rows.len();
            let matching: Vec<ListingRow> = listing
                .rows
                .iter()
                .filter_map(|row| parse_listing_row(row, &self.archive.base_url))
                .filter(|row| row.release_date == Some(target))
                .collect();

            tracing::info!(
                matches = matching.len(),
                page = page_count + 1,
                "Parsed listing page"
            );

            for row in matching {
                if self.should_stop() {
                    outcome.stopped = true;
                    break;
                }
                let mut record = row.into_record();
                if let Err(err) = self.enrich_album(&mut record, download_covers).await {
                    tracing::error!(
                        album = %record.album_name,
                        error = %err,
                        "Enrichment failed, keeping basic data"
                    );
                }
                outcome.albums.push(record);
            }
            if outcome.stopped {
                break;
            }

            if fetched < page_size {
                break;
            }
            display_start += fetched;
            page_count += 1;
        }

        outcome.rate_limited = self.rate_limited || outcome.albums.is_empty();
        tracing::info!(found = outcome.albums.len(), %target, "Scrape finished");
        Ok(outcome)
    }

    fn listing_url(&self, year: i32, month: u32, display_start: usize) -> String {
        let params: Vec<(&str, String)> = vec![
            ("sEcho", "1".into()),
            ("iColumns", "4".into()),
            ("sColumns", ",,,".into()),
            ("iDisplayStart", display_start.to_string()),
            ("iDisplayLength", self.settings.page_size.to_string()),
            ("sSearch", String::new()),
            ("bRegex", "false".into()),
            ("iSortCol_0", "2".into()),
            ("sSortDir_0", "asc".into()),
            ("iSortingCols", "1".into()),
            ("releaseYearFrom", year.to_string()),
            ("releaseMonthFrom", month.to_string()),
            ("releaseYearTo", year.to_string()),
            ("releaseMonthTo", month.to_string()),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.archive.search_url(), query)
    }

    /// The endpoint renders JSON into the document body (usually inside a
    /// `<pre>` element).
    async fn extract_listing(&self) -> Result<ListingResponse> {
        let json_text: Option<String> = self
            .session
            .evaluate(
                r#"() => {
                    const pre = document.querySelector('pre');
                    if (pre && pre.textContent) {
                        return pre.textContent;
                    }
                    const body = document.body.textContent;
                    if (body && body.trim().startsWith('{')) {
                        return body.trim();
                    }
                    return null;
                }"#,
            )
            .await?;

        let json_text = json_text.ok_or_else(|| anyhow!("No JSON found in listing response"))?;
        serde_json::from_str(&json_text).context("Unexpected listing response format")
    }

    /// Visit the album page, band page and related-links endpoint to fill
    /// in everything the listing row lacks.
    async fn enrich_album(
        &mut self,
        record: &mut AlbumRecord,
        download_covers: bool,
    ) -> Result<()> {
        if record.album_url.is_empty() {
            return Ok(());
        }
        tracing::debug!(album = %record.album_name, "Enriching album");

        self.navigate(&record.album_url.clone()).await?;

        let cover_art: Option<String> = self
            .session
            .evaluate(
                r#"() => {
                    let img = document.querySelector('a.image img')
                        || document.querySelector('img.album_img')
                        || document.querySelector('img[src*="albums"]')
                        || document.querySelector('#album_info img');
                    return img ? img.src : null;
                }"#,
            )
            .await
            .unwrap_or(None);

        if let Some(cover_url) = cover_art {
            record.cover_art = Some(cover_url.clone());
            if download_covers {
                match self.download_cover(&record.album_id, &cover_url).await {
                    Ok(path) => record.cover_path = Some(path),
                    Err(err) => {
                        tracing::warn!(album = %record.album_name, error = %err, "Cover download failed")
                    }
                }
            }
        }

        let details: HashMap<String, String> = self
            .session
            .evaluate(
                r#"() => {
                    const info = {};
                    const dl = document.querySelector('div#album_info dl');
                    if (dl) {
                        const dts = dl.querySelectorAll('dt');
                        const dds = dl.querySelectorAll('dd');
                        dts.forEach((dt, i) => {
                            if (dds[i]) {
                                const key = dt.textContent.trim().toLowerCase()
                                    .replace(/[^a-z0-9]/g, '_');
                                const value = dds[i].textContent.trim();
                                if (key && value) info[key] = value;
                            }
                        });
                    }
                    return info;
                }"#,
            )
            .await
            .unwrap_or_default();
        record.details = serde_json::to_value(details)?;

        record.tracklist = self.extract_tracklist().await.unwrap_or_default();

        if !record.band_url.is_empty() {
            let band_url = record.band_url.clone();
            match self.extract_band_facts(&band_url).await {
                Ok(facts) => record.band_facts = facts,
                Err(err) => tracing::warn!(error = %err, "Band page extraction failed"),
            }
            if !record.band_id.is_empty() {
                let band_id = record.band_id.clone();
                match self.extract_platform_urls(&band_id).await {
                    Ok(urls) => record.platform_urls = urls,
                    Err(err) => tracing::warn!(error = %err, "Related-links extraction failed"),
                }
            }
        }

        Ok(())
    }

    async fn extract_tracklist(&self) -> Result<Vec<Track>> {
        let tracks: Vec<Track> = self
            .session
            .evaluate(
                r#"() => {
                    const tracks = [];
                    const table = document.querySelector('table.table_lyrics');
                    if (!table) return tracks;
                    table.querySelectorAll('tr').forEach(row => {
                        const cells = row.querySelectorAll('td');
                        if (cells.length < 2) return;
                        const number = cells[0]?.textContent?.trim() || '';
                        const name = cells[1]?.textContent?.trim() || '';
                        const length = cells[2]?.textContent?.trim() || '';
                        if (!number.match(/^\d+\.?$/)) return;
                        if (name.includes('(loading lyrics...)')) return;
                        const track = {
                            number: number.replace('.', ''),
                            name: name,
                            length: length
                        };
                        const lyrics = cells[1]?.querySelector('a[href*="lyrics"]');
                        if (lyrics) track.lyrics_url = lyrics.href;
                        tracks.push(track);
                    });
                    return tracks;
                }"#,
            )
            .await?;
        tracing::debug!(count = tracks.len(), "Extracted tracklist");
        Ok(tracks)
    }

    async fn extract_band_facts(&mut self, band_url: &str) -> Result<BandFacts> {
        self.navigate(band_url).await?;
        let raw: HashMap<String, String> = self
            .session
            .evaluate(
                r#"() => {
                    const info = {};
                    const div = document.querySelector('#band_info');
                    if (!div) return info;
                    const dts = div.querySelectorAll('dt');
                    const dds = div.querySelectorAll('dd');
                    dts.forEach((dt, i) => {
                        if (dds[i]) {
                            const key = dt.textContent.trim().toLowerCase();
                            const value = dds[i].textContent.trim();
                            if (key.includes('country of origin')) info.country_of_origin = value;
                            else if (key.includes('location')) info.location = value;
                            else if (key.includes('genre')) info.genre = value;
                            else if (key.includes('themes')) info.themes = value;
                            else if (key.includes('current label')) info.current_label = value;
                            else if (key.includes('years active')) info.years_active = value;
                        }
                    });
                    return info;
                }"#,
            )
            .await?;

        Ok(BandFacts {
            country_of_origin: raw.get("country_of_origin").cloned().unwrap_or_default(),
            location: raw.get("location").cloned().unwrap_or_default(),
            genre: raw.get("genre").cloned().unwrap_or_default(),
            themes: raw.get("themes").cloned().unwrap_or_default(),
            current_label: raw.get("current_label").cloned().unwrap_or_default(),
            years_active: raw.get("years_active").cloned().unwrap_or_default(),
        })
    }

    /// The related-links endpoint lists external pages for a band; each of
    /// the seven platforms is matched by domain.
    async fn extract_platform_urls(&mut self, band_id: &str) -> Result<PlatformUrls> {
        let url = self.archive.band_links_url(band_id);
        self.navigate(&url).await?;
        let hrefs: Vec<String> = self
            .session
            .evaluate(
                r#"() => Array.from(document.querySelectorAll('a[href]'))
                        .map(a => a.href)
                        .filter(h => h.startsWith('http'))"#,
            )
            .await?;
        Ok(match_platform_urls(&hrefs))
    }

    async fn download_cover(&self, album_id: &str, cover_url: &str) -> Result<String> {
        std::fs::create_dir_all(&self.covers_dir)?;
        let response = self
            .http
            .get(cover_url)
            .send()
            .await
            .context("Cover request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("Cover request returned {}", response.status());
        }
        let bytes = response.bytes().await?;
        let path = self.covers_dir.join(format!("{}.jpg", album_id));
        std::fs::write(&path, &bytes)?;
        tracing::info!(album_id, path = %path.display(), "Downloaded cover");
        Ok(path.to_string_lossy().to_string())
    }
}

impl ListingRow {
    fn into_record(self) -> AlbumRecord {
        AlbumRecord {
            album_id: self.album_id,
            album_name: self.album_name,
            album_url: self.album_url,
            band_name: self.band_name,
            band_id: self.band_id,
            band_url: self.band_url,
            // Callers filter on a parsed date before building records.
            release_date: self.release_date.expect("listing row has parsed date"),
            release_date_raw: self.release_date_raw,
            release_type: self.release_type,
            cover_art: None,
            cover_path: None,
            platform_urls: PlatformUrls::default(),
            band_facts: BandFacts::default(),
            details: serde_json::Value::Object(Default::default()),
            tracklist: Vec::new(),
        }
    }
}

/// Parse one `aaData` row: band cell HTML, album cell HTML, type, raw date.
fn parse_listing_row(row: &[String], base_url: &str) -> Option<ListingRow> {
    if row.len() < 4 {
        tracing::warn!(cells = row.len(), "Skipping listing row with too few cells");
        return None;
    }

    let (band_name, band_href) = parse_link_cell(&row[0]);
    let (album_name, album_href) = parse_link_cell(&row[1]);
    let release_type = ReleaseType::parse(row[2].trim());
    let release_date_raw = row[3].trim().to_string();
    let release_date = parse_release_date(&release_date_raw);

    let band_url = band_href.map(|h| absolutize(base_url, &h)).unwrap_or_default();
    let album_url = album_href.map(|h| absolutize(base_url, &h)).unwrap_or_default();

    Some(ListingRow {
        band_id: extract_band_id(&band_url).unwrap_or_default(),
        album_id: extract_album_id(&album_url).unwrap_or_default(),
        band_name,
        band_url,
        album_name,
        album_url,
        release_type,
        release_date,
        release_date_raw,
    })
}

/// Extract the text and first link href from one HTML table cell.
fn parse_link_cell(html: &str) -> (String, Option<String>) {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("a").expect("valid selector");
    let href = fragment
        .select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string);
    let text = fragment
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    (text, href)
}

fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

fn extract_band_id(url: &str) -> Option<String> {
    static_capture(url, r"bands/.*?/(\d+)")
}

fn extract_album_id(url: &str) -> Option<String> {
    static_capture(url, r"albums/.*?/(\d+)")
}

fn static_capture(text: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(text)
        .map(|c| c[1].to_string())
}

/// Parse the archive's listing date cell. The cell usually carries the ISO
/// date in an HTML comment ("August 31st, 2025 <!-- 2025-08-31 -->"); the
/// human-readable text is the fallback.
fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    if let (Some(start), Some(end)) = (raw.find("<!--"), raw.find("-->")) {
        let iso = raw[start + 4..end].trim();
        if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
            return Some(date);
        }
    }

    let stripped = Regex::new(r"<[^>]+>")
        .expect("valid pattern")
        .replace_all(raw, "")
        .to_string();
    let no_ordinals = Regex::new(r"(\d+)(st|nd|rd|th)")
        .expect("valid pattern")
        .replace_all(&stripped, "$1")
        .trim()
        .to_string();

    for format in ["%B %d, %Y", "%B %d %Y", "%d %B %Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(&no_ordinals, format) {
            return Some(date);
        }
    }
    tracing::warn!(raw, "Could not parse release date");
    None
}

/// Match collected hrefs against the seven supported platforms, first match
/// per platform wins.
fn match_platform_urls(hrefs: &[String]) -> PlatformUrls {
    let mut urls = PlatformUrls::default();
    for href in hrefs {
        let lower = href.to_lowercase();
        if urls.bandcamp_url.is_none() && lower.contains("bandcamp.com") {
            urls.bandcamp_url = Some(href.clone());
        } else if urls.youtube_url.is_none()
            && (lower.contains("youtube.com") || lower.contains("youtu.be"))
        {
            urls.youtube_url = Some(href.clone());
        } else if urls.spotify_url.is_none() && lower.contains("spotify.com") {
            urls.spotify_url = Some(href.clone());
        } else if urls.discogs_url.is_none() && lower.contains("discogs.com") {
            urls.discogs_url = Some(href.clone());
        } else if urls.lastfm_url.is_none()
            && (lower.contains("last.fm") || lower.contains("lastfm.com"))
        {
            urls.lastfm_url = Some(href.clone());
        } else if urls.soundcloud_url.is_none() && lower.contains("soundcloud.com") {
            urls.soundcloud_url = Some(href.clone());
        } else if urls.tidal_url.is_none() && lower.contains("tidal.com") {
            urls.tidal_url = Some(href.clone());
        }
    }
    urls
}

/// Detect a rate-limit answer in rendered page content and extract a
/// Retry-After hint when present.
fn rate_limit_hint(content: &str) -> Option<Duration> {
    let lower = content.to_lowercase();
    // Digits alone are too common in listing payloads; require the status
    // phrase or an explicit error marker.
    if !lower.contains("too many requests") && !lower.contains("error 429") {
        return None;
    }
    let seconds = Regex::new(r"(?i)retry-after[:\s]+(\d+)")
        .expect("valid pattern")
        .captures(content)
        .and_then(|c| c[1].parse::<u64>().ok());
    Some(seconds.map(Duration::from_secs).unwrap_or(DEFAULT_RETRY_AFTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_date_prefers_embedded_iso_comment() {
        let date = parse_release_date("August 31st, 2025 <!-- 2025-08-31 -->");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 8, 31));
    }

    #[test]
    fn release_date_falls_back_to_human_format() {
        assert_eq!(
            parse_release_date("October 7th, 2025"),
            NaiveDate::from_ymd_opt(2025, 10, 7)
        );
        assert_eq!(
            parse_release_date("2025-10-07"),
            NaiveDate::from_ymd_opt(2025, 10, 7)
        );
        assert_eq!(parse_release_date("sometime soon"), None);
    }

    #[test]
    fn link_cells_yield_text_and_href() {
        let (text, href) =
            parse_link_cell(r#"<a href="https://example.com/bands/Testband/123">Testband</a>"#);
        assert_eq!(text, "Testband");
        assert_eq!(href.as_deref(), Some("https://example.com/bands/Testband/123"));

        let (plain, no_href) = parse_link_cell("Plain text");
        assert_eq!(plain, "Plain text");
        assert!(no_href.is_none());
    }

    #[test]
    fn ids_extract_from_entity_urls() {
        assert_eq!(
            extract_band_id("https://example.com/bands/Testband/123").as_deref(),
            Some("123")
        );
        assert_eq!(
            extract_album_id("https://example.com/albums/Testband/Demo/456").as_deref(),
            Some("456")
        );
        assert!(extract_band_id("https://example.com/somewhere").is_none());
    }

    #[test]
    fn listing_rows_filter_and_absolutize() {
        let row = vec![
            r#"<a href="/bands/Testband/123">Testband</a>"#.to_string(),
            r#"<a href="/albums/Testband/First/456">First</a>"#.to_string(),
            "Full-length".to_string(),
            "October 7th, 2025 <!-- 2025-10-07 -->".to_string(),
        ];
        let parsed = parse_listing_row(&row, "https://archive.example").unwrap();
        assert_eq!(parsed.band_id, "123");
        assert_eq!(parsed.album_id, "456");
        assert_eq!(parsed.album_url, "https://archive.example/albums/Testband/First/456");
        assert_eq!(parsed.release_type, ReleaseType::FullLength);
        assert_eq!(parsed.release_date, NaiveDate::from_ymd_opt(2025, 10, 7));

        assert!(parse_listing_row(&["only".to_string()], "x").is_none());
    }

    #[test]
    fn platform_urls_match_by_domain_first_wins() {
        let hrefs = vec![
            "https://testband.bandcamp.com".to_string(),
            "https://other.bandcamp.com".to_string(),
            "https://www.youtube.com/@testband".to_string(),
            "https://open.spotify.com/artist/x".to_string(),
            "https://www.discogs.com/artist/x".to_string(),
            "https://www.last.fm/music/x".to_string(),
            "https://soundcloud.com/x".to_string(),
            "https://tidal.com/browse/artist/x".to_string(),
        ];
        let urls = match_platform_urls(&hrefs);
        assert_eq!(urls.bandcamp_url.as_deref(), Some("https://testband.bandcamp.com"));
        assert!(urls.youtube_url.is_some());
        assert!(urls.spotify_url.is_some());
        assert!(urls.discogs_url.is_some());
        assert!(urls.lastfm_url.is_some());
        assert!(urls.soundcloud_url.is_some());
        assert!(urls.tidal_url.is_some());
    }

    #[test]
    fn rate_limit_hint_honors_retry_after() {
        assert_eq!(
            rate_limit_hint("<h1>429 Too Many Requests</h1> Retry-After: 60"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            rate_limit_hint("<h1>Too Many Requests</h1>"),
            Some(DEFAULT_RETRY_AFTER)
        );
        assert_eq!(rate_limit_hint("<h1>All fine</h1>"), None);
        // Bare digits in listing payloads must not trip the detector.
        assert_eq!(rate_limit_hint(r#"{"aaData": [["429", "x"]]}"#), None);
    }
}
