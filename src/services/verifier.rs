//! Platform verifier: finds embeddable playback URLs for albums.
//!
//! For every album the verifier tries two platforms. The video platform is
//! searched globally ("{band} {album} full album"); candidates are scored
//! with fuzzy ratios and the best one above the similarity threshold wins.
//! The music-sales platform is matched from the band's page discography.
//! Connection-class failures rebuild the browser and retry; the browser is
//! also cycled preventively every N albums to avoid long-session drift.

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{Album, EmbedKind, VerifiedEmbed};
use crate::services::browser::{is_connection_error, BrowserSession};
use crate::services::matching;

const VIDEO_EMBED_BASE: &str = "https://www.youtube-nocookie.com/embed";
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of verifying one album across both platforms.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub album_id: String,
    pub youtube: Option<VerifiedEmbed>,
    pub bandcamp: Option<VerifiedEmbed>,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregate results of a verification batch.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchVerifyStats {
    pub total: usize,
    pub verified: usize,
    pub youtube_count: usize,
    pub bandcamp_count: usize,
    pub failed: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchCandidate {
    title: String,
    url: String,
}

pub struct PlatformVerifier {
    session: BrowserSession,
    headless: bool,
    min_similarity: u32,
    inter_album_delay: Duration,
    restart_every: usize,
    max_retries: u32,
    processed: usize,
}

impl PlatformVerifier {
    pub async fn new(headless: bool, min_similarity: u32) -> Result<Self> {
        let session = BrowserSession::launch(headless).await?;
        Ok(Self {
            session,
            headless,
            min_similarity,
            inter_album_delay: Duration::from_secs(2),
            restart_every: 50,
            max_retries: 2,
            processed: 0,
        })
    }

    pub fn set_min_similarity(&mut self, min_similarity: u32) {
        self.min_similarity = min_similarity;
    }

    pub async fn close(self) {
        self.session.close().await;
    }

    async fn restart_browser(&mut self) -> Result<()> {
        tracing::info!("Restarting verifier browser");
        let fresh = BrowserSession::launch(self.headless).await?;
        let old = std::mem::replace(&mut self.session, fresh);
        old.close().await;
        Ok(())
    }

    /// Pace between albums and cycle the browser preventively.
    pub async fn pace(&mut self) {
        self.processed += 1;
        if self.processed % self.restart_every == 0 {
            tracing::info!(
                processed = self.processed,
                "Preventive browser restart"
            );
            if let Err(err) = self.restart_browser().await {
                tracing::error!(error = %err, "Preventive restart failed");
            }
        }
        tokio::time::sleep(self.inter_album_delay).await;
    }

    /// Verify one album on both platforms, rebuilding the browser and
    /// retrying on connection-class failures.
    pub async fn verify_album(&mut self, album: &Album) -> VerificationResult {
        let mut result = VerificationResult {
            album_id: album.album_id.clone(),
            youtube: None,
            bandcamp: None,
            success: false,
            error: None,
        };
        tracing::info!(band = %album.band_name, album = %album.album_name, "Verifying album");

        for attempt in 0..=self.max_retries {
            let mut connection_error: Option<anyhow::Error> = None;

            match self.verify_youtube(album).await {
                Ok(found) => {
                    if let Some(embed) = &found {
                        tracing::info!(score = embed.match_score, "Video platform verified");
                    } else {
                        tracing::warn!(
                            threshold = self.min_similarity,
                            "No video match above threshold"
                        );
                    }
                    result.youtube = found;
                }
                Err(err) if is_connection_error(&err) => connection_error = Some(err),
                Err(err) => tracing::error!(error = %err, "Video verification error"),
            }

            if connection_error.is_none() {
                match self.verify_bandcamp(album).await {
                    Ok(found) => {
                        if let Some(embed) = &found {
                            tracing::info!(score = embed.match_score, "Music-sales platform verified");
                        } else {
                            tracing::warn!(
                                threshold = self.min_similarity,
                                "No music-sales match above threshold"
                            );
                        }
                        result.bandcamp = found;
                    }
                    Err(err) if is_connection_error(&err) => connection_error = Some(err),
                    Err(err) => tracing::error!(error = %err, "Music-sales verification error"),
                }
            }

            match connection_error {
                Some(err) if attempt < self.max_retries => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %err,
                        "Connection error, restarting browser"
                    );
                    if let Err(restart_err) = self.restart_browser().await {
                        result.error = Some(format!("Browser restart failed: {}", restart_err));
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                Some(err) => {
                    result.error = Some(err.to_string());
                    break;
                }
                None => break,
            }
        }

        result.success = result.youtube.is_some() || result.bandcamp.is_some();
        result
    }

    // ------------------------------------------------------------------
    // Video platform
    // ------------------------------------------------------------------

    async fn verify_youtube(&mut self, album: &Album) -> Result<Option<VerifiedEmbed>> {
        // A direct video or playlist URL on the record skips the search.
        if let Some(url) = album.youtube_url.as_deref() {
            if let Some(embed) = direct_video_embed(url, &album.album_name) {
                tracing::debug!("Using direct video URL, no search needed");
                return Ok(Some(embed));
            }
            if is_channel_url(url) {
                if let Some(embed) = self.search_channel(url, album).await? {
                    return Ok(Some(embed));
                }
            }
        }
        self.global_video_search(album).await
    }

    /// Channel-scoped pass: videos tab first, then playlists.
    async fn search_channel(&mut self, channel_url: &str, album: &Album) -> Result<Option<VerifiedEmbed>> {
        let videos_url = format!("{}/videos", channel_url.trim_end_matches('/'));
        self.session.goto(&videos_url, NAVIGATION_TIMEOUT).await?;
        self.scroll_results().await;
        let candidates = self.collect_video_candidates().await?;
        if let Some((candidate, score)) = best_video_candidate(
            &album.band_name,
            &album.album_name,
            &candidates,
            self.min_similarity,
        ) {
            if let Some(embed) = embed_from_url(&candidate.url, &candidate.title, score) {
                return Ok(Some(embed));
            }
        }

        let playlists_url = format!("{}/playlists", channel_url.trim_end_matches('/'));
        self.session.goto(&playlists_url, NAVIGATION_TIMEOUT).await?;
        let playlists = self.collect_playlist_candidates().await?;
        let best = playlists
            .iter()
            .map(|c| {
                (
                    c,
                    matching::token_sort_ratio(
                        &album.album_name.to_lowercase(),
                        &c.title.to_lowercase(),
                    ),
                )
            })
            .filter(|(_, score)| *score >= self.min_similarity)
            .max_by_key(|(_, score)| *score);
        if let Some((candidate, score)) = best {
            if let Some(embed) = embed_from_url(&candidate.url, &candidate.title, score) {
                return Ok(Some(embed));
            }
        }
        Ok(None)
    }

    async fn global_video_search(&mut self, album: &Album) -> Result<Option<VerifiedEmbed>> {
        let query = format!("{} {} full album", album.band_name, album.album_name);
        let url = format!(
            "https://www.youtube.com/results?search_query={}",
            urlencoding::encode(&query)
        );
        self.session.goto(&url, NAVIGATION_TIMEOUT).await?;
        self.scroll_results().await;

        let candidates = self.collect_video_candidates().await?;
        tracing::debug!(candidates = candidates.len(), "Collected search results");

        let best = best_video_candidate(
            &album.band_name,
            &album.album_name,
            &candidates,
            self.min_similarity,
        );
        Ok(best.and_then(|(candidate, score)| embed_from_url(&candidate.url, &candidate.title, score)))
    }

    async fn scroll_results(&self) {
        for _ in 0..3 {
            let _ = self
                .session
                .evaluate::<serde_json::Value>("() => { window.scrollBy(0, 1000); return null; }")
                .await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn collect_video_candidates(&self) -> Result<Vec<SearchCandidate>> {
        self.session
            .evaluate(
                r#"() => {
                    const results = [];
                    const elements = document.querySelectorAll(
                        'ytd-video-renderer, ytd-grid-video-renderer, ytd-rich-item-renderer');
                    elements.forEach(el => {
                        const titleEl = el.querySelector('#video-title, #video-title-link');
                        if (!titleEl) return;
                        const title = titleEl.textContent?.trim()
                            || titleEl.getAttribute('title') || '';
                        const url = titleEl.href || titleEl.getAttribute('href') || '';
                        if (title && url) {
                            results.push({
                                title: title,
                                url: url.startsWith('http')
                                    ? url : 'https://www.youtube.com' + url
                            });
                        }
                    });
                    return results;
                }"#,
            )
            .await
    }

    async fn collect_playlist_candidates(&self) -> Result<Vec<SearchCandidate>> {
        self.session
            .evaluate(
                r#"() => {
                    const results = [];
                    const elements = document.querySelectorAll(
                        'ytd-grid-playlist-renderer, ytd-playlist-renderer, ytd-rich-item-renderer');
                    elements.forEach(el => {
                        const titleEl = el.querySelector('#video-title, a#video-title');
                        if (!titleEl) return;
                        const title = titleEl.textContent?.trim()
                            || titleEl.getAttribute('title') || '';
                        const url = titleEl.href || titleEl.getAttribute('href') || '';
                        if (title && url) {
                            results.push({
                                title: title,
                                url: url.startsWith('http')
                                    ? url : 'https://www.youtube.com' + url
                            });
                        }
                    });
                    return results;
                }"#,
            )
            .await
    }

    // ------------------------------------------------------------------
    // Music-sales platform
    // ------------------------------------------------------------------

    async fn verify_bandcamp(&mut self, album: &Album) -> Result<Option<VerifiedEmbed>> {
        let Some(band_page) = album.bandcamp_url.as_deref() else {
            tracing::debug!("No band page URL for music-sales platform");
            return Ok(None);
        };

        self.session.goto(band_page, NAVIGATION_TIMEOUT).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let releases: Vec<SearchCandidate> = self
            .session
            .evaluate(
                r#"() => {
                    const results = [];
                    document.querySelectorAll('.music-grid-item, .featured-item').forEach(item => {
                        const titleEl = item.querySelector('.title, p.title');
                        const linkEl = item.querySelector('a');
                        if (titleEl && linkEl) {
                            results.push({ title: titleEl.textContent.trim(), url: linkEl.href });
                        }
                    });
                    document.querySelectorAll('.track_row_view').forEach(track => {
                        const titleEl = track.querySelector('.track-title');
                        const linkEl = track.querySelector('a');
                        if (titleEl && linkEl) {
                            results.push({ title: titleEl.textContent.trim(), url: linkEl.href });
                        }
                    });
                    return results;
                }"#,
            )
            .await?;

        let album_lower = album.album_name.to_lowercase();
        let best = releases
            .iter()
            .map(|c| (c, matching::token_sort_ratio(&album_lower, &c.title.to_lowercase())))
            .filter(|(_, score)| *score >= self.min_similarity)
            .max_by_key(|(_, score)| *score);

        let Some((candidate, score)) = best else {
            return Ok(None);
        };
        let release_url = candidate.url.clone();
        let matched_title = candidate.title.clone();

        self.session.goto(&release_url, NAVIGATION_TIMEOUT).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Open the share widget if present; the official embed code lives
        // behind it.
        let _ = self
            .session
            .evaluate::<serde_json::Value>(
                r#"() => {
                    const btn = Array.from(document.querySelectorAll('button, a'))
                        .find(el => (el.textContent || '').trim() === 'Share');
                    if (btn) btn.click();
                    return null;
                }"#,
            )
            .await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let embed_code: Option<String> = self
            .session
            .evaluate(
                r#"() => {
                    const input = document.querySelector(
                        'input[value*="EmbeddedPlayer"], textarea[value*="EmbeddedPlayer"]');
                    if (input) return input.value;
                    const data = document.querySelector('[data-embed]');
                    if (data) return data.getAttribute('data-embed');
                    return null;
                }"#,
            )
            .await
            .unwrap_or(None);

        Ok(Some(bandcamp_embed(
            &release_url,
            &matched_title,
            score,
            embed_code.as_deref(),
        )))
    }
}

/// Pick the best-scoring candidate at or above the threshold.
fn best_video_candidate<'a>(
    band_name: &str,
    album_name: &str,
    candidates: &'a [SearchCandidate],
    min_similarity: u32,
) -> Option<(&'a SearchCandidate, u32)> {
    candidates
        .iter()
        .map(|c| (c, matching::score_video_candidate(band_name, album_name, &c.title)))
        .filter(|(_, score)| *score >= min_similarity)
        .max_by_key(|(_, score)| *score)
}

/// Build an embed from a matched result URL: video ids take priority, then
/// playlist ids.
fn embed_from_url(url: &str, matched_title: &str, score: u32) -> Option<VerifiedEmbed> {
    if let Some(video_id) = extract_video_id(url) {
        return Some(VerifiedEmbed {
            embed_url: format!("{}/{}", VIDEO_EMBED_BASE, video_id),
            matched_title: matched_title.to_string(),
            match_score: score as i64,
            embed_kind: EmbedKind::Video,
            embed_code: None,
        });
    }
    if let Some(playlist_id) = extract_playlist_id(url) {
        return Some(VerifiedEmbed {
            embed_url: format!("{}/videoseries?list={}", VIDEO_EMBED_BASE, playlist_id),
            matched_title: matched_title.to_string(),
            match_score: score as i64,
            embed_kind: EmbedKind::Playlist,
            embed_code: None,
        });
    }
    None
}

/// Embed for a direct video/playlist URL carried on the album record. The
/// URL shape decides the kind; no search is involved so the score is 100.
fn direct_video_embed(url: &str, album_name: &str) -> Option<VerifiedEmbed> {
    if !(url.contains("watch?v=")
        || url.contains("youtu.be/")
        || url.contains("/embed/")
        || url.contains("list="))
    {
        return None;
    }
    // Playlist form wins only when no concrete video id is present.
    let mut embed = embed_from_url(url, album_name, 100)?;
    embed.match_score = 100;
    Some(embed)
}

fn is_channel_url(url: &str) -> bool {
    url.contains("/channel/") || url.contains("/user/") || url.contains("/c/") || url.contains("/@")
}

fn extract_video_id(url: &str) -> Option<String> {
    for pattern in [
        r"(?:youtube\.com/watch\?v=|youtu\.be/)([^&\n?#]+)",
        r"youtube\.com/embed/([^&\n?#/]+)",
        r"youtube\.com/v/([^&\n?#]+)",
    ] {
        if let Some(captures) = Regex::new(pattern).ok()?.captures(url) {
            let id = captures[1].to_string();
            if id != "videoseries" {
                return Some(id);
            }
        }
    }
    None
}

fn extract_playlist_id(url: &str) -> Option<String> {
    Regex::new(r"list=([^&\n?#]+)")
        .ok()?
        .captures(url)
        .map(|c| c[1].to_string())
}

/// Build the music-sales embed. A recoverable release id yields the
/// canonical player URL; otherwise a minimal iframe wraps the release page.
fn bandcamp_embed(
    release_url: &str,
    matched_title: &str,
    score: u32,
    embed_code: Option<&str>,
) -> VerifiedEmbed {
    if let Some(code) = embed_code {
        if let Some(captures) = Regex::new(r"album=(\d+)")
            .expect("valid pattern")
            .captures(code)
        {
            let album_id = &captures[1];
            return VerifiedEmbed {
                embed_url: format!(
                    "https://bandcamp.com/EmbeddedPlayer/album={}/size=large/bgcol=ffffff/linkcol=0687f5/tracklist=false/artwork=small/transparent=true/",
                    album_id
                ),
                matched_title: matched_title.to_string(),
                match_score: score as i64,
                embed_kind: EmbedKind::Playlist,
                embed_code: Some(code.to_string()),
            };
        }
    }
    VerifiedEmbed {
        embed_url: release_url.to_string(),
        matched_title: matched_title.to_string(),
        match_score: score as i64,
        embed_kind: EmbedKind::Playlist,
        embed_code: Some(format!(
            r#"<iframe src="{}" width="350" height="470"></iframe>"#,
            release_url
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, url: &str) -> SearchCandidate {
        SearchCandidate {
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn video_ids_extract_from_url_shapes() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=abc123&t=5").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            extract_video_id("https://youtu.be/xyz789").as_deref(),
            Some("xyz789")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/qwe456").as_deref(),
            Some("qwe456")
        );
        assert!(extract_video_id("https://www.youtube.com/playlist?list=PL1").is_none());
    }

    #[test]
    fn playlist_ids_extract_from_list_param() {
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/playlist?list=PLabc&x=1").as_deref(),
            Some("PLabc")
        );
        assert!(extract_playlist_id("https://www.youtube.com/watch?v=abc").is_none());
    }

    #[test]
    fn embeds_prefer_video_over_playlist() {
        let embed =
            embed_from_url("https://www.youtube.com/watch?v=abc&list=PL1", "Title", 95).unwrap();
        assert_eq!(embed.embed_kind, EmbedKind::Video);
        assert_eq!(embed.embed_url, "https://www.youtube-nocookie.com/embed/abc");

        let playlist =
            embed_from_url("https://www.youtube.com/playlist?list=PL1", "Title", 95).unwrap();
        assert_eq!(playlist.embed_kind, EmbedKind::Playlist);
        assert_eq!(
            playlist.embed_url,
            "https://www.youtube-nocookie.com/embed/videoseries?list=PL1"
        );
    }

    #[test]
    fn direct_urls_skip_search_with_full_score() {
        let embed =
            direct_video_embed("https://www.youtube.com/watch?v=abc", "Album Name").unwrap();
        assert_eq!(embed.match_score, 100);
        assert_eq!(embed.embed_kind, EmbedKind::Video);

        assert!(direct_video_embed("https://www.youtube.com/@someband", "x").is_none());
    }

    #[test]
    fn channel_urls_are_recognized() {
        assert!(is_channel_url("https://www.youtube.com/@band"));
        assert!(is_channel_url("https://www.youtube.com/channel/UCabc"));
        assert!(!is_channel_url("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn candidate_at_exact_threshold_is_accepted() {
        let candidates = vec![
            candidate(
                "AngelMaker - This Used to Be Heaven (Full Album 2025)",
                "https://www.youtube.com/watch?v=abc",
            ),
            candidate("Unrelated cooking video", "https://www.youtube.com/watch?v=def"),
        ];
        let best = best_video_candidate(
            "AngelMaker",
            "This Used to Be Heaven",
            &candidates,
            // Scores cap at 100, so demanding 100 exercises the >= boundary.
            100,
        );
        let (chosen, score) = best.expect("boundary candidate must be accepted");
        assert_eq!(score, 100);
        assert!(chosen.title.contains("AngelMaker"));
    }

    #[test]
    fn no_candidate_above_threshold_yields_none() {
        let candidates = vec![candidate("Totally different", "https://www.youtube.com/watch?v=x")];
        assert!(best_video_candidate("Band", "Album", &candidates, 90).is_none());
    }

    #[test]
    fn bandcamp_embed_prefers_recovered_album_id() {
        let embed = bandcamp_embed(
            "https://band.bandcamp.com/album/demo",
            "Demo",
            95,
            Some(r#"<iframe src="https://bandcamp.com/EmbeddedPlayer/album=12345/size=large/"></iframe>"#),
        );
        assert!(embed.embed_url.contains("album=12345"));
        assert!(embed.embed_code.unwrap().contains("12345"));
    }

    #[test]
    fn bandcamp_embed_falls_back_to_iframe() {
        let embed = bandcamp_embed("https://band.bandcamp.com/album/demo", "Demo", 92, None);
        assert_eq!(embed.embed_url, "https://band.bandcamp.com/album/demo");
        assert!(embed
            .embed_code
            .unwrap()
            .contains(r#"width="350" height="470""#));
    }
}
