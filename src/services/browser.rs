//! Headless browser session shared by the scraper and the verifier.
//!
//! Each subsystem owns its own session; sessions are never shared across
//! subsystems. A session wraps one Chromium instance with a randomized user
//! agent and viewport, and knows how to wait out anti-bot interstitials.

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::USER_AGENTS;

/// Challenge markers checked on every navigation.
const CHALLENGE_SELECTORS: &[&str] = &[
    "div#cf-challenge-running",
    ".cf-browser-verification",
    ".challenge-running",
];
const CHALLENGE_TITLE_MARKERS: &[&str] = &["just a moment", "cloudflare", "attention required"];

pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    pub user_agent: String,
}

impl BrowserSession {
    /// Launch a Chromium instance with a user agent and viewport drawn from
    /// the fixed rotation set.
    pub async fn launch(headless: bool) -> Result<Self> {
        let (width, height) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(1200..=1920), rng.gen_range(800..=1080))
        };

        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(|e| anyhow!(e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let user_agent = {
            let mut rng = rand::thread_rng();
            USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())].to_string()
        };

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;
        page.set_user_agent(&user_agent)
            .await
            .context("Failed to set user agent")?;

        tracing::info!(width, height, "Browser session launched");
        Ok(Self {
            browser,
            page,
            handler,
            user_agent,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate with a bounded timeout and return the page HTML.
    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<String> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow!("Navigation timeout after {}s: {}", timeout.as_secs(), url))?
            .with_context(|| format!("Navigation failed: {}", url))?;
        self.page
            .content()
            .await
            .context("Failed to read page content")
    }

    /// Evaluate a JS function on the current page and deserialize its
    /// return value.
    pub async fn evaluate<T: serde::de::DeserializeOwned>(&self, function: &str) -> Result<T> {
        let result = self
            .page
            .evaluate_function(function)
            .await
            .context("Script evaluation failed")?;
        result.into_value::<T>().context("Unexpected script result")
    }

    pub async fn title(&self) -> String {
        self.page
            .get_title()
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// True when a known anti-bot challenge is on the page.
    pub async fn challenge_present(&self) -> bool {
        for selector in CHALLENGE_SELECTORS {
            if let Ok(Some(found)) = self
                .evaluate::<Option<bool>>(&format!(
                    "() => document.querySelector('{}') !== null",
                    selector
                ))
                .await
            {
                if found {
                    return true;
                }
            }
        }
        let title = self.title().await.to_lowercase();
        CHALLENGE_TITLE_MARKERS
            .iter()
            .any(|marker| title.contains(marker))
    }

    /// Poll for the challenge to clear itself. Returns true once clear.
    pub async fn wait_for_challenge(&self, max_wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + max_wait;
        while tokio::time::Instant::now() < deadline {
            if !self.challenge_present().await {
                tracing::info!("Challenge cleared");
                return true;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tracing::warn!("Challenge not cleared within {}s", max_wait.as_secs());
        false
    }

    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            tracing::warn!(error = %err, "Error closing browser");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        tracing::info!("Browser session closed");
    }
}

/// Heuristic for errors that mean the browser or page connection died and a
/// fresh session is needed.
pub fn is_connection_error(err: &anyhow::Error) -> bool {
    let message = format!("{:#}", err).to_lowercase();
    message.contains("closed")
        || message.contains("connection")
        || message.contains("websocket")
        || message.contains("browser")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_detected_by_message() {
        assert!(is_connection_error(&anyhow!(
            "Target page, context or browser has been closed"
        )));
        assert!(is_connection_error(&anyhow!("websocket protocol error")));
        assert!(!is_connection_error(&anyhow!("no matches above threshold")));
    }
}
