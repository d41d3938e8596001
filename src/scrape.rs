//! Fetches flyer image URLs from store websites.
//!
//! Flyer pages are static enough for plain HTTP + HTML parsing; the only
//! dynamic behavior worth emulating is lazy image loading, handled by
//! re-fetching the page for a bounded wait instead of driving a browser.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// How flyer images are identified on a store page.
const FLYER_IMG_SELECTOR: &str = "img[src*='.webp']";

static FLYER_IMG: Lazy<Selector> =
    Lazy::new(|| Selector::parse(FLYER_IMG_SELECTOR).expect("valid flyer image selector"));

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const SELECTOR_WAIT: Duration = Duration::from_secs(15);
const REFETCH_PAUSE: Duration = Duration::from_secs(2);

/// Where flyer images come from. The posting job only sees this trait, so
/// tests can script page contents and failures.
#[async_trait]
pub trait FlyerSource: Send + Sync {
    /// Absolute flyer image URLs for a store page, in document order.
    /// An empty vec means the page loaded but showed no flyers.
    async fn flyer_image_urls(&self, page_url: &str) -> Result<Vec<String>>;

    /// Raw bytes of one flyer image.
    async fn download_image(&self, image_url: &str) -> Result<Vec<u8>>;
}

/// Production scraper: browser-looking HTTP client plus CSS selection.
pub struct WebScraper {
    http: reqwest::Client,
}

impl WebScraper {
    pub fn new() -> Result<Self> {
        // A browser-like User-Agent; flyer sites tend to block obvious bots.
        let user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(NAVIGATION_TIMEOUT)
            .build()
            .context("failed to build scraper HTTP client")?;

        Ok(Self { http })
    }

    async fn fetch_page(&self, page_url: &str) -> Result<String> {
        let response = self
            .http
            .get(page_url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {page_url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status} for {page_url}");
        }

        response
            .text()
            .await
            .with_context(|| format!("failed to read body of {page_url}"))
    }
}

#[async_trait]
impl FlyerSource for WebScraper {
    async fn flyer_image_urls(&self, page_url: &str) -> Result<Vec<String>> {
        let deadline = Instant::now() + SELECTOR_WAIT;
        loop {
            let html = self.fetch_page(page_url).await?;
            let urls = extract_flyer_urls(&html, page_url);
            if !urls.is_empty() {
                return Ok(urls);
            }
            if Instant::now() >= deadline {
                debug!(page = page_url, "no flyer images appeared before the wait deadline");
                return Ok(Vec::new());
            }
            // Lazy-loaded galleries usually fill in within a few seconds.
            tokio::time::sleep(REFETCH_PAUSE).await;
        }
    }

    async fn download_image(&self, image_url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .with_context(|| format!("failed to download {image_url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status} for {image_url}");
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read bytes of {image_url}"))?;
        Ok(bytes.to_vec())
    }
}

/// Pull flyer image URLs out of a page, resolving relative `src` values
/// against the page URL. Parsing happens entirely here so no document state
/// crosses an await point.
pub fn extract_flyer_urls(html: &str, page_url: &str) -> Vec<String> {
    let base = Url::parse(page_url).ok();
    let document = Html::parse_document(html);
    document
        .select(&FLYER_IMG)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| match Url::parse(src) {
            Ok(absolute) => Some(absolute.to_string()),
            Err(_) => base.as_ref()?.join(src).ok().map(|u| u.to_string()),
        })
        .collect()
}
