use std::sync::OnceLock;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::PageContent;

const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const TEXT_WIDTH: usize = 80;
const TITLE_WIDTH: usize = 1000;
const MAX_CONCURRENT_FETCHES: usize = 4;

static TITLE: OnceLock<Regex> = OnceLock::new();
static ICON_LINK: OnceLock<Regex> = OnceLock::new();
static HREF: OnceLock<Regex> = OnceLock::new();

/// Downloads pages for command-line ingestion and turns them into the same
/// shape the browser sends.
pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    pub async fn fetch(&self, page_url: &str) -> Result<PageContent> {
        let url = Url::parse(page_url)
            .map_err(|e| anyhow::anyhow!("Invalid URL {}: {}", page_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!("Unsupported URL scheme: {}", url.scheme()).into());
        }

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to fetch {}: HTTP {}",
                page_url,
                response.status()
            )
            .into());
        }

        let final_url = response.url().clone();
        let html = response.text().await?;

        let text = extract_text(&html)
            .ok_or_else(|| AppError::Other(anyhow::anyhow!("No readable text at {}", page_url)))?;
        let title = extract_title(&html).unwrap_or_else(|| final_url.to_string());
        let favicon = find_favicon(&html, &final_url);

        Ok(PageContent {
            url: final_url.to_string(),
            title,
            text,
            favicon,
        })
    }

    /// Fetch several pages concurrently. Failures are logged and skipped.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<PageContent> {
        stream::iter(urls)
            .map(|url| async move {
                match self.fetch(url).await {
                    Ok(content) => Some(content),
                    Err(e) => {
                        tracing::warn!("Failed to fetch {}: {}", url, e);
                        None
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .filter_map(|r| async { r })
            .collect()
            .await
    }
}

impl Default for ContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Readable text of an HTML document, blank lines removed.
fn extract_text(html: &str) -> Option<String> {
    let text = match html2text::from_read(html.as_bytes(), TEXT_WIDTH) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    let cleaned = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn extract_title(html: &str) -> Option<String> {
    let title_re =
        TITLE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
    let raw = title_re.captures(html)?.get(1)?.as_str();

    // Let html2text decode entities
    let decoded = html2text::from_read(raw.as_bytes(), TITLE_WIDTH).ok()?;
    let title = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// The page's declared icon, or `/favicon.ico` on its origin.
fn find_favicon(html: &str, base: &Url) -> Option<String> {
    let link_re = ICON_LINK.get_or_init(|| {
        Regex::new(r#"(?i)<link[^>]*rel=["'](?:shortcut )?icon["'][^>]*>"#).expect("valid regex")
    });
    let href_re = HREF.get_or_init(|| {
        Regex::new(r#"(?i)href=["']([^"']+)["']"#).expect("valid regex")
    });

    let declared = link_re
        .find(html)
        .and_then(|tag| href_re.captures(tag.as_str()))
        .and_then(|cap| base.join(&cap[1]).ok());

    match declared {
        Some(icon) => Some(icon.to_string()),
        None => base.join("/favicon.ico").ok().map(|u| u.to_string()),
    }
}
