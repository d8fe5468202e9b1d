use crate::browser::ScrapeError;
use crate::config::ScraperConfig;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// reqwest client presenting itself as a desktop browser. Retailer CDNs
/// answer the default reqwest identifier with 403.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    request_delay_ms: u64,
    jitter_ms: u64,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Cookie banners set session cookies the next page expects
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            request_delay_ms: config.request_delay_ms,
            jitter_ms: config.jitter_ms,
        })
    }

    /// Fetch a URL as text. Single attempt; non-2xx is an error.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Fetch { url: url.to_string(), status: status.as_u16() }.into());
        }
        resp.text().await.context("Failed to read response body")
    }

    /// Fetch a URL as raw bytes, after the polite delay.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.polite_delay().await;
        debug!("GET {} (bytes)", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Fetch { url: url.to_string(), status: status.as_u16() }.into());
        }
        let bytes = resp.bytes().await.context("Failed to read response body")?;
        Ok(bytes.to_vec())
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>() % (self.jitter_ms + 1)
        };
        let total = Duration::from_millis(self.request_delay_ms + jitter);
        if !total.is_zero() {
            sleep(total).await;
        }
    }
}
