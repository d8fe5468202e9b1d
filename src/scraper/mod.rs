pub mod cleaner;
pub mod extract;
pub mod images;
pub mod listing;
pub mod navigate;

use crate::browser::PageClient;
use crate::config::sites::SiteProfile;
use crate::config::PipelineConfig;
use crate::models::ProductRecord;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use self::extract::ProductExtractor;
use self::listing::ListingCollector;

// ── Site scraper ──────────────────────────────────────────────────────────────

/// The scraping core for one site profile: catalog navigation, listing
/// collection and product extraction, all driven through a [`PageClient`].
pub struct SiteScraper {
    profile: SiteProfile,
    collector: ListingCollector,
    extractor: ProductExtractor,
    wait: Duration,
    settle: Duration,
}

impl SiteScraper {
    pub fn new(profile: SiteProfile, config: &PipelineConfig) -> Self {
        let collector = ListingCollector::new(
            profile.listing.clone(),
            Duration::from_millis(config.scroll_pause_ms),
            config.max_scroll_iterations,
        );
        let extractor = ProductExtractor::new(profile.product.clone());

        Self {
            profile,
            collector,
            extractor,
            wait: Duration::from_millis(config.wait_timeout_ms),
            settle: Duration::from_millis(config.page_settle_ms),
        }
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    /// Landing page → catalog page. Fatal on a missing required step.
    pub async fn open_catalog<P: PageClient + ?Sized>(&self, page: &mut P) -> Result<String> {
        info!("Opening {}", self.profile.landing_url);
        page.navigate(&self.profile.landing_url)
            .await
            .context("Landing page did not load")?;
        self.settle().await;

        navigate::follow_steps(page, &self.profile.navigation, self.wait, self.settle).await
    }

    /// In-stock product URLs on the current catalog page, capped to the
    /// profile's "first N" in page order.
    pub async fn discover_products<P: PageClient + ?Sized>(&self, page: &mut P) -> Result<Vec<String>> {
        let mut links = self.collector.collect(page).await?;
        if let Some(cap) = self.profile.max_products {
            if links.len() > cap {
                info!("Visiting the first {} of {} listings", cap, links.len());
                links.truncate(cap);
            }
        }
        Ok(links)
    }

    /// Load a product page. A page that does not load ends the run.
    pub async fn open_product<P: PageClient + ?Sized>(&self, page: &mut P, link: &str) -> Result<()> {
        page.navigate(link)
            .await
            .with_context(|| format!("Product page {} did not load", link))?;
        self.settle().await;
        Ok(())
    }

    /// Record for the product page currently loaded.
    pub async fn extract_product<P: PageClient + ?Sized>(&self, page: &P, link: &str) -> ProductRecord {
        self.extractor.extract(page, link).await
    }

    async fn settle(&self) {
        if !self.settle.is_zero() {
            sleep(self.settle).await;
        }
    }
}

// ── Test doubles ──────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::html_client::testing::MemorySource;
    use crate::browser::html_client::HtmlPageClient;
    use crate::config::sites::Site;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            wait_timeout_ms: 0,
            page_settle_ms: 0,
            scroll_pause_ms: 0,
            max_scroll_iterations: 5,
            max_products: None,
        }
    }

    #[tokio::test]
    async fn test_discover_applies_first_n_cap() {
        let items: String = (0..12)
            .map(|i| format!(r#"<h3><a href="https://www.box.co.uk/p/{i}">{i}</a></h3>"#))
            .collect();
        let html = format!(r#"<div class="product-list p-small-list">{items}</div>"#);
        let mut page = HtmlPageClient::new(MemorySource::new().with_page("https://www.box.co.uk/c", html));
        page.navigate("https://www.box.co.uk/c").await.unwrap();

        let scraper = SiteScraper::new(Site::Box.profile(), &fast_config());
        let links = scraper.discover_products(&mut page).await.unwrap();
        assert_eq!(links.len(), 9);
        assert_eq!(links[0], "https://www.box.co.uk/p/0");
        assert_eq!(links[8], "https://www.box.co.uk/p/8");
    }

    #[tokio::test]
    async fn test_unreachable_product_page_is_fatal() {
        let mut page = HtmlPageClient::new(MemorySource::new());
        let scraper = SiteScraper::new(Site::Box.profile(), &fast_config());
        let result = scraper.open_product(&mut page, "https://www.box.co.uk/gone").await;
        tokio_test::assert_err!(result);
    }
}
