//! Catalog page → ordered, in-stock product URLs.

use crate::browser::html_client::resolve_url;
use crate::browser::{ElementHandle, PageClient};
use crate::config::sites::ListingSelectors;
use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub scrolls: u32,
    /// False when the iteration cap stopped the loop before the height
    /// settled; collection then proceeds with whatever is loaded.
    pub converged: bool,
}

/// Scroll to the bottom until two consecutive height reads agree, or
/// `max_iterations` scrolls have been made.
pub async fn settle_scroll<P: PageClient + ?Sized>(
    page: &mut P,
    pause: Duration,
    max_iterations: u32,
) -> Result<ScrollOutcome> {
    let mut last_height = page.current_height().await?;
    let mut scrolls = 0;

    while scrolls < max_iterations {
        page.scroll_to_bottom().await?;
        scrolls += 1;
        if !pause.is_zero() {
            sleep(pause).await;
        }

        let new_height = page.current_height().await?;
        debug!("Scroll {}: height {} → {}", scrolls, last_height, new_height);
        if new_height == last_height {
            return Ok(ScrollOutcome { scrolls, converged: true });
        }
        last_height = new_height;
    }

    warn!("Page still growing after {} scrolls, collecting what is loaded", scrolls);
    Ok(ScrollOutcome { scrolls, converged: false })
}

pub struct ListingCollector {
    selectors: ListingSelectors,
    scroll_pause: Duration,
    max_scroll_iterations: u32,
}

impl ListingCollector {
    pub fn new(selectors: ListingSelectors, scroll_pause: Duration, max_scroll_iterations: u32) -> Self {
        Self { selectors, scroll_pause, max_scroll_iterations }
    }

    /// Product URLs of every in-stock entry, in page order. Duplicates are
    /// kept if the page lists the same link twice.
    pub async fn collect<P: PageClient + ?Sized>(&self, page: &mut P) -> Result<Vec<String>> {
        if self.selectors.lazy_load {
            settle_scroll(page, self.scroll_pause, self.max_scroll_iterations).await?;
        }

        let entries = self.selectors.entries.locate_all(&*page).await?;
        if entries.is_empty() {
            info!("No listing entries found ({})", self.selectors.entries);
            return Ok(Vec::new());
        }

        let in_stock = self.in_stock(&*page, entries).await?;
        let base = page.current_url().unwrap_or_default();

        let mut links = Vec::with_capacity(in_stock.len());
        for entry in in_stock {
            match self.entry_link(&*page, entry).await? {
                Some(href) => match resolve_url(&base, &href) {
                    Ok(url) => links.push(url),
                    Err(e) => warn!("Skipping listing with bad link '{}': {:#}", href, e),
                },
                None => warn!("Listing entry without a link, skipping"),
            }
        }

        info!("There are {} cards in stock", links.len());
        Ok(links)
    }

    async fn in_stock<P: PageClient + ?Sized>(
        &self,
        page: &P,
        entries: Vec<ElementHandle>,
    ) -> Result<Vec<ElementHandle>> {
        if self.selectors.hidden.is_empty() {
            return Ok(entries);
        }

        let hidden: HashSet<ElementHandle> =
            self.selectors.hidden.locate_all(page).await?.into_iter().collect();
        let total = entries.len();
        let kept: Vec<_> = entries.into_iter().filter(|e| !hidden.contains(e)).collect();
        debug!("{} of {} entries hidden", total - kept.len(), total);
        Ok(kept)
    }

    async fn entry_link<P: PageClient + ?Sized>(
        &self,
        page: &P,
        entry: ElementHandle,
    ) -> Result<Option<String>> {
        if let Some(a) = self.selectors.link.locate_within(page, entry).await? {
            if let Some(href) = page.attribute(a, "href").await? {
                return Ok(Some(href));
            }
        }
        page.attribute(entry, "href").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::html_client::testing::MemorySource;
    use crate::browser::html_client::HtmlPageClient;
    use crate::browser::{LocateStrategy, Locator};
    use crate::config::sites::Site;
    use crate::scraper::testing::ScriptedHeights;

    const CATALOG: &str = "https://www.scan.co.uk/shop/gpu/rtx-3060";

    /// `total` entries, those whose index is in `hidden` carrying the
    /// out-of-stock price marker.
    fn scan_catalog(ul_class: &str, total: usize, hidden: &[usize]) -> String {
        let items: String = (0..total)
            .map(|i| {
                let price = if hidden.contains(&i) { "999999.00" } else { "329.99" };
                format!(r#"<li data-price="{price}"><a href="/products/card-{i}">Card {i}</a></li>"#)
            })
            .collect();
        format!(r#"<div role="main"><div><ul class="{ul_class}">{items}</ul></div></div>"#)
    }

    async fn page_with(html: String) -> HtmlPageClient<MemorySource> {
        let mut page = HtmlPageClient::new(MemorySource::new().with_page(CATALOG, html));
        page.navigate(CATALOG).await.unwrap();
        page
    }

    fn collector(site: Site) -> ListingCollector {
        ListingCollector::new(site.profile().listing, Duration::ZERO, 10)
    }

    #[tokio::test]
    async fn test_excludes_hidden_and_keeps_page_order() {
        let mut page = page_with(scan_catalog("productColumns", 10, &[1, 4, 8])).await;
        let urls = collector(Site::Scan).collect(&mut page).await.unwrap();

        let expected: Vec<String> = [0, 2, 3, 5, 6, 7, 9]
            .iter()
            .map(|i| format!("https://www.scan.co.uk/products/card-{i}"))
            .collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary_container() {
        let mut page = page_with(scan_catalog("product-grid", 3, &[2])).await;
        let urls = collector(Site::Scan).collect(&mut page).await.unwrap();
        assert_eq!(
            urls,
            vec!["https://www.scan.co.uk/products/card-0", "https://www.scan.co.uk/products/card-1"]
        );
    }

    #[tokio::test]
    async fn test_fallback_ignores_later_lists() {
        let html = r#"<div role="main">
                <div><ul class="product-grid">
                    <li data-price="329.99"><a href="/products/a">A</a></li>
                    <li data-price="999999.00"><a href="/products/b">B</a></li>
                </ul></div>
                <div class="pager"><ul>
                    <li><a href="/shop/gpu?page=2">2</a></li>
                </ul></div>
            </div>"#;
        let mut page = page_with(html.to_string()).await;
        let urls = collector(Site::Scan).collect(&mut page).await.unwrap();
        assert_eq!(urls, vec!["https://www.scan.co.uk/products/a"]);
    }

    #[tokio::test]
    async fn test_empty_catalog_is_not_an_error() {
        let mut page = page_with("<div role='main'><p>No results</p></div>".to_string()).await;
        let urls = collector(Site::Scan).collect(&mut page).await.unwrap();
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_box_markup_variant_and_duplicates() {
        let html = r#"<div class="product-list  p-small-list">
                <h3><a href="https://www.box.co.uk/a">A</a></h3>
                <h3><a href="https://www.box.co.uk/b">B</a></h3>
                <h3><a href="https://www.box.co.uk/a">A again</a></h3>
                <h3>no link</h3>
            </div>"#;
        let mut page = page_with(html.to_string()).await;
        let urls = collector(Site::Box).collect(&mut page).await.unwrap();
        assert_eq!(
            urls,
            vec!["https://www.box.co.uk/a", "https://www.box.co.uk/b", "https://www.box.co.uk/a"]
        );
    }

    #[tokio::test]
    async fn test_single_scroll_when_height_is_stable() {
        let mut page = ScriptedHeights::new(&[1000, 1000]);
        let outcome = settle_scroll(&mut page, Duration::ZERO, 10).await.unwrap();
        assert_eq!(outcome, ScrollOutcome { scrolls: 1, converged: true });
        assert_eq!(page.scrolls, 1);
    }

    #[tokio::test]
    async fn test_scroll_until_growth_stops() {
        let mut page = ScriptedHeights::new(&[1000, 1800, 2600, 2600]);
        let outcome = settle_scroll(&mut page, Duration::ZERO, 10).await.unwrap();
        assert_eq!(outcome, ScrollOutcome { scrolls: 3, converged: true });
    }

    #[tokio::test]
    async fn test_scroll_cap_is_best_effort() {
        let heights: Vec<u64> = (1..=100).map(|i| i * 1000).collect();
        let mut page = ScriptedHeights::new(&heights);
        let outcome = settle_scroll(&mut page, Duration::ZERO, 5).await.unwrap();
        assert_eq!(outcome, ScrollOutcome { scrolls: 5, converged: false });
    }

    #[tokio::test]
    async fn test_lazy_catalog_scrolls_before_collecting() {
        let mut page = ScriptedHeights::new(&[1000, 1000]);
        let selectors = ListingSelectors {
            entries: LocateStrategy::single(Locator::css("h3")),
            hidden: LocateStrategy::default(),
            link: LocateStrategy::single(Locator::css("a")),
            lazy_load: true,
        };
        let urls = ListingCollector::new(selectors, Duration::ZERO, 10)
            .collect(&mut page)
            .await
            .unwrap();
        assert!(urls.is_empty());
        assert_eq!(page.scrolls, 1);
    }
}
