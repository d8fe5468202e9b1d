//! [`PageClient`] over server-rendered HTML.
//!
//! Each navigation fetches the document through a [`PageSource`] and keeps the
//! raw markup; lookups re-parse it with `scraper`. Element handles are the
//! element's position in a document-order walk of the tree, which is stable
//! for a given page load.

use crate::browser::http_client::HttpClient;
use crate::browser::{ElementHandle, Locator, PageClient, ScrapeError};
use crate::scraper::cleaner::normalise_text;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Where page markup comes from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[async_trait]
impl PageSource for HttpClient {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }
}

struct LoadedPage {
    url: String,
    html: String,
    generation: u64,
}

pub struct HtmlPageClient<S> {
    source: S,
    page: Option<LoadedPage>,
    generation: u64,
}

impl<S: PageSource> HtmlPageClient<S> {
    pub fn new(source: S) -> Self {
        Self { source, page: None, generation: 0 }
    }

    fn page(&self) -> Result<&LoadedPage> {
        self.page.as_ref().ok_or_else(|| ScrapeError::NoPage.into())
    }

    fn matches(&self, parent: Option<ElementHandle>, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let page = self.page()?;
        let selector = parse_selector(&locator.css)?;
        let doc = Html::parse_document(&page.html);

        let index: HashMap<_, usize> = doc
            .tree
            .root()
            .descendants()
            .enumerate()
            .map(|(i, n)| (n.id(), i))
            .collect();

        let candidates: Vec<ElementRef> = match parent {
            None => doc.select(&selector).collect(),
            Some(p) => {
                let scope = resolve(&doc, page, p)?;
                scope.select(&selector).collect()
            }
        };

        Ok(candidates
            .into_iter()
            .filter(|el| locator.text.is_none() || locator.text_matches(&element_text(*el)))
            .filter_map(|el| index.get(&el.id()).copied())
            .map(|node| ElementHandle { page: page.generation, node })
            .collect())
    }

    fn with_element<T>(&self, el: ElementHandle, f: impl FnOnce(ElementRef<'_>) -> T) -> Result<T> {
        let page = self.page()?;
        let doc = Html::parse_document(&page.html);
        let found = resolve(&doc, page, el)?;
        Ok(f(found))
    }
}

#[async_trait]
impl<S: PageSource> PageClient for HtmlPageClient<S> {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let html = self
            .source
            .fetch(url)
            .await
            .with_context(|| format!("Failed to load {}", url))?;
        self.generation += 1;
        debug!("Loaded {} ({} bytes, page #{})", url, html.len(), self.generation);
        self.page = Some(LoadedPage { url: url.to_string(), html, generation: self.generation });
        Ok(())
    }

    async fn wait_for_element(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        // Static markup cannot change while we wait.
        self.find(locator).await
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        self.matches(None, locator)
    }

    async fn find_all_within(
        &self,
        parent: ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>> {
        self.matches(Some(parent), locator)
    }

    async fn text(&self, el: ElementHandle) -> Result<String> {
        self.with_element(el, element_text)
    }

    async fn attribute(&self, el: ElementHandle, name: &str) -> Result<Option<String>> {
        self.with_element(el, |e| e.value().attr(name).map(str::to_string))
    }

    async fn click(&mut self, el: ElementHandle) -> Result<()> {
        let href = self.with_element(el, |e| {
            std::iter::once(e)
                .chain(e.ancestors().filter_map(ElementRef::wrap))
                .find_map(|e| e.value().attr("href").map(str::to_string))
        })?;

        match href {
            Some(href) => {
                let base = self.page()?.url.clone();
                let target = resolve_url(&base, &href)
                    .with_context(|| format!("Bad link target '{}'", href))?;
                self.navigate(&target).await
            }
            None => {
                debug!("Clicked element without a link target; page unchanged");
                Ok(())
            }
        }
    }

    async fn hover(&mut self, el: ElementHandle) -> Result<()> {
        // Menus are already present in server-rendered markup.
        self.with_element(el, |_| ())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.page().map(|_| ())
    }

    async fn current_height(&self) -> Result<u64> {
        Ok(self.page()?.html.len() as u64)
    }

    fn current_url(&self) -> Option<String> {
        self.page.as_ref().map(|p| p.url.clone())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

pub fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| {
        ScrapeError::Selector { css: css.to_string(), reason: format!("{:?}", e) }.into()
    })
}

fn resolve<'a>(doc: &'a Html, page: &LoadedPage, el: ElementHandle) -> Result<ElementRef<'a>> {
    if el.page != page.generation {
        return Err(anyhow!("stale element handle from page #{}", el.page));
    }
    doc.tree
        .root()
        .descendants()
        .nth(el.node)
        .and_then(ElementRef::wrap)
        .ok_or_else(|| anyhow!("element #{} not found on page #{}", el.node, el.page))
}

fn element_text(el: ElementRef<'_>) -> String {
    normalise_text(&el.text().collect::<String>())
}

/// Resolve `href` against `base`; absolute links pass through unchanged.
pub fn resolve_url(base: &str, href: &str) -> Result<String> {
    let base = Url::parse(base).with_context(|| format!("Bad base URL '{}'", base))?;
    Ok(base.join(href.trim())?.to_string())
}

// ── Test support ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Pages served from memory, keyed by absolute URL.
    #[derive(Default)]
    pub struct MemorySource {
        pages: HashMap<String, String>,
    }

    impl MemorySource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), html.into());
            self
        }
    }

    #[async_trait]
    impl PageSource for MemorySource {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::Fetch { url: url.to_string(), status: 404 }.into())
        }
    }
}
