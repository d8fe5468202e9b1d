//! Page access abstraction consumed by the scraping core.
//!
//! The core never talks to a browser or HTTP client directly; it drives a
//! [`PageClient`] and identifies elements through opaque [`ElementHandle`]s.

pub mod html_client;
pub mod http_client;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation failed at step '{step}': {locator} never appeared")]
    Navigation { step: String, locator: String },

    #[error("HTTP {status} fetching {url}")]
    Fetch { url: String, status: u16 },

    #[error("invalid selector '{css}': {reason}")]
    Selector { css: String, reason: String },

    #[error("no page loaded")]
    NoPage,
}

// ── Element handle ────────────────────────────────────────────────────────────

/// Reference to an element on the page that was current when it was looked
/// up. Two handles are equal iff they point at the same element of the same
/// page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub page: u64,
    pub node: usize,
}

// ── Locators ──────────────────────────────────────────────────────────────────

/// A CSS selector, optionally narrowed to elements whose normalised text
/// contains (or, with `exact`, equals) `text`, with `nth` picking among
/// matches for single lookups.
///
/// `within` scopes list lookups to the first element matching that selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locator {
    pub css: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub nth: usize,
    #[serde(default)]
    pub within: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self { css: css.into(), text: None, exact: false, nth: 0, within: None }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self.exact = false;
        self
    }

    pub fn with_exact_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self.exact = true;
        self
    }

    pub fn within(mut self, container: impl Into<String>) -> Self {
        self.within = Some(container.into());
        self
    }

    /// Whether `text` (already normalised) passes the text filter.
    pub fn text_matches(&self, text: &str) -> bool {
        match &self.text {
            Some(wanted) if self.exact => text == wanted,
            Some(wanted) => text.contains(wanted.as_str()),
            None => true,
        }
    }

    pub fn nth(mut self, nth: usize) -> Self {
        self.nth = nth;
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(container) = &self.within {
            write!(f, "{} >> ", container)?;
        }
        write!(f, "{}", self.css)?;
        match &self.text {
            Some(text) if self.exact => write!(f, " = \"{}\"", text)?,
            Some(text) => write!(f, " ~ \"{}\"", text)?,
            None => {}
        }
        if self.nth > 0 {
            write!(f, " [{}]", self.nth)?;
        }
        Ok(())
    }
}

/// Prioritised locators; the first one that matches wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LocateStrategy(pub Vec<Locator>);

impl LocateStrategy {
    pub fn new(locators: impl IntoIterator<Item = Locator>) -> Self {
        Self(locators.into_iter().collect())
    }

    pub fn single(locator: Locator) -> Self {
        Self(vec![locator])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn locators(&self) -> &[Locator] {
        &self.0
    }

    /// All matches of the first locator that matches anything.
    pub async fn locate_all<P: PageClient + ?Sized>(&self, page: &P) -> Result<Vec<ElementHandle>> {
        for (i, loc) in self.0.iter().enumerate() {
            let found = match &loc.within {
                None => page.find_all(loc).await?,
                Some(container) => match page.find(&Locator::css(container.as_str())).await? {
                    Some(scope) => page.find_all_within(scope, loc).await?,
                    None => Vec::new(),
                },
            };
            if !found.is_empty() {
                debug!("{} matched {} elements (choice {})", loc, found.len(), i + 1);
                return Ok(found);
            }
            debug!("{} matched nothing", loc);
        }
        Ok(Vec::new())
    }

    /// First single match across the chain.
    pub async fn locate<P: PageClient + ?Sized>(&self, page: &P) -> Result<Option<ElementHandle>> {
        for loc in &self.0 {
            if let Some(el) = page.find(loc).await? {
                return Ok(Some(el));
            }
        }
        Ok(None)
    }

    /// Like [`locate`](Self::locate) but scoped to descendants of `parent`.
    pub async fn locate_within<P: PageClient + ?Sized>(
        &self,
        page: &P,
        parent: ElementHandle,
    ) -> Result<Option<ElementHandle>> {
        for loc in &self.0 {
            if let Some(el) = page.find_within(parent, loc).await? {
                return Ok(Some(el));
            }
        }
        Ok(None)
    }

    /// Wait on each locator in turn; every locator gets the full bound.
    pub async fn wait_for<P: PageClient + ?Sized>(
        &self,
        page: &P,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        for loc in &self.0 {
            if let Some(el) = page.wait_for_element(loc, timeout).await? {
                return Ok(Some(el));
            }
        }
        Ok(None)
    }
}

impl fmt::Display for LocateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|l| l.to_string()).collect();
        f.write_str(&parts.join(" | "))
    }
}

// ── Page client ───────────────────────────────────────────────────────────────

/// A single page session. Calls are strictly sequential; handles from a
/// previous page load are stale after `navigate`/`click`.
#[async_trait]
pub trait PageClient: Send + Sync {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Poll for `locator` for up to `timeout`; `None` when it never appears.
    async fn wait_for_element(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>>;

    /// Every element matching the locator's selector and text filter, in
    /// document order. `nth` is ignored here.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>>;

    async fn find_all_within(
        &self,
        parent: ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>>;

    async fn text(&self, el: ElementHandle) -> Result<String>;

    async fn attribute(&self, el: ElementHandle, name: &str) -> Result<Option<String>>;

    async fn click(&mut self, el: ElementHandle) -> Result<()>;

    async fn hover(&mut self, el: ElementHandle) -> Result<()>;

    async fn scroll_to_bottom(&mut self) -> Result<()>;

    async fn current_height(&self) -> Result<u64>;

    fn current_url(&self) -> Option<String>;

    async fn find(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        Ok(self.find_all(locator).await?.into_iter().nth(locator.nth))
    }

    async fn find_within(
        &self,
        parent: ElementHandle,
        locator: &Locator,
    ) -> Result<Option<ElementHandle>> {
        Ok(self.find_all_within(parent, locator).await?.into_iter().nth(locator.nth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        let loc = Locator::css("a").with_text("GPU - NVIDIA Gaming").nth(2);
        assert_eq!(loc.to_string(), "a ~ \"GPU - NVIDIA Gaming\" [2]");
        let chain = LocateStrategy::new([Locator::css("ul.a > li"), Locator::css("ul.b > li")]);
        assert_eq!(chain.to_string(), "ul.a > li | ul.b > li");

        let scoped = Locator::css("ul > li").within("div[role='main'] ul");
        assert_eq!(scoped.to_string(), "div[role='main'] ul >> ul > li");
        assert_eq!(Locator::css("a").with_exact_text("Computing").to_string(), "a = \"Computing\"");
    }

    #[test]
    fn test_exact_text_rejects_longer_labels() {
        let exact = Locator::css("a").with_exact_text("Computing");
        assert!(exact.text_matches("Computing"));
        assert!(!exact.text_matches("Cloud Computing"));

        let loose = Locator::css("a").with_text("Computing");
        assert!(loose.text_matches("Cloud Computing"));
        assert!(Locator::css("a").text_matches("anything"));
    }

    #[test]
    fn test_strategy_deserialises_from_list() {
        let chain: LocateStrategy = serde_json::from_str(
            r#"[{"css": "span.price", "nth": 3}, {"css": ".price"}]"#,
        )
        .unwrap();
        assert_eq!(chain.locators()[0], Locator::css("span.price").nth(3));
        assert_eq!(chain.locators()[1].nth, 0);
    }
}
