//! Built-in retailer profiles. A profile is plain data: every selector chain
//! and navigation step the site-agnostic collector and extractor need.

use crate::browser::{LocateStrategy, Locator};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Scan,
    Box,
}

impl Site {
    pub fn profile(self) -> SiteProfile {
        match self {
            Site::Scan => scan(),
            Site::Box => box_co_uk(),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Site::Scan => "scan",
            Site::Box => "box",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NavAction {
    Click,
    Hover,
}

/// One scripted interaction on the way from the landing page to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NavStep {
    pub name: String,
    pub locate: LocateStrategy,
    pub action: NavAction,
    /// Missing optional steps are logged and skipped.
    #[serde(default)]
    pub optional: bool,
}

impl NavStep {
    fn click(name: &str, locate: LocateStrategy) -> Self {
        Self { name: name.to_string(), locate, action: NavAction::Click, optional: false }
    }

    fn hover(name: &str, locate: LocateStrategy) -> Self {
        Self { name: name.to_string(), locate, action: NavAction::Hover, optional: false }
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListingSelectors {
    /// Listing entries; later locators are fallbacks for markup variants.
    pub entries: LocateStrategy,
    /// Entries flagged as out of stock. Empty disables the filter.
    #[serde(default)]
    pub hidden: LocateStrategy,
    /// Outbound link inside an entry.
    pub link: LocateStrategy,
    /// Whether the catalog lazy-loads entries on scroll.
    #[serde(default)]
    pub lazy_load: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProductSelectors {
    /// Site-published SKU. Empty means the site has none and one is generated.
    #[serde(default)]
    pub sku: LocateStrategy,
    pub brand: LocateStrategy,
    pub name: LocateStrategy,
    pub price: LocateStrategy,
    pub image: LocateStrategy,
    #[serde(default = "default_image_attr")]
    pub image_attr: String,
}

fn default_image_attr() -> String {
    "src".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SiteProfile {
    pub site: Site,
    pub landing_url: String,
    pub navigation: Vec<NavStep>,
    pub listing: ListingSelectors,
    pub product: ProductSelectors,
    /// Default "first N" cap when the configuration sets none.
    pub max_products: Option<usize>,
}

fn one(css: &str) -> LocateStrategy {
    LocateStrategy::single(Locator::css(css))
}

/// Link whose whole normalised text is `text`.
fn link_text(text: &str) -> LocateStrategy {
    LocateStrategy::single(Locator::css("a").with_exact_text(text))
}

// ── scan.co.uk ────────────────────────────────────────────────────────────────

fn scan() -> SiteProfile {
    SiteProfile {
        site: Site::Scan,
        landing_url: "https://www.scan.co.uk".to_string(),
        navigation: vec![
            NavStep::click("accept cookies", one("div.inner button")).optional(),
            NavStep::click(
                "components tab",
                LocateStrategy::single(Locator::css("div.menuLevel2 span").with_text("Components")),
            ),
            NavStep::click("nvidia gaming family", link_text("GPU - NVIDIA Gaming")),
            NavStep::click("rtx 3060 catalog", link_text("GeForce RTX 3060 (3584 Cores)")),
        ],
        listing: ListingSelectors {
            entries: LocateStrategy::new([
                Locator::css("ul.productColumns > li"),
                // first list of the main area only; later lists are pagers and filters
                Locator::css("ul > li").within("div[role='main'] ul"),
            ]),
            hidden: one("li[data-price*='999999.00']"),
            link: one("a"),
            lazy_load: false,
        },
        product: ProductSelectors {
            sku: one("strong[itemprop='sku']"),
            brand: LocateStrategy::new([
                Locator::css("[itemprop='brand']"),
                Locator::css("ul.breadcrumb li:nth-last-child(2)"),
            ]),
            name: LocateStrategy::new([Locator::css("h1[itemprop='name']"), Locator::css("h1")]),
            price: LocateStrategy::new([
                Locator::css("span.price").nth(3),
                Locator::css("[itemprop='price']"),
            ]),
            image: one("img.zoomable-image"),
            image_attr: default_image_attr(),
        },
        max_products: None,
    }
}

// ── box.co.uk ─────────────────────────────────────────────────────────────────

fn box_co_uk() -> SiteProfile {
    SiteProfile {
        site: Site::Box,
        landing_url: "https://www.box.co.uk".to_string(),
        navigation: vec![
            NavStep::hover("computing tab", link_text("Computing")).optional(),
            NavStep::hover("components + storage", link_text("Components + Storage")).optional(),
            NavStep::click(
                "rtx 3060 catalog",
                LocateStrategy::single(Locator::css("a").with_text("RTX 3060 Graphics Cards")),
            ),
        ],
        listing: ListingSelectors {
            // Box ships both spellings of the class attribute
            entries: LocateStrategy::new([
                Locator::css("div[class='product-list p-small-list'] h3"),
                Locator::css("div[class='product-list  p-small-list'] h3"),
            ]),
            hidden: LocateStrategy::default(),
            link: one("a"),
            lazy_load: true,
        },
        product: ProductSelectors {
            sku: LocateStrategy::default(),
            brand: one("span.breadcrumb-item:nth-of-type(5) span"),
            name: LocateStrategy::new([Locator::css("h2.p-title-desc"), Locator::css("h1")]),
            price: one("span.pq-price"),
            image: LocateStrategy::new([
                Locator::css("img[class='p-image-button pq-images-small pq-images-show']"),
                Locator::css("img.pq-images-show"),
            ]),
            image_attr: default_image_attr(),
        },
        max_products: Some(9),
    }
}
