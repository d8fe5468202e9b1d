//! Product page → [`ProductRecord`].
//!
//! Every field is looked up independently. A lookup that fails for any reason
//! (no match, empty text, client error) yields `Extracted::Unavailable` for
//! that field only; sentinels are applied when the record is assembled.

use crate::browser::html_client::resolve_url;
use crate::browser::{LocateStrategy, PageClient};
use crate::config::sites::ProductSelectors;
use crate::models::{Extracted, Price, ProductRecord};
use crate::scraper::cleaner::{generate_unique_id, non_empty, parse_price, short_id_for};
use tracing::debug;

pub struct ProductExtractor {
    selectors: ProductSelectors,
}

impl ProductExtractor {
    pub fn new(selectors: ProductSelectors) -> Self {
        Self { selectors }
    }

    /// Build the record for the product page currently loaded. Never fails.
    pub async fn extract<P: PageClient + ?Sized>(&self, page: &P, link: &str) -> ProductRecord {
        let sel = &self.selectors;

        let sku = if sel.sku.is_empty() {
            Extracted::Value(short_id_for(link))
        } else {
            text_field(page, &sel.sku, "sku")
                .await
                .or_else(|| Extracted::Value(short_id_for(link)))
        };
        let brand = text_field(page, &sel.brand, "brand").await;
        let name = text_field(page, &sel.name, "name").await;
        let price = text_field(page, &sel.price, "price").await.and_then(|t| parse_price(&t));
        let image_url = attr_field(page, &sel.image, &sel.image_attr, "image")
            .await
            .and_then(|src| resolve_url(link, &src).ok());

        if !price.is_available() {
            debug!("{}: no parseable price", link);
        }

        ProductRecord {
            sku: sku.or_sentinel(),
            brand: brand.or_sentinel(),
            name: name.or_sentinel(),
            unique_id: generate_unique_id(),
            price: Price::from(price),
            link: link.to_string(),
            image_url: image_url.or_sentinel(),
        }
    }
}

async fn text_field<P: PageClient + ?Sized>(
    page: &P,
    strategy: &LocateStrategy,
    field: &str,
) -> Extracted<String> {
    let text = match strategy.locate(page).await {
        Ok(Some(el)) => page.text(el).await,
        Ok(None) => {
            debug!("{}: nothing matched {}", field, strategy);
            return Extracted::Unavailable;
        }
        Err(e) => Err(e),
    };

    match text {
        Ok(t) => Extracted::from_option(non_empty(&t)),
        Err(e) => {
            debug!("{}: lookup failed: {:#}", field, e);
            Extracted::Unavailable
        }
    }
}

async fn attr_field<P: PageClient + ?Sized>(
    page: &P,
    strategy: &LocateStrategy,
    attr: &str,
    field: &str,
) -> Extracted<String> {
    let value = match strategy.locate(page).await {
        Ok(Some(el)) => page.attribute(el, attr).await,
        Ok(None) => {
            debug!("{}: nothing matched {}", field, strategy);
            return Extracted::Unavailable;
        }
        Err(e) => Err(e),
    };

    match value {
        Ok(v) => Extracted::from_option(v.as_deref().and_then(non_empty)),
        Err(e) => {
            debug!("{}: lookup failed: {:#}", field, e);
            Extracted::Unavailable
        }
    }
}
