use crate::browser::http_client::HttpClient;
use crate::models::ProductRecord;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl ImageFetcher for HttpClient {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.get_bytes(url).await
    }
}

/// Download the record's image to `dest`. Failures are logged and reported as
/// `None`; the record itself is left untouched.
pub async fn download_image<F: ImageFetcher + ?Sized>(
    fetcher: &F,
    record: &ProductRecord,
    dest: &Path,
) -> Option<PathBuf> {
    if !record.has_image() {
        debug!("{}: no image URL", record.sku);
        return None;
    }

    let bytes = match fetcher.fetch_image(&record.image_url).await {
        Ok(b) => b,
        Err(e) => {
            warn!("{}: image download failed: {:#}", record.sku, e);
            return None;
        }
    };

    if let Some(parent) = dest.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("{}: could not create {:?}: {}", record.sku, parent, e);
            return None;
        }
    }
    if let Err(e) = tokio::fs::write(dest, &bytes).await {
        warn!("{}: could not write {:?}: {}", record.sku, dest, e);
        return None;
    }

    debug!("{}: {} image bytes → {:?}", record.sku, bytes.len(), dest);
    Some(dest.to_path_buf())
}
