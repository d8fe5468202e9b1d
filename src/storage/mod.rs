pub mod bucket;
pub mod files;
pub mod repository;

use crate::config::{BucketKind, StorageConfig};
use crate::models::ProductRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use self::bucket::{DirBucket, HttpBucket, ObjectStore};
use self::files::LocalStore;
use self::repository::Repository;

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Everything the pipeline persists goes through here. Every run fully
/// replaces what the previous run left in each store.
#[async_trait]
pub trait Sink: Send {
    /// Clear the local tree and the bucket prefix.
    async fn reset(&mut self) -> Result<()>;

    async fn write_record_file(&mut self, key: &str, record: &ProductRecord) -> Result<PathBuf>;

    async fn write_batch_file(&mut self, records: &[ProductRecord]) -> Result<PathBuf>;

    /// `remote_key` is relative to the configured bucket prefix.
    async fn upload_file(&mut self, local: &Path, remote_key: &str) -> Result<()>;

    /// Load `records` into `table`, replacing its contents.
    async fn load_table(&mut self, table: &str, records: &[ProductRecord]) -> Result<usize>;

    fn record_folder_count(&self) -> Result<usize>;

    async fn finish(&mut self) -> Result<()>;
}

// ── Store sink ────────────────────────────────────────────────────────────────

/// Local files + optional bucket + DuckDB table.
pub struct StoreSink {
    files: LocalStore,
    bucket: Option<Box<dyn ObjectStore>>,
    prefix: String,
    repo: Repository,
    keep_local: bool,
}

impl StoreSink {
    pub fn new(
        files: LocalStore,
        bucket: Option<Box<dyn ObjectStore>>,
        prefix: impl Into<String>,
        repo: Repository,
        keep_local: bool,
    ) -> Self {
        Self { files, bucket, prefix: prefix.into(), repo, keep_local }
    }

    pub fn from_config(config: &StorageConfig, http: reqwest::Client) -> Result<Self> {
        let bucket: Option<Box<dyn ObjectStore>> = match config.bucket.kind {
            BucketKind::Dir => Some(Box::new(DirBucket::new(&config.bucket.root, &config.bucket.name))),
            BucketKind::Http => {
                let endpoint = config
                    .bucket
                    .endpoint
                    .as_deref()
                    .context("storage.bucket.endpoint is required for an http bucket")?;
                Some(Box::new(HttpBucket::new(http, endpoint, &config.bucket.name)))
            }
            BucketKind::None => None,
        };

        let repo = Repository::open(&config.db_path)?;
        Ok(Self::new(
            LocalStore::new(&config.output_dir),
            bucket,
            config.bucket.prefix.clone(),
            repo,
            config.keep_local,
        ))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    fn remote_key(&self, key: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        }
    }
}

#[async_trait]
impl Sink for StoreSink {
    async fn reset(&mut self) -> Result<()> {
        self.files.reset()?;
        if let Some(bucket) = &self.bucket {
            let removed = bucket
                .clear_prefix(&self.prefix)
                .await
                .with_context(|| format!("Could not clear {}", bucket.describe()))?;
            info!("Cleared {} previous objects from {}", removed, bucket.describe());
        }
        Ok(())
    }

    async fn write_record_file(&mut self, key: &str, record: &ProductRecord) -> Result<PathBuf> {
        self.files.write_record(key, record)
    }

    async fn write_batch_file(&mut self, records: &[ProductRecord]) -> Result<PathBuf> {
        self.files.write_batch(records)
    }

    async fn upload_file(&mut self, local: &Path, remote_key: &str) -> Result<()> {
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };
        let key = self.remote_key(remote_key);
        bucket
            .put_file(local, &key)
            .await
            .with_context(|| format!("Upload of {} to {} failed", key, bucket.describe()))
    }

    async fn load_table(&mut self, table: &str, records: &[ProductRecord]) -> Result<usize> {
        self.repo.replace_products(table, records, Utc::now().naive_utc())
    }

    fn record_folder_count(&self) -> Result<usize> {
        self.files.record_folder_count()
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(bucket) = &self.bucket {
            bucket.finish(&self.prefix).await?;
        }
        if !self.keep_local {
            if let Err(e) = self.files.remove() {
                warn!("Could not remove {:?}: {}", self.files.root(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Price;

    fn record() -> ProductRecord {
        ProductRecord {
            sku: "K1".into(),
            brand: "EVGA".into(),
            name: "RTX 3060 XC".into(),
            unique_id: "u1".into(),
            price: Price::Amount(319.0),
            link: "https://www.box.co.uk/k1".into(),
            image_url: "N/A".into(),
        }
    }

    #[tokio::test]
    async fn test_sink_round_trip_without_bucket() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = StoreSink::new(
            LocalStore::new(tmp.path().join("raw_data")),
            None,
            "raw_data",
            Repository::open_in_memory().unwrap(),
            false,
        );

        sink.reset().await.unwrap();
        let path = sink.write_record_file("K1", &record()).await.unwrap();
        sink.upload_file(&path, "K1/data.json").await.unwrap();
        assert_eq!(sink.record_folder_count().unwrap(), 1);

        assert_eq!(sink.load_table("gpus", &[record()]).await.unwrap(), 1);
        assert_eq!(sink.repository().product_count("gpus").unwrap(), 1);

        sink.finish().await.unwrap();
        assert!(!tmp.path().join("raw_data").exists());
    }

    #[test]
    fn test_remote_keys_are_prefixed() {
        let sink = StoreSink::new(
            LocalStore::new("raw_data"),
            None,
            "/raw_data/",
            Repository::open_in_memory().unwrap(),
            true,
        );
        assert_eq!(sink.remote_key("K1/data.json"), "raw_data/K1/data.json");
    }
}
