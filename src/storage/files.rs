//! The local `raw_data/` tree:
//!
//! ```text
//! raw_data/
//!   raw_data.json          whole batch
//!   raw_data.csv
//!   <key>/data.json        one record
//!   <key>/images/<sku>.jpg
//! ```

use crate::models::ProductRecord;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const RECORD_FILE: &str = "data.json";
pub const BATCH_JSON: &str = "raw_data.json";
pub const BATCH_CSV: &str = "raw_data.csv";

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete whatever a previous run left and start from an empty tree.
    pub fn reset(&self) -> Result<()> {
        if self.root.exists() {
            debug!("Removing previous {:?}", self.root);
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Could not clear {:?}", self.root))?;
        }
        fs::create_dir_all(&self.root).with_context(|| format!("Could not create {:?}", self.root))
    }

    pub fn write_record(&self, key: &str, record: &ProductRecord) -> Result<PathBuf> {
        let dir = self.root.join(key);
        fs::create_dir_all(dir.join("images"))
            .with_context(|| format!("Could not create {:?}", dir))?;

        let path = dir.join(RECORD_FILE);
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(&path, json).with_context(|| format!("Could not write {:?}", path))?;
        Ok(path)
    }

    /// Write the batch as JSON and CSV; returns the JSON path.
    pub fn write_batch(&self, records: &[ProductRecord]) -> Result<PathBuf> {
        let json_path = self.root.join(BATCH_JSON);
        fs::write(&json_path, serde_json::to_vec_pretty(records)?)
            .with_context(|| format!("Could not write {:?}", json_path))?;

        let csv_path = self.root.join(BATCH_CSV);
        let mut writer = csv::Writer::from_path(&csv_path)
            .with_context(|| format!("Could not create {:?}", csv_path))?;
        for r in records {
            writer.serialize(r)?;
        }
        writer.flush()?;

        Ok(json_path)
    }

    /// Number of per-record folders currently on disk.
    pub fn record_folder_count(&self) -> Result<usize> {
        let mut n = 0;
        for entry in fs::read_dir(&self.root)? {
            if entry?.file_type()?.is_dir() {
                n += 1;
            }
        }
        Ok(n)
    }

    pub fn remove(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}
