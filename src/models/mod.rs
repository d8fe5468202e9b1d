use crate::scraper::cleaner::storage_key;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Placeholder written for any text field that could not be extracted.
pub const NOT_AVAILABLE: &str = "N/A";

/// Numeric stand-in for an unavailable price where a number is required
/// (the product table). Sorts above any real listing.
pub const UNAVAILABLE_PRICE: f64 = 99999.99;

// ── Extracted ─────────────────────────────────────────────────────────────────

/// Outcome of a single guarded field lookup.
///
/// Extraction code only ever produces `Value` or `Unavailable`; the sentinel
/// policy is applied when the record is built.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Value(T),
    Unavailable,
}

impl<T> Extracted<T> {
    pub fn from_option(v: Option<T>) -> Self {
        match v {
            Some(v) => Extracted::Value(v),
            None => Extracted::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Extracted::Value(_))
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Option<U>) -> Extracted<U> {
        match self {
            Extracted::Value(v) => Extracted::from_option(f(v)),
            Extracted::Unavailable => Extracted::Unavailable,
        }
    }

    pub fn or_else(self, f: impl FnOnce() -> Extracted<T>) -> Extracted<T> {
        match self {
            Extracted::Value(v) => Extracted::Value(v),
            Extracted::Unavailable => f(),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Extracted::Value(v) => Some(v),
            Extracted::Unavailable => None,
        }
    }
}

impl Extracted<String> {
    /// Collapse to the text sentinel.
    pub fn or_sentinel(self) -> String {
        self.into_option().unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

// ── Price ─────────────────────────────────────────────────────────────────────

/// Listing price in GBP. Never null: a missing price is `Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Price {
    Amount(f64),
    Unavailable,
}

impl Price {
    /// Value for numeric sinks; `Unavailable` maps to [`UNAVAILABLE_PRICE`].
    pub fn as_sentinel_f64(&self) -> f64 {
        match self {
            Price::Amount(v) => *v,
            Price::Unavailable => UNAVAILABLE_PRICE,
        }
    }
}

impl From<Extracted<f64>> for Price {
    fn from(e: Extracted<f64>) -> Self {
        match e {
            Extracted::Value(v) => Price::Amount(v),
            Extracted::Unavailable => Price::Unavailable,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Amount(v) => write!(f, "{:.2}", v),
            Price::Unavailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Price::Amount(v) => s.serialize_f64(*v),
            Price::Unavailable => s.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Amount(f64),
            Text(String),
        }

        Ok(match Repr::deserialize(d)? {
            Repr::Amount(v) if v < UNAVAILABLE_PRICE => Price::Amount(v),
            Repr::Amount(_) => Price::Unavailable,
            Repr::Text(t) => t.trim().parse().map(Price::Amount).unwrap_or(Price::Unavailable),
        })
    }
}

// ── Product record ────────────────────────────────────────────────────────────

/// One scraped listing. Every field is always populated, either with a real
/// value or with a sentinel, so all records in a run share the same shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub sku: String,
    pub brand: String,
    pub name: String,
    pub unique_id: String,
    pub price: Price,
    pub link: String,
    pub image_url: String,
}

impl ProductRecord {
    pub fn has_image(&self) -> bool {
        self.image_url != NOT_AVAILABLE
    }
}

// ── Listing batch ─────────────────────────────────────────────────────────────

/// Records produced by one run, in visit order.
#[derive(Debug, Default)]
pub struct ListingBatch {
    records: Vec<ProductRecord>,
}

impl ListingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ProductRecord) {
        self.records.push(record);
    }

    pub fn freeze(self) -> FrozenBatch {
        FrozenBatch(self.records)
    }
}

/// A batch that can no longer be appended to; handed to the sink.
#[derive(Debug)]
pub struct FrozenBatch(Vec<ProductRecord>);

impl FrozenBatch {
    pub fn into_records(self) -> Vec<ProductRecord> {
        self.0
    }
}

// ── Run summary ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub records: usize,
    /// Filled in once the sink has written the per-record folders.
    pub folders_created: Option<usize>,
}

impl RunSummary {
    pub fn is_consistent(&self) -> bool {
        self.folders_created.is_none_or(|f| f == self.records)
    }
}

// ── Run context ───────────────────────────────────────────────────────────────

/// `<key>/images/<key>.jpg`, relative to the output directory and to the
/// bucket prefix alike.
pub fn image_object(key: &str) -> String {
    format!("{}/images/{}.jpg", key, key)
}

/// Per-run state handed to every component instead of process-wide globals.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub site: String,
    pub output_dir: PathBuf,
    used_keys: HashSet<String>,
}

impl RunContext {
    pub fn new(site: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            site: site.into(),
            output_dir: output_dir.into(),
            used_keys: HashSet::new(),
        }
    }

    /// Storage key for a record: its SKU reduced to one safe path segment, or
    /// `<key>-<unique_id>` when that key was already used earlier in this run.
    pub fn claim_key(&mut self, record: &ProductRecord) -> String {
        let base = storage_key(&record.sku, &record.link);
        let key = if self.used_keys.contains(&base) {
            storage_key(&format!("{}-{}", base, record.unique_id), &record.link)
        } else {
            base
        };
        self.used_keys.insert(key.clone());
        key
    }

    pub fn image_path(&self, key: &str) -> PathBuf {
        self.output_dir.join(image_object(key))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
