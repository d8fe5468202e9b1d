pub mod sites;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use self::sites::{Site, SiteProfile};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Site selection and HTTP behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_site")]
    pub site: Site,

    /// Overrides the profile's landing page.
    #[serde(default)]
    pub landing_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Waits, delays and caps of the run itself
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Bound on every wait-for-element.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Unconditional pause after each navigation.
    #[serde(default = "default_page_settle_ms")]
    pub page_settle_ms: u64,

    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    #[serde(default = "default_max_scroll_iterations")]
    pub max_scroll_iterations: u32,

    /// Visit only the first N listings; falls back to the profile's cap.
    #[serde(default)]
    pub max_products: Option<usize>,
}

/// Local tree, bucket and table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Keep `output_dir` on disk once the run has been uploaded.
    #[serde(default = "default_true")]
    pub keep_local: bool,

    #[serde(default)]
    pub bucket: BucketConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    /// Mirror objects into a local directory.
    Dir,
    /// PUT/DELETE objects against an HTTP object-store endpoint.
    Http,
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketConfig {
    #[serde(default = "default_bucket_kind")]
    pub kind: BucketKind,

    #[serde(default = "default_bucket_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_bucket_name")]
    pub name: String,

    #[serde(default = "default_bucket_prefix")]
    pub prefix: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_site() -> Site {
    Site::Box
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/104.0.0.0 Safari/537.36"
        .to_string()
}
fn default_wait_timeout_ms() -> u64 {
    5000
}
fn default_page_settle_ms() -> u64 {
    1000
}
fn default_scroll_pause_ms() -> u64 {
    3000
}
fn default_max_scroll_iterations() -> u32 {
    50
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("raw_data")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/gpu_products.duckdb")
}
fn default_table_name() -> String {
    "gpu_products_data_set".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bucket_kind() -> BucketKind {
    BucketKind::Dir
}
fn default_bucket_root() -> PathBuf {
    PathBuf::from("data/bucket")
}
fn default_bucket_name() -> String {
    "gpuscraperbucket".to_string()
}
fn default_bucket_prefix() -> String {
    "raw_data".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            site: default_site(),
            landing_url: None,
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            page_settle_ms: default_page_settle_ms(),
            scroll_pause_ms: default_scroll_pause_ms(),
            max_scroll_iterations: default_max_scroll_iterations(),
            max_products: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            db_path: default_db_path(),
            table_name: default_table_name(),
            keep_local: true,
            bucket: BucketConfig::default(),
        }
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            kind: default_bucket_kind(),
            root: default_bucket_root(),
            endpoint: None,
            name: default_bucket_name(),
            prefix: default_bucket_prefix(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SCRAPER").separator("__"))
            .build()?;

        let app_cfg = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }

    /// The selected site's profile with configuration overrides applied.
    pub fn site_profile(&self) -> SiteProfile {
        let mut profile = self.scraper.site.profile();
        if let Some(url) = &self.scraper.landing_url {
            profile.landing_url = url.clone();
        }
        if self.pipeline.max_products.is_some() {
            profile.max_products = self.pipeline.max_products;
        }
        profile
    }
}
