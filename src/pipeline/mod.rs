//! Pipeline orchestrator: ties page client → scraper → sink together.
//!
//! ## Run
//!
//! `Idle → NavigatingCatalog → Collecting → (NavigatingProduct(i) →
//! Extracting(i))* → Aggregating → Done`, strictly sequential on one page
//! session. A navigation failure ends the run; a missing field or image
//! never does. Every run replaces the previous run's files, objects and table.

pub mod aggregate;

use crate::browser::html_client::HtmlPageClient;
use crate::browser::http_client::HttpClient;
use crate::browser::PageClient;
use crate::config::AppConfig;
use crate::models::{image_object, ListingBatch, RunContext, RunSummary};
use crate::scraper::images::{download_image, ImageFetcher};
use crate::scraper::SiteScraper;
use crate::storage::files::{BATCH_JSON, RECORD_FILE};
use crate::storage::{Sink, StoreSink};
use crate::utils::Timer;
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    NavigatingCatalog,
    Collecting,
    NavigatingProduct(usize),
    Extracting(usize),
    Aggregating,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::NavigatingCatalog => f.write_str("navigating to catalog"),
            RunState::Collecting => f.write_str("collecting listings"),
            RunState::NavigatingProduct(i) => write!(f, "navigating to product {}", i + 1),
            RunState::Extracting(i) => write!(f, "extracting product {}", i + 1),
            RunState::Aggregating => f.write_str("aggregating"),
            RunState::Done => f.write_str("done"),
        }
    }
}

pub struct Pipeline<P, S, F> {
    scraper: SiteScraper,
    page: P,
    sink: S,
    images: F,
    table: String,
    output_dir: PathBuf,
    state: RunState,
}

impl Pipeline<HtmlPageClient<HttpClient>, StoreSink, HttpClient> {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http = HttpClient::new(&config.scraper).context("Failed to build HTTP client")?;
        let sink = StoreSink::from_config(&config.storage, http.inner().clone())
            .context("Failed to open storage")?;
        Ok(Pipeline::new(
            SiteScraper::new(config.site_profile(), &config.pipeline),
            HtmlPageClient::new(http.clone()),
            sink,
            http,
            config.storage.table_name.clone(),
            config.storage.output_dir.clone(),
        ))
    }
}

impl<P, S, F> Pipeline<P, S, F>
where
    P: PageClient,
    S: Sink,
    F: ImageFetcher,
{
    pub fn new(
        scraper: SiteScraper,
        page: P,
        sink: S,
        images: F,
        table: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scraper,
            page,
            sink,
            images,
            table: table.into(),
            output_dir: output_dir.into(),
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn enter(&mut self, next: RunState) {
        debug!("{} → {}", self.state, next);
        self.state = next;
    }

    /// Upload a written file. A failed upload is logged and counted; it never
    /// ends the run.
    async fn upload(&mut self, local: &Path, remote_key: &str, failed: &mut usize) -> bool {
        match self.sink.upload_file(local, remote_key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{:#}", e);
                *failed += 1;
                false
            }
        }
    }

    /// Execute the whole run once.
    pub async fn run(&mut self) -> Result<PipelineStats> {
        self.state = RunState::Idle;
        let mut ctx = RunContext::new(self.scraper.profile().site.to_string(), &self.output_dir);
        let timer = Timer::start(format!("Run {} ({})", ctx.run_id, ctx.site));
        self.sink.reset().await.context("Could not clear previous run")?;

        // ── 1. Landing page → catalog ─────────────────────────────────────────
        self.enter(RunState::NavigatingCatalog);
        self.scraper
            .open_catalog(&mut self.page)
            .await
            .with_context(|| format!("Run failed while {}", self.state))?;

        // ── 2. Catalog → product URLs ──────────────────────────────────────────
        self.enter(RunState::Collecting);
        let links = self
            .scraper
            .discover_products(&mut self.page)
            .await
            .with_context(|| format!("Run failed while {}", self.state))?;
        info!("=== {} products to visit ===", links.len());

        // ── 3. One product page at a time ──────────────────────────────────────
        let mut batch = ListingBatch::new();
        let mut images_saved = 0usize;
        let mut uploads_failed = 0usize;

        for (i, link) in links.iter().enumerate() {
            self.enter(RunState::NavigatingProduct(i));
            self.scraper
                .open_product(&mut self.page, link)
                .await
                .with_context(|| format!("Run failed while {}", self.state))?;

            self.enter(RunState::Extracting(i));
            let record = self.scraper.extract_product(&self.page, link).await;
            let key = ctx.claim_key(&record);

            let data_path = self.sink.write_record_file(&key, &record).await?;
            self.upload(&data_path, &format!("{}/{}", key, RECORD_FILE), &mut uploads_failed)
                .await;

            let image_path = ctx.image_path(&key);
            if let Some(saved) = download_image(&self.images, &record, &image_path).await {
                if self.upload(&saved, &image_object(&key), &mut uploads_failed).await {
                    images_saved += 1;
                }
            }

            info!("[{}/{}] {} | {} | {}", i + 1, links.len(), record.sku, record.price, record.name);
            batch.push(record);
        }

        // ── 4. Aggregate + persist ─────────────────────────────────────────────
        self.enter(RunState::Aggregating);
        let (records, mut summary) = aggregate::finalize(batch);

        let batch_path = self.sink.write_batch_file(&records).await?;
        self.upload(&batch_path, BATCH_JSON, &mut uploads_failed).await;

        summary.folders_created = Some(self.sink.record_folder_count()?);
        if !summary.is_consistent() {
            warn!(
                "{} records but {:?} folders in {:?}",
                summary.records,
                summary.folders_created,
                ctx.output_dir()
            );
        } else {
            info!("{} sub-folders created in {:?}", summary.records, ctx.output_dir());
        }

        let rows = self.sink.load_table(&self.table, &records).await?;
        self.sink.finish().await?;
        self.enter(RunState::Done);

        if uploads_failed > 0 {
            warn!("{} uploads failed; the bucket is incomplete for this run", uploads_failed);
        }

        Ok(PipelineStats {
            products_found: links.len(),
            rows_loaded: rows,
            images_saved,
            uploads_failed,
            summary,
            elapsed: timer.finish(),
        })
    }
}

#[derive(Debug)]
pub struct PipelineStats {
    pub products_found: usize,
    pub rows_loaded: usize,
    /// Images both downloaded and uploaded.
    pub images_saved: usize,
    pub uploads_failed: usize,
    pub summary: RunSummary,
    pub elapsed: Duration,
}
