mod browser;
mod config;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::sites::Site;
use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::storage::repository::Repository;

#[derive(Parser)]
#[command(name = "gpu-scraper", about = "RTX 3060 listing scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape the catalog and replace the stored data set (default)
    Run {
        /// Retailer to scrape, overriding the configuration
        #[arg(short, long, value_parser = parse_site, env = "SCRAPER_SITE")]
        site: Option<Site>,

        /// Visit only the first N in-stock listings
        #[arg(short = 'n', long)]
        max_products: Option<usize>,
    },

    /// Show table statistics
    Stats,

    /// List the stored products
    Products,

    /// Create the products table without scraping
    Migrate,
}

fn parse_site(s: &str) -> Result<Site, String> {
    match s.to_ascii_lowercase().as_str() {
        "scan" => Ok(Site::Scan),
        "box" => Ok(Site::Box),
        other => Err(format!("unknown site '{}' (expected scan or box)", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "gpu_scraper=info,warn",
        1 => "gpu_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;
    let table = config.storage.table_name.clone();

    match cli.command.unwrap_or(Command::Run { site: None, max_products: None }) {
        Command::Run { site, max_products } => {
            if let Some(site) = site {
                config.scraper.site = site;
            }
            if max_products.is_some() {
                config.pipeline.max_products = max_products;
            }

            let mut pipeline = Pipeline::from_config(&config)?;
            let stats = match pipeline.run().await {
                Ok(stats) => stats,
                Err(e) => {
                    error!("Run stopped while {}", pipeline.state());
                    return Err(e);
                }
            };
            info!(
                "Done: {} products, {} rows, {} images, {} failed uploads in {:.1?}",
                stats.products_found,
                stats.rows_loaded,
                stats.images_saved,
                stats.uploads_failed,
                stats.elapsed
            );
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.ensure_table(&table)?;
            let rows = repo.product_count(&table)?;
            let (min, max) = repo.price_range(&table).unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  GPU scraper: {}", table);
            println!("─────────────────────────────────");
            println!("  Products : {}", utils::fmt_number(rows));
            println!("  Cheapest : {}", utils::fmt_price(min));
            println!("  Dearest  : {}", utils::fmt_price(max));
            println!("─────────────────────────────────");
        }

        Command::Products => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.ensure_table(&table)?;
            let products = repo.products(&table)?;
            if products.is_empty() {
                println!("No products. Run `gpu-scraper run` first.");
            } else {
                println!("{} products:", products.len());
                for p in &products {
                    println!("  {:<24} {:>10}  {}", p.sku, p.price.to_string(), p.name);
                }
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.ensure_table(&table)?;
            println!("Table {} ready.", table);
        }
    }

    Ok(())
}
