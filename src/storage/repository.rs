use crate::models::{Price, ProductRecord, UNAVAILABLE_PRICE};
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use duckdb::{params, Connection};
use std::path::Path;
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

/// Column list shared by `CREATE TABLE IF NOT EXISTS` and `CREATE OR REPLACE`.
/// `idx` is the record's position in the batch.
const COLUMNS: &str = r#"(
    idx         BIGINT    NOT NULL,
    sku         VARCHAR   NOT NULL,
    brand       VARCHAR   NOT NULL,
    name        VARCHAR   NOT NULL,
    unique_id   VARCHAR   NOT NULL,
    -- 99999.99 when the listing had no readable price
    price       DOUBLE    NOT NULL,
    link        VARCHAR   NOT NULL,
    image_url   VARCHAR   NOT NULL,
    scraped_at  TIMESTAMP NOT NULL
)"#;

/// Table names are interpolated into DDL, so only plain identifiers pass.
fn checked_table(name: &str) -> Result<&str> {
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !ok {
        bail!("Invalid table name {:?}", name);
    }
    Ok(name)
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn ensure_table(&self, table: &str) -> Result<()> {
        let table = checked_table(table)?;
        self.conn
            .execute_batch(&format!("CREATE TABLE IF NOT EXISTS {} {};", table, COLUMNS))
            .with_context(|| format!("DDL for {} failed", table))?;
        Ok(())
    }

    /// Replace the table's contents with `records`, in order. The previous
    /// table (if any) is dropped in the same transaction.
    pub fn replace_products(
        &self,
        table: &str,
        records: &[ProductRecord],
        scraped_at: NaiveDateTime,
    ) -> Result<usize> {
        let table = checked_table(table)?;
        let tx = self.conn.unchecked_transaction()?;

        tx.execute_batch(&format!("CREATE OR REPLACE TABLE {} {};", table, COLUMNS))
            .with_context(|| format!("Could not recreate {}", table))?;

        let sql = format!(
            "INSERT INTO {} (idx, sku, brand, name, unique_id, price, link, image_url, scraped_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            table
        );
        for (i, r) in records.iter().enumerate() {
            tx.execute(&sql, params![
                i as i64,
                r.sku,
                r.brand,
                r.name,
                r.unique_id,
                r.price.as_sentinel_f64(),
                r.link,
                r.image_url,
                scraped_at,
            ])
            .with_context(|| format!("insert product {}", r.link))?;
        }

        tx.commit()?;
        info!("{}: {} rows loaded (replace)", table, records.len());
        Ok(records.len())
    }

    pub fn products(&self, table: &str) -> Result<Vec<ProductRecord>> {
        let table = checked_table(table)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT sku, brand, name, unique_id, price, link, image_url FROM {} ORDER BY idx",
            table
        ))?;
        let rows = stmt
            .query_map([], |r| {
                let price: f64 = r.get(4)?;
                Ok(ProductRecord {
                    sku: r.get(0)?,
                    brand: r.get(1)?,
                    name: r.get(2)?,
                    unique_id: r.get(3)?,
                    price: if price >= UNAVAILABLE_PRICE { Price::Unavailable } else { Price::Amount(price) },
                    link: r.get(5)?,
                    image_url: r.get(6)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn product_count(&self, table: &str) -> Result<i64> {
        let table = checked_table(table)?;
        let mut s = self.conn.prepare(&format!("SELECT COUNT(*) FROM {}", table))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    /// Cheapest and dearest listing with a real price.
    pub fn price_range(&self, table: &str) -> Result<(Option<f64>, Option<f64>)> {
        let table = checked_table(table)?;
        let mut s = self.conn.prepare(&format!(
            "SELECT MIN(price), MAX(price) FROM {} WHERE price < ?",
            table
        ))?;
        Ok(s.query_row(params![UNAVAILABLE_PRICE], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }
}
