//! Closing step of a run: freeze the batch and count it.

use crate::models::{ListingBatch, ProductRecord, RunSummary};
use tracing::{debug, info};

/// Records in collection order plus the count the sink's folder tally is
/// checked against. No sorting, grouping or de-duplication.
pub fn finalize(batch: ListingBatch) -> (Vec<ProductRecord>, RunSummary) {
    let records = batch.freeze().into_records();
    let summary = RunSummary { records: records.len(), folders_created: None };

    for (i, r) in records.iter().enumerate() {
        debug!("{:>3} | {} | {} | {} | {}", i, r.sku, r.brand, r.price, r.name);
    }
    info!("Batch finalised: {} records", summary.records);

    (records, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Price;

    fn record(sku: &str) -> ProductRecord {
        ProductRecord {
            sku: sku.into(),
            brand: "Zotac".into(),
            name: "Twin Edge".into(),
            unique_id: "u".into(),
            price: Price::Amount(299.0),
            link: format!("https://www.box.co.uk/{}", sku),
            image_url: "N/A".into(),
        }
    }

    #[test]
    fn test_finalize_keeps_order_and_duplicates() {
        let mut batch = ListingBatch::new();
        for sku in ["b", "a", "b"] {
            batch.push(record(sku));
        }

        let (records, summary) = finalize(batch);
        let skus: Vec<_> = records.iter().map(|r| r.sku.as_str()).collect();
        assert_eq!(skus, vec!["b", "a", "b"]);
        assert_eq!(summary, RunSummary { records: 3, folders_created: None });
    }

    #[test]
    fn test_finalize_empty_batch() {
        let (records, summary) = finalize(ListingBatch::new());
        assert!(records.is_empty());
        assert_eq!(summary.records, 0);
    }
}
