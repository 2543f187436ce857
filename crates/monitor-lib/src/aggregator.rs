//! Aggregation of raw usage rows into per-day buckets
//!
//! Rows are summed per (day, project, SKU). The first description seen for a
//! key wins. Output is ordered by project, SKU and day.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{UsageBucket, UsageRow};

/// Bucket key, ordered so that one series is contiguous in the output
type BucketKey = (String, String, NaiveDate);

/// Sum usage rows into one bucket per (day, project, SKU)
pub fn aggregate(rows: &[UsageRow]) -> Vec<UsageBucket> {
    let mut buckets: BTreeMap<BucketKey, UsageBucket> = BTreeMap::new();

    for row in rows {
        let key = (row.project_id.clone(), row.sku_id.clone(), row.day);
        buckets
            .entry(key)
            .and_modify(|bucket| bucket.cost += row.cost)
            .or_insert_with(|| UsageBucket {
                day: row.day,
                project_id: row.project_id.clone(),
                sku_id: row.sku_id.clone(),
                sku_description: row.sku_description.clone(),
                cost: row.cost,
            });
    }

    buckets.into_values().collect()
}
