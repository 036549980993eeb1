//! Cost aggregation
//!
//! Converts usage inside the lookback window into DBU and dollar totals per
//! cluster, and rolls per-cluster costs into distribution summaries.

use crate::error::{PricingGap, PricingGapError};
use crate::models::{DetailRow, PriceRecord, Rule, Severity, SummaryRow, UsageRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Half-open usage window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LookbackWindow {
    pub fn ending_at(end: DateTime<Utc>, lookback_days: i64) -> Self {
        Self {
            start: end - Duration::days(lookback_days),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// List prices indexed by SKU
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    by_sku: HashMap<String, Vec<PriceRecord>>,
}

impl PriceBook {
    pub fn new(prices: &[PriceRecord]) -> Self {
        let mut by_sku: HashMap<String, Vec<PriceRecord>> = HashMap::new();
        for price in prices {
            by_sku.entry(price.sku.clone()).or_default().push(price.clone());
        }
        // Latest effective start first, so overlapping ranges resolve to the newest price
        for rows in by_sku.values_mut() {
            rows.sort_by(|a, b| {
                b.effective_start
                    .cmp(&a.effective_start)
                    .then(a.price_usd_per_dbu.total_cmp(&b.price_usd_per_dbu))
            });
        }
        Self { by_sku }
    }

    /// Price per DBU effective for `sku` at `at`
    pub fn resolve(&self, sku: &str, at: DateTime<Utc>) -> Option<f64> {
        self.by_sku
            .get(sku)?
            .iter()
            .find(|p| p.is_effective_at(at))
            .map(|p| p.price_usd_per_dbu)
    }
}

/// Aggregated usage and cost for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCost {
    pub cluster_id: String,
    pub total_dbus: f64,
    /// Cost of the priced usage only
    pub total_cost_usd: f64,
    pub usage_records: usize,
    pub gaps: Vec<PricingGap>,
}

impl ClusterCost {
    pub fn zero(cluster_id: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            total_dbus: 0.0,
            total_cost_usd: 0.0,
            usage_records: 0,
            gaps: Vec::new(),
        }
    }

    /// Cost understates reality because some usage had no price
    pub fn is_lower_bound(&self) -> bool {
        !self.gaps.is_empty()
    }

    /// Fail when any usage went unpriced
    pub fn ensure_priced(&self) -> Result<(), PricingGapError> {
        if self.gaps.is_empty() {
            Ok(())
        } else {
            Err(PricingGapError {
                gaps: self.gaps.clone(),
            })
        }
    }
}

/// Sum DBUs and dollar cost of one cluster's usage inside `window`.
///
/// Usage with no effective price still counts towards DBUs and is recorded
/// as a gap (one per SKU) instead of being priced at zero silently.
pub fn aggregate<'a>(
    cluster_id: &str,
    usage: impl IntoIterator<Item = &'a UsageRecord>,
    prices: &PriceBook,
    window: LookbackWindow,
) -> ClusterCost {
    let mut cost = ClusterCost::zero(cluster_id);
    let mut gaps: BTreeMap<&str, PricingGap> = BTreeMap::new();

    for record in usage
        .into_iter()
        .filter(|u| u.cluster_id == cluster_id && window.contains(u.usage_start_time))
    {
        cost.usage_records += 1;
        cost.total_dbus += record.dbus;

        match prices.resolve(&record.sku, record.usage_start_time) {
            Some(price) => cost.total_cost_usd += record.dbus * price,
            None => {
                let gap = PricingGap::single(&record.sku, record.usage_start_time, record.dbus);
                gaps.entry(record.sku.as_str())
                    .and_modify(|g| g.absorb(&gap))
                    .or_insert(gap);
            }
        }
    }

    cost.gaps = gaps.into_values().collect();
    cost
}

/// Merge per-cluster gaps into one entry per SKU
pub fn merge_gaps<'a>(costs: impl IntoIterator<Item = &'a ClusterCost>) -> Vec<PricingGap> {
    let mut merged: BTreeMap<String, PricingGap> = BTreeMap::new();
    for gap in costs.into_iter().flat_map(|c| c.gaps.iter()) {
        merged
            .entry(gap.sku.clone())
            .and_modify(|g| g.absorb(gap))
            .or_insert_with(|| gap.clone());
    }
    merged.into_values().collect()
}

/// Running totals for one group of clusters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostBucket {
    pub cluster_count: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    example: Option<(f64, String)>,
}

impl CostBucket {
    pub fn add(&mut self, cluster_id: &str, dbus: f64, cost_usd: f64) {
        self.cluster_count += 1;
        self.total_dbus += dbus;
        self.total_cost_usd += cost_usd;

        let replace = match &self.example {
            None => true,
            Some((best_cost, best_id)) => {
                cost_usd > *best_cost || (cost_usd == *best_cost && cluster_id < best_id.as_str())
            }
        };
        if replace {
            self.example = Some((cost_usd, cluster_id.to_string()));
        }
    }

    /// Highest-cost cluster, ties broken by cluster id
    pub fn example(&self) -> &str {
        self.example.as_ref().map(|(_, id)| id.as_str()).unwrap_or_default()
    }
}

/// Share of `part` in `total` as a percentage (0 when the total is 0)
pub fn percent_of(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part * 100.0 / total
    } else {
        0.0
    }
}

/// Roll one rule's detail rows into one summary row per severity,
/// most severe first
pub fn summarize_by_severity(rule: Rule, rows: &[DetailRow]) -> Vec<SummaryRow> {
    let mut buckets: BTreeMap<Severity, CostBucket> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.rule == rule) {
        buckets
            .entry(row.status)
            .or_default()
            .add(&row.cluster_id, row.total_dbus, row.total_cost_usd);
    }

    let total_cost: f64 = buckets.values().map(|b| b.total_cost_usd).sum();

    buckets
        .into_iter()
        .rev()
        .map(|(status, bucket)| SummaryRow {
            rule,
            status,
            cluster_count: bucket.cluster_count,
            total_dbus: bucket.total_dbus,
            total_cost_usd: bucket.total_cost_usd,
            pct_of_total_cost: percent_of(bucket.total_cost_usd, total_cost),
            example_cluster_id: bucket.example().to_string(),
        })
        .collect()
}
