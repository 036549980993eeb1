//! Error types for the advisor library

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid configuration, detected before any evaluation starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration field `{field}`: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A node-type identifier that does not follow the provider naming convention
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("node type `{node_type}` does not match the expected naming pattern: {reason}")]
pub struct NodeTypeParseError {
    pub node_type: String,
    pub reason: &'static str,
}

/// Usage for a SKU that no price row covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingGap {
    pub sku: String,
    /// Earliest unpriced usage timestamp
    pub first_usage: DateTime<Utc>,
    /// Latest unpriced usage timestamp
    pub last_usage: DateTime<Utc>,
    pub unpriced_dbus: f64,
    pub usage_records: usize,
}

impl PricingGap {
    pub fn single(sku: &str, at: DateTime<Utc>, dbus: f64) -> Self {
        Self {
            sku: sku.to_string(),
            first_usage: at,
            last_usage: at,
            unpriced_dbus: dbus,
            usage_records: 1,
        }
    }

    /// Fold another gap for the same SKU into this one
    pub fn absorb(&mut self, other: &PricingGap) {
        self.first_usage = self.first_usage.min(other.first_usage);
        self.last_usage = self.last_usage.max(other.last_usage);
        self.unpriced_dbus += other.unpriced_dbus;
        self.usage_records += other.usage_records;
    }
}

/// Usage records with no effective price
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no effective list price for {} SKU(s): {}", .gaps.len(), skus(.gaps))]
pub struct PricingGapError {
    pub gaps: Vec<PricingGap>,
}

impl PricingGapError {
    pub fn skus(&self) -> Vec<&str> {
        self.gaps.iter().map(|g| g.sku.as_str()).collect()
    }
}

fn skus(gaps: &[PricingGap]) -> String {
    gaps.iter()
        .map(|g| format!("{} ({} .. {})", g.sku, g.first_usage.date_naive(), g.last_usage.date_naive()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run-level failure; nothing is published when one of these is returned
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    PricingGap(#[from] PricingGapError),

    #[error("failed to load input tables: {0:#}")]
    Source(anyhow::Error),

    #[error("failed to publish output tables: {0:#}")]
    Sink(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_config_error_names_field() {
        let err = ConfigError::new("lookback_days", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid configuration field `lookback_days`: must be positive"
        );
    }

    #[test]
    fn test_pricing_gap_error_lists_skus() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let err = PricingGapError {
            gaps: vec![PricingGap::single("PREMIUM_JOBS_COMPUTE", at, 4.0)],
        };
        let msg = err.to_string();
        assert!(msg.contains("PREMIUM_JOBS_COMPUTE"));
        assert!(msg.contains("2025-06-01"));
        assert_eq!(err.skus(), vec!["PREMIUM_JOBS_COMPUTE"]);
    }

    #[test]
    fn test_gap_absorb_widens_range() {
        let early = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 6, 9, 0, 0, 0).unwrap();
        let mut gap = PricingGap::single("SKU", late, 1.0);
        gap.absorb(&PricingGap::single("SKU", early, 2.5));

        assert_eq!(gap.first_usage, early);
        assert_eq!(gap.last_usage, late);
        assert_eq!(gap.usage_records, 2);
        assert!((gap.unpriced_dbus - 3.5).abs() < f64::EPSILON);
    }
}
