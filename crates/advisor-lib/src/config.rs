//! Run-scoped configuration
//!
//! Every field has a documented default so an empty configuration is a
//! valid run. Validation happens once, before any evaluation.

use crate::error::ConfigError;
use crate::lifecycle::LifecycleEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on the lookback window (ten years)
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// Configuration object supplied at invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Days of usage history to attribute cost from
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    /// Single workspace id, or `ALL`
    #[serde(default = "default_workspace_filter")]
    pub workspace_filter: String,

    /// Driver vCPU count above which a driver is oversized
    #[serde(default = "default_driver_cpu_threshold")]
    pub driver_cpu_threshold: u32,

    /// Driver memory (GB) above which a driver is oversized
    #[serde(default = "default_driver_memory_threshold_gb")]
    pub driver_memory_threshold_gb: f64,

    /// Days before end-of-support at which an LTS runtime becomes a warning
    #[serde(default = "default_warning_window_days")]
    pub warning_window_days: i64,

    /// Per-family minimum generation overrides, e.g. `{ "D" = 6 }`
    #[serde(default)]
    pub generation_minimums: BTreeMap<String, u32>,

    /// Minimum applied to families absent from the policy table
    #[serde(default)]
    pub default_minimum_generation: Option<u32>,

    /// Extra or replacement runtime lifecycle entries
    #[serde(default)]
    pub runtime_lifecycle: Vec<LifecycleEntry>,

    /// Evaluation instant; defaults to the invocation time
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,

    #[serde(default = "default_output_catalog")]
    pub output_catalog: String,

    #[serde(default = "default_output_schema")]
    pub output_schema: String,

    /// Pricing-gap policy. Off by default: usage with no effective list price
    /// is left out of cost, affected rows are marked `cost_is_lower_bound` and
    /// each gap lands in `run_warnings`. Set to `true` to fail the run with
    /// [`PricingGapError`](crate::error::PricingGapError) instead, in which
    /// case nothing is published.
    #[serde(default)]
    pub strict_pricing: bool,
}

fn default_lookback_days() -> i64 {
    30
}

fn default_workspace_filter() -> String {
    "ALL".to_string()
}

fn default_driver_cpu_threshold() -> u32 {
    16
}

fn default_driver_memory_threshold_gb() -> f64 {
    64.0
}

fn default_warning_window_days() -> i64 {
    90
}

fn default_output_catalog() -> String {
    "main".to_string()
}

fn default_output_schema() -> String {
    "cluster_advisor".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            workspace_filter: default_workspace_filter(),
            driver_cpu_threshold: default_driver_cpu_threshold(),
            driver_memory_threshold_gb: default_driver_memory_threshold_gb(),
            warning_window_days: default_warning_window_days(),
            generation_minimums: BTreeMap::new(),
            default_minimum_generation: None,
            runtime_lifecycle: Vec::new(),
            as_of: None,
            output_catalog: default_output_catalog(),
            output_schema: default_output_schema(),
            strict_pricing: false,
        }
    }
}

/// A catalog or schema name becomes one directory level under the output
/// root, so it is restricted to `[A-Za-z0-9_-]`.
pub fn check_location_segment(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::new(field, "must not be empty"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::new(
            field,
            format!("`{}` may only contain letters, digits, `-` and `_`", value),
        ));
    }
    Ok(())
}

/// Which workspaces a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceFilter {
    All,
    Only(String),
}

impl WorkspaceFilter {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if trimmed.is_empty() {
            return Err(ConfigError::new(
                "workspace_filter",
                "must be `ALL` or a workspace id",
            ));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::new(
                "workspace_filter",
                format!("`{}` is not a valid workspace id", trimmed),
            ));
        }
        Ok(Self::Only(trimmed.to_string()))
    }

    pub fn matches(&self, workspace_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(id) => id == workspace_id,
        }
    }
}

impl fmt::Display for WorkspaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Only(id) => write!(f, "{}", id),
        }
    }
}

/// Driver right-sizing thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverThresholds {
    pub cpu: u32,
    pub memory_gb: f64,
}

impl Default for DriverThresholds {
    fn default() -> Self {
        Self {
            cpu: default_driver_cpu_threshold(),
            memory_gb: default_driver_memory_threshold_gb(),
        }
    }
}

impl RunConfig {
    /// Check every field, returning the first invalid one
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback_days <= 0 {
            return Err(ConfigError::new(
                "lookback_days",
                format!("must be positive, got {}", self.lookback_days),
            ));
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::new(
                "lookback_days",
                format!("must be at most {}, got {}", MAX_LOOKBACK_DAYS, self.lookback_days),
            ));
        }

        WorkspaceFilter::parse(&self.workspace_filter)?;

        if self.driver_cpu_threshold == 0 {
            return Err(ConfigError::new("driver_cpu_threshold", "must be positive"));
        }
        if !(self.driver_memory_threshold_gb.is_finite() && self.driver_memory_threshold_gb > 0.0) {
            return Err(ConfigError::new(
                "driver_memory_threshold_gb",
                "must be a positive number",
            ));
        }
        if self.warning_window_days < 0 {
            return Err(ConfigError::new(
                "warning_window_days",
                "must not be negative",
            ));
        }

        for (family, generation) in &self.generation_minimums {
            let valid_family =
                family.len() == 1 && family.chars().all(|c| c.is_ascii_alphabetic());
            if !valid_family {
                return Err(ConfigError::new(
                    "generation_minimums",
                    format!("family `{}` must be a single letter", family),
                ));
            }
            if *generation == 0 {
                return Err(ConfigError::new(
                    "generation_minimums",
                    format!("minimum generation for `{}` must be at least 1", family),
                ));
            }
        }
        if self.default_minimum_generation == Some(0) {
            return Err(ConfigError::new(
                "default_minimum_generation",
                "must be at least 1",
            ));
        }

        for entry in &self.runtime_lifecycle {
            entry.validate()?;
        }

        check_location_segment("output_catalog", &self.output_catalog)?;
        check_location_segment("output_schema", &self.output_schema)?;

        Ok(())
    }

    pub fn workspace(&self) -> Result<WorkspaceFilter, ConfigError> {
        WorkspaceFilter::parse(&self.workspace_filter)
    }

    pub fn driver_thresholds(&self) -> DriverThresholds {
        DriverThresholds {
            cpu: self.driver_cpu_threshold,
            memory_gb: self.driver_memory_threshold_gb,
        }
    }

    /// Evaluation instant, resolving the default to now
    pub fn as_of_or_now(&self) -> DateTime<Utc> {
        self.as_of.unwrap_or_else(Utc::now)
    }
}
