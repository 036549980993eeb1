//! Core data models for the fleet advisor
//!
//! Input records mirror the four warehouse tables consumed by a run. Derived
//! rows are the tabular shapes handed to the output sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Cluster configuration snapshot from the clusters table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub account_id: String,
    pub workspace_id: String,
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub cluster_source: Option<String>,
    pub runtime_version: String,
    pub driver_node_type_id: String,
    pub worker_node_type_id: String,
    pub created_at: DateTime<Utc>,
    /// Last configuration change observed for this cluster
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ClusterRecord {
    /// Most recent time the cluster was observed, falling back to creation
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen_at.unwrap_or(self.created_at)
    }
}

/// Hardware metadata for a node type from the node-type catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeRecord {
    pub node_type_id: String,
    pub vcpu_count: u32,
    pub memory_gb: f64,
    /// Provider instance name that carries the family and generation
    pub raw_type_string: String,
}

/// Time-bucketed DBU consumption for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub cluster_id: String,
    pub sku: String,
    pub usage_start_time: DateTime<Utc>,
    pub dbus: f64,
}

/// List price of a SKU over an effective range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub sku: String,
    pub price_usd_per_dbu: f64,
    pub effective_start: DateTime<Utc>,
    /// Exclusive end of the range; `None` means the price is still current
    #[serde(default)]
    pub effective_end: Option<DateTime<Utc>>,
}

/// Per-node utilization sample from the optional node timeline table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTimelineRecord {
    pub cluster_id: String,
    pub start_time: DateTime<Utc>,
    /// Driver samples are ignored; compute happens on the workers
    #[serde(default)]
    pub driver: bool,
    #[serde(default)]
    pub cpu_user_percent: f64,
    #[serde(default)]
    pub cpu_system_percent: f64,
    /// CPU time spent waiting on I/O
    #[serde(default)]
    pub cpu_wait_percent: f64,
    #[serde(default)]
    pub memory_used_percent: f64,
    #[serde(default)]
    pub swap_used_percent: f64,
}

impl NodeTimelineRecord {
    pub fn cpu_percent(&self) -> f64 {
        self.cpu_user_percent + self.cpu_system_percent
    }
}

impl PriceRecord {
    /// Whether this price applies at `at` (start inclusive, end exclusive)
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.effective_start && self.effective_end.map_or(true, |end| at < end)
    }
}

/// Severity bucket of a verdict.
///
/// Ordered from most to least severe:
/// `Expired > Critical > Unknown > Warning > Good`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Good,
    Warning,
    /// No classification possible; treated as needing attention
    Unknown,
    Critical,
    /// Only produced by the runtime-freshness rule
    Expired,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Expired,
        Severity::Critical,
        Severity::Unknown,
        Severity::Warning,
        Severity::Good,
    ];

    /// Numeric rank used for ordering; higher is more severe
    pub fn rank(&self) -> u8 {
        match self {
            Self::Good => 0,
            Self::Warning => 1,
            Self::Unknown => 2,
            Self::Critical => 3,
            Self::Expired => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Unknown => "unknown",
            Self::Critical => "critical",
            Self::Expired => "expired",
        }
    }

    /// Parse a severity from a string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "good" => Some(Self::Good),
            "warning" => Some(Self::Warning),
            "unknown" => Some(Self::Unknown),
            "critical" => Some(Self::Critical),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Analysis area / best-practice rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    RuntimeFreshness,
    HardwareGeneration,
    DriverSizing,
}

impl Rule {
    pub const ALL: [Rule; 3] = [
        Rule::RuntimeFreshness,
        Rule::HardwareGeneration,
        Rule::DriverSizing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuntimeFreshness => "runtime_freshness",
            Self::HardwareGeneration => "hardware_generation",
            Self::DriverSizing => "driver_sizing",
        }
    }

    /// Whether a verdict of `severity` under this rule needs attention.
    ///
    /// An unknown runtime has no freshness guarantee and counts; an unknown
    /// hardware family or driver is a data-quality gap, not a finding.
    pub fn flags(&self, severity: Severity) -> bool {
        match self {
            Self::RuntimeFreshness => severity != Severity::Good,
            Self::HardwareGeneration | Self::DriverSizing => {
                matches!(severity, Severity::Warning | Severity::Critical)
            }
        }
    }

    /// Human-readable title for reports
    pub fn title(&self) -> &'static str {
        match self {
            Self::RuntimeFreshness => "Runtime Freshness",
            Self::HardwareGeneration => "Hardware Generation",
            Self::DriverSizing => "Driver Sizing",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one rule for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub rule: Rule,
    pub severity: Severity,
    pub reason: String,
}

impl Verdict {
    pub fn new(rule: Rule, severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            rule,
            severity,
            reason: reason.into(),
        }
    }
}

/// One row of a per-area detail table: a (cluster, rule) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub account_id: String,
    pub workspace_id: String,
    pub cluster_id: String,
    pub cluster_name: Option<String>,
    pub rule: Rule,
    pub status: Severity,
    pub reason: String,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    /// Some usage could not be priced, so the cost understates reality
    pub cost_is_lower_bound: bool,
}

/// One row of a per-area summary table: a (rule, severity) bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub rule: Rule,
    pub status: Severity,
    pub cluster_count: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub pct_of_total_cost: f64,
    /// Highest-cost cluster in the bucket
    pub example_cluster_id: String,
}

/// Per-row data-quality finding that did not abort the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityIssue {
    pub cluster_id: String,
    pub rule: Option<Rule>,
    pub kind: DataQualityKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQualityKind {
    MissingNodeType,
    UnparseableNodeType,
    UnknownRuntime,
}

impl fmt::Display for DataQualityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNodeType => write!(f, "missing_node_type"),
            Self::UnparseableNodeType => write!(f, "unparseable_node_type"),
            Self::UnknownRuntime => write!(f, "unknown_runtime"),
        }
    }
}
