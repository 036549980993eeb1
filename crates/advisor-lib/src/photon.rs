//! Photon adoption reporting
//!
//! Informational only: Photon usage never changes a rule verdict.

use crate::cost::{percent_of, ClusterCost};
use crate::models::ClusterRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const HIGH_SPEND_USD: f64 = 1000.0;
const MEDIUM_SPEND_USD: f64 = 100.0;

/// Whether a runtime string names a Photon image
pub fn is_photon(runtime_version: &str) -> bool {
    runtime_version.to_ascii_lowercase().contains("photon")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Standard,
    Gpu,
    Ml,
}

impl RuntimeKind {
    pub fn suitability(&self) -> &'static str {
        match self {
            Self::Standard => "Good candidate for Photon",
            Self::Gpu => "Evaluate: GPU workloads vary",
            Self::Ml => "Evaluate: ML libraries are not accelerated",
        }
    }

    pub fn of(runtime_version: &str) -> Self {
        let lower = runtime_version.to_ascii_lowercase();
        if lower.contains("ml") {
            Self::Ml
        } else if lower.contains("gpu") {
            Self::Gpu
        } else {
            Self::Standard
        }
    }
}

/// Candidate priority; declaration order is report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotonPriority {
    High,
    Medium,
    Low,
    /// GPU workloads need careful evaluation
    GpuRuntime,
    /// ML libraries are not accelerated by Photon
    MlRuntime,
}

impl PhotonPriority {
    pub fn assess(kind: RuntimeKind, cost_usd: f64) -> Self {
        match kind {
            RuntimeKind::Ml => Self::MlRuntime,
            RuntimeKind::Gpu => Self::GpuRuntime,
            RuntimeKind::Standard if cost_usd > HIGH_SPEND_USD => Self::High,
            RuntimeKind::Standard if cost_usd > MEDIUM_SPEND_USD => Self::Medium,
            RuntimeKind::Standard => Self::Low,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::High => "High priority: high spend cluster",
            Self::Medium => "Medium priority",
            Self::Low => "Low priority: low spend",
            Self::GpuRuntime => "GPU workloads: evaluate carefully",
            Self::MlRuntime => "ML workloads may not benefit",
        }
    }
}

impl fmt::Display for PhotonPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::GpuRuntime => "gpu_runtime",
            Self::MlRuntime => "ml_runtime",
        };
        f.write_str(s)
    }
}

/// One row of the adoption overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotonAdoptionRow {
    pub photon_enabled: bool,
    pub cluster_count: usize,
    pub pct_of_clusters: f64,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub pct_of_total_cost: f64,
}

/// A non-Photon cluster that could be moved to Photon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotonCandidate {
    pub account_id: String,
    pub workspace_id: String,
    pub cluster_id: String,
    pub cluster_name: Option<String>,
    pub owner: Option<String>,
    pub runtime_version: String,
    pub runtime_kind: RuntimeKind,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub priority: PhotonPriority,
    pub recommendation: String,
}

/// Non-Photon spend grouped by runtime kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotonRuntimeSummaryRow {
    pub runtime_kind: RuntimeKind,
    pub suitability: String,
    pub cluster_count: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub pct_of_non_photon_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotonReport {
    pub adoption: Vec<PhotonAdoptionRow>,
    pub candidates: Vec<PhotonCandidate>,
    pub by_runtime: Vec<PhotonRuntimeSummaryRow>,
}

/// Build the adoption overview and the prioritised candidate list
pub fn analyze(clusters: &[(&ClusterRecord, &ClusterCost)]) -> PhotonReport {
    let total_clusters = clusters.len();
    let total_cost: f64 = clusters.iter().map(|(_, c)| c.total_cost_usd).sum();

    let adoption = [true, false]
        .into_iter()
        .filter_map(|enabled| {
            let group: Vec<&ClusterCost> = clusters
                .iter()
                .filter(|(record, _)| is_photon(&record.runtime_version) == enabled)
                .map(|(_, cost)| *cost)
                .collect();
            if group.is_empty() {
                return None;
            }
            let dbus: f64 = group.iter().map(|c| c.total_dbus).sum();
            let cost: f64 = group.iter().map(|c| c.total_cost_usd).sum();
            Some(PhotonAdoptionRow {
                photon_enabled: enabled,
                cluster_count: group.len(),
                pct_of_clusters: percent_of(group.len() as f64, total_clusters as f64),
                total_dbus: dbus,
                total_cost_usd: cost,
                pct_of_total_cost: percent_of(cost, total_cost),
            })
        })
        .collect();

    let mut candidates: Vec<PhotonCandidate> = clusters
        .iter()
        .filter(|(record, _)| !is_photon(&record.runtime_version))
        .map(|(record, cost)| {
            let kind = RuntimeKind::of(&record.runtime_version);
            let priority = PhotonPriority::assess(kind, cost.total_cost_usd);
            PhotonCandidate {
                account_id: record.account_id.clone(),
                workspace_id: record.workspace_id.clone(),
                cluster_id: record.cluster_id.clone(),
                cluster_name: record.cluster_name.clone(),
                owner: record.owner.clone(),
                runtime_version: record.runtime_version.clone(),
                runtime_kind: kind,
                total_dbus: cost.total_dbus,
                total_cost_usd: cost.total_cost_usd,
                priority,
                recommendation: priority.recommendation().to_string(),
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.total_cost_usd.total_cmp(&a.total_cost_usd))
            .then_with(|| a.cluster_id.cmp(&b.cluster_id))
    });

    let by_runtime = summarize_by_runtime(&candidates);

    PhotonReport {
        adoption,
        candidates,
        by_runtime,
    }
}

fn summarize_by_runtime(candidates: &[PhotonCandidate]) -> Vec<PhotonRuntimeSummaryRow> {
    let non_photon_cost: f64 = candidates.iter().map(|c| c.total_cost_usd).sum();

    let mut buckets: BTreeMap<RuntimeKind, (usize, f64, f64)> = BTreeMap::new();
    for candidate in candidates {
        let bucket = buckets.entry(candidate.runtime_kind).or_default();
        bucket.0 += 1;
        bucket.1 += candidate.total_dbus;
        bucket.2 += candidate.total_cost_usd;
    }

    let mut rows: Vec<PhotonRuntimeSummaryRow> = buckets
        .into_iter()
        .map(|(kind, (count, dbus, cost))| PhotonRuntimeSummaryRow {
            runtime_kind: kind,
            suitability: kind.suitability().to_string(),
            cluster_count: count,
            total_dbus: dbus,
            total_cost_usd: cost,
            pct_of_non_photon_cost: percent_of(cost, non_photon_cost),
        })
        .collect();

    // Highest spend first; BTreeMap order breaks ties
    rows.sort_by(|a, b| b.total_cost_usd.total_cmp(&a.total_cost_usd));
    rows
}
