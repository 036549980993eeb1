//! Resource utilization findings from the node timeline
//!
//! Worker-node samples inside the lookback window are averaged per cluster
//! and used to spot CPU-bound Photon candidates, I/O-wait and memory
//! pressure, and the dominant bottleneck. All of it is informational and
//! only produced when the timeline table is available.

use crate::cost::{percent_of, ClusterCost, LookbackWindow};
use crate::models::{ClusterRecord, NodeTimelineRecord};
use crate::photon::{is_photon, RuntimeKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Average CPU at which a cluster is worth listing as a Photon candidate
pub const CPU_CANDIDATE_PERCENT: f64 = 30.0;
/// Average I/O wait at which a cluster is listed
pub const IO_WAIT_CANDIDATE_PERCENT: f64 = 10.0;
pub const MEMORY_CANDIDATE_PERCENT: f64 = 70.0;
pub const SWAP_CANDIDATE_PERCENT: f64 = 5.0;

/// Aggregated worker samples for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationStats {
    pub avg_cpu_percent: f64,
    pub max_cpu_percent: f64,
    pub avg_io_wait_percent: f64,
    pub max_io_wait_percent: f64,
    pub avg_memory_percent: f64,
    pub max_memory_percent: f64,
    pub avg_swap_percent: f64,
    pub max_swap_percent: f64,
    pub days_active: usize,
    pub samples: usize,
}

#[derive(Default)]
struct Accumulator {
    samples: usize,
    cpu: (f64, f64),
    io_wait: (f64, f64),
    memory: (f64, f64),
    swap: (f64, f64),
    days: BTreeSet<NaiveDate>,
}

fn push(slot: &mut (f64, f64), value: f64) {
    slot.0 += value;
    slot.1 = slot.1.max(value);
}

impl Accumulator {
    fn add(&mut self, sample: &NodeTimelineRecord) {
        self.samples += 1;
        push(&mut self.cpu, sample.cpu_percent());
        push(&mut self.io_wait, sample.cpu_wait_percent);
        push(&mut self.memory, sample.memory_used_percent);
        push(&mut self.swap, sample.swap_used_percent);
        self.days.insert(sample.start_time.date_naive());
    }

    fn finish(self) -> UtilizationStats {
        let n = self.samples as f64;
        UtilizationStats {
            avg_cpu_percent: self.cpu.0 / n,
            max_cpu_percent: self.cpu.1,
            avg_io_wait_percent: self.io_wait.0 / n,
            max_io_wait_percent: self.io_wait.1,
            avg_memory_percent: self.memory.0 / n,
            max_memory_percent: self.memory.1,
            avg_swap_percent: self.swap.0 / n,
            max_swap_percent: self.swap.1,
            days_active: self.days.len(),
            samples: self.samples,
        }
    }
}

/// Per-cluster statistics over worker samples inside the window
pub fn cluster_stats<'a>(
    timeline: impl IntoIterator<Item = &'a NodeTimelineRecord>,
    window: LookbackWindow,
) -> BTreeMap<&'a str, UtilizationStats> {
    let mut acc: BTreeMap<&str, Accumulator> = BTreeMap::new();
    for sample in timeline {
        if sample.driver || !window.contains(sample.start_time) {
            continue;
        }
        acc.entry(sample.cluster_id.as_str()).or_default().add(sample);
    }
    acc.into_iter().map(|(id, a)| (id, a.finish())).collect()
}

/// Average-CPU band; declaration order is report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuBand {
    High,
    MediumHigh,
    Medium,
    Low,
}

impl CpuBand {
    pub fn of(avg_cpu_percent: f64) -> Self {
        if avg_cpu_percent >= 70.0 {
            Self::High
        } else if avg_cpu_percent >= 50.0 {
            Self::MediumHigh
        } else if avg_cpu_percent >= 30.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "High CPU (>=70%)",
            Self::MediumHigh => "Medium-high CPU (50-70%)",
            Self::Medium => "Medium CPU (30-50%)",
            Self::Low => "Low CPU (<30%)",
        }
    }

    pub fn photon_suitability(&self) -> &'static str {
        match self {
            Self::High | Self::MediumHigh => "Good Photon candidate",
            Self::Medium => "Evaluate for Photon",
            Self::Low => "Not CPU-bound: Photon may not help",
        }
    }

    fn recommendation(&self, kind: RuntimeKind) -> &'static str {
        match (kind, self) {
            (RuntimeKind::Ml, Self::High | Self::MediumHigh) => {
                "ML runtime: Photon helps Spark SQL and feature engineering, or use compute-optimized (F-series)"
            }
            (RuntimeKind::Ml, _) => "ML runtime: evaluate whether the workload uses Spark SQL/DataFrames",
            (_, Self::High) => {
                "High: enable Photon, compute-optimized (F-series), larger nodes, or more workers"
            }
            (_, Self::MediumHigh) => {
                "Good: enable Photon, compute-optimized (F-series), larger nodes, or more workers"
            }
            (_, Self::Medium) => "Moderate: consider Photon for SQL workloads",
            (_, Self::Low) => "Low: not CPU-bound (I/O, memory, or idle)",
        }
    }
}

/// Identity columns shared by every utilization candidate row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub account_id: String,
    pub workspace_id: String,
    pub cluster_id: String,
    pub cluster_name: Option<String>,
    pub owner: Option<String>,
    pub runtime_version: String,
}

impl From<&ClusterRecord> for ClusterIdentity {
    fn from(c: &ClusterRecord) -> Self {
        Self {
            account_id: c.account_id.clone(),
            workspace_id: c.workspace_id.clone(),
            cluster_id: c.cluster_id.clone(),
            cluster_name: c.cluster_name.clone(),
            owner: c.owner.clone(),
            runtime_version: c.runtime_version.clone(),
        }
    }
}

/// Non-Photon cluster whose workers are CPU-bound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighCpuCandidate {
    #[serde(flatten)]
    pub cluster: ClusterIdentity,
    pub runtime_kind: RuntimeKind,
    pub avg_cpu_percent: f64,
    pub max_cpu_percent: f64,
    pub days_active: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub band: CpuBand,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuBandRow {
    pub band: CpuBand,
    pub label: String,
    pub photon_suitability: String,
    pub cluster_count: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
}

/// Cluster waiting on storage; Delta cache and data layout help here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoWaitCandidate {
    #[serde(flatten)]
    pub cluster: ClusterIdentity,
    pub avg_io_wait_percent: f64,
    pub max_io_wait_percent: f64,
    pub avg_cpu_percent: f64,
    pub driver_node_type_id: String,
    pub worker_node_type_id: String,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPressureCandidate {
    #[serde(flatten)]
    pub cluster: ClusterIdentity,
    pub avg_memory_percent: f64,
    pub max_memory_percent: f64,
    pub avg_swap_percent: f64,
    pub max_swap_percent: f64,
    pub driver_node_type_id: String,
    pub worker_node_type_id: String,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub recommendation: String,
}

/// Dominant resource constraint of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bottleneck {
    MemoryBound,
    IoBound,
    CpuBound,
    Balanced,
}

impl Bottleneck {
    /// Memory pressure wins over I/O wait, which wins over CPU
    pub fn classify(stats: &UtilizationStats) -> Self {
        if stats.avg_swap_percent >= 5.0 || stats.avg_memory_percent >= 80.0 {
            Self::MemoryBound
        } else if stats.avg_io_wait_percent >= 20.0 {
            Self::IoBound
        } else if stats.avg_cpu_percent >= 50.0 {
            Self::CpuBound
        } else {
            Self::Balanced
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::CpuBound => "Enable Photon, compute-optimized (F-series), larger nodes, or more workers",
            Self::IoBound => "Enable Delta Cache, Liquid Clustering, storage-optimized (L-series)",
            Self::MemoryBound => "Memory-optimized (E-series), larger nodes, or more workers",
            Self::Balanced => "No immediate action needed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckRow {
    pub bottleneck: Bottleneck,
    pub recommendation: String,
    pub cluster_count: usize,
    pub total_cost_usd: f64,
    pub pct_of_total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReport {
    /// Evaluated clusters with at least one worker sample in the window
    pub clusters_sampled: usize,
    pub high_cpu_candidates: Vec<HighCpuCandidate>,
    pub cpu_bands: Vec<CpuBandRow>,
    pub io_wait_candidates: Vec<IoWaitCandidate>,
    pub memory_pressure: Vec<MemoryPressureCandidate>,
    pub bottlenecks: Vec<BottleneckRow>,
}

fn io_wait_recommendation(avg_io_wait: f64) -> &'static str {
    if avg_io_wait >= 30.0 {
        "High I/O wait: enable Delta Cache and Liquid Clustering"
    } else if avg_io_wait >= 20.0 {
        "Medium I/O wait: consider Delta Cache, storage-optimized nodes"
    } else {
        "Moderate I/O wait: review data layout, consider Liquid Clustering"
    }
}

fn memory_recommendation(stats: &UtilizationStats) -> &'static str {
    if stats.avg_swap_percent >= 10.0 {
        "Critical: use memory-optimized (E-series), larger nodes, or more workers"
    } else if stats.avg_swap_percent >= 5.0 {
        "Swapping: use memory-optimized (E-series), larger nodes, or more workers"
    } else if stats.avg_memory_percent >= 90.0 {
        "High memory: use memory-optimized (E-series), larger nodes, or more workers"
    } else if stats.avg_memory_percent >= 80.0 {
        "Elevated: consider memory-optimized (E-series), larger nodes, or more workers"
    } else {
        "Moderate: monitor for memory pressure"
    }
}

/// Build every utilization table for the evaluated clusters
pub fn analyze(
    clusters: &[(&ClusterRecord, &ClusterCost)],
    timeline: &[NodeTimelineRecord],
    window: LookbackWindow,
) -> UtilizationReport {
    let stats = cluster_stats(timeline, window);
    let sampled: Vec<(&ClusterRecord, &ClusterCost, &UtilizationStats)> = clusters
        .iter()
        .filter_map(|(record, cost)| {
            stats
                .get(record.cluster_id.as_str())
                .map(|s| (*record, *cost, s))
        })
        .collect();

    let mut high_cpu_candidates: Vec<HighCpuCandidate> = sampled
        .iter()
        .filter(|(record, _, s)| {
            !is_photon(&record.runtime_version) && s.avg_cpu_percent >= CPU_CANDIDATE_PERCENT
        })
        .map(|(record, cost, s)| {
            let kind = RuntimeKind::of(&record.runtime_version);
            let band = CpuBand::of(s.avg_cpu_percent);
            HighCpuCandidate {
                cluster: ClusterIdentity::from(*record),
                runtime_kind: kind,
                avg_cpu_percent: s.avg_cpu_percent,
                max_cpu_percent: s.max_cpu_percent,
                days_active: s.days_active,
                total_dbus: cost.total_dbus,
                total_cost_usd: cost.total_cost_usd,
                band,
                recommendation: band.recommendation(kind).to_string(),
            }
        })
        .collect();
    high_cpu_candidates.sort_by(|a, b| {
        b.avg_cpu_percent
            .total_cmp(&a.avg_cpu_percent)
            .then(b.total_cost_usd.total_cmp(&a.total_cost_usd))
            .then_with(|| a.cluster.cluster_id.cmp(&b.cluster.cluster_id))
    });

    // ML runtimes are left out of the band summary
    let mut bands: BTreeMap<CpuBand, (usize, f64, f64)> = BTreeMap::new();
    for (record, cost, s) in &sampled {
        if is_photon(&record.runtime_version) || RuntimeKind::of(&record.runtime_version) == RuntimeKind::Ml {
            continue;
        }
        let bucket = bands.entry(CpuBand::of(s.avg_cpu_percent)).or_default();
        bucket.0 += 1;
        bucket.1 += cost.total_dbus;
        bucket.2 += cost.total_cost_usd;
    }
    let cpu_bands = bands
        .into_iter()
        .map(|(band, (count, dbus, cost))| CpuBandRow {
            band,
            label: band.label().to_string(),
            photon_suitability: band.photon_suitability().to_string(),
            cluster_count: count,
            total_dbus: dbus,
            total_cost_usd: cost,
        })
        .collect();

    let mut io_wait_candidates: Vec<IoWaitCandidate> = sampled
        .iter()
        .filter(|(_, _, s)| s.avg_io_wait_percent >= IO_WAIT_CANDIDATE_PERCENT)
        .map(|(record, cost, s)| IoWaitCandidate {
            cluster: ClusterIdentity::from(*record),
            avg_io_wait_percent: s.avg_io_wait_percent,
            max_io_wait_percent: s.max_io_wait_percent,
            avg_cpu_percent: s.avg_cpu_percent,
            driver_node_type_id: record.driver_node_type_id.clone(),
            worker_node_type_id: record.worker_node_type_id.clone(),
            total_dbus: cost.total_dbus,
            total_cost_usd: cost.total_cost_usd,
            recommendation: io_wait_recommendation(s.avg_io_wait_percent).to_string(),
        })
        .collect();
    io_wait_candidates.sort_by(|a, b| {
        b.avg_io_wait_percent
            .total_cmp(&a.avg_io_wait_percent)
            .then(b.total_cost_usd.total_cmp(&a.total_cost_usd))
            .then_with(|| a.cluster.cluster_id.cmp(&b.cluster.cluster_id))
    });

    let mut memory_pressure: Vec<MemoryPressureCandidate> = sampled
        .iter()
        .filter(|(_, _, s)| {
            s.avg_memory_percent >= MEMORY_CANDIDATE_PERCENT || s.avg_swap_percent >= SWAP_CANDIDATE_PERCENT
        })
        .map(|(record, cost, s)| MemoryPressureCandidate {
            cluster: ClusterIdentity::from(*record),
            avg_memory_percent: s.avg_memory_percent,
            max_memory_percent: s.max_memory_percent,
            avg_swap_percent: s.avg_swap_percent,
            max_swap_percent: s.max_swap_percent,
            driver_node_type_id: record.driver_node_type_id.clone(),
            worker_node_type_id: record.worker_node_type_id.clone(),
            total_dbus: cost.total_dbus,
            total_cost_usd: cost.total_cost_usd,
            recommendation: memory_recommendation(s).to_string(),
        })
        .collect();
    memory_pressure.sort_by(|a, b| {
        b.avg_swap_percent
            .total_cmp(&a.avg_swap_percent)
            .then(b.avg_memory_percent.total_cmp(&a.avg_memory_percent))
            .then(b.total_cost_usd.total_cmp(&a.total_cost_usd))
            .then_with(|| a.cluster.cluster_id.cmp(&b.cluster.cluster_id))
    });

    let sampled_cost: f64 = sampled.iter().map(|(_, c, _)| c.total_cost_usd).sum();
    let mut by_bottleneck: BTreeMap<Bottleneck, (usize, f64)> = BTreeMap::new();
    for (_, cost, s) in &sampled {
        let bucket = by_bottleneck.entry(Bottleneck::classify(s)).or_default();
        bucket.0 += 1;
        bucket.1 += cost.total_cost_usd;
    }
    let mut bottlenecks: Vec<BottleneckRow> = by_bottleneck
        .into_iter()
        .map(|(bottleneck, (count, cost))| BottleneckRow {
            bottleneck,
            recommendation: bottleneck.recommendation().to_string(),
            cluster_count: count,
            total_cost_usd: cost,
            pct_of_total_cost: percent_of(cost, sampled_cost),
        })
        .collect();
    bottlenecks.sort_by(|a, b| b.total_cost_usd.total_cmp(&a.total_cost_usd));

    UtilizationReport {
        clusters_sampled: sampled.len(),
        high_cpu_candidates,
        cpu_bands,
        io_wait_candidates,
        memory_pressure,
        bottlenecks,
    }
}
