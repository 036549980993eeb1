//! Report types and derived summaries
//!
//! Everything here is computed from the evaluated clusters of one run and is
//! deterministic for a fixed input and `as_of`.

use crate::cost::{percent_of, ClusterCost, CostBucket, LookbackWindow};
use crate::error::PricingGap;
use crate::lifecycle::{RuntimeClassification, RuntimeVersion};
use crate::models::{ClusterRecord, DataQualityIssue, DetailRow, Rule, Severity, SummaryRow};
use crate::photon::PhotonReport;
use crate::rules::{ClusterFindings, NodeVerdict};
use crate::utilization::UtilizationReport;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cluster after joining, costing and rule evaluation
#[derive(Debug, Clone)]
pub struct EvaluatedCluster {
    pub cluster: ClusterRecord,
    pub cost: ClusterCost,
    pub findings: ClusterFindings,
}

/// Detail and summary tables of one analysis area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaReport {
    pub rule: Rule,
    pub details: Vec<DetailRow>,
    pub summary: Vec<SummaryRow>,
}

impl AreaReport {
    /// Detail rows that need attention under this area's rule
    pub fn flagged(&self) -> impl Iterator<Item = &DetailRow> {
        let rule = self.rule;
        self.details.iter().filter(move |r| rule.flags(r.status))
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDistributionRow {
    /// `major.minor`, or the raw runtime string when none can be extracted
    pub runtime_family: String,
    pub is_long_term_support: Option<bool>,
    pub end_of_support_date: Option<NaiveDate>,
    pub days_until_expiry: Option<i64>,
    pub status: Severity,
    pub cluster_count: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub pct_of_total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDistributionRow {
    pub series: String,
    pub generation: u32,
    pub minimum_generation: Option<u32>,
    pub status: Severity,
    pub cluster_count: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub pct_of_total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverNodeTypeRow {
    pub driver_node_type_id: String,
    pub vcpu: u32,
    pub memory_gb: f64,
    pub status: Severity,
    pub cluster_count: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub pct_of_total_cost: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummaryRow {
    pub rule: Rule,
    pub area: String,
    pub status: Severity,
    pub cluster_count: usize,
    pub total_dbus: f64,
    pub total_cost_usd: f64,
    pub recommendation: String,
}

/// Everything a run produces, in publication order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub as_of: DateTime<Utc>,
    pub window: LookbackWindow,
    pub workspace_filter: String,
    pub clusters_evaluated: usize,
    pub runtime: AreaReport,
    pub hardware: AreaReport,
    pub driver: AreaReport,
    pub runtime_distribution: Vec<RuntimeDistributionRow>,
    pub generation_distribution: Vec<GenerationDistributionRow>,
    pub driver_node_types: Vec<DriverNodeTypeRow>,
    pub executive_summary: Vec<ExecutiveSummaryRow>,
    pub photon: PhotonReport,
    /// Present only when the source supplied a node timeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<UtilizationReport>,
    pub data_quality: Vec<DataQualityIssue>,
    /// Usage that could not be priced; costs touching these are lower bounds
    pub pricing_gaps: Vec<PricingGap>,
}

impl AnalysisReport {
    pub fn areas(&self) -> [&AreaReport; 3] {
        [&self.runtime, &self.hardware, &self.driver]
    }

    pub fn area(&self, rule: Rule) -> &AreaReport {
        match rule {
            Rule::RuntimeFreshness => &self.runtime,
            Rule::HardwareGeneration => &self.hardware,
            Rule::DriverSizing => &self.driver,
        }
    }

    pub fn flagged_total(&self) -> usize {
        self.areas().iter().map(|a| a.flagged_count()).sum()
    }
}

struct Group<K> {
    key: K,
    bucket: CostBucket,
}

fn bucket_by<K, F>(clusters: &[EvaluatedCluster], mut key_of: F) -> Vec<Group<K>>
where
    K: Ord + Clone,
    F: FnMut(&EvaluatedCluster) -> Option<K>,
{
    let mut groups: BTreeMap<K, CostBucket> = BTreeMap::new();
    for evaluated in clusters {
        if let Some(key) = key_of(evaluated) {
            groups.entry(key).or_default().add(
                &evaluated.cluster.cluster_id,
                evaluated.cost.total_dbus,
                evaluated.cost.total_cost_usd,
            );
        }
    }
    groups
        .into_iter()
        .map(|(key, bucket)| Group { key, bucket })
        .collect()
}

fn group_total<K>(groups: &[Group<K>]) -> f64 {
    groups.iter().map(|g| g.bucket.total_cost_usd).sum()
}

/// One row per runtime family, newest family first
pub fn runtime_distribution(clusters: &[EvaluatedCluster]) -> Vec<RuntimeDistributionRow> {
    let mut meta: BTreeMap<String, (Option<RuntimeVersion>, RuntimeClassification)> = BTreeMap::new();
    let groups = bucket_by(clusters, |e| {
        let evidence = &e.findings.runtime.evidence;
        let version = evidence
            .family
            .as_ref()
            .and_then(|_| RuntimeVersion::extract(&evidence.runtime_version));
        let family = evidence
            .family
            .clone()
            .unwrap_or_else(|| evidence.runtime_version.clone());
        meta.entry(family.clone())
            .or_insert_with(|| (version, evidence.classification.clone()));
        Some(family)
    });
    let total = group_total(&groups);

    let mut rows: Vec<(Option<RuntimeVersion>, RuntimeDistributionRow)> = groups
        .into_iter()
        .filter_map(|g| {
            let (version, classification) = meta.remove(&g.key)?;
            Some((
                version,
                RuntimeDistributionRow {
                    runtime_family: g.key,
                    is_long_term_support: classification.entry.as_ref().map(|e| e.is_long_term_support),
                    end_of_support_date: classification.entry.as_ref().map(|e| e.end_of_support_date),
                    days_until_expiry: classification.days_until_expiry,
                    status: classification.status,
                    cluster_count: g.bucket.cluster_count,
                    total_dbus: g.bucket.total_dbus,
                    total_cost_usd: g.bucket.total_cost_usd,
                    pct_of_total_cost: percent_of(g.bucket.total_cost_usd, total),
                },
            ))
        })
        .collect();

    // Unrecognised runtimes (no version) sort last
    rows.sort_by(|(a, ra), (b, rb)| {
        b.cmp(a).then_with(|| ra.runtime_family.cmp(&rb.runtime_family))
    });
    rows.into_iter().map(|(_, row)| row).collect()
}

/// One row per (series, generation) of the driver node, by series then generation
pub fn generation_distribution(clusters: &[EvaluatedCluster]) -> Vec<GenerationDistributionRow> {
    let mut meta: BTreeMap<(String, u32), (Option<u32>, Severity)> = BTreeMap::new();
    let groups = bucket_by(clusters, |e| {
        let classification = match &e.findings.hardware.evidence.driver {
            NodeVerdict::Classified(c) => c,
            _ => return None,
        };
        let key = (classification.hardware.series.clone(), classification.current_gen);
        meta.entry(key.clone())
            .or_insert((classification.minimum_gen, classification.status));
        Some(key)
    });
    let total = group_total(&groups);

    groups
        .into_iter()
        .filter_map(|g| {
            let (minimum, status) = *meta.get(&g.key)?;
            let (series, generation) = g.key;
            Some(GenerationDistributionRow {
                series,
                generation,
                minimum_generation: minimum,
                status,
                cluster_count: g.bucket.cluster_count,
                total_dbus: g.bucket.total_dbus,
                total_cost_usd: g.bucket.total_cost_usd,
                pct_of_total_cost: percent_of(g.bucket.total_cost_usd, total),
            })
        })
        .collect()
}

/// One row per flagged driver node type, most expensive first
pub fn driver_node_types(clusters: &[EvaluatedCluster]) -> Vec<DriverNodeTypeRow> {
    let mut meta: BTreeMap<String, DriverNodeTypeRow> = BTreeMap::new();
    let groups = bucket_by(clusters, |e| {
        let evidence = &e.findings.driver.evidence;
        let classification = evidence.classification.as_ref()?;
        if !Rule::DriverSizing.flags(classification.status) {
            return None;
        }
        let key = evidence.driver_node_type_id.clone();
        meta.entry(key.clone()).or_insert_with(|| DriverNodeTypeRow {
            driver_node_type_id: key.clone(),
            vcpu: classification.vcpu,
            memory_gb: classification.memory_gb,
            status: classification.status,
            cluster_count: 0,
            total_dbus: 0.0,
            total_cost_usd: 0.0,
            pct_of_total_cost: 0.0,
            recommendation: evidence.recommendation.unwrap_or_default().to_string(),
        });
        Some(key)
    });
    let total = group_total(&groups);

    let mut rows: Vec<DriverNodeTypeRow> = groups
        .into_iter()
        .filter_map(|g| {
            let template = meta.remove(&g.key)?;
            Some(DriverNodeTypeRow {
                cluster_count: g.bucket.cluster_count,
                total_dbus: g.bucket.total_dbus,
                total_cost_usd: g.bucket.total_cost_usd,
                pct_of_total_cost: percent_of(g.bucket.total_cost_usd, total),
                ..template
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_cost_usd
            .total_cmp(&a.total_cost_usd)
            .then_with(|| a.driver_node_type_id.cmp(&b.driver_node_type_id))
    });
    rows
}

fn executive_recommendation(rule: Rule, status: Severity) -> &'static str {
    match (rule, status) {
        (Rule::RuntimeFreshness, Severity::Expired) => "Upgrade to a supported LTS runtime immediately",
        (Rule::RuntimeFreshness, Severity::Critical) => "Move off non-LTS runtimes to the latest LTS",
        (Rule::RuntimeFreshness, Severity::Unknown) => "Verify runtime versions against the lifecycle registry",
        (Rule::RuntimeFreshness, _) => "Plan upgrade before end of support",
        (Rule::HardwareGeneration, Severity::Critical) => "Upgrade VMs to the recommended generation",
        (Rule::HardwareGeneration, _) => "Plan move to a newer VM generation",
        (Rule::DriverSizing, _) => "Right-size driver configurations",
    }
}

/// Flagged buckets of every area, in area order then severity
pub fn executive_summary(areas: &[&AreaReport]) -> Vec<ExecutiveSummaryRow> {
    areas
        .iter()
        .flat_map(|area| {
            area.summary
                .iter()
                .filter(|s| area.rule.flags(s.status) && s.cluster_count > 0)
                .map(|s| ExecutiveSummaryRow {
                    rule: s.rule,
                    area: s.rule.title().to_string(),
                    status: s.status,
                    cluster_count: s.cluster_count,
                    total_dbus: s.total_dbus,
                    total_cost_usd: s.total_cost_usd,
                    recommendation: executive_recommendation(s.rule, s.status).to_string(),
                })
        })
        .collect()
}
