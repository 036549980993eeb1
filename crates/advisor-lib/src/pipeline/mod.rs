//! Pipeline orchestration
//!
//! One run: select the active clusters, join them with node types and
//! usage, evaluate the three rules, aggregate cost per severity and hand the
//! resulting tables to a sink. A run that fails publishes nothing.

#[cfg(test)]
mod tests;

use crate::config::{RunConfig, WorkspaceFilter};
use crate::cost::{self, ClusterCost, LookbackWindow, PriceBook};
use crate::error::{AdvisorError, ConfigError, PricingGapError};
use crate::generation::GenerationPolicy;
use crate::lifecycle::LifecycleRegistry;
use crate::models::{
    ClusterRecord, DataQualityIssue, DataQualityKind, DetailRow, NodeTypeRecord, Rule, Severity,
    UsageRecord,
};
use crate::observability::{AdvisorMetrics, StructuredLogger};
use crate::photon;
use crate::report::{self, AnalysisReport, AreaReport, EvaluatedCluster};
use crate::rules::{ClusterView, RuleContext};
use crate::tables::{InputTables, OutputTables, PublishReceipt, TableSink, TableSource};
use crate::utilization;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Report plus where it was published, if anywhere
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: AnalysisReport,
    pub receipt: Option<PublishReceipt>,
}

/// Validated, immutable run setup
pub struct Pipeline {
    config: RunConfig,
    workspace: WorkspaceFilter,
    registry: LifecycleRegistry,
    policy: GenerationPolicy,
    metrics: Option<AdvisorMetrics>,
}

impl Pipeline {
    /// Validate the configuration and build the registry and policy
    pub fn new(config: RunConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let workspace = config.workspace()?;
        let registry = LifecycleRegistry::with_defaults().with_overrides(&config.runtime_lifecycle)?;
        let policy = GenerationPolicy::with_defaults()
            .with_overrides(&config.generation_minimums)
            .with_default_minimum(config.default_minimum_generation);

        Ok(Self {
            config,
            workspace,
            registry,
            policy,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: AdvisorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn registry(&self) -> &LifecycleRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    /// Load, analyse and optionally publish
    pub async fn execute(
        &self,
        source: &dyn TableSource,
        sink: Option<&dyn TableSink>,
    ) -> Result<RunOutcome, AdvisorError> {
        let input = source.load().await.map_err(AdvisorError::Source)?;
        let report = self.run(&input)?;

        let receipt = match sink {
            Some(sink) => {
                let tables = OutputTables::from_report(&report).map_err(AdvisorError::Sink)?;
                let receipt = sink.publish(&tables).await.map_err(AdvisorError::Sink)?;
                StructuredLogger::new(&self.workspace).log_tables_published(
                    &receipt.location,
                    receipt.tables,
                    receipt.rows,
                );
                Some(receipt)
            }
            None => None,
        };

        Ok(RunOutcome { report, receipt })
    }

    /// Analyse one snapshot of the input tables
    pub fn run(&self, input: &InputTables) -> Result<AnalysisReport, AdvisorError> {
        let started = Instant::now();
        let as_of = self.config.as_of_or_now();
        let window = LookbackWindow::ending_at(as_of, self.config.lookback_days);
        let logger = StructuredLogger::new(&self.workspace);

        logger.log_run_started(&window, input.clusters.len(), input.usage.len());

        if let WorkspaceFilter::Only(id) = &self.workspace {
            if !input.clusters.iter().any(|c| &c.workspace_id == id) {
                return Err(ConfigError::new(
                    "workspace_filter",
                    format!("workspace `{}` does not appear in the clusters table", id),
                )
                .into());
            }
        }

        let clusters = select_clusters(&input.clusters, &self.workspace, window);
        let node_types = index_node_types(&input.node_types);
        let usage = group_usage(&input.usage);
        let prices = PriceBook::new(&input.prices);

        let mut data_quality = Vec::new();
        let joined: Vec<(ClusterView<'_>, ClusterCost)> = clusters
            .iter()
            .map(|cluster| {
                let view = join(cluster, &node_types, &mut data_quality);
                let records = usage.get(cluster.cluster_id.as_str()).into_iter().flatten().copied();
                let cost = cost::aggregate(&cluster.cluster_id, records, &prices, window);
                (view, cost)
            })
            .collect();

        let pricing_gaps = cost::merge_gaps(joined.iter().map(|(_, c)| c));
        if self.config.strict_pricing && !pricing_gaps.is_empty() {
            return Err(PricingGapError { gaps: pricing_gaps }.into());
        }

        let ctx = RuleContext {
            registry: self.registry.clone(),
            policy: self.policy.clone(),
            thresholds: self.config.driver_thresholds(),
            as_of: as_of.date_naive(),
            warning_window_days: self.config.warning_window_days,
        };

        let eval_started = Instant::now();
        let evaluated: Vec<EvaluatedCluster> = joined
            .par_iter()
            .map(|(view, cost)| EvaluatedCluster {
                cluster: view.cluster.clone(),
                cost: cost.clone(),
                findings: ctx.evaluate(view),
            })
            .collect();
        let eval_secs = eval_started.elapsed().as_secs_f64();

        for e in &evaluated {
            let verdicts = e.findings.verdicts().map(|v| (v.rule, v.severity));
            logger.log_cluster_evaluated(&e.cluster.cluster_id, verdicts, e.cost.total_cost_usd);
            data_quality.extend(e.findings.issues().cloned());
        }

        let runtime = area_report(Rule::RuntimeFreshness, &evaluated);
        let hardware = area_report(Rule::HardwareGeneration, &evaluated);
        let driver = area_report(Rule::DriverSizing, &evaluated);
        let executive_summary = report::executive_summary(&[&runtime, &hardware, &driver]);

        let cluster_costs: Vec<(&ClusterRecord, &ClusterCost)> =
            evaluated.iter().map(|e| (&e.cluster, &e.cost)).collect();

        let report = AnalysisReport {
            as_of,
            window,
            workspace_filter: self.workspace.to_string(),
            clusters_evaluated: evaluated.len(),
            runtime_distribution: report::runtime_distribution(&evaluated),
            generation_distribution: report::generation_distribution(&evaluated),
            driver_node_types: report::driver_node_types(&evaluated),
            photon: photon::analyze(&cluster_costs),
            utilization: input
                .node_timeline
                .as_deref()
                .map(|timeline| utilization::analyze(&cluster_costs, timeline, window)),
            runtime,
            hardware,
            driver,
            executive_summary,
            data_quality,
            pricing_gaps,
        };

        logger.log_utilization(report.utilization.as_ref().map(|u| u.clusters_sampled));
        for issue in &report.data_quality {
            logger.log_data_quality(issue);
        }
        for gap in &report.pricing_gaps {
            logger.log_pricing_gap(gap);
        }
        if let Some(metrics) = &self.metrics {
            record_metrics(metrics, &report, &evaluated, eval_secs);
        }

        let total_cost: f64 = evaluated.iter().map(|e| e.cost.total_cost_usd).sum();
        logger.log_run_completed(
            report.clusters_evaluated,
            report.flagged_total(),
            total_cost,
            started.elapsed().as_millis(),
        );

        Ok(report)
    }
}

/// Active, in-scope clusters; one snapshot per cluster id, sorted by id
fn select_clusters(
    rows: &[ClusterRecord],
    workspace: &WorkspaceFilter,
    window: LookbackWindow,
) -> Vec<ClusterRecord> {
    let deleted: HashSet<&str> = rows
        .iter()
        .filter(|c| c.deleted_at.is_some())
        .map(|c| c.cluster_id.as_str())
        .collect();

    let mut latest: HashMap<&str, &ClusterRecord> = HashMap::new();
    for row in rows {
        let seen = row.last_seen();
        if !workspace.matches(&row.workspace_id)
            || deleted.contains(row.cluster_id.as_str())
            || !window.contains(seen)
        {
            continue;
        }
        latest
            .entry(row.cluster_id.as_str())
            .and_modify(|current| {
                if is_newer(row, current) {
                    *current = row;
                }
            })
            .or_insert(row);
    }

    let mut selected: Vec<ClusterRecord> = latest.into_values().cloned().collect();
    selected.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
    selected
}

fn is_newer(candidate: &ClusterRecord, current: &ClusterRecord) -> bool {
    let (a, b) = (candidate.last_seen(), current.last_seen());
    a > b || (a == b && candidate.runtime_version > current.runtime_version)
}

fn index_node_types(rows: &[NodeTypeRecord]) -> HashMap<&str, &NodeTypeRecord> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        index.entry(row.node_type_id.as_str()).or_insert(row);
    }
    index
}

fn group_usage(rows: &[UsageRecord]) -> HashMap<&str, Vec<&UsageRecord>> {
    let mut grouped: HashMap<&str, Vec<&UsageRecord>> = HashMap::new();
    for row in rows {
        grouped.entry(row.cluster_id.as_str()).or_default().push(row);
    }
    grouped
}

fn join<'a>(
    cluster: &'a ClusterRecord,
    node_types: &HashMap<&str, &'a NodeTypeRecord>,
    issues: &mut Vec<DataQualityIssue>,
) -> ClusterView<'a> {
    let mut resolve = |role: &str, id: &str| {
        let found = node_types.get(id).copied();
        if found.is_none() {
            issues.push(DataQualityIssue {
                cluster_id: cluster.cluster_id.clone(),
                rule: None,
                kind: DataQualityKind::MissingNodeType,
                detail: format!("{} node type `{}` is not in the node-type catalog", role, id),
            });
        }
        found
    };

    ClusterView {
        cluster,
        driver: resolve("driver", &cluster.driver_node_type_id),
        worker: resolve("worker", &cluster.worker_node_type_id),
    }
}

/// Detail rows and severity summary for one rule.
///
/// Unknown verdicts carry no cost so that they are not attributed to any
/// severity bucket with spend.
fn area_report(rule: Rule, evaluated: &[EvaluatedCluster]) -> AreaReport {
    let mut details: Vec<DetailRow> = evaluated
        .iter()
        .filter_map(|e| {
            let verdict = e.findings.verdicts().into_iter().find(|v| v.rule == rule)?;
            let attributed = verdict.severity != Severity::Unknown;
            Some(DetailRow {
                account_id: e.cluster.account_id.clone(),
                workspace_id: e.cluster.workspace_id.clone(),
                cluster_id: e.cluster.cluster_id.clone(),
                cluster_name: e.cluster.cluster_name.clone(),
                rule,
                status: verdict.severity,
                reason: verdict.reason.clone(),
                total_dbus: if attributed { e.cost.total_dbus } else { 0.0 },
                total_cost_usd: if attributed { e.cost.total_cost_usd } else { 0.0 },
                cost_is_lower_bound: attributed && e.cost.is_lower_bound(),
            })
        })
        .collect();

    details.sort_by(|a, b| {
        b.status
            .cmp(&a.status)
            .then(b.total_cost_usd.total_cmp(&a.total_cost_usd))
            .then_with(|| a.cluster_id.cmp(&b.cluster_id))
    });

    let summary = cost::summarize_by_severity(rule, &details);
    AreaReport {
        rule,
        details,
        summary,
    }
}

fn record_metrics(
    metrics: &AdvisorMetrics,
    report: &AnalysisReport,
    evaluated: &[EvaluatedCluster],
    eval_secs: f64,
) {
    metrics.add_clusters_evaluated(evaluated.len());
    metrics.observe_evaluation_latency(eval_secs);
    metrics.add_usage_records(evaluated.iter().map(|e| e.cost.usage_records).sum());
    metrics.add_pricing_gaps(report.pricing_gaps.len());
    for area in report.areas() {
        for row in &area.details {
            metrics.inc_finding(row.rule, row.status);
        }
    }
    for issue in &report.data_quality {
        metrics.inc_data_quality(issue);
    }
}
