//! Observability infrastructure for the fleet advisor
//!
//! Provides:
//! - Prometheus metrics (clusters evaluated, findings, data quality, pricing gaps, latency)
//! - Structured logging with tracing

use crate::config::WorkspaceFilter;
use crate::cost::LookbackWindow;
use crate::error::PricingGap;
use crate::models::{DataQualityIssue, Rule, Severity};
use anyhow::Context;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for whole-fleet evaluation latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AdvisorMetricsInner> = OnceLock::new();

struct AdvisorMetricsInner {
    clusters_evaluated: IntCounter,
    findings: IntCounterVec,
    data_quality_issues: IntCounterVec,
    pricing_gaps: IntCounter,
    usage_records_priced: IntCounter,
    evaluation_latency_seconds: Histogram,
}

impl AdvisorMetricsInner {
    fn new() -> Self {
        Self {
            clusters_evaluated: register_int_counter!(
                "fleet_advisor_clusters_evaluated_total",
                "Clusters evaluated by the rule pipeline"
            )
            .expect("Failed to register clusters_evaluated"),

            findings: register_int_counter_vec!(
                "fleet_advisor_findings_total",
                "Verdicts produced, by rule and status",
                &["rule", "status"]
            )
            .expect("Failed to register findings"),

            data_quality_issues: register_int_counter_vec!(
                "fleet_advisor_data_quality_issues_total",
                "Per-row data-quality issues that did not abort a run",
                &["kind"]
            )
            .expect("Failed to register data_quality_issues"),

            pricing_gaps: register_int_counter!(
                "fleet_advisor_pricing_gaps_total",
                "SKUs with usage but no effective list price"
            )
            .expect("Failed to register pricing_gaps"),

            usage_records_priced: register_int_counter!(
                "fleet_advisor_usage_records_total",
                "Usage records aggregated inside the lookback window"
            )
            .expect("Failed to register usage_records_priced"),

            evaluation_latency_seconds: register_histogram!(
                "fleet_advisor_evaluation_latency_seconds",
                "Time spent evaluating all rules across the fleet",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),
        }
    }
}

/// Advisor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct AdvisorMetrics {
    _private: (),
}

impl Default for AdvisorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AdvisorMetricsInner {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new)
    }

    pub fn add_clusters_evaluated(&self, count: usize) {
        self.inner().clusters_evaluated.inc_by(count as u64);
    }

    pub fn inc_finding(&self, rule: Rule, status: Severity) {
        self.inner()
            .findings
            .with_label_values(&[rule.as_str(), status.as_str()])
            .inc();
    }

    pub fn inc_data_quality(&self, issue: &DataQualityIssue) {
        self.inner()
            .data_quality_issues
            .with_label_values(&[&issue.kind.to_string()])
            .inc();
    }

    pub fn add_pricing_gaps(&self, count: usize) {
        self.inner().pricing_gaps.inc_by(count as u64);
    }

    pub fn add_usage_records(&self, count: usize) {
        self.inner().usage_records_priced.inc_by(count as u64);
    }

    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    /// Gathered metrics in the Prometheus text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
    }

    /// Write the rendered metrics for textfile collection
    pub async fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let rendered = self.render()?;
        tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("Failed to write metrics to {}", path.display()))
    }
}

/// Structured logger for run events
#[derive(Clone)]
pub struct StructuredLogger {
    workspace: String,
}

impl StructuredLogger {
    pub fn new(workspace: &WorkspaceFilter) -> Self {
        Self {
            workspace: workspace.to_string(),
        }
    }

    pub fn log_run_started(&self, window: &LookbackWindow, clusters: usize, usage_records: usize) {
        info!(
            event = "run_started",
            workspace = %self.workspace,
            window_start = %window.start,
            window_end = %window.end,
            cluster_rows = clusters,
            usage_records = usage_records,
            "Starting fleet analysis"
        );
    }

    pub fn log_cluster_evaluated(&self, cluster_id: &str, verdicts: [(Rule, Severity); 3], cost_usd: f64) {
        debug!(
            event = "cluster_evaluated",
            workspace = %self.workspace,
            cluster_id = %cluster_id,
            runtime = %verdicts[0].1,
            hardware = %verdicts[1].1,
            driver = %verdicts[2].1,
            total_cost_usd = cost_usd,
            "Evaluated cluster"
        );
    }

    pub fn log_data_quality(&self, issue: &DataQualityIssue) {
        warn!(
            event = "data_quality_issue",
            workspace = %self.workspace,
            cluster_id = %issue.cluster_id,
            rule = ?issue.rule.map(|r| r.as_str()),
            kind = %issue.kind,
            detail = %issue.detail,
            "Data quality issue"
        );
    }

    pub fn log_pricing_gap(&self, gap: &PricingGap) {
        warn!(
            event = "pricing_gap",
            workspace = %self.workspace,
            sku = %gap.sku,
            first_usage = %gap.first_usage,
            last_usage = %gap.last_usage,
            unpriced_dbus = gap.unpriced_dbus,
            usage_records = gap.usage_records,
            "No effective list price; costs are lower bounds"
        );
    }

    pub fn log_utilization(&self, clusters_sampled: Option<usize>) {
        match clusters_sampled {
            Some(sampled) => info!(
                event = "utilization_analyzed",
                workspace = %self.workspace,
                clusters_sampled = sampled,
                "Analyzed node utilization"
            ),
            None => info!(
                event = "utilization_skipped",
                workspace = %self.workspace,
                "No node timeline; skipping utilization tables"
            ),
        }
    }

    pub fn log_run_completed(&self, clusters: usize, flagged: usize, total_cost_usd: f64, elapsed_ms: u128) {
        info!(
            event = "run_completed",
            workspace = %self.workspace,
            clusters_evaluated = clusters,
            flagged_findings = flagged,
            total_cost_usd = total_cost_usd,
            elapsed_ms = elapsed_ms as u64,
            "Fleet analysis completed"
        );
    }

    pub fn log_tables_published(&self, location: &str, tables: usize, rows: usize) {
        info!(
            event = "tables_published",
            workspace = %self.workspace,
            location = %location,
            tables = tables,
            rows = rows,
            "Published output tables"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataQualityKind;

    #[test]
    fn test_metrics_render_contains_counters() {
        let metrics = AdvisorMetrics::new();
        metrics.add_clusters_evaluated(3);
        metrics.inc_finding(Rule::DriverSizing, Severity::Critical);
        metrics.inc_data_quality(&DataQualityIssue {
            cluster_id: "c1".into(),
            rule: None,
            kind: DataQualityKind::MissingNodeType,
            detail: "driver Standard_X_v1".into(),
        });
        metrics.observe_evaluation_latency(0.002);

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("fleet_advisor_clusters_evaluated_total"));
        assert!(rendered.contains("rule=\"driver_sizing\""));
        assert!(rendered.contains("kind=\"missing_node_type\""));
    }

    #[test]
    fn test_structured_logger_keeps_workspace() {
        let logger = StructuredLogger::new(&WorkspaceFilter::All);
        assert_eq!(logger.workspace, "ALL");
    }
}
