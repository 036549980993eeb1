//! Integration tests for the pipeline
//!
//! These tests verify:
//! - Cluster selection, joining and data-quality reporting
//! - Cost conservation and deterministic ordering
//! - Pricing gaps (lenient and strict)
//! - Utilization tables only when a node timeline is supplied
//! - Publication only after a successful run

use super::*;
use crate::models::{NodeTimelineRecord, PriceRecord};
use crate::tables::{JsonDirSink, OutputTables, PublishReceipt};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn cluster(id: &str, workspace: &str, runtime: &str, driver: &str, worker: &str) -> ClusterRecord {
    ClusterRecord {
        account_id: "acct-1".into(),
        workspace_id: workspace.into(),
        cluster_id: id.into(),
        cluster_name: Some(format!("{}-name", id)),
        owner: Some("data-eng@example.com".into()),
        cluster_source: Some("UI".into()),
        runtime_version: runtime.into(),
        driver_node_type_id: driver.into(),
        worker_node_type_id: worker.into(),
        created_at: at(2025, 6, 10),
        last_seen_at: None,
        deleted_at: None,
    }
}

fn node(id: &str, vcpu: u32, memory_gb: f64) -> NodeTypeRecord {
    NodeTypeRecord {
        node_type_id: id.into(),
        vcpu_count: vcpu,
        memory_gb,
        raw_type_string: id.into(),
    }
}

fn usage(cluster: &str, sku: &str, day: u32, dbus: f64) -> UsageRecord {
    UsageRecord {
        cluster_id: cluster.into(),
        sku: sku.into(),
        usage_start_time: at(2025, 6, day),
        dbus,
    }
}

fn price(sku: &str, rate: f64) -> PriceRecord {
    PriceRecord {
        sku: sku.into(),
        price_usd_per_dbu: rate,
        effective_start: at(2024, 1, 1),
        effective_end: None,
    }
}

/// Four active clusters over two workspaces, evaluated at 2025-06-30
fn fleet() -> InputTables {
    InputTables {
        clusters: vec![
            cluster("c-expired", "1001", "13.2.x-scala2.12", "Standard_D4ds_v5", "Standard_DS3_v2"),
            cluster("c-good", "1001", "16.4.x-photon-scala2.12", "Standard_D4ds_v6", "Standard_E8ds_v6"),
            cluster("c-big-driver", "1001", "15.4.x-scala2.12", "Standard_E32ds_v5", "Standard_D4ds_v5"),
            cluster("c-other-ws", "2002", "15.4.x-cpu-ml-scala2.12", "Standard_F32s_v2", "Standard_D4ds_v5"),
        ],
        node_types: vec![
            node("Standard_D4ds_v5", 4, 16.0),
            node("Standard_D4ds_v6", 4, 16.0),
            node("Standard_DS3_v2", 4, 14.0),
            node("Standard_E8ds_v6", 8, 64.0),
            node("Standard_E32ds_v5", 32, 256.0),
            node("Standard_F32s_v2", 32, 48.0),
        ],
        usage: vec![
            usage("c-expired", "JOBS", 12, 100.0),
            usage("c-good", "JOBS", 15, 40.0),
            usage("c-good", "ALL_PURPOSE", 16, 10.0),
            usage("c-big-driver", "ALL_PURPOSE", 20, 200.0),
            usage("c-other-ws", "JOBS", 21, 10.0),
            // outside the window
            usage("c-expired", "JOBS", 1, 1000.0),
        ],
        prices: vec![price("JOBS", 0.15), price("ALL_PURPOSE", 0.55)],
        node_timeline: None,
    }
}

fn worker_sample(cluster: &str, day: u32, cpu: f64, io_wait: f64) -> NodeTimelineRecord {
    NodeTimelineRecord {
        cluster_id: cluster.into(),
        start_time: at(2025, 6, day),
        driver: false,
        cpu_user_percent: cpu,
        cpu_system_percent: 0.0,
        cpu_wait_percent: io_wait,
        memory_used_percent: 40.0,
        swap_used_percent: 0.0,
    }
}

fn config() -> RunConfig {
    RunConfig {
        as_of: Some(at(2025, 6, 30)),
        lookback_days: 20,
        ..RunConfig::default()
    }
}

fn run(config: RunConfig, input: &InputTables) -> Result<AnalysisReport, AdvisorError> {
    Pipeline::new(config)?.run(input)
}

fn status_of(area: &AreaReport, cluster_id: &str) -> Severity {
    area.details
        .iter()
        .find(|r| r.cluster_id == cluster_id)
        .map(|r| r.status)
        .unwrap_or_else(|| panic!("no detail row for {}", cluster_id))
}

mod selection_tests {
    use super::*;

    #[test]
    fn test_every_cluster_gets_one_row_per_rule() {
        let report = run(config(), &fleet()).unwrap();
        assert_eq!(report.clusters_evaluated, 4);
        for area in report.areas() {
            assert_eq!(area.details.len(), 4);
            assert!(area.details.iter().all(|r| r.rule == area.rule));
        }
    }

    #[test]
    fn test_rules_evaluated_independently() {
        let report = run(config(), &fleet()).unwrap();
        assert_eq!(status_of(&report.runtime, "c-expired"), Severity::Expired);
        assert_eq!(status_of(&report.hardware, "c-expired"), Severity::Critical);
        assert_eq!(status_of(&report.driver, "c-expired"), Severity::Good);

        assert_eq!(status_of(&report.runtime, "c-good"), Severity::Good);
        assert_eq!(status_of(&report.hardware, "c-good"), Severity::Good);
        assert_eq!(status_of(&report.driver, "c-big-driver"), Severity::Critical);
        assert_eq!(status_of(&report.driver, "c-other-ws"), Severity::Warning);
    }

    #[test]
    fn test_workspace_filter_limits_scope() {
        let config = RunConfig {
            workspace_filter: "2002".into(),
            ..config()
        };
        let report = run(config, &fleet()).unwrap();
        assert_eq!(report.clusters_evaluated, 1);
        assert_eq!(report.workspace_filter, "2002");
        assert_eq!(report.driver.details[0].cluster_id, "c-other-ws");
    }

    #[test]
    fn test_unknown_workspace_is_config_error() {
        let config = RunConfig {
            workspace_filter: "9999".into(),
            ..config()
        };
        match run(config, &fleet()) {
            Err(AdvisorError::Config(err)) => assert_eq!(err.field, "workspace_filter"),
            other => panic!("expected config error, got {:?}", other.map(|r| r.clusters_evaluated)),
        }
    }

    #[test]
    fn test_invalid_config_fails_before_evaluation() {
        let config = RunConfig {
            lookback_days: 0,
            ..config()
        };
        let err = Pipeline::new(config).err().unwrap();
        assert_eq!(err.field, "lookback_days");
    }

    #[test]
    fn test_deleted_and_inactive_clusters_excluded() {
        let mut input = fleet();
        let mut deleted = cluster("c-deleted", "1001", "15.4.x-scala2.12", "Standard_D4ds_v5", "Standard_D4ds_v5");
        deleted.deleted_at = Some(at(2025, 6, 20));
        let mut stale = cluster("c-stale", "1001", "15.4.x-scala2.12", "Standard_D4ds_v5", "Standard_D4ds_v5");
        stale.created_at = at(2025, 1, 1);
        input.clusters.extend([deleted, stale]);

        let report = run(config(), &input).unwrap();
        assert_eq!(report.clusters_evaluated, 4);
        assert!(report
            .runtime
            .details
            .iter()
            .all(|r| r.cluster_id != "c-deleted" && r.cluster_id != "c-stale"));
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let mut input = fleet();
        let mut upgraded = cluster("c-expired", "1001", "15.4.x-scala2.12", "Standard_D4ds_v5", "Standard_DS3_v2");
        upgraded.last_seen_at = Some(at(2025, 6, 25));
        input.clusters.push(upgraded);

        let report = run(config(), &input).unwrap();
        assert_eq!(report.clusters_evaluated, 4);
        assert_eq!(status_of(&report.runtime, "c-expired"), Severity::Good);
    }

    #[test]
    fn test_equal_last_seen_prefers_greater_runtime() {
        let older = cluster("c-tie", "1001", "13.2.x-scala2.12", "Standard_D4ds_v5", "Standard_D4ds_v5");
        let newer = cluster("c-tie", "1001", "15.4.x-scala2.12", "Standard_D4ds_v5", "Standard_D4ds_v5");
        assert_eq!(older.last_seen(), newer.last_seen());
        assert!(is_newer(&newer, &older));
        assert!(!is_newer(&older, &newer));

        for snapshots in [vec![older.clone(), newer.clone()], vec![newer, older]] {
            let mut input = fleet();
            input.clusters.extend(snapshots);

            let report = run(config(), &input).unwrap();
            assert_eq!(report.clusters_evaluated, 5);
            let row = report
                .runtime
                .details
                .iter()
                .find(|r| r.cluster_id == "c-tie")
                .unwrap();
            assert!(row.reason.starts_with("15.4 LTS"), "{}", row.reason);
            assert_eq!(row.status, Severity::Good);
        }
    }

    #[test]
    fn test_missing_node_type_is_data_quality_not_fatal() {
        let mut input = fleet();
        input.clusters.push(cluster(
            "c-orphan",
            "1001",
            "15.4.x-scala2.12",
            "Standard_Retired_v1",
            "Standard_D4ds_v5",
        ));

        let report = run(config(), &input).unwrap();
        assert_eq!(report.clusters_evaluated, 5);
        assert_eq!(status_of(&report.driver, "c-orphan"), Severity::Unknown);
        // Worker still classifies; Standard_D4ds_v5 sits on the D minimum
        assert_eq!(status_of(&report.hardware, "c-orphan"), Severity::Warning);

        let issue = report
            .data_quality
            .iter()
            .find(|i| i.cluster_id == "c-orphan")
            .unwrap();
        assert_eq!(issue.kind, DataQualityKind::MissingNodeType);
        assert!(issue.detail.contains("Standard_Retired_v1"));
    }
}

mod cost_tests {
    use super::*;

    #[test]
    fn test_costs_attributed_per_cluster() {
        let report = run(config(), &fleet()).unwrap();
        let row = report
            .driver
            .details
            .iter()
            .find(|r| r.cluster_id == "c-good")
            .unwrap();
        assert!((row.total_dbus - 50.0).abs() < 1e-9);
        assert!((row.total_cost_usd - (40.0 * 0.15 + 10.0 * 0.55)).abs() < 1e-9);
        assert!(!row.cost_is_lower_bound);
    }

    #[test]
    fn test_cost_conservation_per_area() {
        let input = fleet();
        let report = run(config(), &input).unwrap();

        for area in report.areas() {
            let detail_total: f64 = area.details.iter().map(|r| r.total_cost_usd).sum();
            let summary_total: f64 = area.summary.iter().map(|s| s.total_cost_usd).sum();
            assert!((detail_total - summary_total).abs() < 1e-9, "{}", area.rule);

            let summary_count: usize = area.summary.iter().map(|s| s.cluster_count).sum();
            assert_eq!(summary_count, area.details.len());
        }

        // No unknown verdicts in this fleet, so every area covers the full spend
        let fleet_total = 100.0 * 0.15 + 40.0 * 0.15 + 10.0 * 0.55 + 200.0 * 0.55 + 10.0 * 0.15;
        let runtime_total: f64 = report.runtime.details.iter().map(|r| r.total_cost_usd).sum();
        assert!((runtime_total - fleet_total).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_verdicts_carry_no_cost() {
        let mut input = fleet();
        input.clusters.push(cluster("c-custom", "1001", "custom-image", "Standard_D4ds_v5", "Standard_D4ds_v5"));
        input.usage.push(usage("c-custom", "JOBS", 22, 50.0));

        let report = run(config(), &input).unwrap();
        let row = report
            .runtime
            .details
            .iter()
            .find(|r| r.cluster_id == "c-custom")
            .unwrap();
        assert_eq!(row.status, Severity::Unknown);
        assert_eq!(row.total_cost_usd, 0.0);

        let driver_row = report
            .driver
            .details
            .iter()
            .find(|r| r.cluster_id == "c-custom")
            .unwrap();
        assert!((driver_row.total_cost_usd - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_summary_rows_most_severe_first() {
        let report = run(config(), &fleet()).unwrap();
        let statuses: Vec<Severity> = report.runtime.summary.iter().map(|s| s.status).collect();
        let mut sorted = statuses.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(statuses, sorted);

        let critical = report
            .driver
            .summary
            .iter()
            .find(|s| s.status == Severity::Critical)
            .unwrap();
        assert_eq!(critical.example_cluster_id, "c-big-driver");
    }
}

mod pricing_gap_tests {
    use super::*;

    fn with_gap() -> InputTables {
        let mut input = fleet();
        input.usage.push(usage("c-good", "SERVERLESS_SQL", 18, 12.0));
        input
    }

    #[test]
    fn test_gap_reported_as_run_warning() {
        // lenient unless strict_pricing is set explicitly
        assert!(!RunConfig::default().strict_pricing);
        let report = run(config(), &with_gap()).unwrap();
        assert_eq!(report.pricing_gaps.len(), 1);
        assert_eq!(report.pricing_gaps[0].sku, "SERVERLESS_SQL");

        let row = report
            .driver
            .details
            .iter()
            .find(|r| r.cluster_id == "c-good")
            .unwrap();
        assert!(row.cost_is_lower_bound);
        assert!((row.total_dbus - 62.0).abs() < 1e-9);
    }

    #[test]
    fn test_strict_pricing_fails_run() {
        let config = RunConfig {
            strict_pricing: true,
            ..config()
        };
        match run(config, &with_gap()) {
            Err(AdvisorError::PricingGap(err)) => assert_eq!(err.skus(), vec!["SERVERLESS_SQL"]),
            other => panic!("expected pricing gap, got {:?}", other.map(|r| r.clusters_evaluated)),
        }
    }
}

mod determinism_tests {
    use super::*;

    #[test]
    fn test_identical_runs_produce_identical_output() {
        let input = fleet();
        let first = serde_json::to_string(&run(config(), &input).unwrap()).unwrap();
        let second = serde_json::to_string(&run(config(), &input).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let input = fleet();
        let mut reversed = fleet();
        reversed.clusters.reverse();
        reversed.usage.reverse();
        reversed.node_types.reverse();

        let a = OutputTables::from_report(&run(config(), &input).unwrap()).unwrap();
        let b = OutputTables::from_report(&run(config(), &reversed).unwrap()).unwrap();
        assert_eq!(a.get("driver_sizing_detail"), b.get("driver_sizing_detail"));
        assert_eq!(a.get("runtime_freshness_summary"), b.get("runtime_freshness_summary"));
    }

    #[test]
    fn test_detail_ordering() {
        let report = run(config(), &fleet()).unwrap();
        for area in report.areas() {
            for pair in area.details.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                assert!(a.status >= b.status);
                if a.status == b.status {
                    assert!(a.total_cost_usd >= b.total_cost_usd);
                    if a.total_cost_usd == b.total_cost_usd {
                        assert!(a.cluster_id < b.cluster_id);
                    }
                }
            }
        }
        assert_eq!(report.runtime.details[0].cluster_id, "c-expired");
    }
}

mod scenario_tests {
    use super::*;

    #[test]
    fn test_lts_runtime_near_expiry_is_warning() {
        let mut lts = cluster("c1", "1001", "10.4 LTS", "Standard_D4ds_v5", "Standard_D4ds_v5");
        lts.created_at = at(2025, 2, 1);
        let input = InputTables {
            clusters: vec![lts],
            node_types: vec![node("Standard_D4ds_v5", 4, 16.0)],
            usage: Vec::new(),
            prices: Vec::new(),
            node_timeline: None,
        };
        let config = RunConfig {
            as_of: Some(at(2025, 2, 6)),
            ..RunConfig::default()
        };

        let report = run(config, &input).unwrap();
        assert_eq!(report.runtime.details[0].status, Severity::Warning);
        assert!(report.runtime.details[0].reason.contains("40 days"));
        // Standard_D4ds_v5 sits exactly on the D-family minimum
        assert_eq!(report.hardware.details[0].status, Severity::Warning);
    }

    #[test]
    fn test_expired_is_runtime_only() {
        let mut input = fleet();
        input.clusters.extend([
            cluster("c-ancient", "1001", "7.3.x-scala2.12", "Standard_DS3_v2", "Standard_D4s_v3"),
            cluster("c-custom", "1001", "custom-image", "Standard_E32ds_v5", "m5.xlarge"),
            cluster("c-old-lts", "2002", "10.4.x-scala2.12", "Standard_E32ds_v5", "Standard_DS3_v2"),
            cluster("c-missing", "2002", "12.2.x-scala2.12", "Standard_Retired_v1", "Standard_Retired_v1"),
        ]);
        input.node_types.push(node("Standard_D4s_v3", 4, 16.0));
        input.usage.push(usage("c-ancient", "JOBS", 22, 30.0));

        let report = run(config(), &input).unwrap();
        assert_eq!(report.clusters_evaluated, 8);
        assert!(report.runtime.details.iter().any(|r| r.status == Severity::Expired));

        for area in [&report.hardware, &report.driver] {
            assert!(
                area.details.iter().all(|r| r.status != Severity::Expired),
                "{} produced an expired verdict",
                area.rule
            );
            assert!(area.summary.iter().all(|s| s.status != Severity::Expired));
        }
    }

    #[test]
    fn test_driver_one_threshold_exceeded_is_warning() {
        let report = run(config(), &fleet()).unwrap();
        let row = report
            .driver
            .details
            .iter()
            .find(|r| r.cluster_id == "c-other-ws")
            .unwrap();
        assert_eq!(row.status, Severity::Warning);
        assert!(row.reason.contains("32 vCPU / 48.0 GB"));
    }
}

mod utilization_tests {
    use super::*;

    fn with_timeline() -> InputTables {
        let mut input = fleet();
        input.node_timeline = Some(vec![
            worker_sample("c-big-driver", 20, 80.0, 2.0),
            worker_sample("c-big-driver", 21, 70.0, 2.0),
            worker_sample("c-expired", 12, 20.0, 25.0),
            // not an evaluated cluster
            worker_sample("c-ghost", 12, 95.0, 0.0),
            // before the window
            worker_sample("c-good", 1, 90.0, 0.0),
        ]);
        input
    }

    #[test]
    fn test_no_timeline_skips_utilization() {
        let report = run(config(), &fleet()).unwrap();
        assert!(report.utilization.is_none());

        let tables = OutputTables::from_report(&report).unwrap();
        assert!(tables.get("resource_utilization_summary").is_none());
        assert!(tables.get("photon_runtime_summary").is_some());
    }

    #[test]
    fn test_timeline_limited_to_evaluated_clusters_in_window() {
        let report = run(config(), &with_timeline()).unwrap();
        let utilization = report.utilization.unwrap();
        assert_eq!(utilization.clusters_sampled, 2);

        assert_eq!(utilization.high_cpu_candidates.len(), 1);
        let candidate = &utilization.high_cpu_candidates[0];
        assert_eq!(candidate.cluster.cluster_id, "c-big-driver");
        assert!((candidate.avg_cpu_percent - 75.0).abs() < 1e-9);
        assert_eq!(candidate.days_active, 2);
        assert!((candidate.total_cost_usd - 200.0 * 0.55).abs() < 1e-9);

        assert_eq!(utilization.io_wait_candidates[0].cluster.cluster_id, "c-expired");
    }

    #[tokio::test]
    async fn test_timeline_adds_utilization_tables() {
        let dir = TempDir::new().unwrap();
        let sink = JsonDirSink::new(dir.path(), "main", "cluster_advisor");
        let pipeline = Pipeline::new(config()).unwrap();

        let outcome = pipeline
            .execute(&StaticSource(with_timeline()), Some(&sink))
            .await
            .unwrap();
        assert_eq!(outcome.receipt.unwrap().tables, 20);

        for table in [
            "high_cpu_photon_candidates",
            "cpu_utilization_summary",
            "io_wait_candidates",
            "memory_pressure_candidates",
            "resource_utilization_summary",
        ] {
            let path = sink.target_dir().join(format!("{}.json", table));
            assert!(tokio::fs::try_exists(&path).await.unwrap(), "{}", table);
        }
    }
}

struct CountingSink {
    calls: AtomicUsize,
}

#[async_trait]
impl TableSink for CountingSink {
    async fn publish(&self, tables: &OutputTables) -> anyhow::Result<PublishReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PublishReceipt {
            location: "memory".into(),
            tables: tables.tables.len(),
            rows: tables.row_count(),
        })
    }
}

struct StaticSource(InputTables);

#[async_trait]
impl TableSource for StaticSource {
    async fn load(&self) -> anyhow::Result<InputTables> {
        Ok(self.0.clone())
    }
}

struct FailingSource;

#[async_trait]
impl TableSource for FailingSource {
    async fn load(&self) -> anyhow::Result<InputTables> {
        anyhow::bail!("warehouse unavailable")
    }
}

mod publish_tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_publishes_every_table() {
        let dir = TempDir::new().unwrap();
        let sink = JsonDirSink::new(dir.path(), "main", "cluster_advisor");
        let pipeline = Pipeline::new(config()).unwrap();

        let outcome = pipeline
            .execute(&StaticSource(fleet()), Some(&sink))
            .await
            .unwrap();
        let receipt = outcome.receipt.unwrap();
        assert_eq!(receipt.tables, 15);
        assert!(outcome.report.utilization.is_none());

        for table in ["executive_summary", "driver_sizing_detail", "run_warnings", "photon_candidates"] {
            let path = sink.target_dir().join(format!("{}.json", table));
            assert!(tokio::fs::try_exists(&path).await.unwrap(), "{}", table);
        }
    }

    #[tokio::test]
    async fn test_failed_run_publishes_nothing() {
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
        };
        let config = RunConfig {
            strict_pricing: true,
            ..config()
        };
        let mut input = fleet();
        input.prices.clear();

        let pipeline = Pipeline::new(config).unwrap();
        let result = pipeline.execute(&StaticSource(input), Some(&sink)).await;
        assert!(matches!(result, Err(AdvisorError::PricingGap(_))));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_source_failure_is_reported() {
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
        };
        let pipeline = Pipeline::new(config()).unwrap();
        let err = pipeline.execute(&FailingSource, Some(&sink)).await.unwrap_err();
        assert!(err.to_string().contains("warehouse unavailable"));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_without_sink() {
        let pipeline = Pipeline::new(config()).unwrap();
        let outcome = pipeline.execute(&StaticSource(fleet()), None).await.unwrap();
        assert!(outcome.receipt.is_none());
        assert_eq!(outcome.report.clusters_evaluated, 4);
    }
}
