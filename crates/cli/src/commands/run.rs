//! The `run` command: analyse a fleet snapshot and publish the tables

use advisor_lib::report::{AnalysisReport, AreaReport};
use advisor_lib::tables::TableSink;
use advisor_lib::{AdvisorMetrics, JsonDirSink, JsonDirSource, Pipeline, RunConfig};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tabled::Tabled;
use tracing::{debug, info};

use crate::output::{
    color_severity, format_dbus, format_pct, format_usd, print_heading, print_info, print_json,
    print_success, print_table, print_warning, truncate, OutputFormat,
};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Directory holding clusters.json, node_types.json, usage.json and list_prices.json
    #[arg(long, short)]
    pub input: PathBuf,

    /// Root directory to publish output tables under (<output>/<catalog>/<schema>/)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Evaluate and print without publishing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Only print rows that need attention (published tables stay complete)
    #[arg(long)]
    pub flagged_only: bool,

    /// Lookback window in days
    #[arg(long)]
    pub lookback_days: Option<i64>,

    /// Workspace id to analyse, or ALL
    #[arg(long)]
    pub workspace: Option<String>,

    /// Evaluation instant (RFC 3339 or YYYY-MM-DD); defaults to now
    #[arg(long, value_parser = parse_as_of)]
    pub as_of: Option<DateTime<Utc>>,

    /// Fail the run when usage has no effective list price
    #[arg(long)]
    pub strict_pricing: bool,

    /// Write Prometheus metrics in text format to this file
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

impl RunArgs {
    /// Flags take precedence over every other configuration layer
    fn apply(&self, config: &mut RunConfig) {
        if let Some(days) = self.lookback_days {
            config.lookback_days = days;
        }
        if let Some(workspace) = &self.workspace {
            config.workspace_filter = workspace.clone();
        }
        if let Some(as_of) = self.as_of {
            config.as_of = Some(as_of);
        }
        if self.strict_pricing {
            config.strict_pricing = true;
        }
    }
}

/// Accept a full RFC 3339 timestamp or a bare date (midnight UTC)
pub fn parse_as_of(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("`{}` is neither RFC 3339 nor YYYY-MM-DD", raw))
}

#[derive(Tabled)]
struct ExecutiveRow {
    #[tabled(rename = "Area")]
    area: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Clusters")]
    clusters: usize,
    #[tabled(rename = "DBUs")]
    dbus: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
}

#[derive(Tabled)]
struct SummaryTableRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Clusters")]
    clusters: usize,
    #[tabled(rename = "DBUs")]
    dbus: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "% Cost")]
    pct: String,
    #[tabled(rename = "Example")]
    example: String,
}

#[derive(Tabled)]
struct DetailTableRow {
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Workspace")]
    workspace: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

#[derive(Tabled)]
struct PhotonRuntimeTableRow {
    #[tabled(rename = "Runtime")]
    runtime: String,
    #[tabled(rename = "Clusters")]
    clusters: usize,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "% Non-Photon")]
    pct: String,
    #[tabled(rename = "Suitability")]
    suitability: String,
}

#[derive(Tabled)]
struct BottleneckTableRow {
    #[tabled(rename = "Bottleneck")]
    bottleneck: String,
    #[tabled(rename = "Clusters")]
    clusters: usize,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "% Cost")]
    pct: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut config = crate::config::load(config_path)?;
    args.apply(&mut config);

    let sink = match (&args.output, args.dry_run) {
        (Some(root), false) => Some(JsonDirSink::new(
            root,
            config.output_catalog.clone(),
            config.output_schema.clone(),
        )),
        _ => None,
    };

    let metrics = AdvisorMetrics::new();
    let pipeline = Pipeline::new(config)
        .context("Invalid configuration")?
        .with_metrics(metrics.clone());
    let source = JsonDirSource::new(&args.input);

    info!(
        input = %args.input.display(),
        output = ?sink.as_ref().map(|s| s.target_dir()),
        dry_run = args.dry_run,
        "Running fleet analysis"
    );
    let outcome = pipeline
        .execute(&source, sink.as_ref().map(|s| s as &dyn TableSink))
        .await?;

    match &outcome.receipt {
        Some(receipt) => info!(
            location = %receipt.location,
            tables = receipt.tables,
            rows = receipt.rows,
            "Published result tables"
        ),
        None => info!(dry_run = args.dry_run, "Run finished without publishing"),
    }

    if let Some(path) = &args.metrics_out {
        metrics.write_to(path).await?;
        debug!(path = %path.display(), "Wrote metrics file");
    }

    let mut report = outcome.report;
    if args.flagged_only {
        retain_flagged(&mut report);
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_report(&report, args.flagged_only);
            match &outcome.receipt {
                Some(receipt) => print_success(&format!(
                    "Published {} tables ({} rows) to {}",
                    receipt.tables, receipt.rows, receipt.location
                )),
                None if args.dry_run => print_info("Dry run: nothing published"),
                None => print_info("No --output given: nothing published"),
            }
        }
    }

    Ok(())
}

fn retain_flagged(report: &mut AnalysisReport) {
    for area in [&mut report.runtime, &mut report.hardware, &mut report.driver] {
        let rule = area.rule;
        area.details.retain(|row| rule.flags(row.status));
    }
}

fn print_report(report: &AnalysisReport, flagged_only: bool) {
    println!("{}", "Fleet Best-Practice Report".bold());
    println!("{}", "=".repeat(50));
    println!("As of:                  {}", report.as_of.to_rfc3339().cyan());
    println!(
        "Window:                 {} .. {}",
        report.window.start.date_naive(),
        report.window.end.date_naive()
    );
    println!("Workspace:              {}", report.workspace_filter.cyan());
    println!("Clusters evaluated:     {}", report.clusters_evaluated);

    print_heading("Executive Summary");
    let rows: Vec<ExecutiveRow> = report
        .executive_summary
        .iter()
        .map(|r| ExecutiveRow {
            area: r.area.clone(),
            status: color_severity(r.status),
            clusters: r.cluster_count,
            dbus: format_dbus(r.total_dbus),
            cost: format_usd(r.total_cost_usd),
            recommendation: r.recommendation.clone(),
        })
        .collect();
    print_table(&rows, "No clusters need attention");

    for area in report.areas() {
        print_area(area, flagged_only);
    }

    print_heading("Photon Opportunity by Runtime");
    let rows: Vec<PhotonRuntimeTableRow> = report
        .photon
        .by_runtime
        .iter()
        .map(|r| PhotonRuntimeTableRow {
            runtime: format!("{:?}", r.runtime_kind),
            clusters: r.cluster_count,
            cost: format_usd(r.total_cost_usd),
            pct: format_pct(r.pct_of_non_photon_cost),
            suitability: r.suitability.clone(),
        })
        .collect();
    print_table(&rows, "Every cluster already runs Photon");

    if let Some(utilization) = &report.utilization {
        print_heading("Resource Utilization");
        let rows: Vec<BottleneckTableRow> = utilization
            .bottlenecks
            .iter()
            .map(|b| BottleneckTableRow {
                bottleneck: format!("{:?}", b.bottleneck),
                clusters: b.cluster_count,
                cost: format_usd(b.total_cost_usd),
                pct: format_pct(b.pct_of_total_cost),
                recommendation: b.recommendation.clone(),
            })
            .collect();
        print_table(&rows, "No utilization samples in the window");
    }

    if !report.pricing_gaps.is_empty() {
        println!();
        for gap in &report.pricing_gaps {
            print_warning(&format!(
                "No list price for {} between {} and {} ({} DBUs); affected costs are lower bounds",
                gap.sku,
                gap.first_usage.date_naive(),
                gap.last_usage.date_naive(),
                format_dbus(gap.unpriced_dbus)
            ));
        }
    }
    if !report.data_quality.is_empty() {
        print_warning(&format!(
            "{} data-quality issue(s); see the data_quality table",
            report.data_quality.len()
        ));
    }
}

fn print_area(area: &AreaReport, flagged_only: bool) {
    print_heading(area.rule.title());

    let summary: Vec<SummaryTableRow> = area
        .summary
        .iter()
        .map(|s| SummaryTableRow {
            status: color_severity(s.status),
            clusters: s.cluster_count,
            dbus: format_dbus(s.total_dbus),
            cost: format_usd(s.total_cost_usd),
            pct: format_pct(s.pct_of_total_cost),
            example: s.example_cluster_id.clone(),
        })
        .collect();
    print_table(&summary, "No clusters evaluated");

    let details: Vec<DetailTableRow> = area
        .details
        .iter()
        .map(|d| DetailTableRow {
            cluster: d.cluster_name.clone().unwrap_or_else(|| d.cluster_id.clone()),
            workspace: d.workspace_id.clone(),
            status: color_severity(d.status),
            cost: if d.cost_is_lower_bound {
                format!("≥{}", format_usd(d.total_cost_usd))
            } else {
                format_usd(d.total_cost_usd)
            },
            reason: truncate(&d.reason, 90),
        })
        .collect();
    let empty = if flagged_only {
        "No flagged clusters"
    } else {
        "No clusters evaluated"
    };
    print_table(&details, empty);
}
