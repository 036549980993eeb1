//! Tabular input and output seams
//!
//! A run reads four input tables, plus an optional node timeline, through a
//! [`TableSource`] and publishes its result tables through a [`TableSink`]. The JSON directory implementations
//! back the CLI and the tests.

use crate::config::check_location_segment;
use crate::models::{ClusterRecord, NodeTimelineRecord, NodeTypeRecord, PriceRecord, UsageRecord};
use crate::report::AnalysisReport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub const CLUSTERS_TABLE: &str = "clusters";
pub const NODE_TYPES_TABLE: &str = "node_types";
pub const USAGE_TABLE: &str = "usage";
pub const PRICES_TABLE: &str = "list_prices";
pub const NODE_TIMELINE_TABLE: &str = "node_timeline";

/// The tables a run consumes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTables {
    pub clusters: Vec<ClusterRecord>,
    pub node_types: Vec<NodeTypeRecord>,
    pub usage: Vec<UsageRecord>,
    pub prices: Vec<PriceRecord>,
    /// `None` when the source has no timeline; utilization tables are skipped
    pub node_timeline: Option<Vec<NodeTimelineRecord>>,
}

/// Where input tables come from
#[async_trait]
pub trait TableSource: Send + Sync {
    async fn load(&self) -> Result<InputTables>;
}

/// Reads `<table>.json` arrays from one directory
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.dir.join(format!("{}.json", name));
        let bytes = fs::read(&path)
            .await
            .with_context(|| format!("Failed to read table `{}` from {}", name, path.display()))?;
        let rows: Vec<T> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse table `{}` ({})", name, path.display()))?;
        debug!(table = name, rows = rows.len(), "Loaded input table");
        Ok(rows)
    }

    /// A missing file yields `None`; a present but malformed file is an error
    async fn read_optional_table<T: DeserializeOwned>(&self, name: &str) -> Result<Option<Vec<T>>> {
        let path = self.dir.join(format!("{}.json", name));
        if !fs::try_exists(&path).await.unwrap_or(false) {
            info!(table = name, "Optional input table not present");
            return Ok(None);
        }
        self.read_table(name).await.map(Some)
    }
}

#[async_trait]
impl TableSource for JsonDirSource {
    async fn load(&self) -> Result<InputTables> {
        Ok(InputTables {
            clusters: self.read_table(CLUSTERS_TABLE).await?,
            node_types: self.read_table(NODE_TYPES_TABLE).await?,
            usage: self.read_table(USAGE_TABLE).await?,
            prices: self.read_table(PRICES_TABLE).await?,
            node_timeline: self.read_optional_table(NODE_TIMELINE_TABLE).await?,
        })
    }
}

/// One named output table, rows already serialized
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    pub name: String,
    pub rows: Vec<serde_json::Value>,
}

impl OutputTable {
    fn new<T: Serialize>(name: &str, rows: &[T]) -> Result<Self> {
        let rows = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to serialize table `{}`", name))?;
        Ok(Self {
            name: name.to_string(),
            rows,
        })
    }
}

/// The full set of tables one run publishes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputTables {
    pub tables: Vec<OutputTable>,
}

impl OutputTables {
    pub fn from_report(report: &AnalysisReport) -> Result<Self> {
        let mut tables = vec![
            OutputTable::new("runtime_freshness_detail", &report.runtime.details)?,
            OutputTable::new("runtime_freshness_summary", &report.runtime.summary)?,
            OutputTable::new("runtime_distribution", &report.runtime_distribution)?,
            OutputTable::new("hardware_generation_detail", &report.hardware.details)?,
            OutputTable::new("hardware_generation_summary", &report.hardware.summary)?,
            OutputTable::new("generation_distribution", &report.generation_distribution)?,
            OutputTable::new("driver_sizing_detail", &report.driver.details)?,
            OutputTable::new("driver_sizing_summary", &report.driver.summary)?,
            OutputTable::new("driver_node_types", &report.driver_node_types)?,
            OutputTable::new("executive_summary", &report.executive_summary)?,
            OutputTable::new("photon_adoption", &report.photon.adoption)?,
            OutputTable::new("photon_candidates", &report.photon.candidates)?,
            OutputTable::new("photon_runtime_summary", &report.photon.by_runtime)?,
            OutputTable::new("data_quality", &report.data_quality)?,
            OutputTable::new("run_warnings", &report.pricing_gaps)?,
        ];
        if let Some(utilization) = &report.utilization {
            tables.extend([
                OutputTable::new("high_cpu_photon_candidates", &utilization.high_cpu_candidates)?,
                OutputTable::new("cpu_utilization_summary", &utilization.cpu_bands)?,
                OutputTable::new("io_wait_candidates", &utilization.io_wait_candidates)?,
                OutputTable::new("memory_pressure_candidates", &utilization.memory_pressure)?,
                OutputTable::new("resource_utilization_summary", &utilization.bottlenecks)?,
            ]);
        }
        Ok(Self { tables })
    }

    pub fn get(&self, name: &str) -> Option<&OutputTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

/// Outcome of a successful publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub location: String,
    pub tables: usize,
    pub rows: usize,
}

/// Where output tables go; a failed publish must leave the previous one intact
#[async_trait]
pub trait TableSink: Send + Sync {
    async fn publish(&self, tables: &OutputTables) -> Result<PublishReceipt>;
}

/// Writes `<root>/<catalog>/<schema>/<table>.json`
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    root: PathBuf,
    catalog: String,
    schema: String,
}

impl JsonDirSink {
    pub fn new(root: impl Into<PathBuf>, catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            catalog: catalog.into(),
            schema: schema.into(),
        }
    }

    pub fn target_dir(&self) -> PathBuf {
        self.root.join(&self.catalog).join(&self.schema)
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        self.root
            .join(&self.catalog)
            .join(format!(".{}.{}", self.schema, suffix))
    }

    async fn write_all(dir: &Path, tables: &OutputTables) -> Result<()> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create staging directory {}", dir.display()))?;
        for table in &tables.tables {
            let path = dir.join(format!("{}.json", table.name));
            let body = serde_json::to_vec_pretty(&table.rows)
                .with_context(|| format!("Failed to encode table `{}`", table.name))?;
            fs::write(&path, body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }

    async fn swap_into_place(&self, staging: &Path) -> Result<()> {
        let target = self.target_dir();
        let previous = self.sibling("previous");

        if fs::try_exists(&previous).await.unwrap_or(false) {
            fs::remove_dir_all(&previous).await.ok();
        }

        let had_previous = fs::try_exists(&target).await.unwrap_or(false);
        if had_previous {
            fs::rename(&target, &previous)
                .await
                .with_context(|| format!("Failed to move aside {}", target.display()))?;
        }

        if let Err(err) = fs::rename(staging, &target).await {
            if had_previous {
                fs::rename(&previous, &target).await.ok();
            }
            return Err(err).with_context(|| format!("Failed to move staging into {}", target.display()));
        }

        if had_previous {
            fs::remove_dir_all(&previous).await.ok();
        }
        Ok(())
    }
}

#[async_trait]
impl TableSink for JsonDirSink {
    async fn publish(&self, tables: &OutputTables) -> Result<PublishReceipt> {
        check_location_segment("output_catalog", &self.catalog)?;
        check_location_segment("output_schema", &self.schema)?;

        let staging = self.sibling("staging");
        if fs::try_exists(&staging).await.unwrap_or(false) {
            fs::remove_dir_all(&staging)
                .await
                .with_context(|| format!("Failed to clear stale staging {}", staging.display()))?;
        }

        if let Err(err) = Self::write_all(&staging, tables).await {
            fs::remove_dir_all(&staging).await.ok();
            return Err(err);
        }
        self.swap_into_place(&staging).await?;

        Ok(PublishReceipt {
            location: self.target_dir().display().to_string(),
            tables: tables.tables.len(),
            rows: tables.row_count(),
        })
    }
}
