//! Fleet advisor library for compute cluster best practices
//!
//! This crate provides the core functionality for:
//! - Runtime lifecycle and hardware generation policy lookups
//! - Rule evaluation (runtime freshness, hardware generation, driver sizing)
//! - Cost aggregation over a lookback window
//! - Photon and resource utilization reporting
//! - Pipeline orchestration with tabular sources and sinks
//! - Metrics and structured logging

pub mod config;
pub mod cost;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod photon;
pub mod pipeline;
pub mod report;
pub mod rules;
pub mod tables;
pub mod utilization;

pub use config::{DriverThresholds, RunConfig, WorkspaceFilter};
pub use error::{AdvisorError, ConfigError, NodeTypeParseError, PricingGap, PricingGapError};
pub use generation::{parse_node_type, GenerationPolicy};
pub use lifecycle::{LifecycleEntry, LifecycleRegistry};
pub use models::*;
pub use observability::{AdvisorMetrics, StructuredLogger};
pub use pipeline::{Pipeline, RunOutcome};
pub use report::AnalysisReport;
pub use tables::{InputTables, JsonDirSink, JsonDirSource, OutputTables, TableSink, TableSource};
pub use utilization::UtilizationReport;
