//! Reference lookups: the lifecycle table and single-value classification

use advisor_lib::{GenerationPolicy, LifecycleRegistry, RunConfig};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{color_severity, print_heading, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct LifecycleRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Track")]
    track: String,
    #[tabled(rename = "Released")]
    released: String,
    #[tabled(rename = "End of Support")]
    end_of_support: String,
    #[tabled(rename = "Days Left")]
    days_left: i64,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Serialize)]
struct LifecycleJson<'a> {
    version: &'a str,
    is_long_term_support: bool,
    release_date: NaiveDate,
    end_of_support_date: NaiveDate,
    days_until_expiry: Option<i64>,
    status: &'static str,
}

#[derive(Serialize)]
struct RuntimeLookup<'a> {
    runtime_version: &'a str,
    as_of: NaiveDate,
    status: &'static str,
    track: Option<&'static str>,
    end_of_support_date: Option<NaiveDate>,
    days_until_expiry: Option<i64>,
}

#[derive(Serialize)]
struct NodeTypeLookup<'a> {
    node_type: &'a str,
    series: String,
    family: char,
    generation: u32,
    minimum_generation: Option<u32>,
    status: &'static str,
}

fn registry(config: &RunConfig) -> Result<LifecycleRegistry> {
    LifecycleRegistry::with_defaults()
        .with_overrides(&config.runtime_lifecycle)
        .context("Invalid runtime_lifecycle override")
}

fn policy(config: &RunConfig) -> GenerationPolicy {
    GenerationPolicy::with_defaults()
        .with_overrides(&config.generation_minimums)
        .with_default_minimum(config.default_minimum_generation)
}

/// Apply the lookup flags and run the same validation as `run`
fn validated(mut config: RunConfig, warning_window_days: Option<i64>) -> Result<RunConfig> {
    if let Some(days) = warning_window_days {
        config.warning_window_days = days;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_validated(config_path: Option<&Path>, warning_window_days: Option<i64>) -> Result<RunConfig> {
    validated(crate::config::load(config_path)?, warning_window_days)
}

fn evaluation_date(config: &RunConfig, as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| config.as_of.unwrap_or_else(Utc::now).date_naive())
}

/// Print every known runtime release with its status as of a date
pub fn show_lifecycle(
    config_path: Option<&Path>,
    as_of: Option<NaiveDate>,
    warning_window_days: Option<i64>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_validated(config_path, warning_window_days)?;
    let registry = registry(&config)?;
    let as_of = evaluation_date(&config, as_of);
    let window = config.warning_window_days;

    let entries: Vec<_> = registry.entries().collect();

    match format {
        OutputFormat::Json => {
            let rows: Vec<LifecycleJson> = entries
                .iter()
                .map(|entry| {
                    let classified = registry.classify_runtime(&entry.version, as_of, window);
                    LifecycleJson {
                        version: &entry.version,
                        is_long_term_support: entry.is_long_term_support,
                        release_date: entry.release_date,
                        end_of_support_date: entry.end_of_support_date,
                        days_until_expiry: classified.days_until_expiry,
                        status: classified.status.as_str(),
                    }
                })
                .collect();
            print_json(&rows)?;
        }
        OutputFormat::Table => {
            print_heading(&format!("Runtime Lifecycle as of {}", as_of));
            let rows: Vec<LifecycleRow> = entries
                .iter()
                .map(|entry| {
                    let classified = registry.classify_runtime(&entry.version, as_of, window);
                    LifecycleRow {
                        version: entry.version.clone(),
                        track: entry.track().to_string(),
                        released: entry.release_date.to_string(),
                        end_of_support: entry.end_of_support_date.to_string(),
                        days_left: classified.days_until_expiry.unwrap_or_default(),
                        status: color_severity(classified.status),
                    }
                })
                .collect();
            print_table(&rows, "Lifecycle table is empty");
            if let Some(lts) = registry.latest_lts() {
                println!("Latest LTS: {}", lts.version.green());
            }
        }
    }

    Ok(())
}

/// Classify one runtime version string
pub fn classify_runtime(
    config_path: Option<&Path>,
    runtime_version: &str,
    as_of: Option<NaiveDate>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_validated(config_path, None)?;
    let registry = registry(&config)?;
    let as_of = evaluation_date(&config, as_of);
    let classified = registry.classify_runtime(runtime_version, as_of, config.warning_window_days);

    let lookup = RuntimeLookup {
        runtime_version,
        as_of,
        status: classified.status.as_str(),
        track: classified.entry.as_ref().map(|e| e.track()),
        end_of_support_date: classified.entry.as_ref().map(|e| e.end_of_support_date),
        days_until_expiry: classified.days_until_expiry,
    };

    match format {
        OutputFormat::Json => print_json(&lookup)?,
        OutputFormat::Table => {
            println!("Runtime:        {}", runtime_version.cyan());
            println!("As of:          {}", as_of);
            println!("Status:         {}", color_severity(classified.status));
            match &classified.entry {
                Some(entry) => {
                    println!("Track:          {}", entry.track());
                    println!("End of support: {}", entry.end_of_support_date);
                    if let Some(days) = classified.days_until_expiry {
                        println!("Days left:      {}", days);
                    }
                }
                None => println!("{}", "Not in the lifecycle table".yellow()),
            }
        }
    }

    Ok(())
}

/// Classify one node type id against the generation policy
pub fn classify_node_type(
    config_path: Option<&Path>,
    node_type: &str,
    format: OutputFormat,
) -> Result<()> {
    let config = load_validated(config_path, None)?;
    let classified = policy(&config).classify_generation(node_type)?;

    let lookup = NodeTypeLookup {
        node_type,
        series: classified.hardware.series.clone(),
        family: classified.hardware.family,
        generation: classified.current_gen,
        minimum_generation: classified.minimum_gen,
        status: classified.status.as_str(),
    };

    match format {
        OutputFormat::Json => print_json(&lookup)?,
        OutputFormat::Table => {
            println!("Node type:   {}", node_type.cyan());
            println!("Series:      {}", lookup.series);
            println!("Generation:  v{}", lookup.generation);
            match lookup.minimum_generation {
                Some(min) => println!("Minimum:     v{}", min),
                None => println!("Minimum:     {}", "none for this family".yellow()),
            }
            println!("Status:      {}", color_severity(classified.status));
        }
    }

    Ok(())
}
