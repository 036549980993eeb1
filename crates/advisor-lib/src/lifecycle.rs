//! Runtime lifecycle registry
//!
//! Maps a runtime `major.minor` release to its support track and
//! end-of-support date, and classifies cluster runtimes against it.

use crate::error::ConfigError;
use crate::models::Severity;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Published LTS schedule: (version, release, end of support)
const LTS_SCHEDULE: &[(&str, &str, &str)] = &[
    ("17.3", "2025-10-22", "2028-10-22"),
    ("16.4", "2025-05-09", "2028-05-09"),
    ("15.4", "2024-08-19", "2027-08-19"),
    ("14.3", "2024-02-01", "2027-02-01"),
    ("13.3", "2023-08-22", "2026-08-22"),
    ("12.2", "2023-03-01", "2026-03-01"),
    ("11.3", "2022-10-19", "2025-10-19"),
    ("10.4", "2022-03-18", "2025-03-18"),
    ("9.1", "2021-09-23", "2024-09-23"),
];

/// Standard (short support) releases
const STANDARD_SCHEDULE: &[(&str, &str, &str)] = &[
    ("17.2", "2025-09-16", "2026-03-16"),
    ("17.1", "2025-08-05", "2026-02-05"),
    ("17.0", "2025-06-24", "2025-12-24"),
    ("16.3", "2025-04-08", "2025-10-08"),
    ("16.2", "2025-02-12", "2025-08-12"),
    ("16.1", "2025-01-08", "2025-07-08"),
    ("16.0", "2024-11-19", "2025-05-19"),
    ("15.3", "2024-06-24", "2024-12-24"),
    ("15.2", "2024-05-15", "2024-11-15"),
    ("15.1", "2024-04-12", "2024-10-12"),
    ("14.2", "2023-11-22", "2024-05-22"),
    ("14.1", "2023-10-11", "2024-04-11"),
    ("13.2", "2023-07-25", "2024-01-25"),
    ("13.1", "2023-05-22", "2023-11-22"),
];

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\.(\d+)").expect("version pattern is valid"))
}

/// Release key ordered numerically (so 9.1 < 10.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
}

impl RuntimeVersion {
    /// Extract the `major.minor` component from a runtime string such as
    /// `15.4.x-photon-scala2.12` or `10.4 LTS`
    pub fn extract(raw: &str) -> Option<Self> {
        let caps = version_pattern().captures(raw)?;
        Some(Self {
            major: caps.get(1)?.as_str().parse().ok()?,
            minor: caps.get(2)?.as_str().parse().ok()?,
        })
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One row of the lifecycle table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEntry {
    /// `major.minor`, e.g. `15.4`
    pub version: String,
    pub is_long_term_support: bool,
    pub release_date: NaiveDate,
    pub end_of_support_date: NaiveDate,
}

impl LifecycleEntry {
    pub fn validate(&self) -> Result<RuntimeVersion, ConfigError> {
        let parsed = RuntimeVersion::extract(&self.version)
            .filter(|v| v.to_string() == self.version.trim())
            .ok_or_else(|| {
                ConfigError::new(
                    "runtime_lifecycle",
                    format!("version `{}` must look like `major.minor`", self.version),
                )
            })?;
        if self.end_of_support_date < self.release_date {
            return Err(ConfigError::new(
                "runtime_lifecycle",
                format!("version {} ends support before its release", self.version),
            ));
        }
        Ok(parsed)
    }

    pub fn track(&self) -> &'static str {
        if self.is_long_term_support {
            "LTS"
        } else {
            "Non-LTS"
        }
    }
}

/// Result of classifying one runtime string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeClassification {
    pub status: Severity,
    /// Negative once the release is past end-of-support
    pub days_until_expiry: Option<i64>,
    pub entry: Option<LifecycleEntry>,
}

/// Immutable lifecycle table loaded once per run
#[derive(Debug, Clone)]
pub struct LifecycleRegistry {
    entries: BTreeMap<RuntimeVersion, LifecycleEntry>,
}

impl LifecycleRegistry {
    /// Registry with no entries; every version classifies as unknown
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry loaded with the built-in release schedule
    pub fn with_defaults() -> Self {
        let mut entries = BTreeMap::new();
        let builtin = LTS_SCHEDULE
            .iter()
            .map(|row| (row, true))
            .chain(STANDARD_SCHEDULE.iter().map(|row| (row, false)));

        for ((version, release, eos), lts) in builtin {
            let (Some(key), Ok(release_date), Ok(end_of_support_date)) = (
                RuntimeVersion::extract(version),
                NaiveDate::parse_from_str(release, "%Y-%m-%d"),
                NaiveDate::parse_from_str(eos, "%Y-%m-%d"),
            ) else {
                continue;
            };
            entries.insert(
                key,
                LifecycleEntry {
                    version: version.to_string(),
                    is_long_term_support: lts,
                    release_date,
                    end_of_support_date,
                },
            );
        }

        Self { entries }
    }

    /// Add or replace entries, keyed by version
    pub fn with_overrides(mut self, overrides: &[LifecycleEntry]) -> Result<Self, ConfigError> {
        for entry in overrides {
            let key = entry.validate()?;
            self.entries.insert(key, entry.clone());
        }
        Ok(self)
    }

    pub fn lookup(&self, runtime_version: &str) -> Option<&LifecycleEntry> {
        RuntimeVersion::extract(runtime_version).and_then(|key| self.entries.get(&key))
    }

    /// Most recently released LTS entry
    pub fn latest_lts(&self) -> Option<&LifecycleEntry> {
        self.entries
            .values()
            .filter(|e| e.is_long_term_support)
            .max_by_key(|e| e.release_date)
    }

    /// Entries, newest release first
    pub fn entries(&self) -> impl Iterator<Item = &LifecycleEntry> {
        self.entries.values().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classify a runtime string as of `as_of`.
    ///
    /// Unknown releases are `unknown`; releases at or past end-of-support are
    /// `expired`; any other standard release is `critical`; an LTS release
    /// within `warning_window_days` of end-of-support is `warning`.
    pub fn classify_runtime(
        &self,
        runtime_version: &str,
        as_of: NaiveDate,
        warning_window_days: i64,
    ) -> RuntimeClassification {
        let Some(entry) = self.lookup(runtime_version) else {
            return RuntimeClassification {
                status: Severity::Unknown,
                days_until_expiry: None,
                entry: None,
            };
        };

        let days = (entry.end_of_support_date - as_of).num_days();
        let status = if days <= 0 {
            Severity::Expired
        } else if !entry.is_long_term_support {
            Severity::Critical
        } else if days <= warning_window_days {
            Severity::Warning
        } else {
            Severity::Good
        };

        RuntimeClassification {
            status,
            days_until_expiry: Some(days),
            entry: Some(entry.clone()),
        }
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
