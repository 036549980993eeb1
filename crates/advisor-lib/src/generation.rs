//! Hardware generation policy
//!
//! Node types follow the Azure naming convention
//! `Standard_<series><size><features>_v<generation>`, e.g. `Standard_D4ds_v5`.
//! The family is the first letter of the series.

use crate::error::NodeTypeParseError;
use crate::models::Severity;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Built-in minimum acceptable generation per family
pub const DEFAULT_MINIMUMS: &[(char, u32)] = &[
    ('D', 5), // general purpose
    ('E', 5), // memory optimized
    ('F', 2), // compute optimized
    ('L', 3), // storage optimized
    ('M', 2), // large memory
    ('N', 1), // GPU
];

const NODE_TYPE_PREFIX: &str = "Standard_";

fn node_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^Standard_([A-Z]+)\S*?_v(\d+)(?:_\S*)?$").expect("node type pattern is valid")
    })
}

/// Family and generation parsed from a node-type identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareId {
    /// Leading series letters, e.g. `DS` or `NC`
    pub series: String,
    pub family: char,
    pub generation: u32,
}

/// Parse family and generation out of a node-type identifier
pub fn parse_node_type(node_type: &str) -> Result<HardwareId, NodeTypeParseError> {
    let trimmed = node_type.trim();
    if !trimmed.starts_with(NODE_TYPE_PREFIX) {
        return Err(NodeTypeParseError {
            node_type: node_type.to_string(),
            reason: "missing `Standard_` prefix",
        });
    }

    let caps = node_type_pattern()
        .captures(trimmed)
        .ok_or_else(|| NodeTypeParseError {
            node_type: node_type.to_string(),
            reason: "missing `_v<generation>` suffix",
        })?;

    let series = caps[1].to_string();
    let generation = caps[2].parse().map_err(|_| NodeTypeParseError {
        node_type: node_type.to_string(),
        reason: "generation is not a number",
    })?;
    let family = series.chars().next().ok_or_else(|| NodeTypeParseError {
        node_type: node_type.to_string(),
        reason: "empty series",
    })?;

    Ok(HardwareId {
        series,
        family,
        generation,
    })
}

/// Result of classifying one node type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationClassification {
    pub status: Severity,
    pub hardware: HardwareId,
    pub current_gen: u32,
    /// `None` when the family has no policy entry
    pub minimum_gen: Option<u32>,
}

/// Minimum acceptable generation per hardware family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPolicy {
    minimums: BTreeMap<char, u32>,
    default_minimum: Option<u32>,
}

impl GenerationPolicy {
    pub fn with_defaults() -> Self {
        Self {
            minimums: DEFAULT_MINIMUMS.iter().copied().collect(),
            default_minimum: None,
        }
    }

    /// Merge per-family overrides (single-letter keys) over the table
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, u32>) -> Self {
        for (family, minimum) in overrides {
            if let Some(letter) = family.chars().next() {
                self.minimums.insert(letter.to_ascii_uppercase(), *minimum);
            }
        }
        self
    }

    /// Minimum for families the table does not name
    pub fn with_default_minimum(mut self, minimum: Option<u32>) -> Self {
        self.default_minimum = minimum;
        self
    }

    pub fn minimum_for(&self, family: char) -> Option<u32> {
        self.minimums
            .get(&family.to_ascii_uppercase())
            .copied()
            .or(self.default_minimum)
    }

    /// Families in the table with their minimums
    pub fn minimums(&self) -> impl Iterator<Item = (char, u32)> + '_ {
        self.minimums.iter().map(|(f, m)| (*f, *m))
    }

    /// Classify a node type against the policy.
    ///
    /// Below the minimum is `critical`; exactly at the minimum is `warning`;
    /// only generations strictly above it are `good`. Families without a
    /// minimum are `unknown`.
    pub fn classify_generation(
        &self,
        node_type: &str,
    ) -> Result<GenerationClassification, NodeTypeParseError> {
        let hardware = parse_node_type(node_type)?;
        let current_gen = hardware.generation;
        let minimum_gen = self.minimum_for(hardware.family);

        let status = match minimum_gen {
            None => Severity::Unknown,
            Some(min) if current_gen < min => Severity::Critical,
            Some(min) if current_gen == min => Severity::Warning,
            Some(_) => Severity::Good,
        };

        Ok(GenerationClassification {
            status,
            hardware,
            current_gen,
            minimum_gen,
        })
    }
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_node_types() {
        let d = parse_node_type("Standard_D4ds_v5").unwrap();
        assert_eq!((d.series.as_str(), d.family, d.generation), ("D", 'D', 5));

        let ds = parse_node_type("Standard_DS3_v2").unwrap();
        assert_eq!((ds.series.as_str(), ds.family, ds.generation), ("DS", 'D', 2));

        let gpu = parse_node_type("Standard_NC24ads_A100_v4").unwrap();
        assert_eq!((gpu.series.as_str(), gpu.family, gpu.generation), ("NC", 'N', 4));

        let constrained = parse_node_type("Standard_E16-4ds_v5").unwrap();
        assert_eq!(constrained.family, 'E');
        assert_eq!(constrained.generation, 5);
    }

    #[test]
    fn test_parse_failures() {
        let err = parse_node_type("i3.xlarge").unwrap_err();
        assert_eq!(err.reason, "missing `Standard_` prefix");

        let err = parse_node_type("Standard_F4s").unwrap_err();
        assert_eq!(err.reason, "missing `_v<generation>` suffix");

        assert!(parse_node_type("Standard_").is_err());
    }

    #[test]
    fn test_at_minimum_is_warning() {
        let policy = GenerationPolicy::with_defaults();
        let result = policy.classify_generation("Standard_D4ds_v5").unwrap();
        assert_eq!(result.current_gen, 5);
        assert_eq!(result.minimum_gen, Some(5));
        assert_eq!(result.status, Severity::Warning);
    }

    #[test]
    fn test_below_and_above_minimum() {
        let policy = GenerationPolicy::with_defaults();
        assert_eq!(
            policy.classify_generation("Standard_DS3_v2").unwrap().status,
            Severity::Critical
        );
        assert_eq!(
            policy.classify_generation("Standard_F8s_v3").unwrap().status,
            Severity::Good
        );
    }

    #[test]
    fn test_unknown_family_not_flagged() {
        let policy = GenerationPolicy::with_defaults();
        let result = policy.classify_generation("Standard_HB120rs_v3").unwrap();
        assert_eq!(result.status, Severity::Unknown);
        assert_eq!(result.minimum_gen, None);
    }

    #[test]
    fn test_default_minimum_covers_unlisted_families() {
        let policy = GenerationPolicy::with_defaults().with_default_minimum(Some(5));
        let result = policy.classify_generation("Standard_HB120rs_v3").unwrap();
        assert_eq!(result.status, Severity::Critical);
    }

    #[test]
    fn test_overrides_replace_family_minimum() {
        let mut overrides = BTreeMap::new();
        overrides.insert("d".to_string(), 4);
        let policy = GenerationPolicy::with_defaults().with_overrides(&overrides);

        assert_eq!(policy.minimum_for('D'), Some(4));
        assert_eq!(
            policy.classify_generation("Standard_D4ds_v5").unwrap().status,
            Severity::Good
        );
        assert_eq!(policy.minimum_for('E'), Some(5));
    }
}
