//! Driver right-sizing rule

use super::{ClusterView, Finding, RuleContext};
use crate::config::DriverThresholds;
use crate::models::{NodeTypeRecord, Rule, Severity, Verdict};

/// Sizing of one driver node type against the thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct DriverClassification {
    pub status: Severity,
    pub vcpu: u32,
    pub memory_gb: f64,
    /// vCPUs above the threshold (0 when compliant)
    pub excess_vcpu: u32,
    /// Memory above the threshold in GB (0 when compliant)
    pub excess_memory_gb: f64,
}

/// What the driver rule saw for one cluster
#[derive(Debug, Clone)]
pub struct DriverEvidence {
    pub driver_node_type_id: String,
    pub classification: Option<DriverClassification>,
    pub recommendation: Option<&'static str>,
}

/// Classify a driver node type.
///
/// Only values strictly above a threshold count as exceeding it: both
/// exceeded is `critical`, one exceeded is `warning`.
pub fn classify_driver(driver: &NodeTypeRecord, thresholds: DriverThresholds) -> DriverClassification {
    let cpu_over = driver.vcpu_count > thresholds.cpu;
    let memory_over = driver.memory_gb > thresholds.memory_gb;

    let status = match (cpu_over, memory_over) {
        (true, true) => Severity::Critical,
        (true, false) | (false, true) => Severity::Warning,
        (false, false) => Severity::Good,
    };

    DriverClassification {
        status,
        vcpu: driver.vcpu_count,
        memory_gb: driver.memory_gb,
        excess_vcpu: driver.vcpu_count.saturating_sub(thresholds.cpu),
        excess_memory_gb: (driver.memory_gb - thresholds.memory_gb).max(0.0),
    }
}

/// Suggested replacement for an oversized driver
pub fn driver_recommendation(vcpu: u32) -> &'static str {
    if vcpu > 32 {
        "Consider Standard_E8ds_v5 (8 vCPU, 64GB)"
    } else if vcpu > 16 {
        "Consider Standard_E4ds_v5 (4 vCPU, 32GB)"
    } else {
        "Review workload requirements"
    }
}

pub(super) fn evaluate(ctx: &RuleContext, view: &ClusterView<'_>) -> Finding<DriverEvidence> {
    let node_type_id = view.cluster.driver_node_type_id.clone();

    let Some(driver) = view.driver else {
        return Finding {
            verdict: Verdict::new(
                Rule::DriverSizing,
                Severity::Unknown,
                format!("driver {} is not in the node-type catalog", node_type_id),
            ),
            evidence: DriverEvidence {
                driver_node_type_id: node_type_id,
                classification: None,
                recommendation: None,
            },
            issues: Vec::new(),
        };
    };

    let classification = classify_driver(driver, ctx.thresholds);
    let recommendation = Rule::DriverSizing
        .flags(classification.status)
        .then(|| driver_recommendation(classification.vcpu));

    let mut reason = format!(
        "driver {} has {} vCPU / {:.1} GB (limits {} vCPU / {:.1} GB)",
        node_type_id,
        classification.vcpu,
        classification.memory_gb,
        ctx.thresholds.cpu,
        ctx.thresholds.memory_gb
    );
    if let Some(hint) = recommendation {
        reason.push_str("; ");
        reason.push_str(hint);
    }

    Finding {
        verdict: Verdict::new(Rule::DriverSizing, classification.status, reason),
        evidence: DriverEvidence {
            driver_node_type_id: node_type_id,
            classification: Some(classification),
            recommendation,
        },
        issues: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_one_threshold_exceeded_is_warning() {
        let driver = node("Standard_F32s_v2", 32, 48.0);
        let result = classify_driver(&driver, DriverThresholds { cpu: 16, memory_gb: 64.0 });
        assert_eq!(result.status, Severity::Warning);
        assert_eq!(result.excess_vcpu, 16);
        assert_eq!(result.excess_memory_gb, 0.0);
    }

    #[test]
    fn test_both_exceeded_is_critical() {
        let driver = node("Standard_E32ds_v5", 32, 256.0);
        let result = classify_driver(&driver, DriverThresholds::default());
        assert_eq!(result.status, Severity::Critical);
        assert!((result.excess_memory_gb - 192.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_equal_to_threshold_is_compliant() {
        let driver = node("Standard_D16ds_v5", 16, 64.0);
        let result = classify_driver(&driver, DriverThresholds::default());
        assert_eq!(result.status, Severity::Good);
        assert_eq!(result.excess_vcpu, 0);
    }

    #[test]
    fn test_recommendation_tiers() {
        assert!(driver_recommendation(64).contains("E8ds_v5"));
        assert!(driver_recommendation(32).contains("E4ds_v5"));
        assert_eq!(driver_recommendation(8), "Review workload requirements");
    }

    #[test]
    fn test_missing_driver_is_unknown() {
        let ctx = context("2025-06-01");
        let cluster = cluster("c1", "15.4.x-scala2.12", "Standard_Gone_v9", "Standard_D4ds_v5");
        let view = ClusterView {
            cluster: &cluster,
            driver: None,
            worker: None,
        };
        let finding = evaluate(&ctx, &view);
        assert_eq!(finding.verdict.severity, Severity::Unknown);
        assert!(finding.evidence.classification.is_none());
    }

    #[test]
    fn test_oversized_driver_reason_carries_recommendation() {
        let ctx = context("2025-06-01");
        let cluster = cluster("c1", "15.4.x-scala2.12", "Standard_E64ds_v5", "Standard_D4ds_v5");
        let driver = node("Standard_E64ds_v5", 64, 512.0);
        let view = ClusterView {
            cluster: &cluster,
            driver: Some(&driver),
            worker: None,
        };
        let finding = evaluate(&ctx, &view);
        assert_eq!(finding.verdict.severity, Severity::Critical);
        assert!(finding.verdict.reason.contains("Standard_E8ds_v5"));
        assert_eq!(finding.evidence.recommendation, Some(driver_recommendation(64)));
    }
}
