//! Best-practice rule evaluators
//!
//! Each evaluator is a pure function of one joined cluster view and the
//! run-scoped context, so clusters can be evaluated in any order or in
//! parallel.

mod driver;
mod hardware;
mod runtime;

pub use driver::{classify_driver, driver_recommendation, DriverClassification, DriverEvidence};
pub use hardware::{HardwareEvidence, NodeRole, NodeVerdict};
pub use runtime::RuntimeEvidence;

use crate::config::DriverThresholds;
use crate::generation::GenerationPolicy;
use crate::lifecycle::LifecycleRegistry;
use crate::models::{ClusterRecord, DataQualityIssue, NodeTypeRecord, Verdict};
use chrono::NaiveDate;

/// Cluster config joined with its resolved node types
#[derive(Debug, Clone, Copy)]
pub struct ClusterView<'a> {
    pub cluster: &'a ClusterRecord,
    pub driver: Option<&'a NodeTypeRecord>,
    pub worker: Option<&'a NodeTypeRecord>,
}

/// Run-scoped inputs shared by all evaluators
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub registry: LifecycleRegistry,
    pub policy: GenerationPolicy,
    pub thresholds: DriverThresholds,
    pub as_of: NaiveDate,
    pub warning_window_days: i64,
}

/// Verdict plus the typed evidence behind it
#[derive(Debug, Clone)]
pub struct Finding<T> {
    pub verdict: Verdict,
    pub evidence: T,
    pub issues: Vec<DataQualityIssue>,
}

/// All three verdicts for one cluster
#[derive(Debug, Clone)]
pub struct ClusterFindings {
    pub runtime: Finding<RuntimeEvidence>,
    pub hardware: Finding<HardwareEvidence>,
    pub driver: Finding<DriverEvidence>,
}

impl ClusterFindings {
    pub fn verdicts(&self) -> [&Verdict; 3] {
        [
            &self.runtime.verdict,
            &self.hardware.verdict,
            &self.driver.verdict,
        ]
    }

    pub fn issues(&self) -> impl Iterator<Item = &DataQualityIssue> {
        self.runtime
            .issues
            .iter()
            .chain(self.hardware.issues.iter())
            .chain(self.driver.issues.iter())
    }
}

impl RuleContext {
    /// Run the three evaluators independently
    pub fn evaluate(&self, view: &ClusterView<'_>) -> ClusterFindings {
        ClusterFindings {
            runtime: runtime::evaluate(self, view),
            hardware: hardware::evaluate(self, view),
            driver: driver::evaluate(self, view),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::{Rule, Severity};

    #[test]
    fn test_rules_are_independent() {
        let ctx = context("2025-06-01");
        let cluster = cluster("c1", "13.2.x-scala2.12", "Standard_D4ds_v6", "Standard_D8ds_v6");
        let driver = node("Standard_D4ds_v6", 4, 16.0);
        let worker = node("Standard_D8ds_v6", 8, 32.0);
        let view = ClusterView {
            cluster: &cluster,
            driver: Some(&driver),
            worker: Some(&worker),
        };

        let findings = ctx.evaluate(&view);
        assert_eq!(findings.runtime.verdict.severity, Severity::Expired);
        assert_eq!(findings.hardware.verdict.severity, Severity::Good);
        assert_eq!(findings.driver.verdict.severity, Severity::Good);

        let rules: Vec<Rule> = findings.verdicts().iter().map(|v| v.rule).collect();
        assert_eq!(rules, Rule::ALL.to_vec());
    }
}
