//! Hardware generation rule
//!
//! Driver and worker node types are classified separately; the cluster
//! verdict is the worst of the classifiable ones.

use super::{ClusterView, Finding, RuleContext};
use crate::generation::GenerationClassification;
use crate::models::{DataQualityIssue, DataQualityKind, NodeTypeRecord, Rule, Severity, Verdict};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Driver,
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Driver => write!(f, "driver"),
            NodeRole::Worker => write!(f, "worker"),
        }
    }
}

/// Classification of one node of the cluster
#[derive(Debug, Clone, PartialEq)]
pub enum NodeVerdict {
    Classified(GenerationClassification),
    /// Identifier does not follow the naming convention
    Unparseable(String),
    /// Node type absent from the catalog
    Unresolved,
}

impl NodeVerdict {
    pub fn classification(&self) -> Option<&GenerationClassification> {
        match self {
            NodeVerdict::Classified(c) => Some(c),
            _ => None,
        }
    }
}

/// What the hardware rule saw for one cluster
#[derive(Debug, Clone)]
pub struct HardwareEvidence {
    pub driver: NodeVerdict,
    pub worker: NodeVerdict,
}

fn classify_node(
    ctx: &RuleContext,
    cluster_id: &str,
    role: NodeRole,
    node: Option<&NodeTypeRecord>,
    issues: &mut Vec<DataQualityIssue>,
) -> NodeVerdict {
    let Some(node) = node else {
        return NodeVerdict::Unresolved;
    };
    match ctx.policy.classify_generation(&node.raw_type_string) {
        Ok(classification) => NodeVerdict::Classified(classification),
        Err(err) => {
            issues.push(DataQualityIssue {
                cluster_id: cluster_id.to_string(),
                rule: Some(Rule::HardwareGeneration),
                kind: DataQualityKind::UnparseableNodeType,
                detail: format!("{} {}", role, err),
            });
            NodeVerdict::Unparseable(node.raw_type_string.clone())
        }
    }
}

fn describe(role: NodeRole, node_type: &str, verdict: &NodeVerdict) -> String {
    match verdict {
        NodeVerdict::Classified(c) => match c.minimum_gen {
            Some(min) => format!(
                "{} {} is v{} (minimum v{})",
                role, node_type, c.current_gen, min
            ),
            None => format!(
                "{} {} is v{} (no policy for family {})",
                role, node_type, c.current_gen, c.hardware.family
            ),
        },
        NodeVerdict::Unparseable(raw) => format!("{} {} has no parseable generation", role, raw),
        NodeVerdict::Unresolved => format!("{} {} is not in the node-type catalog", role, node_type),
    }
}

pub(super) fn evaluate(ctx: &RuleContext, view: &ClusterView<'_>) -> Finding<HardwareEvidence> {
    let cluster = view.cluster;
    let mut issues = Vec::new();

    let driver = classify_node(ctx, &cluster.cluster_id, NodeRole::Driver, view.driver, &mut issues);
    let worker = classify_node(ctx, &cluster.cluster_id, NodeRole::Worker, view.worker, &mut issues);

    let severity = [&driver, &worker]
        .iter()
        .filter_map(|v| v.classification())
        .map(|c| c.status)
        .filter(|s| *s != Severity::Unknown)
        .max()
        .unwrap_or(Severity::Unknown);

    let reason = format!(
        "{}; {}",
        describe(NodeRole::Driver, &cluster.driver_node_type_id, &driver),
        describe(NodeRole::Worker, &cluster.worker_node_type_id, &worker)
    );

    Finding {
        verdict: Verdict::new(Rule::HardwareGeneration, severity, reason),
        evidence: HardwareEvidence { driver, worker },
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn run(driver: Option<NodeTypeRecord>, worker: Option<NodeTypeRecord>) -> Finding<HardwareEvidence> {
        let ctx = context("2025-06-01");
        let cluster = cluster(
            "c1",
            "15.4.x-scala2.12",
            driver.as_ref().map_or("Standard_Missing_v1", |n| n.node_type_id.as_str()),
            worker.as_ref().map_or("Standard_Missing_v1", |n| n.node_type_id.as_str()),
        );
        let view = ClusterView {
            cluster: &cluster,
            driver: driver.as_ref(),
            worker: worker.as_ref(),
        };
        evaluate(&ctx, &view)
    }

    #[test]
    fn test_worst_of_driver_and_worker() {
        let finding = run(
            Some(node("Standard_D4ds_v5", 4, 16.0)),
            Some(node("Standard_DS3_v2", 4, 14.0)),
        );
        assert_eq!(finding.verdict.severity, Severity::Critical);
        assert!(finding.verdict.reason.contains("worker Standard_DS3_v2 is v2 (minimum v5)"));
    }

    #[test]
    fn test_driver_at_minimum_is_warning() {
        let finding = run(
            Some(node("Standard_D4ds_v5", 4, 16.0)),
            Some(node("Standard_E8ds_v6", 8, 64.0)),
        );
        assert_eq!(finding.verdict.severity, Severity::Warning);
    }

    #[test]
    fn test_unparseable_part_is_skipped() {
        let finding = run(
            Some(node("Standard_F4s", 4, 8.0)),
            Some(node("Standard_E8ds_v6", 8, 64.0)),
        );
        assert_eq!(finding.verdict.severity, Severity::Good);
        assert_eq!(finding.issues.len(), 1);
        assert_eq!(finding.issues[0].kind, DataQualityKind::UnparseableNodeType);
    }

    #[test]
    fn test_nothing_classifiable_is_unknown() {
        let finding = run(None, Some(node("i3.xlarge", 4, 30.5)));
        assert_eq!(finding.verdict.severity, Severity::Unknown);
        assert!(matches!(finding.evidence.driver, NodeVerdict::Unresolved));
        assert!(matches!(finding.evidence.worker, NodeVerdict::Unparseable(_)));
    }

    #[test]
    fn test_unknown_family_does_not_mask_known_part() {
        let finding = run(
            Some(node("Standard_HB120rs_v3", 120, 448.0)),
            Some(node("Standard_D8ds_v4", 8, 32.0)),
        );
        assert_eq!(finding.verdict.severity, Severity::Critical);
        assert!(finding.issues.is_empty());
    }
}
