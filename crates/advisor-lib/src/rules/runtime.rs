//! Runtime freshness rule

use super::{ClusterView, Finding, RuleContext};
use crate::lifecycle::{RuntimeClassification, RuntimeVersion};
use crate::models::{DataQualityIssue, DataQualityKind, Rule, Severity, Verdict};

/// What the runtime rule saw for one cluster
#[derive(Debug, Clone)]
pub struct RuntimeEvidence {
    pub runtime_version: String,
    /// `major.minor` family, when one could be extracted
    pub family: Option<String>,
    pub classification: RuntimeClassification,
}

pub(super) fn evaluate(ctx: &RuleContext, view: &ClusterView<'_>) -> Finding<RuntimeEvidence> {
    let raw = view.cluster.runtime_version.as_str();
    let classification = ctx
        .registry
        .classify_runtime(raw, ctx.as_of, ctx.warning_window_days);
    let family = RuntimeVersion::extract(raw).map(|v| v.to_string());

    let upgrade_hint = ctx
        .registry
        .latest_lts()
        .map(|e| format!("; upgrade to {} LTS", e.version))
        .unwrap_or_default();

    let mut issues = Vec::new();
    let reason = match (&classification.entry, classification.days_until_expiry) {
        (Some(entry), Some(days)) => match classification.status {
            Severity::Expired => format!(
                "{} ({}) reached end of support on {} ({} days ago){}",
                entry.version,
                entry.track(),
                entry.end_of_support_date,
                -days,
                upgrade_hint
            ),
            Severity::Critical => format!(
                "{} is a non-LTS release with a short support window (ends {}){}",
                entry.version, entry.end_of_support_date, upgrade_hint
            ),
            Severity::Warning => format!(
                "{} LTS ends support in {} days ({}){}",
                entry.version, days, entry.end_of_support_date, upgrade_hint
            ),
            _ => format!(
                "{} LTS supported until {} ({} days left)",
                entry.version, entry.end_of_support_date, days
            ),
        },
        _ => {
            let detail = format!("runtime `{}` is not in the lifecycle registry", raw);
            issues.push(DataQualityIssue {
                cluster_id: view.cluster.cluster_id.clone(),
                rule: Some(Rule::RuntimeFreshness),
                kind: DataQualityKind::UnknownRuntime,
                detail: detail.clone(),
            });
            format!("{}; no freshness guarantee", detail)
        }
    };

    Finding {
        verdict: Verdict::new(Rule::RuntimeFreshness, classification.status, reason),
        evidence: RuntimeEvidence {
            runtime_version: raw.to_string(),
            family,
            classification,
        },
        issues,
    }
}
