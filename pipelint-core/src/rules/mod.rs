//! The built-in rule catalog: 23 predicates in five categories.
//!
//! Every rule is a plain function paired with its [`RuleMeta`] in a
//! per-category table. Adding a rule means adding a table entry; the engine
//! never changes.

pub mod evaluation;
pub mod leakage;
pub mod reproducibility;
pub mod resampling;
pub mod workflow;

use crate::error::RuleError;
use crate::finding::{RuleCategory, Severity};
use crate::lineage::{AnnotatedPipeline, Provenance};
use crate::pipeline::{ArtifactId, Operation, attr};
use crate::rule::{PredicateRule, Rule, RuleMeta};
use std::collections::BTreeSet;
use std::sync::Arc;

/// All built-in rules, in table order.
pub(crate) fn builtin_rules() -> Vec<Arc<dyn Rule>> {
    [
        leakage::RULES,
        resampling::RULES,
        workflow::RULES,
        evaluation::RULES,
        reproducibility::RULES,
    ]
    .into_iter()
    .flatten()
    .map(|rule| Arc::new(*rule) as Arc<dyn Rule>)
    .collect()
}

pub(crate) const fn meta(
    id: &'static str,
    title: &'static str,
    category: RuleCategory,
    severity: Severity,
) -> RuleMeta {
    RuleMeta {
        id,
        title,
        category,
        severity,
        version: 1,
    }
}

pub(crate) const fn rule(meta: RuleMeta, predicate: crate::rule::Predicate) -> PredicateRule {
    PredicateRule::new(meta, predicate)
}

/// Resolved provenance, or an error when lineage has no such artifact.
pub(crate) fn provenance<'a>(
    pipeline: &'a AnnotatedPipeline,
    id: &ArtifactId,
) -> Result<&'a Provenance, RuleError> {
    pipeline
        .resolve(id)
        .ok_or_else(|| RuleError::MissingArtifact(id.clone()))
}

/// The artifacts themselves plus everything upstream of them.
pub(crate) fn reach<'a>(
    pipeline: &AnnotatedPipeline,
    ids: impl IntoIterator<Item = &'a ArtifactId>,
) -> BTreeSet<ArtifactId> {
    let mut result = BTreeSet::new();
    for id in ids {
        result.insert(id.clone());
        result.extend(pipeline.lineage().upstream(id));
    }
    result
}

/// Artifacts in `ids` whose own provenance is `Resample`.
pub(crate) fn resamples<'a>(
    pipeline: &'a AnnotatedPipeline,
    ids: impl IntoIterator<Item = &'a ArtifactId>,
) -> impl Iterator<Item = &'a ArtifactId> {
    ids.into_iter().filter(move |id| {
        pipeline
            .lineage()
            .artifact(id)
            .is_some_and(|a| a.provenance == Provenance::Resample)
    })
}

/// Declared metric names, lowercased. Missing attribute means no metrics.
pub(crate) fn metrics(op: &Operation) -> Result<Vec<String>, RuleError> {
    if op.attributes.get(attr::METRICS).is_none() {
        return Ok(Vec::new());
    }
    op.attributes
        .strings(attr::METRICS)
        .map(|names| names.into_iter().map(|m| m.to_ascii_lowercase()).collect())
        .ok_or_else(|| RuleError::MalformedAttribute {
            operation: op.id,
            key: attr::METRICS.to_string(),
            message: "expected a metric name or a list of metric names".to_string(),
        })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Operation, OperationKind};

    #[test]
    fn test_metrics_lowercased_and_validated() {
        let op = Operation::new(OperationKind::Evaluate).attr("metrics", "ROC_AUC");
        assert_eq!(metrics(&op).unwrap(), vec!["roc_auc"]);

        let op = Operation::new(OperationKind::Evaluate);
        assert!(metrics(&op).unwrap().is_empty());

        let op = Operation::new(OperationKind::Evaluate).attr("metrics", 3);
        assert!(matches!(
            metrics(&op),
            Err(RuleError::MalformedAttribute { .. })
        ));
    }

    #[test]
    fn test_builtin_ids_unique() {
        let rules = builtin_rules();
        let ids: BTreeSet<_> = rules.iter().map(|r| r.id()).collect();
        assert_eq!(ids.len(), rules.len());
        assert!(rules.iter().all(|r| r.meta().version == 1));
    }
}
