//! Workflow rules (WF-001 to WF-003).

use super::{meta, reach, rule};
use crate::error::RuleError;
use crate::finding::{
    Finding,
    RuleCategory::Workflow,
    Severity::{Major, Minor},
};
use crate::lineage::{AnnotatedPipeline, Provenance};
use crate::pipeline::{ArtifactId, Operation, OperationKind, attr, role};
use crate::rule::{PredicateRule, RuleMeta};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) const RULES: &[PredicateRule] = &[
    rule(
        meta("WF-001", "Preprocessor and model not bundled", Workflow, Minor),
        unbundled_preprocessor,
    ),
    rule(
        meta("WF-002", "Inconsistent preprocessing across splits", Workflow, Major),
        inconsistent_preprocessing,
    ),
    rule(
        meta("WF-003", "Tuned model fitted without finalizing", Workflow, Major),
        fit_without_finalize,
    ),
];

fn produced_by(pipeline: &AnnotatedPipeline, id: &ArtifactId, kind: OperationKind) -> bool {
    pipeline.producer_of(id).is_some_and(|op| op.kind == kind)
}

fn is_wrapper(op: &Operation) -> bool {
    op.kind == OperationKind::FinalizeWorkflow || op.has_role(role::WORKFLOW)
}

fn unbundled_preprocessor(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let lineage = pipeline.lineage();
    let mut findings = Vec::new();

    for op in pipeline.operations() {
        if op.kind != OperationKind::Fit {
            continue;
        }
        let feeds = reach(pipeline, &op.inputs);
        let wrappers: Vec<_> = feeds
            .iter()
            .filter(|id| pipeline.producer_of(id).is_some_and(is_wrapper))
            .collect();

        let unwrapped: Vec<_> = feeds
            .iter()
            .filter(|id| produced_by(pipeline, id, OperationKind::DefinePreprocessor))
            .filter(|recipe| !wrappers.iter().any(|w| lineage.upstream(w).contains(*recipe)))
            .collect();
        if unwrapped.is_empty() {
            continue;
        }

        let mut finding = Finding::new(
            meta,
            "Model is fitted on a preprocessor outside a workflow that bundles both",
        )
        .at(op);
        for recipe in unwrapped {
            finding = finding.with_artifact(recipe);
        }
        findings.push(finding);
    }
    Ok(findings)
}

/// Which side of the split an `ApplyPreprocessor` transforms.
fn branch(pipeline: &AnnotatedPipeline, op: &Operation) -> Option<Provenance> {
    pipeline
        .data_inputs(op)
        .filter_map(|id| pipeline.resolve(id))
        .find(|p| matches!(p, Provenance::Train | Provenance::Test))
        .cloned()
}

fn inconsistent_preprocessing(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    // Recipe lineage -> (train applications, test applications).
    type Branches<'a> = (Vec<&'a Operation>, Vec<&'a Operation>);
    let mut groups: BTreeMap<BTreeSet<ArtifactId>, Branches<'_>> = BTreeMap::new();

    for op in pipeline.operations() {
        if op.kind != OperationKind::ApplyPreprocessor {
            continue;
        }
        let prepped: Vec<_> = op.inputs.iter().filter(|id| !pipeline.is_data(id)).collect();
        let recipes: BTreeSet<_> = reach(pipeline, prepped)
            .into_iter()
            .filter(|id| produced_by(pipeline, id, OperationKind::DefinePreprocessor))
            .collect();
        if recipes.is_empty() {
            continue;
        }
        let entry = groups.entry(recipes).or_default();
        match branch(pipeline, op) {
            Some(Provenance::Train) => entry.0.push(op),
            Some(Provenance::Test) => entry.1.push(op),
            _ => {}
        }
    }

    let mut findings = Vec::new();
    for (train, test) in groups.values() {
        let Some(reference) = train.first() else {
            continue;
        };
        let reference_prepped: BTreeSet<_> =
            reference.inputs.iter().filter(|id| !pipeline.is_data(id)).collect();
        for op in test {
            let prepped: BTreeSet<_> = op.inputs.iter().filter(|id| !pipeline.is_data(id)).collect();
            let message = if prepped != reference_prepped {
                "Test data is transformed with a preprocessor estimated separately from the training branch"
            } else if op.attributes.get(attr::PARAMS) != reference.attributes.get(attr::PARAMS) {
                "Test data is transformed with different parameters than the training data"
            } else {
                continue;
            };
            let mut finding = Finding::new(meta, message)
                .at(op)
                .with_operation(reference.id);
            for id in prepped {
                finding = finding.with_artifact(id);
            }
            findings.push(finding);
        }
    }
    Ok(findings)
}

fn fit_without_finalize(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let operations = pipeline.operations();
    let mut findings = Vec::new();

    for op in operations {
        if op.kind != OperationKind::SelectBest {
            continue;
        }
        let Some(tune) = op
            .inputs
            .iter()
            .filter_map(|id| pipeline.producer_of(id))
            .find(|p| p.kind == OperationKind::Tune)
        else {
            continue;
        };

        let rest = &operations[(op.id.index() + 1).min(operations.len())..];
        let Some(fit) = rest.iter().find(|o| o.kind == OperationKind::Fit) else {
            continue;
        };
        let finalized = pipeline
            .pipeline()
            .between(op.id, fit.id)
            .iter()
            .any(|o| o.kind == OperationKind::FinalizeWorkflow);
        if !finalized {
            findings.push(
                Finding::new(
                    meta,
                    "Selected parameters are never finalized into the workflow before fitting",
                )
                .at(op)
                .with_operation(tune.id)
                .with_operation(fit.id),
            );
        }
    }
    Ok(findings)
}
