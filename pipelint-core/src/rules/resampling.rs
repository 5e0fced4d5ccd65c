//! Resampling rules (RS-001 to RS-005).

use super::{meta, reach, resamples, rule};
use crate::error::RuleError;
use crate::finding::{
    Finding,
    RuleCategory::Resampling,
    Severity::{Critical, Major},
};
use crate::lineage::{AnnotatedPipeline, Provenance};
use crate::pipeline::{ArtifactId, Operation, OperationKind, attr};
use crate::rule::{PredicateRule, RuleMeta};
use std::collections::BTreeSet;

pub(crate) const RULES: &[PredicateRule] = &[
    rule(
        meta("RS-001", "Unstratified split of an imbalanced outcome", Resampling, Major),
        unstratified_split,
    ),
    rule(
        meta("RS-002", "Evaluation on training data", Resampling, Critical),
        evaluated_on_training_data,
    ),
    rule(
        meta("RS-003", "Final evaluation reuses tuning resamples", Resampling, Critical),
        evaluation_reuses_tuning_resamples,
    ),
    rule(
        meta("RS-004", "Resampling without a seed", Resampling, Major),
        unseeded_resampling,
    ),
    rule(
        meta("RS-005", "Resamples shared by independent selection chains", Resampling, Critical),
        shared_resamples,
    ),
];

fn unstratified_split(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    Ok(pipeline
        .operations()
        .iter()
        .filter(|op| {
            matches!(op.kind, OperationKind::Split | OperationKind::DefineResample)
                && pipeline.outcome_imbalanced(op)
                && !op.attributes.flag(attr::STRATIFIED)
        })
        .map(|op| {
            Finding::new(
                meta,
                format!("{} is not stratified although the outcome is imbalanced", op.kind),
            )
            .at(op)
        })
        .collect())
}

fn evaluated_on_training_data(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in pipeline.operations() {
        if !matches!(op.kind, OperationKind::Predict | OperationKind::Evaluate) {
            continue;
        }
        let Some(fit) = pipeline
            .pipeline()
            .before(op.id)
            .iter()
            .rev()
            .find(|o| o.kind == OperationKind::Fit)
        else {
            continue;
        };
        let trained_on: BTreeSet<_> = pipeline.data_inputs(fit).collect();
        for input in op.inputs.iter().filter(|i| trained_on.contains(i)) {
            findings.push(
                Finding::new(
                    meta,
                    format!("{} uses '{input}', the data the model was fitted on", op.kind),
                )
                .at(op)
                .with_operation(fit.id)
                .with_artifact(input),
            );
        }
    }
    Ok(findings)
}

/// Resample artifacts an evaluation depends on: consumed directly, or through
/// the result of the `Tune` that consumed them.
fn evaluated_resamples<'a>(
    pipeline: &'a AnnotatedPipeline,
    op: &'a Operation,
) -> BTreeSet<&'a ArtifactId> {
    let mut result: BTreeSet<_> = resamples(pipeline, &op.inputs).collect();
    for input in &op.inputs {
        if let Some(producer) = pipeline.producer_of(input)
            && producer.kind == OperationKind::Tune
        {
            result.extend(resamples(pipeline, &producer.inputs));
        }
    }
    result
}

fn evaluation_reuses_tuning_resamples(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in pipeline.operations() {
        if op.kind != OperationKind::Evaluate {
            continue;
        }
        for resample in evaluated_resamples(pipeline, op) {
            let tune = pipeline
                .pipeline()
                .before(op.id)
                .iter()
                .rev()
                .find(|o| o.kind == OperationKind::Tune && o.consumes(resample));
            let Some(tune) = tune else { continue };
            let resplit = pipeline
                .pipeline()
                .between(tune.id, op.id)
                .iter()
                .any(|o| o.kind == OperationKind::Split);
            if !resplit {
                findings.push(
                    Finding::new(
                        meta,
                        format!("Evaluation reports performance on '{resample}', the resamples used for tuning"),
                    )
                    .at(op)
                    .with_operation(tune.id)
                    .with_artifact(resample),
                );
            }
        }
    }
    Ok(findings)
}

fn unseeded_resampling(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    Ok(pipeline
        .operations()
        .iter()
        .filter(|op| {
            (op.kind == OperationKind::DefineResample || op.attributes.flag(attr::BOOTSTRAP))
                && !pipeline.seed_precedes(op)
        })
        .map(|op| Finding::new(meta, format!("{} runs before any seed is set", op.kind)).at(op))
        .collect())
}

fn is_selection(op: &Operation) -> bool {
    op.kind == OperationKind::Tune || op.attributes.flag(attr::MODEL_SELECTION)
}

/// Each group of consumers that feed one another forms one chain; every chain
/// after the first is reported at its head.
fn shared_resamples(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let lineage = pipeline.lineage();
    let mut findings = Vec::new();

    for artifact in lineage.artifacts() {
        if artifact.provenance != Provenance::Resample {
            continue;
        }

        let mut chains: Vec<Vec<&Operation>> = Vec::new();
        for &id in lineage.consumers(&artifact.id) {
            let Some(op) = pipeline.operation(id).filter(|op| is_selection(op)) else {
                continue;
            };
            let feeds = reach(pipeline, &op.inputs);
            let chain = chains.iter_mut().find(|chain| {
                chain
                    .iter()
                    .any(|member| member.outputs.iter().any(|o| feeds.contains(o)))
            });
            match chain {
                Some(chain) => chain.push(op),
                None => chains.push(vec![op]),
            }
        }

        let Some((first, rest)) = chains.split_first() else {
            continue;
        };
        for chain in rest {
            let head = chain[0];
            findings.push(
                Finding::new(
                    meta,
                    format!(
                        "Resamples '{}' are reused by an independent selection chain",
                        artifact.id
                    ),
                )
                .at(head)
                .with_operation(first[0].id)
                .with_artifact(&artifact.id),
            );
        }
    }
    Ok(findings)
}
