//! Data leakage rules (DL-001 to DL-005).
//!
//! Preprocessing and feature selection must only ever see training rows.

use super::{meta, provenance, rule};
use crate::error::RuleError;
use crate::finding::{Finding, RuleCategory::DataLeakage, Severity::Critical};
use crate::lineage::{AnnotatedPipeline, Provenance};
use crate::pipeline::{ArtifactId, Operation, OperationKind, attr};
use crate::rule::{PredicateRule, RuleMeta};

pub(crate) const RULES: &[PredicateRule] = &[
    rule(
        meta("DL-001", "Preprocessor defined on pre-split data", DataLeakage, Critical),
        preprocessor_defined_on_full,
    ),
    rule(
        meta("DL-002", "Preprocessor estimated on pre-split data", DataLeakage, Critical),
        preprocessor_prepped_on_full,
    ),
    rule(
        meta("DL-003", "Target encoding outside resampling", DataLeakage, Critical),
        target_encoding_outside_resampling,
    ),
    rule(
        meta("DL-004", "Feature selection on test data", DataLeakage, Critical),
        feature_selection_on_test,
    ),
    rule(
        meta("DL-005", "Preprocessing on test data", DataLeakage, Critical),
        preprocessing_on_test,
    ),
];

/// Inputs a preprocessing step learns from: its data inputs, or every input
/// when it only takes a recipe.
fn estimation_inputs<'a>(pipeline: &'a AnnotatedPipeline, op: &'a Operation) -> Vec<&'a ArtifactId> {
    let data: Vec<_> = pipeline.data_inputs(op).collect();
    if data.is_empty() {
        op.inputs.iter().collect()
    } else {
        data
    }
}

/// One finding per operation of the given kinds with an estimation input
/// resolving to `target`.
fn estimated_on(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
    kinds: &[OperationKind],
    target: Provenance,
    message: &str,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in pipeline.operations().iter().filter(|o| kinds.contains(&o.kind)) {
        let mut finding: Option<Finding> = None;
        for input in estimation_inputs(pipeline, op) {
            if *provenance(pipeline, input)? == target {
                let current = finding.unwrap_or_else(|| {
                    Finding::new(meta, format!("{} {message}", op.kind)).at(op)
                });
                finding = Some(current.with_artifact(input));
            }
        }
        findings.extend(finding);
    }
    Ok(findings)
}

fn preprocessor_defined_on_full(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    estimated_on(
        meta,
        pipeline,
        &[OperationKind::DefinePreprocessor],
        Provenance::Full,
        "is defined on data that has not been split",
    )
}

fn preprocessor_prepped_on_full(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    estimated_on(
        meta,
        pipeline,
        &[OperationKind::PrepPreprocessor],
        Provenance::Full,
        "estimates its parameters on data that has not been split",
    )
}

fn preprocessing_on_test(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    estimated_on(
        meta,
        pipeline,
        &[OperationKind::DefinePreprocessor, OperationKind::PrepPreprocessor],
        Provenance::Test,
        "learns from the test set",
    )
}

/// A target-encoded recipe must be re-estimated inside every resample, so it
/// has to reach a `Tune` or an operation that consumes resamples.
fn target_encoding_outside_resampling(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let lineage = pipeline.lineage();
    let mut findings = Vec::new();

    for op in pipeline.operations() {
        if op.kind != OperationKind::DefinePreprocessor
            || !op.attributes.flag(attr::TARGET_ENCODING)
        {
            continue;
        }

        let scoped = op.outputs.iter().any(|output| {
            let mut reached = lineage.downstream(output);
            reached.insert(output.clone());
            reached.iter().any(|artifact| {
                lineage.consumers(artifact).iter().any(|&id| {
                    pipeline.operation(id).is_some_and(|consumer| {
                        consumer.kind == OperationKind::Tune
                            || super::resamples(pipeline, &consumer.inputs).next().is_some()
                    })
                })
            })
        });

        if !scoped {
            let mut finding = Finding::new(
                meta,
                "Target encoding is estimated once instead of inside each resample",
            )
            .at(op);
            for output in &op.outputs {
                finding = finding.with_artifact(output);
            }
            findings.push(finding);
        }
    }
    Ok(findings)
}

fn feature_selection_on_test(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in pipeline.operations() {
        if !op.attributes.flag(attr::FEATURE_SELECTION) {
            continue;
        }
        for input in pipeline.data_inputs(op) {
            if *provenance(pipeline, input)? == Provenance::Test {
                findings.push(
                    Finding::new(meta, format!("Features are selected using test artifact '{input}'"))
                        .at(op)
                        .with_artifact(input),
                );
            }
        }
    }
    Ok(findings)
}
