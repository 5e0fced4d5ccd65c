//! Model evaluation rules (ME-001 to ME-005).

use super::{meta, metrics, reach, resamples, rule};
use crate::error::RuleError;
use crate::finding::{Finding, RuleCategory::Evaluation, Severity::Major};
use crate::lineage::AnnotatedPipeline;
use crate::pipeline::{ModelMode, Operation, OperationKind, attr};
use crate::rule::{PredicateRule, RuleMeta};
use std::collections::BTreeSet;

pub(crate) const RULES: &[PredicateRule] = &[
    rule(
        meta("ME-001", "Single balance-insensitive metric", Evaluation, Major),
        single_insensitive_metric,
    ),
    rule(
        meta("ME-002", "Metric does not match model mode", Evaluation, Major),
        metric_mode_mismatch,
    ),
    rule(
        meta("ME-003", "No calibration metric for probabilities", Evaluation, Major),
        missing_calibration,
    ),
    rule(
        meta("ME-004", "Metrics reported without variance", Evaluation, Major),
        missing_variance,
    ),
    rule(
        meta("ME-005", "Models compared on different resamples", Evaluation, Major),
        compared_on_different_resamples,
    ),
];

/// Metrics that stay high when a model ignores the minority class.
const BALANCE_INSENSITIVE: &[&str] = &["accuracy", "error_rate"];

const REGRESSION: &[&str] = &[
    "rmse", "mae", "rsq", "mape", "mse", "huber_loss", "ccc", "rpd", "smape", "msd",
];

const CLASSIFICATION: &[&str] = &[
    "accuracy",
    "roc_auc",
    "pr_auc",
    "f_meas",
    "precision",
    "recall",
    "sens",
    "spec",
    "kap",
    "mcc",
    "bal_accuracy",
    "mn_log_loss",
    "brier_class",
    "j_index",
    "ppv",
    "npv",
    "gain_capture",
];

const CALIBRATION: &[&str] = &[
    "brier_class",
    "brier_score",
    "calibration_slope",
    "cal_slope",
    "ece",
    "expected_calibration_error",
    "hosmer_lemeshow",
];

fn evaluations(pipeline: &AnnotatedPipeline) -> impl Iterator<Item = &Operation> {
    pipeline
        .operations()
        .iter()
        .filter(|op| op.kind == OperationKind::Evaluate)
}

fn single_insensitive_metric(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in evaluations(pipeline) {
        let metrics = metrics(op)?;
        if let [only] = metrics.as_slice()
            && BALANCE_INSENSITIVE.contains(&only.as_str())
            && pipeline.outcome_imbalanced(op)
        {
            findings.push(
                Finding::new(
                    meta,
                    format!("'{only}' is the only metric although the outcome is imbalanced"),
                )
                .at(op),
            );
        }
    }
    Ok(findings)
}

fn metric_mode_mismatch(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in evaluations(pipeline) {
        let foreign: &[&str] = match pipeline.model_mode(op) {
            Some(ModelMode::Classification) => REGRESSION,
            Some(ModelMode::Regression) => CLASSIFICATION,
            None => continue,
        };
        let mismatched: Vec<_> = metrics(op)?
            .into_iter()
            .filter(|m| foreign.contains(&m.as_str()))
            .collect();
        if !mismatched.is_empty() {
            findings.push(
                Finding::new(
                    meta,
                    format!("Metrics {} do not apply to this model mode", mismatched.join(", ")),
                )
                .at(op),
            );
        }
    }
    Ok(findings)
}

fn missing_calibration(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in evaluations(pipeline) {
        if !op.attributes.flag(attr::PROBABILISTIC)
            || pipeline.model_mode(op) != Some(ModelMode::Classification)
        {
            continue;
        }
        if !metrics(op)?.iter().any(|m| CALIBRATION.contains(&m.as_str())) {
            findings.push(
                Finding::new(meta, "Predicted probabilities are never checked for calibration")
                    .at(op),
            );
        }
    }
    Ok(findings)
}

fn missing_variance(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in evaluations(pipeline) {
        if !metrics(op)?.is_empty() && !op.attributes.flag(attr::REPORTS_VARIANCE) {
            findings.push(
                Finding::new(meta, "Metrics are reported as point estimates without variance")
                    .at(op),
            );
        }
    }
    Ok(findings)
}

fn compared_on_different_resamples(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in evaluations(pipeline) {
        if !op.attributes.flag(attr::COMPARES) {
            continue;
        }
        let reached = reach(pipeline, &op.inputs);
        let used: BTreeSet<_> = resamples(pipeline, &reached).collect();
        if used.len() > 1 {
            let names: Vec<_> = used.iter().map(|id| id.as_str()).collect();
            let mut finding = Finding::new(
                meta,
                format!("Compared models were resampled differently ({})", names.join(", ")),
            )
            .at(op);
            for id in used {
                finding = finding.with_artifact(id);
            }
            findings.push(finding);
        }
    }
    Ok(findings)
}
