//! Reproducibility rules (RP-001 to RP-005).
//!
//! The environment rules (RP-002, RP-004, RP-005) only apply when the
//! front-end reports loaded packages; without them there is no environment
//! to pin.

use super::{meta, rule};
use crate::error::RuleError;
use crate::finding::{
    Finding,
    RuleCategory::Reproducibility,
    Severity::{Major, Minor},
};
use crate::lineage::AnnotatedPipeline;
use crate::pipeline::{Operation, OperationKind, attr, role};
use crate::rule::{PredicateRule, RuleMeta};

pub(crate) const RULES: &[PredicateRule] = &[
    rule(
        meta("RP-001", "Randomized step without a seed", Reproducibility, Major),
        unseeded_randomness,
    ),
    rule(
        meta("RP-002", "No namespace conflict preference", Reproducibility, Minor),
        missing_namespace_preference,
    ),
    rule(
        meta("RP-003", "Hard-coded absolute path", Reproducibility, Minor),
        absolute_path,
    ),
    rule(
        meta("RP-004", "No dependency lock file", Reproducibility, Minor),
        missing_lockfile,
    ),
    rule(
        meta("RP-005", "Session information not captured", Reproducibility, Minor),
        missing_session_capture,
    ),
];

/// Resampling definitions and bootstraps are covered by RS-004.
fn is_randomized(op: &Operation) -> bool {
    if op.kind == OperationKind::DefineResample || op.attributes.flag(attr::BOOTSTRAP) {
        return false;
    }
    matches!(op.kind, OperationKind::Split | OperationKind::Tune)
        || op.attributes.flag(attr::RANDOMIZED)
}

fn unseeded_randomness(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    Ok(pipeline
        .operations()
        .iter()
        .filter(|op| is_randomized(op) && !pipeline.seed_precedes(op))
        .map(|op| {
            Finding::new(meta, format!("{} draws random numbers before any seed is set", op.kind))
                .at(op)
        })
        .collect())
}

fn declares_packages(pipeline: &AnnotatedPipeline) -> bool {
    !pipeline.pipeline().metadata().packages.is_empty()
}

fn missing_namespace_preference(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    if !declares_packages(pipeline)
        || pipeline
            .operations()
            .iter()
            .any(|op| op.has_role(role::NAMESPACE_PREFERENCE))
    {
        return Ok(Vec::new());
    }
    Ok(vec![Finding::new(
        meta,
        "Packages are loaded without declaring a preference for conflicting function names",
    )])
}

/// Absolute, home-relative or drive-letter paths.
fn is_absolute_literal(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('~')
        || path.starts_with('\\')
        || (bytes.len() >= 3
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && matches!(bytes[2], b'/' | b'\\'))
}

fn absolute_path(meta: &RuleMeta, pipeline: &AnnotatedPipeline) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for op in pipeline.operations() {
        if !op.attributes.contains(attr::IO) {
            continue;
        }
        let Some(value) = op.attributes.get(attr::PATH) else {
            continue;
        };
        let path = value.as_str().ok_or_else(|| RuleError::MalformedAttribute {
            operation: op.id,
            key: attr::PATH.to_string(),
            message: "expected a string".to_string(),
        })?;
        if is_absolute_literal(path) {
            findings.push(
                Finding::new(meta, format!("'{path}' only exists on the author's machine")).at(op),
            );
        }
    }
    Ok(findings)
}

fn missing_lockfile(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    if !declares_packages(pipeline) || pipeline.pipeline().metadata().lockfile.is_some() {
        return Ok(Vec::new());
    }
    Ok(vec![Finding::new(
        meta,
        "Package versions are not pinned by a lock file",
    )])
}

fn missing_session_capture(
    meta: &RuleMeta,
    pipeline: &AnnotatedPipeline,
) -> Result<Vec<Finding>, RuleError> {
    let captured = pipeline
        .operations()
        .last()
        .is_some_and(|op| op.has_role(role::SESSION_CAPTURE));
    if !declares_packages(pipeline) || captured {
        return Ok(Vec::new());
    }
    Ok(vec![Finding::new(
        meta,
        "The pipeline does not end by recording session information",
    )])
}
