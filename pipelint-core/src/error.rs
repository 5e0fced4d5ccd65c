//! Error types for the analyzer crate.

use crate::pipeline::{ArtifactId, OperationId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level analyzer error. Every variant is fatal for the run it occurs in.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("lineage error: {0}")]
    Lineage(#[from] LineageError),
    #[error("scoring error: {0}")]
    Scoring(#[from] ScoringError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Malformed pipeline models. Raised before any rule runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineageError {
    #[error("{operation} references artifact '{artifact}' that is never produced upstream")]
    DanglingReference {
        operation: OperationId,
        artifact: ArtifactId,
    },
    #[error("artifact '{artifact}' produced by {operation} already exists")]
    DuplicateArtifact {
        operation: OperationId,
        artifact: ArtifactId,
    },
    #[error("source artifact '{0}' is declared more than once")]
    DuplicateSource(ArtifactId),
}

/// Scoring engine misconfiguration. Only raised at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("invalid {severity} weight {weight}: deductions must be non-negative")]
    InvalidSeverityWeight { severity: String, weight: i64 },
}

/// Error returned by a rule predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("artifact '{0}' is missing from lineage")]
    MissingArtifact(ArtifactId),
    #[error("attribute '{key}' on {operation} has an unexpected shape: {message}")]
    MalformedAttribute {
        operation: OperationId,
        key: String,
        message: String,
    },
    #[error("{0}")]
    Other(String),
}

/// A rule that failed or panicked during a run. Recoverable: collected as a
/// report diagnostic while the remaining rules keep running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("rule {rule_id} failed: {message}")]
pub struct RuleEvaluationError {
    pub rule_id: String,
    pub message: String,
}

impl RuleEvaluationError {
    pub fn new(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }
}
