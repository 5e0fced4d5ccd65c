//! Finding schema: one detected rule violation.
//!
//! Findings carry no timestamps or random ids: the same pipeline always
//! yields byte-identical findings, and the fingerprint is a content hash.

use crate::pipeline::{ArtifactId, Operation, OperationId, SourceLocation};
use crate::rule::RuleMeta;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One instance of a rule match against a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Rule identifier (e.g., "DL-002").
    pub rule_id: String,
    pub severity: Severity,
    pub category: RuleCategory,
    /// What matched, in one sentence.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Operations and artifacts that triggered the match.
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    /// Anchoring operation. `None` for pipeline-level findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationId>,
    /// SHA-256 over rule id, anchor and evidence, for deduplication.
    pub fingerprint: String,
}

impl Finding {
    /// Create a pipeline-level finding for a rule.
    pub fn new(meta: &RuleMeta, message: impl Into<String>) -> Self {
        let mut finding = Self {
            rule_id: meta.id.to_string(),
            severity: meta.severity,
            category: meta.category,
            message: message.into(),
            location: None,
            evidence: Vec::new(),
            operation: None,
            fingerprint: String::new(),
        };
        finding.rehash();
        finding
    }

    /// Anchor the finding at an operation: its id, location and evidence.
    pub fn at(mut self, op: &Operation) -> Self {
        self.operation = Some(op.id);
        self.location = op.location.clone();
        self.evidence.push(Evidence::Operation(op.id));
        self.rehash();
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        if !self.evidence.contains(&evidence) {
            self.evidence.push(evidence);
            self.rehash();
        }
        self
    }

    pub fn with_operation(self, op: OperationId) -> Self {
        self.with_evidence(Evidence::Operation(op))
    }

    pub fn with_artifact(self, artifact: &ArtifactId) -> Self {
        self.with_evidence(Evidence::Artifact(artifact.clone()))
    }

    /// Check if this finding is a duplicate of another (by fingerprint).
    pub fn is_duplicate_of(&self, other: &Finding) -> bool {
        self.fingerprint == other.fingerprint
    }

    fn rehash(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(self.rule_id.as_bytes());
        if let Some(op) = self.operation {
            hasher.update(b"|");
            hasher.update(op.to_string().as_bytes());
        }
        for evidence in &self.evidence {
            hasher.update(b"|");
            hasher.update(evidence.to_string().as_bytes());
        }
        self.fingerprint = format!("{:x}", hasher.finalize());
    }

    fn sort_key(&self) -> (bool, Option<OperationId>, &str, &[Evidence], &str) {
        (
            self.operation.is_none(),
            self.operation,
            &self.rule_id,
            &self.evidence,
            &self.message,
        )
    }
}

/// Put findings into report order: by operation sequence index (pipeline-level
/// findings last), then rule id, and drop exact duplicates.
pub fn sort_findings(findings: &mut Vec<Finding>) {
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    findings.dedup_by(|a, b| a.is_duplicate_of(b));
}

/// Severity of a rule, and of every finding it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Critical, Severity::Major, Severity::Minor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Major => "Major",
            Severity::Minor => "Minor",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleCategory {
    DataLeakage,
    Resampling,
    Workflow,
    Evaluation,
    Reproducibility,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 5] = [
        RuleCategory::DataLeakage,
        RuleCategory::Resampling,
        RuleCategory::Workflow,
        RuleCategory::Evaluation,
        RuleCategory::Reproducibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::DataLeakage => "DataLeakage",
            RuleCategory::Resampling => "Resampling",
            RuleCategory::Workflow => "Workflow",
            RuleCategory::Evaluation => "Evaluation",
            RuleCategory::Reproducibility => "Reproducibility",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            RuleCategory::DataLeakage => "Data leakage",
            RuleCategory::Resampling => "Resampling",
            RuleCategory::Workflow => "Workflow",
            RuleCategory::Evaluation => "Evaluation",
            RuleCategory::Reproducibility => "Reproducibility",
        }
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline element that took part in a match.
///
/// Serialized as `"op#3"` or `"artifact:train"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Evidence {
    Operation(OperationId),
    Artifact(ArtifactId),
}

impl std::fmt::Display for Evidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Evidence::Operation(op) => write!(f, "{op}"),
            Evidence::Artifact(id) => write!(f, "artifact:{id}"),
        }
    }
}

impl From<Evidence> for String {
    fn from(evidence: Evidence) -> Self {
        evidence.to_string()
    }
}

impl TryFrom<String> for Evidence {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(idx) = value.strip_prefix("op#") {
            let idx = idx
                .parse::<u32>()
                .map_err(|e| format!("invalid operation evidence '{value}': {e}"))?;
            return Ok(Evidence::Operation(OperationId(idx)));
        }
        if let Some(id) = value.strip_prefix("artifact:") {
            return Ok(Evidence::Artifact(ArtifactId::from(id)));
        }
        Err(format!("unrecognized evidence '{value}'"))
    }
}
