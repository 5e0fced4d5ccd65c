//! Compliance scoring: reduces findings to a 0-100 score and a band.
//!
//! Every finding deducts its severity weight from 100. The sum is clamped
//! once, at the end, so scoring is order-independent and monotone.

use crate::error::ScoringError;
use crate::finding::{Finding, RuleCategory, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum (and starting) score.
pub const MAX_SCORE: u8 = 100;

/// Points deducted per finding of each severity.
///
/// Signed so that a misconfigured table can be represented and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: i64,
    pub major: i64,
    pub minor: i64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 25,
            major: 10,
            minor: 5,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> i64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::Major => self.major,
            Severity::Minor => self.minor,
        }
    }

    fn validate(&self) -> Result<(), ScoringError> {
        for severity in Severity::ALL {
            let weight = self.weight(severity);
            if weight < 0 {
                return Err(ScoringError::InvalidSeverityWeight {
                    severity: severity.to_string(),
                    weight,
                });
            }
        }
        Ok(())
    }
}

/// Score classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    /// Score 100: no findings.
    Perfect,
    /// Score 80-99.
    Good,
    /// Score 60-79.
    Acceptable,
    /// Score below 60.
    NeedsRevision,
}

impl Band {
    /// Classify a score into a band.
    pub fn from_score(score: u8) -> Self {
        match score {
            100.. => Band::Perfect,
            80..=99 => Band::Good,
            60..=79 => Band::Acceptable,
            _ => Band::NeedsRevision,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Perfect => "Perfect",
            Band::Good => "Good",
            Band::Acceptable => "Acceptable",
            Band::NeedsRevision => "NeedsRevision",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A computed score and its band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub value: u8,
    pub band: Band,
}

/// Where the deductions came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// Finding count per severity.
    pub counts: BTreeMap<Severity, usize>,
    /// Points deducted per category, before clamping.
    pub deductions: BTreeMap<RuleCategory, i64>,
    /// Sum of all deductions, before clamping.
    pub total_deduction: i64,
}

/// Applies a validated weight table to findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringEngine {
    weights: SeverityWeights,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
        }
    }
}

impl ScoringEngine {
    /// Fails when any weight is negative.
    pub fn new(weights: SeverityWeights) -> Result<Self, ScoringError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &SeverityWeights {
        &self.weights
    }

    pub fn score(&self, findings: &[Finding]) -> Score {
        let deduction = findings
            .iter()
            .map(|f| self.weights.weight(f.severity))
            .fold(0i64, i64::saturating_add);
        let value = (i64::from(MAX_SCORE) - deduction).clamp(0, i64::from(MAX_SCORE)) as u8;
        Score {
            value,
            band: Band::from_score(value),
        }
    }

    pub fn breakdown(&self, findings: &[Finding]) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown::default();
        for finding in findings {
            let weight = self.weights.weight(finding.severity);
            *breakdown.counts.entry(finding.severity).or_default() += 1;
            let category = breakdown.deductions.entry(finding.category).or_default();
            *category = category.saturating_add(weight);
            breakdown.total_deduction = breakdown.total_deduction.saturating_add(weight);
        }
        breakdown
    }
}
