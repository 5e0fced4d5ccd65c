//! Pipelint Core: workflow compliance analysis for modeling pipelines.
//!
//! Takes a pre-parsed pipeline (ordered operations with artifact references),
//! derives its data lineage, runs a catalog of anti-pattern rules against it
//! and reduces the findings to a compliance score:
//!
//! - **Pipeline model:** [`Pipeline`], [`Operation`] and the JSON wire format
//! - **Lineage:** the artifact DAG with `Full`/`Train`/`Test` provenance
//! - **Rules:** 23 built-in rules across data leakage, resampling, workflow,
//!   evaluation and reproducibility, held in a frozen [`RuleCatalog`]
//! - **Engine:** sequential or parallel evaluation with per-rule isolation
//! - **Scoring and reports:** weighted score, band, JSON/SARIF/Markdown output

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod finding;
pub mod lineage;
pub mod pipeline;
pub mod report;
pub mod rule;
pub mod rules;
pub mod scoring;

// Re-exports for convenience
pub use analyzer::Analyzer;
pub use config::{AnalyzerConfig, load_config, load_config_with};
pub use engine::{EngineOutput, RuleEngine};
pub use error::{AnalyzerError, LineageError, RuleError, RuleEvaluationError, ScoringError};
pub use finding::{Evidence, Finding, RuleCategory, Severity};
pub use lineage::{AnnotatedPipeline, Artifact, Lineage, Provenance};
pub use pipeline::{
    ArtifactId, Attributes, ModelMode, Operation, OperationId, OperationKind, Pipeline,
    PipelineMetadata, SourceLocation,
};
pub use report::{ComplianceReport, ReportFormat, ReportRenderer};
pub use rule::{PredicateRule, Rule, RuleCatalog, RuleMeta};
pub use scoring::{Band, Score, ScoringEngine, SeverityWeights};
