//! Analyzer: the end-to-end run: lineage, rules, scoring, report.

use crate::config::AnalyzerConfig;
use crate::engine::{EngineOutput, RuleEngine};
use crate::error::AnalyzerError;
use crate::lineage::AnnotatedPipeline;
use crate::pipeline::Pipeline;
use crate::report::{ComplianceReport, ReportRenderer};
use crate::rule::RuleCatalog;
use crate::scoring::{ScoringEngine, SeverityWeights};
use std::sync::Arc;

/// Runs the full analysis for one pipeline at a time. Holds no per-run
/// state, so one instance can serve any number of runs.
#[derive(Debug, Clone)]
pub struct Analyzer {
    engine: RuleEngine,
    scoring: ScoringEngine,
    parallel: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            engine: RuleEngine::builtin(),
            scoring: ScoringEngine::default(),
            parallel: false,
        }
    }
}

impl Analyzer {
    pub fn new(engine: RuleEngine, scoring: ScoringEngine) -> Self {
        Self {
            engine,
            scoring,
            parallel: false,
        }
    }

    /// Build an analyzer from configuration. Fails on negative weights or
    /// unknown disabled rule ids.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let catalog = RuleCatalog::builtin().without(&config.engine.disabled_rules)?;
        let engine = RuleEngine::new(catalog).with_max_concurrent(config.engine.max_concurrent_rules);
        let scoring = ScoringEngine::new(config.scoring)?;
        Ok(Self {
            engine,
            scoring,
            parallel: config.engine.parallel,
        })
    }

    pub fn with_weights(mut self, weights: SeverityWeights) -> Result<Self, AnalyzerError> {
        self.scoring = ScoringEngine::new(weights)?;
        Ok(self)
    }

    pub fn catalog(&self) -> &RuleCatalog {
        self.engine.catalog()
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    /// Whether the configuration asked for parallel rule evaluation.
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn renderer(&self) -> ReportRenderer<'_> {
        ReportRenderer::new(self.catalog(), self.scoring)
    }

    /// Analyze a pipeline on the current thread.
    pub fn analyze(&self, pipeline: Pipeline) -> Result<ComplianceReport, AnalyzerError> {
        let annotated = AnnotatedPipeline::new(pipeline)?;
        let output = self.engine.evaluate(&annotated);
        Ok(self.finish(&annotated, output))
    }

    /// Analyze a pipeline, evaluating rules in parallel.
    pub async fn analyze_parallel(
        &self,
        pipeline: Pipeline,
    ) -> Result<ComplianceReport, AnalyzerError> {
        let annotated = Arc::new(AnnotatedPipeline::new(pipeline)?);
        let output = self.engine.evaluate_parallel(Arc::clone(&annotated)).await;
        Ok(self.finish(&annotated, output))
    }

    /// Sequential or parallel, as configured.
    pub async fn run(&self, pipeline: Pipeline) -> Result<ComplianceReport, AnalyzerError> {
        if self.parallel {
            self.analyze_parallel(pipeline).await
        } else {
            self.analyze(pipeline)
        }
    }

    fn finish(&self, annotated: &AnnotatedPipeline, output: EngineOutput) -> ComplianceReport {
        let score = self.scoring.score(&output.findings);
        tracing::info!(
            pipeline = annotated.pipeline().metadata().name.as_deref().unwrap_or("<unnamed>"),
            operations = annotated.operations().len(),
            findings = output.findings.len(),
            failed_rules = output.diagnostics.len(),
            score = score.value,
            band = %score.band,
            "Analysis complete"
        );
        ComplianceReport::new(output.findings, score, output.diagnostics)
    }
}
