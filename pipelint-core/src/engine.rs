//! Rule engine: runs every rule of a catalog against one annotated pipeline.
//!
//! Rules are independent, so the engine can run them sequentially or on the
//! tokio blocking pool with the same result. A rule that errors or panics is
//! reported as a [`RuleEvaluationError`] and never aborts the run.

use crate::error::RuleEvaluationError;
use crate::finding::{Finding, sort_findings};
use crate::lineage::AnnotatedPipeline;
use crate::rule::{Rule, RuleCatalog};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Default upper bound on rules evaluated at once by [`RuleEngine::evaluate_parallel`].
pub const DEFAULT_MAX_CONCURRENT_RULES: usize = 4;

/// Findings and diagnostics of one engine run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    /// Deduplicated findings in report order.
    pub findings: Vec<Finding>,
    /// Rules that failed, ordered by rule id.
    pub diagnostics: Vec<RuleEvaluationError>,
}

impl EngineOutput {
    fn record(&mut self, result: Result<Vec<Finding>, RuleEvaluationError>) {
        match result {
            Ok(findings) => self.findings.extend(findings),
            Err(diagnostic) => {
                tracing::warn!(
                    rule = %diagnostic.rule_id,
                    error = %diagnostic.message,
                    "Rule evaluation failed"
                );
                self.diagnostics.push(diagnostic);
            }
        }
    }

    fn finish(mut self) -> Self {
        sort_findings(&mut self.findings);
        self.diagnostics.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        self
    }
}

/// Evaluates a frozen rule catalog.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    catalog: RuleCatalog,
    max_concurrent: usize,
}

impl RuleEngine {
    pub fn new(catalog: RuleCatalog) -> Self {
        Self {
            catalog,
            max_concurrent: DEFAULT_MAX_CONCURRENT_RULES,
        }
    }

    /// Engine over the built-in catalog.
    pub fn builtin() -> Self {
        Self::new(RuleCatalog::builtin().clone())
    }

    /// Clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Run every rule in catalog order on the current thread.
    pub fn evaluate(&self, pipeline: &AnnotatedPipeline) -> EngineOutput {
        let start = Instant::now();
        let mut output = EngineOutput::default();
        for rule in self.catalog.iter() {
            output.record(run_rule(rule.as_ref(), pipeline));
        }
        let output = output.finish();
        tracing::debug!(
            rules = self.catalog.len(),
            findings = output.findings.len(),
            failed = output.diagnostics.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Rules evaluated"
        );
        output
    }

    /// Run every rule on the blocking pool, at most `max_concurrent` at once.
    pub async fn evaluate_parallel(&self, pipeline: Arc<AnnotatedPipeline>) -> EngineOutput {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(self.catalog.len());

        for rule in self.catalog.iter() {
            let id = rule.id();
            let rule = Arc::clone(rule);
            let pipeline = Arc::clone(&pipeline);
            let sem = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return Err(RuleEvaluationError::new(id, e.to_string())),
                };
                match tokio::task::spawn_blocking(move || run_rule(rule.as_ref(), &pipeline)).await
                {
                    Ok(result) => result,
                    Err(e) => Err(RuleEvaluationError::new(id, format!("task failed: {e}"))),
                }
            });
            handles.push((id, handle));
        }

        let mut output = EngineOutput::default();
        for (id, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(RuleEvaluationError::new(id, format!("task failed: {e}"))));
            output.record(result);
        }
        let output = output.finish();
        tracing::debug!(
            rules = self.catalog.len(),
            findings = output.findings.len(),
            failed = output.diagnostics.len(),
            max_concurrent = self.max_concurrent,
            duration_ms = start.elapsed().as_millis() as u64,
            "Rules evaluated in parallel"
        );
        output
    }
}

/// Run one rule with panic isolation.
fn run_rule(rule: &dyn Rule, pipeline: &AnnotatedPipeline) -> Result<Vec<Finding>, RuleEvaluationError> {
    let id = rule.id();
    match catch_unwind(AssertUnwindSafe(|| rule.evaluate(pipeline))) {
        Ok(Ok(findings)) => {
            tracing::debug!(rule = id, findings = findings.len(), "Rule evaluated");
            Ok(findings)
        }
        Ok(Err(e)) => Err(RuleEvaluationError::new(id, e.to_string())),
        Err(payload) => Err(RuleEvaluationError::new(
            id,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
