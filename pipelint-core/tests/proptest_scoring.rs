//! Property-based tests for scoring and finding order using proptest.

use proptest::prelude::*;

use pipelint_core::finding::sort_findings;
use pipelint_core::scoring::MAX_SCORE;
use pipelint_core::{
    ArtifactId, Band, Finding, OperationId, RuleCatalog, RuleMeta, ScoringEngine, SeverityWeights,
};

fn metas() -> Vec<RuleMeta> {
    RuleCatalog::builtin().metas().copied().collect()
}

/// Findings drawn from the built-in catalog, optionally anchored to an
/// operation and carrying an artifact.
fn findings_strategy() -> impl Strategy<Value = Vec<Finding>> {
    let count = metas().len();
    prop::collection::vec(
        (0..count, prop::option::of(0u32..20), prop::option::of("[a-z]{1,6}")),
        0..40,
    )
    .prop_map(|draws| {
        let metas = metas();
        draws
            .into_iter()
            .map(|(idx, op, artifact)| {
                let mut finding = Finding::new(&metas[idx], "property finding");
                if let Some(op) = op {
                    finding = finding.with_operation(OperationId(op));
                }
                if let Some(artifact) = artifact {
                    finding = finding.with_artifact(&ArtifactId::new(artifact));
                }
                finding
            })
            .collect()
    })
}

fn weights_strategy() -> impl Strategy<Value = SeverityWeights> {
    (0i64..60, 0i64..60, 0i64..60).prop_map(|(critical, major, minor)| SeverityWeights {
        critical,
        major,
        minor,
    })
}

// --- Score properties ---

proptest! {
    #[test]
    fn score_is_bounded_and_banded(
        findings in findings_strategy(),
        weights in weights_strategy(),
    ) {
        let score = ScoringEngine::new(weights).unwrap().score(&findings);
        prop_assert!(score.value <= MAX_SCORE);
        prop_assert_eq!(score.band, Band::from_score(score.value));
    }

    #[test]
    fn score_is_order_independent(
        findings in findings_strategy(),
        weights in weights_strategy(),
    ) {
        let engine = ScoringEngine::new(weights).unwrap();
        let mut reversed = findings.clone();
        reversed.reverse();
        prop_assert_eq!(engine.score(&findings), engine.score(&reversed));
    }

    #[test]
    fn adding_a_finding_never_raises_the_score(
        findings in findings_strategy(),
        extra in findings_strategy(),
        weights in weights_strategy(),
    ) {
        let engine = ScoringEngine::new(weights).unwrap();
        let mut more = findings.clone();
        more.extend(extra);
        prop_assert!(engine.score(&more).value <= engine.score(&findings).value);
    }

    #[test]
    fn default_score_matches_weighted_sum(findings in findings_strategy()) {
        let engine = ScoringEngine::default();
        let deduction: i64 = findings
            .iter()
            .map(|f| engine.weights().weight(f.severity))
            .sum();
        let expected = (100 - deduction).max(0);
        prop_assert_eq!(i64::from(engine.score(&findings).value), expected);
        prop_assert_eq!(engine.breakdown(&findings).total_deduction, deduction);
    }

    #[test]
    fn negative_weights_are_rejected(weight in -1000i64..0) {
        let weights = SeverityWeights { major: weight, ..SeverityWeights::default() };
        prop_assert!(ScoringEngine::new(weights).is_err());
    }
}

// --- Finding order properties ---

proptest! {
    #[test]
    fn sorting_is_idempotent(findings in findings_strategy()) {
        let mut once = findings;
        sort_findings(&mut once);
        let mut twice = once.clone();
        sort_findings(&mut twice);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn sorting_ignores_input_order(findings in findings_strategy()) {
        let mut forward = findings.clone();
        let mut backward = findings;
        backward.reverse();
        sort_findings(&mut forward);
        sort_findings(&mut backward);
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn sorted_findings_have_unique_fingerprints(findings in findings_strategy()) {
        let mut sorted = findings;
        sort_findings(&mut sorted);
        let mut fingerprints: Vec<_> = sorted.iter().map(|f| f.fingerprint.clone()).collect();
        fingerprints.sort();
        fingerprints.dedup();
        prop_assert_eq!(fingerprints.len(), sorted.len());
    }
}
