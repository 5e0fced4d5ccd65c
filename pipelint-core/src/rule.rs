//! Rule interface and the frozen rule catalog.
//!
//! A rule is a pure predicate over an [`AnnotatedPipeline`]. Rules never see
//! each other's output, which is what lets the engine run them in any order
//! or in parallel. The catalog is built once and never mutated: disabling or
//! adding rules derives a new catalog.

use crate::error::{AnalyzerError, RuleError};
use crate::finding::{Finding, RuleCategory, Severity};
use crate::lineage::AnnotatedPipeline;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

/// Static description of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMeta {
    /// Identifier such as `DL-002`.
    pub id: &'static str,
    /// Short title.
    pub title: &'static str,
    pub category: RuleCategory,
    pub severity: Severity,
    /// Bumped whenever the predicate's semantics change.
    pub version: u32,
}

/// The core trait for every compliance rule.
pub trait Rule: Send + Sync {
    fn meta(&self) -> &RuleMeta;

    /// Evaluate the rule. Must be idempotent and free of external state.
    fn evaluate(&self, pipeline: &AnnotatedPipeline) -> Result<Vec<Finding>, RuleError>;

    fn id(&self) -> &'static str {
        self.meta().id
    }
}

/// Signature of a table-driven rule predicate.
pub type Predicate = fn(&RuleMeta, &AnnotatedPipeline) -> Result<Vec<Finding>, RuleError>;

/// A rule defined as metadata plus a predicate function.
#[derive(Debug, Clone, Copy)]
pub struct PredicateRule {
    meta: RuleMeta,
    predicate: Predicate,
}

impl PredicateRule {
    pub const fn new(meta: RuleMeta, predicate: Predicate) -> Self {
        Self { meta, predicate }
    }
}

impl Rule for PredicateRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn evaluate(&self, pipeline: &AnnotatedPipeline) -> Result<Vec<Finding>, RuleError> {
        (self.predicate)(&self.meta, pipeline)
    }
}

static BUILTIN: LazyLock<RuleCatalog> = LazyLock::new(|| {
    let mut rules = BTreeMap::new();
    for rule in crate::rules::builtin_rules() {
        rules.insert(rule.id(), rule);
    }
    RuleCatalog { rules }
});

/// A read-only registry of rules, ordered by rule id.
#[derive(Clone)]
pub struct RuleCatalog {
    rules: BTreeMap<&'static str, Arc<dyn Rule>>,
}

impl RuleCatalog {
    /// The built-in catalog, initialized once per process.
    pub fn builtin() -> &'static RuleCatalog {
        &BUILTIN
    }

    /// Build a catalog from explicit rules. Rule ids must be unique.
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> Result<Self, AnalyzerError> {
        let mut map = BTreeMap::new();
        for rule in rules {
            let id = rule.id();
            if map.insert(id, rule).is_some() {
                return Err(AnalyzerError::Config(format!("duplicate rule id '{id}'")));
            }
        }
        Ok(Self { rules: map })
    }

    /// Derive a catalog with the given rules removed. Ids are checked
    /// against this catalog, so repeating one is harmless.
    pub fn without(&self, ids: &[String]) -> Result<Self, AnalyzerError> {
        let mut rules = self.rules.clone();
        for id in ids {
            if !self.rules.contains_key(id.as_str()) {
                return Err(AnalyzerError::Config(format!("unknown rule id '{id}'")));
            }
            rules.remove(id.as_str());
        }
        Ok(Self { rules })
    }

    /// Derive a catalog with one more rule.
    pub fn with_rule(&self, rule: Arc<dyn Rule>) -> Result<Self, AnalyzerError> {
        let mut rules = self.rules.clone();
        let id = rule.id();
        if rules.insert(id, rule).is_some() {
            return Err(AnalyzerError::Config(format!("duplicate rule id '{id}'")));
        }
        Ok(Self { rules })
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.values()
    }

    pub fn metas(&self) -> impl Iterator<Item = &RuleMeta> {
        self.rules.values().map(|r| r.meta())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.rules.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &RuleMeta, _: &AnnotatedPipeline) -> Result<Vec<Finding>, RuleError> {
        Ok(Vec::new())
    }

    const CUSTOM: RuleMeta = RuleMeta {
        id: "XX-001",
        title: "Custom",
        category: RuleCategory::Workflow,
        severity: Severity::Minor,
        version: 1,
    };

    #[test]
    fn test_builtin_catalog_has_23_rules() {
        let catalog = RuleCatalog::builtin();
        assert_eq!(catalog.len(), 23);
        for category in RuleCategory::ALL {
            assert_eq!(
                catalog.metas().filter(|m| m.category == category).count(),
                5 - usize::from(category == RuleCategory::Workflow) * 2,
                "{category}"
            );
        }
    }

    #[test]
    fn test_builtin_catalog_is_ordered() {
        let ids: Vec<_> = RuleCatalog::builtin().metas().map(|m| m.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.first(), Some(&"DL-001"));
    }

    #[test]
    fn test_without_removes_and_rejects_unknown() {
        let catalog = RuleCatalog::builtin()
            .without(&["RP-002".to_string(), "RP-004".to_string()])
            .unwrap();
        assert_eq!(catalog.len(), 21);
        assert!(catalog.get("RP-002").is_none());
        assert_eq!(RuleCatalog::builtin().len(), 23);

        let err = RuleCatalog::builtin().without(&["ZZ-999".to_string()]);
        assert!(matches!(err, Err(AnalyzerError::Config(_))));
    }

    #[test]
    fn test_without_accepts_repeated_ids() {
        let ids = ["RP-002", "RP-004", "RP-002"].map(String::from);
        let catalog = RuleCatalog::builtin().without(&ids).unwrap();
        assert_eq!(catalog.len(), 21);
        assert!(catalog.get("RP-002").is_none());
    }

    #[test]
    fn test_with_rule_rejects_duplicates() {
        let custom = Arc::new(PredicateRule::new(CUSTOM, noop));
        let catalog = RuleCatalog::builtin().with_rule(custom.clone()).unwrap();
        assert_eq!(catalog.len(), 24);
        assert!(catalog.with_rule(custom).is_err());
    }

    #[test]
    fn test_new_rejects_duplicate_ids() {
        let rule: Arc<dyn Rule> = Arc::new(PredicateRule::new(CUSTOM, noop));
        assert!(RuleCatalog::new(vec![rule.clone()]).is_ok());
        assert!(RuleCatalog::new(vec![rule.clone(), rule]).is_err());
    }
}
