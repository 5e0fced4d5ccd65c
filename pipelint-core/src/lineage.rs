//! Data lineage: the artifact DAG derived from a pipeline's operations.
//!
//! Every artifact is created exactly once, by a declared source or by one
//! operation, and may only be consumed after it exists. That makes the graph
//! acyclic by construction. Provenance is computed once here so that every
//! rule queries the same ground truth.

use crate::error::LineageError;
use crate::pipeline::{ArtifactId, ModelMode, Operation, OperationId, OperationKind, Pipeline};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Where an artifact's rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Pre-split data.
    Full,
    Train,
    Validation,
    Test,
    /// A resampling specification (folds, bootstraps).
    Resample,
    /// Inherited from the named parent artifact.
    Derived(ArtifactId),
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Full => write!(f, "Full"),
            Provenance::Train => write!(f, "Train"),
            Provenance::Validation => write!(f, "Validation"),
            Provenance::Test => write!(f, "Test"),
            Provenance::Resample => write!(f, "Resample"),
            Provenance::Derived(parent) => write!(f, "Derived({parent})"),
        }
    }
}

/// A named data value flowing between operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: ArtifactId,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<ArtifactId>,
    /// `None` for declared sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<OperationId>,
    /// Rows of data, as opposed to recipes, resamples, tuning results or models.
    pub data_bearing: bool,
}

/// The artifact DAG of one pipeline.
#[derive(Debug, Clone, Default)]
pub struct Lineage {
    graph: DiGraph<ArtifactId, OperationId>,
    nodes: HashMap<ArtifactId, NodeIndex>,
    artifacts: BTreeMap<ArtifactId, Artifact>,
    consumers: BTreeMap<ArtifactId, Vec<OperationId>>,
}

impl Lineage {
    /// Derive the artifact graph for a pipeline.
    ///
    /// Fails with [`LineageError::DanglingReference`] when an operation
    /// consumes an artifact that no earlier source or operation produced.
    pub fn track(pipeline: &Pipeline) -> Result<Self, LineageError> {
        let mut lineage = Self::default();

        for source in pipeline.sources() {
            if lineage.artifacts.contains_key(source) {
                return Err(LineageError::DuplicateSource(source.clone()));
            }
            lineage.insert(Artifact {
                id: source.clone(),
                provenance: Provenance::Full,
                derived_from: None,
                producer: None,
                data_bearing: true,
            });
        }

        for op in pipeline.operations() {
            for input in &op.inputs {
                if !lineage.artifacts.contains_key(input) {
                    return Err(LineageError::DanglingReference {
                        operation: op.id,
                        artifact: input.clone(),
                    });
                }
                let consumers = lineage.consumers.entry(input.clone()).or_default();
                if consumers.last() != Some(&op.id) {
                    consumers.push(op.id);
                }
            }

            let parent = lineage.parent_of(op);
            let inherits_full = op.kind.is_preprocessing()
                && parent
                    .and_then(|p| lineage.resolve(p))
                    .is_some_and(|p| *p == Provenance::Full);

            let count = op.outputs.len();
            for (slot, output) in op.outputs.iter().enumerate() {
                if lineage.artifacts.contains_key(output) {
                    return Err(LineageError::DuplicateArtifact {
                        operation: op.id,
                        artifact: output.clone(),
                    });
                }

                let provenance = match op.kind {
                    OperationKind::Split => split_slot(slot, count),
                    OperationKind::DefineResample => Provenance::Resample,
                    _ if inherits_full => Provenance::Full,
                    _ => match parent {
                        Some(parent) => Provenance::Derived(parent.clone()),
                        None => Provenance::Full,
                    },
                };

                lineage.insert(Artifact {
                    id: output.clone(),
                    provenance,
                    derived_from: parent.cloned(),
                    producer: Some(op.id),
                    data_bearing: is_data_producer(op),
                });

                let to = lineage.nodes[output];
                for input in &op.inputs {
                    let from = lineage.nodes[input];
                    lineage.graph.add_edge(from, to, op.id);
                }
            }
        }

        tracing::debug!(
            artifacts = lineage.artifacts.len(),
            edges = lineage.graph.edge_count(),
            "Lineage tracked"
        );
        Ok(lineage)
    }

    /// The input an operation's outputs inherit provenance from. Transforms
    /// and predictions take their rows from the first data-bearing input, so
    /// a recipe or model listed first does not hide test data.
    fn parent_of<'a>(&self, op: &'a Operation) -> Option<&'a ArtifactId> {
        match op.kind {
            OperationKind::ApplyPreprocessor | OperationKind::Predict => op
                .inputs
                .iter()
                .find(|id| self.artifacts.get(*id).is_some_and(|a| a.data_bearing))
                .or_else(|| op.primary_input()),
            _ => op.primary_input(),
        }
    }

    fn insert(&mut self, artifact: Artifact) {
        let idx = self.graph.add_node(artifact.id.clone());
        self.nodes.insert(artifact.id.clone(), idx);
        self.artifacts.insert(artifact.id.clone(), artifact);
    }

    pub fn artifact(&self, id: &ArtifactId) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    /// All artifacts, ordered by id.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Follow `Derived` links to the nearest non-derived provenance.
    pub fn resolve(&self, id: &ArtifactId) -> Option<&Provenance> {
        let mut current = self.artifacts.get(id)?;
        // Parents always exist before children, so the walk is bounded.
        for _ in 0..=self.artifacts.len() {
            match &current.provenance {
                Provenance::Derived(parent) => current = self.artifacts.get(parent)?,
                other => return Some(other),
            }
        }
        None
    }

    pub fn producer(&self, id: &ArtifactId) -> Option<OperationId> {
        self.artifacts.get(id).and_then(|a| a.producer)
    }

    /// Operations consuming the artifact, in sequence order.
    pub fn consumers(&self, id: &ArtifactId) -> &[OperationId] {
        self.consumers.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every artifact that fed into `id` through any operation input.
    pub fn upstream(&self, id: &ArtifactId) -> BTreeSet<ArtifactId> {
        let Some(&start) = self.nodes.get(id) else {
            return BTreeSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut result = BTreeSet::new();
        while let Some(node) = dfs.next(reversed) {
            if node != start {
                result.insert(self.graph[node].clone());
            }
        }
        result
    }

    /// Every artifact built, directly or transitively, from `id`.
    pub fn downstream(&self, id: &ArtifactId) -> BTreeSet<ArtifactId> {
        let Some(&start) = self.nodes.get(id) else {
            return BTreeSet::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut result = BTreeSet::new();
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                result.insert(self.graph[node].clone());
            }
        }
        result
    }
}

/// Split outputs: first slot is training data, last is test data, anything
/// in between is validation data.
fn split_slot(slot: usize, count: usize) -> Provenance {
    if slot == 0 {
        Provenance::Train
    } else if slot + 1 == count {
        Provenance::Test
    } else {
        Provenance::Validation
    }
}

fn is_data_producer(op: &Operation) -> bool {
    match op.kind {
        OperationKind::Split | OperationKind::ApplyPreprocessor | OperationKind::Predict => true,
        OperationKind::Other => op.role().is_none(),
        _ => false,
    }
}

/// A pipeline together with its lineage: the immutable input every rule reads.
#[derive(Debug, Clone)]
pub struct AnnotatedPipeline {
    pipeline: Pipeline,
    lineage: Lineage,
}

impl AnnotatedPipeline {
    pub fn new(pipeline: Pipeline) -> Result<Self, LineageError> {
        let lineage = Lineage::track(&pipeline)?;
        Ok(Self { pipeline, lineage })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn operations(&self) -> &[Operation] {
        self.pipeline.operations()
    }

    pub fn operation(&self, id: OperationId) -> Option<&Operation> {
        self.pipeline.operation(id)
    }

    pub fn resolve(&self, id: &ArtifactId) -> Option<&Provenance> {
        self.lineage.resolve(id)
    }

    pub fn is_data(&self, id: &ArtifactId) -> bool {
        self.lineage.artifact(id).is_some_and(|a| a.data_bearing)
    }

    /// Inputs of `op` that carry rows of data.
    pub fn data_inputs<'a>(&'a self, op: &'a Operation) -> impl Iterator<Item = &'a ArtifactId> {
        op.inputs.iter().filter(|id| self.is_data(id))
    }

    /// The operation that produced an artifact, if any.
    pub fn producer_of(&self, id: &ArtifactId) -> Option<&Operation> {
        self.lineage
            .producer(id)
            .and_then(|op| self.pipeline.operation(op))
    }

    /// Operation attribute first, pipeline metadata as the fallback.
    pub fn outcome_imbalanced(&self, op: &Operation) -> bool {
        op.attributes
            .bool(crate::pipeline::attr::OUTCOME_IMBALANCED)
            .unwrap_or(self.pipeline.metadata().outcome_imbalanced)
    }

    /// Operation attribute first, pipeline metadata as the fallback.
    pub fn model_mode(&self, op: &Operation) -> Option<ModelMode> {
        op.attributes
            .str(crate::pipeline::attr::MODEL_MODE)
            .and_then(ModelMode::parse)
            .or(self.pipeline.metadata().model_mode)
    }

    /// The operation is seeded itself or a `SetSeed` runs before it.
    pub fn seed_precedes(&self, op: &Operation) -> bool {
        op.is_seeded()
            || self
                .pipeline
                .before(op.id)
                .iter()
                .any(|o| o.kind == OperationKind::SetSeed)
    }
}
