//! Pipeline Model: the ordered operations of a modeling pipeline and the
//! artifact references flowing between them.
//!
//! A [`Pipeline`] is immutable once built. Operation ids are assigned from
//! position, so the sequence index is the only ordering that rules rely on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Attribute keys recognized by the built-in rule catalog.
pub mod attr {
    pub const STRATIFIED: &str = "stratified";
    pub const OUTCOME_IMBALANCED: &str = "outcomeImbalanced";
    pub const SEEDED: &str = "seeded";
    pub const RANDOMIZED: &str = "randomized";
    pub const BOOTSTRAP: &str = "bootstrap";
    pub const TARGET_ENCODING: &str = "targetEncoding";
    pub const FEATURE_SELECTION: &str = "featureSelection";
    pub const MODEL_SELECTION: &str = "modelSelection";
    pub const MODEL_MODE: &str = "modelMode";
    pub const METRICS: &str = "metrics";
    pub const PROBABILISTIC: &str = "probabilistic";
    pub const REPORTS_VARIANCE: &str = "reportsVariance";
    pub const COMPARES: &str = "compares";
    pub const IO: &str = "io";
    pub const PATH: &str = "path";
    pub const PARAMS: &str = "params";
    pub const ROLE: &str = "role";
}

/// Values of the `role` attribute on `Other` operations.
pub mod role {
    pub const WORKFLOW: &str = "workflow";
    pub const NAMESPACE_PREFERENCE: &str = "namespacePreference";
    pub const SESSION_CAPTURE: &str = "sessionCapture";
}

/// Sequence index of an operation within its pipeline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OperationId(pub u32);

impl OperationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Stable identifier of a data artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for ArtifactId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Closed set of pipeline operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Split,
    DefinePreprocessor,
    PrepPreprocessor,
    ApplyPreprocessor,
    DefineResample,
    Tune,
    SelectBest,
    FinalizeWorkflow,
    Fit,
    Predict,
    Evaluate,
    SetSeed,
    Other,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Split => "Split",
            OperationKind::DefinePreprocessor => "DefinePreprocessor",
            OperationKind::PrepPreprocessor => "PrepPreprocessor",
            OperationKind::ApplyPreprocessor => "ApplyPreprocessor",
            OperationKind::DefineResample => "DefineResample",
            OperationKind::Tune => "Tune",
            OperationKind::SelectBest => "SelectBest",
            OperationKind::FinalizeWorkflow => "FinalizeWorkflow",
            OperationKind::Fit => "Fit",
            OperationKind::Predict => "Predict",
            OperationKind::Evaluate => "Evaluate",
            OperationKind::SetSeed => "SetSeed",
            OperationKind::Other => "Other",
        }
    }

    /// Preprocessor definition or estimation.
    pub fn is_preprocessing(&self) -> bool {
        matches!(
            self,
            OperationKind::DefinePreprocessor | OperationKind::PrepPreprocessor
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared mode of the model being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    Classification,
    Regression,
}

impl ModelMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" => Some(ModelMode::Classification),
            "regression" => Some(ModelMode::Regression),
            _ => None,
        }
    }
}

/// Opaque source locator supplied by the front-end. Used for reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Start line (1-indexed).
    pub line: usize,
    /// End line (1-indexed, inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
}

impl SourceLocation {
    pub fn new(line: usize) -> Self {
        Self {
            file: None,
            line,
            end_line: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_range(mut self, end_line: usize) -> Self {
        self.end_line = Some(end_line);
        self
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}", file.display(), self.line)?,
            None => write!(f, "line {}", self.line)?,
        }
        if let Some(end) = self.end_line {
            write!(f, "-{end}")?;
        }
        Ok(())
    }
}

/// Rule-relevant flags surfaced by the front-end.
///
/// Kept as a generic key/value map so that new rules never need a schema
/// change. Backed by a `BTreeMap` so serialization order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, serde_json::Value>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// `true` only when the attribute is present and is the boolean `true`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(serde_json::Value::Bool(true)))
    }

    /// The attribute as a boolean, if it is one.
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(|v| v.as_bool())
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// A list of strings. A bare string counts as a one-element list;
    /// non-string array members are skipped.
    pub fn strings(&self, key: &str) -> Option<Vec<&str>> {
        match self.0.get(key)? {
            serde_json::Value::String(s) => Some(vec![s.as_str()]),
            serde_json::Value::Array(items) => {
                Some(items.iter().filter_map(|v| v.as_str()).collect())
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// One step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Assigned from position when the pipeline is built.
    #[serde(default)]
    pub id: OperationId,
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ArtifactId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<ArtifactId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: OperationId::default(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            location: None,
            attributes: Attributes::new(),
        }
    }

    pub fn input(mut self, artifact: impl Into<ArtifactId>) -> Self {
        self.inputs.push(artifact.into());
        self
    }

    pub fn inputs<I, A>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ArtifactId>,
    {
        self.inputs.extend(artifacts.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, artifact: impl Into<ArtifactId>) -> Self {
        self.outputs.push(artifact.into());
        self
    }

    pub fn outputs<I, A>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ArtifactId>,
    {
        self.outputs.extend(artifacts.into_iter().map(Into::into));
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    /// The first input. Lineage derives outputs from it unless a transform
    /// or prediction lists a recipe or model ahead of its data.
    pub fn primary_input(&self) -> Option<&ArtifactId> {
        self.inputs.first()
    }

    pub fn consumes(&self, artifact: &ArtifactId) -> bool {
        self.inputs.contains(artifact)
    }

    pub fn role(&self) -> Option<&str> {
        self.attributes.str(attr::ROLE)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role() == Some(role)
    }

    /// The operation carries its own seed argument.
    pub fn is_seeded(&self) -> bool {
        self.attributes.flag(attr::SEEDED)
    }
}

/// Pipeline-wide facts reported by the front-end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Packages loaded by the analysed script.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    /// Dependency lock file referenced by the project (e.g. `renv.lock`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockfile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_mode: Option<ModelMode>,
    pub outcome_imbalanced: bool,
}

/// Wire shape of a pipeline document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PipelineDocument {
    metadata: PipelineMetadata,
    sources: Vec<ArtifactId>,
    operations: Vec<Operation>,
}

impl From<PipelineDocument> for Pipeline {
    fn from(doc: PipelineDocument) -> Self {
        Pipeline::new(doc.metadata, doc.sources, doc.operations)
    }
}

/// An ordered, immutable sequence of operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PipelineDocument")]
pub struct Pipeline {
    metadata: PipelineMetadata,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<ArtifactId>,
    operations: Vec<Operation>,
}

impl Pipeline {
    /// Build a pipeline, assigning operation ids from position.
    pub fn new(
        metadata: PipelineMetadata,
        sources: Vec<ArtifactId>,
        mut operations: Vec<Operation>,
    ) -> Self {
        for (idx, op) in operations.iter_mut().enumerate() {
            op.id = OperationId(idx as u32);
        }
        Self {
            metadata,
            sources,
            operations,
        }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_path(path: &Path) -> Result<Self, crate::error::AnalyzerError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    pub fn metadata(&self) -> &PipelineMetadata {
        &self.metadata
    }

    pub fn sources(&self) -> &[ArtifactId] {
        &self.sources
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation(&self, id: OperationId) -> Option<&Operation> {
        self.operations.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations strictly between two sequence indices.
    pub fn between(&self, after: OperationId, before: OperationId) -> &[Operation] {
        let start = (after.index() + 1).min(self.operations.len());
        let end = before.index().min(self.operations.len()).max(start);
        &self.operations[start..end]
    }

    /// Operations strictly before the given index.
    pub fn before(&self, id: OperationId) -> &[Operation] {
        &self.operations[..id.index().min(self.operations.len())]
    }
}

/// Incremental construction of a [`Pipeline`].
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    metadata: PipelineMetadata,
    sources: Vec<ArtifactId>,
    operations: Vec<Operation>,
}

impl PipelineBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = Some(name.into());
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.metadata.packages.push(package.into());
        self
    }

    pub fn lockfile(mut self, lockfile: impl Into<String>) -> Self {
        self.metadata.lockfile = Some(lockfile.into());
        self
    }

    pub fn model_mode(mut self, mode: ModelMode) -> Self {
        self.metadata.model_mode = Some(mode);
        self
    }

    pub fn outcome_imbalanced(mut self, imbalanced: bool) -> Self {
        self.metadata.outcome_imbalanced = imbalanced;
        self
    }

    pub fn source(mut self, artifact: impl Into<ArtifactId>) -> Self {
        self.sources.push(artifact.into());
        self
    }

    pub fn op(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.metadata, self.sources, self.operations)
    }
}
