//! Declarative pipeline and run definitions.
//!
//! These types mirror the pipeline resource tree the resolver operates on.
//! Documents can be written as TOML, YAML or JSON; the format is chosen from
//! the file extension.
//!
//! # Example YAML
//!
//! ```yaml
//! name: build-and-push
//! spec:
//!   params:
//!     - name: greeting
//!       type: string
//!       default: hi
//!   tasks:
//!     - name: build
//!       taskRef: { name: kaniko }
//!       params:
//!         - name: message
//!           value: "$(params.greeting), world"
//!   results:
//!     - name: image-digest
//!       value: "$(tasks.build.results.digest)"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Declared shape of a parameter or result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Array,
    Object,
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Array => write!(f, "array"),
            ParamType::Object => write!(f, "object"),
        }
    }
}

/// A concrete parameter or result value.
///
/// The variant is the value's type tag: it decides which replacement map the
/// value populates, independent of any declared [`ParamType`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Array(Vec<String>),
    Object(BTreeMap<String, String>),
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::String(String::new())
    }
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::String(_) => ParamType::String,
            ParamValue::Array(_) => ParamType::Array,
            ParamValue::Object(_) => ParamType::Object,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[String]> {
        match self {
            ParamValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ParamValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::Array(values)
    }
}

impl From<BTreeMap<String, String>> for ParamValue {
    fn from(values: BTreeMap<String, String>) -> Self {
        ParamValue::Object(values)
    }
}

/// A supplied parameter value (run parameter, task parameter, matrix axis).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Param {
    pub name: String,
    pub value: ParamValue,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A parameter declared by a pipeline or task, with an optional default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParamSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub param_type: ParamType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

// ---------------------------------------------------------------------------
// Pipeline specification
// ---------------------------------------------------------------------------

/// The body of a pipeline: its declared inputs, task graph and outputs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub params: Vec<ParamSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<PipelineWorkspaceDeclaration>,

    #[serde(default)]
    pub tasks: Vec<PipelineTask>,

    /// Tasks that run after the main graph regardless of its outcome.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finally: Vec<PipelineTask>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<PipelineResult>,
}

impl PipelineSpec {
    /// Find a task entry by name in the main task list.
    pub fn task(&self, name: &str) -> Option<&PipelineTask> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// A workspace the pipeline expects the run to bind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineWorkspaceDeclaration {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub optional: bool,
}

/// One node of the pipeline graph.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<TaskRef>,

    /// Task body embedded directly in the pipeline instead of referenced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_spec: Option<TaskSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Matrix>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenExpression>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspacePipelineTaskBinding>,

    #[serde(default)]
    pub retries: u32,

    /// Failure policy, e.g. `continue` or `stopAndFail`. May be templated.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_error: String,
}

impl PipelineTask {
    /// Whether this task fans out over a matrix.
    pub fn is_matrixed(&self) -> bool {
        self.matrix
            .as_ref()
            .is_some_and(|m| m.has_params() || m.has_include())
    }
}

/// Matrix fan-out declaration: axes plus explicit extra combinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Matrix {
    #[serde(default)]
    pub params: Vec<Param>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<IncludeParams>,
}

impl Matrix {
    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn has_include(&self) -> bool {
        !self.include.is_empty()
    }
}

/// A named, fixed-value matrix combination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IncludeParams {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub params: Vec<Param>,
}

/// Guard condition evaluated before a task runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct WhenExpression {
    pub input: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Reference to a task definition stored elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskRef {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Resolver parameters (bundles, git, cluster...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
}

/// Binding of a pipeline workspace into a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePipelineTaskBinding {
    pub name: String,

    #[serde(default)]
    pub workspace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_path: String,
}

/// An embedded task body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<TaskResultSpec>,
}

/// A single container step of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// A result a task declares it will produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskResultSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub result_type: ParamType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A named output of the whole pipeline, computed from task results.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineResult {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub value: ParamValue,
}

/// A final, resolved pipeline result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineRunResult {
    pub name: String,
    pub value: ParamValue,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// A single execution request for a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PipelineRun {
    #[serde(default)]
    pub metadata: RunMetadata,

    #[serde(default)]
    pub spec: PipelineRunSpec,
}

impl PipelineRun {
    /// The run's name, or `""` when it has none.
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Identity fields of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineRunSpec {
    #[serde(default)]
    pub params: Vec<Param>,

    #[serde(default)]
    pub workspaces: Vec<WorkspaceBinding>,
}

/// A concrete volume bound to a declared workspace by the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceBinding {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretSource>,

    #[serde(default)]
    pub empty_dir: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSource {
    pub claim_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigMapSource {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    pub secret_name: String,
}

/// The subset of run status the resolver reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunStatus {
    /// The pipeline spec the run executes, once it has been resolved.
    #[serde(default)]
    pub pipeline_spec: Option<PipelineSpec>,
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// On-disk pipeline document: a name and its spec.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineFile {
    pub name: String,
    pub spec: PipelineSpec,
}

impl PipelineFile {
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        parse_document(content, DocumentFormat::Toml)
    }

    pub fn from_yaml(content: &str) -> Result<Self, PipelineError> {
        parse_document(content, DocumentFormat::Yaml)
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let file: Self = load_document(path)?;
        debug!(
            "Loaded pipeline '{}' with {} tasks and {} finally tasks",
            file.name,
            file.spec.tasks.len(),
            file.spec.finally.len()
        );
        Ok(file)
    }
}

/// Serialization format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Toml,
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Pick a format from a file extension. Unknown extensions are read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => DocumentFormat::Toml,
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Parse a document of any supported format.
pub fn parse_document<T: DeserializeOwned>(
    content: &str,
    format: DocumentFormat,
) -> Result<T, PipelineError> {
    match format {
        DocumentFormat::Toml => toml::from_str(content)
            .map_err(|e| PipelineError::InvalidDefinition(format!("TOML parse error: {}", e))),
        DocumentFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| PipelineError::InvalidDefinition(format!("YAML parse error: {}", e))),
        DocumentFormat::Json => serde_json::from_str(content)
            .map_err(|e| PipelineError::InvalidDefinition(format!("JSON parse error: {}", e))),
    }
}

/// Read and parse a document, choosing the format from its extension.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::InvalidDefinition(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_document(&content, DocumentFormat::from_path(path))
}
