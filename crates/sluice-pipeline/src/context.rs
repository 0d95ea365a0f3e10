//! Run identity and workspace context.
//!
//! # Variables
//!
//! - `context.pipelineRun.name`: the run's name, `""` when unnamed
//! - `context.pipeline.name`: the pipeline's name
//! - `context.pipelineRun.namespace`
//! - `context.pipelineRun.uid`
//! - `workspaces.<name>.bound`: `"true"` when the run binds the workspace,
//!   `"false"` when it is only declared

use tracing::debug;

use crate::definition::{PipelineRun, PipelineSpec};
use crate::params::apply_replacements;
use crate::substitution::{Replacements, StringMap, apply_replacements as substitute_strings};

pub const RUN_NAME_KEY: &str = "context.pipelineRun.name";
pub const PIPELINE_NAME_KEY: &str = "context.pipeline.name";
pub const RUN_NAMESPACE_KEY: &str = "context.pipelineRun.namespace";
pub const RUN_UID_KEY: &str = "context.pipelineRun.uid";

/// The four identity keys of a run.
pub fn context_replacements(pipeline_name: &str, run: &PipelineRun) -> StringMap {
    StringMap::from([
        (RUN_NAME_KEY.to_string(), run.name().to_string()),
        (PIPELINE_NAME_KEY.to_string(), pipeline_name.to_string()),
        (
            RUN_NAMESPACE_KEY.to_string(),
            run.metadata.namespace.clone(),
        ),
        (RUN_UID_KEY.to_string(), run.metadata.uid.clone()),
    ])
}

/// Substitute run identity into a copy of the spec.
///
/// Display names are substituted first, including those of matrixed tasks
/// that spec-wide application leaves alone.
pub fn apply_contexts(spec: &PipelineSpec, pipeline_name: &str, run: &PipelineRun) -> PipelineSpec {
    let strings = context_replacements(pipeline_name, run);
    let mut spec = spec.clone();
    for task in spec.tasks.iter_mut().chain(spec.finally.iter_mut()) {
        task.display_name = substitute_strings(&task.display_name, &strings);
    }
    apply_replacements(&spec, &context_map(strings))
}

fn workspace_key(name: &str) -> String {
    format!("workspaces.{name}.bound")
}

/// Bound flags for every declared and every bound workspace.
pub fn workspace_replacements(spec: &PipelineSpec, run: &PipelineRun) -> StringMap {
    let mut strings = StringMap::new();
    for declared in &spec.workspaces {
        strings.insert(workspace_key(&declared.name), "false".to_string());
    }
    // Bound but undeclared workspaces are validated elsewhere.
    for bound in &run.spec.workspaces {
        strings.insert(workspace_key(&bound.name), "true".to_string());
    }
    strings
}

/// Substitute workspace bound flags into a copy of the spec.
pub fn apply_workspaces(spec: &PipelineSpec, run: &PipelineRun) -> PipelineSpec {
    let strings = workspace_replacements(spec, run);
    debug!("Applying {} workspace flags", strings.len());
    apply_replacements(spec, &context_map(strings))
}

/// Context keys are strings only, but arrays and objects are supplied empty
/// so embedded task bodies see the same shapes as with parameters.
fn context_map(strings: StringMap) -> Replacements {
    let mut repl = Replacements::empty();
    repl.strings = Some(strings);
    repl
}
