//! Variable resolution and result propagation for pipeline runs.
//!
//! Given a pipeline spec, a run request and whatever the run has produced so
//! far, this crate substitutes every `$(...)` reference it can and leaves the
//! rest in place for a later pass. At the end of a run it folds task results
//! into the pipeline's declared results.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  params / context           spec-wide substitution          │
//! │  matrix (ResolutionPass)    per-task context + results cache│
//! │  propagate                  results → pending tasks         │
//! │  aggregate                  results → declared outputs      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  substitution               $(...) replacement, tri-state    │
//! │  reference                  $(...) extraction and parsing    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry point takes its inputs by reference and returns a new value;
//! nothing is mutated in place.

pub mod aggregate;
pub mod context;
pub mod definition;
pub mod error;
pub mod matrix;
pub mod params;
pub mod propagate;
pub mod reference;
pub mod state;
pub mod substitution;

pub use aggregate::{
    AggregatedResults, ResultAggregator, RunOutcome, StatusConvention,
    apply_task_results_to_pipeline_results,
};
pub use context::{apply_contexts, apply_workspaces, context_replacements, workspace_replacements};
pub use definition::{
    DocumentFormat, IncludeParams, Matrix, Param, ParamSpec, ParamType, ParamValue, PipelineFile,
    PipelineResult, PipelineRun, PipelineRunResult, PipelineRunStatus, PipelineSpec, PipelineTask,
    TaskRef, TaskSpec, WhenExpression, WorkspaceBinding, load_document, parse_document,
};
pub use error::{PipelineError, Result};
pub use matrix::{ResolutionPass, ResultsCache, count_instances};
pub use params::{
    apply_parameters, apply_parameters_to_workspace_bindings, apply_replacements,
    param_replacements, resolve_param_replacements, run_param_replacements,
};
pub use propagate::{
    ResolvedResultRef, ResolvedResultRefs, apply_pipeline_task_state_context,
    apply_results_to_workspace_bindings, apply_task_results, propagate_artifacts,
    propagate_results,
};
pub use reference::{ResultReference, extract_references};
pub use state::{
    Artifacts, CustomRunResult, ResolvedPipelineTask, RunState, RunStatus, TaskRunRecord,
    TaskRunResult,
};
pub use substitution::{Replacements, SubstitutionMode, substitute, try_substitute};
