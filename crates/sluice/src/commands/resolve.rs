//! Resolve command - substitute a pipeline's variables for one run.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use tracing::{debug, info};

use sluice_config::OutputFormat;
use sluice_pipeline::{
    PipelineFile, PipelineRun, PipelineRunStatus, PipelineSpec, PipelineTask, ResolutionPass,
    ResolvedResultRefs, RunState, apply_contexts, apply_parameters,
    apply_parameters_to_workspace_bindings, apply_pipeline_task_state_context, apply_task_results,
    apply_workspaces, load_document,
};

use super::{Context, render};

/// Arguments for the resolve command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Pipeline document (TOML, YAML or JSON)
    #[arg(short, long)]
    pub pipeline: PathBuf,

    /// Run document carrying parameter values and workspace bindings
    #[arg(short, long)]
    pub run: PathBuf,

    /// Run state document; when given, completed results are propagated
    /// into the tasks that have not started yet
    #[arg(short, long)]
    pub state: Option<PathBuf>,

    /// Output format (yaml, json, toml)
    #[arg(short, long)]
    pub format: Option<OutputFormat>,
}

/// A resolved pipeline together with the run it was resolved for.
#[derive(Serialize)]
struct ResolvedPipeline<'a> {
    name: &'a str,
    run: &'a PipelineRun,
    spec: &'a PipelineSpec,
}

/// The resolved run state of a pipeline.
#[derive(Serialize)]
struct ResolvedState<'a> {
    name: &'a str,
    run: &'a PipelineRun,
    tasks: &'a RunState,
}

/// Run the resolve command.
pub fn run(args: ResolveArgs, ctx: &Context) -> Result<()> {
    let file = PipelineFile::from_file(&args.pipeline)
        .with_context(|| format!("loading pipeline {}", args.pipeline.display()))?;
    let mut run: PipelineRun = load_document(&args.run)
        .with_context(|| format!("loading run {}", args.run.display()))?;

    if run.metadata.uid.is_empty() {
        run.metadata.uid = uuid::Uuid::new_v4().to_string();
        debug!("Run has no uid, generated {}", run.metadata.uid);
    }

    let run = apply_parameters_to_workspace_bindings(&run);
    let spec = resolve_spec(&file, &run);
    let format = ctx.output_format(args.format);

    let output = match &args.state {
        None => {
            let spec = apply_task_contexts(&spec);
            render(
                &ResolvedPipeline {
                    name: &file.name,
                    run: &run,
                    spec: &spec,
                },
                format,
            )?
        }
        Some(path) => {
            let state: RunState = load_document(path)
                .with_context(|| format!("loading run state {}", path.display()))?;
            let tasks = resolve_state(&spec, &state);
            render(
                &ResolvedState {
                    name: &file.name,
                    run: &run,
                    tasks: &tasks,
                },
                format,
            )?
        }
    };

    info!(
        "Resolved pipeline '{}' for run '{}'",
        file.name,
        run.name()
    );
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// Spec-wide substitution: parameters, then context, then workspaces.
fn resolve_spec(file: &PipelineFile, run: &PipelineRun) -> PipelineSpec {
    let spec = apply_parameters(&file.spec, run);
    let spec = apply_contexts(&spec, &file.name, run);
    apply_workspaces(&spec, run)
}

/// Per-task context for a run that has not started.
fn apply_task_contexts(spec: &PipelineSpec) -> PipelineSpec {
    let state = RunState::from_tasks(spec.tasks.iter().chain(&spec.finally));
    let status = PipelineRunStatus {
        pipeline_spec: Some(spec.clone()),
    };
    let mut pass = ResolutionPass::new(&state);
    let mut out = spec.clone();
    out.tasks = spec
        .tasks
        .iter()
        .map(|t| pass.apply_pipeline_task_contexts(t, &status))
        .collect();
    out.finally = spec
        .finally
        .iter()
        .map(|t| pass.apply_pipeline_task_contexts(t, &status))
        .collect();
    out
}

/// Re-resolve every state entry against the resolved spec, then feed
/// statuses and completed results into the entries that are still pending.
fn resolve_state(spec: &PipelineSpec, state: &RunState) -> RunState {
    let status = PipelineRunStatus {
        pipeline_spec: Some(spec.clone()),
    };
    let mut pass = ResolutionPass::new(state);

    let tasks: Vec<_> = state
        .iter()
        .map(|entry| {
            let task: &PipelineTask = spec
                .tasks
                .iter()
                .chain(&spec.finally)
                .find(|t| t.name == entry.name())
                .unwrap_or(&entry.pipeline_task);
            let mut entry = entry.clone();
            entry.pipeline_task = pass.apply_pipeline_task_contexts(task, &status);
            entry
        })
        .collect();

    let refs = ResolvedResultRefs::from_task_results(&pass.task_runs_results())
        .with_custom_results(&state.custom_runs_results());
    debug!("Propagating {} resolved result references", refs.len());

    let resolved = RunState::from(tasks);
    let resolved = apply_pipeline_task_state_context(&resolved, &state.status_replacements());
    apply_task_results(&resolved, &refs)
}
