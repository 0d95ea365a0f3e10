//! Matrix fan-out and per-task context.
//!
//! A [`ResolutionPass`] owns one [`ResultsCache`]. The cache gathers, for a
//! matrixed task entry, every result value across its child runs in
//! execution order. It is filled on first access to an entry and reused for
//! the rest of the pass; starting a new pass starts an empty cache.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::definition::{Matrix, ParamValue, PipelineRunStatus, PipelineTask};
use crate::reference::{MatrixLengthReference, is_matrix_length_reference};
use crate::state::{ResolvedPipelineTask, RunState, TaskRunResult};
use crate::substitution::{Replacements, StringMap, replace_params, substitute};

/// Key of the retry budget context variable.
pub const RETRIES_KEY: &str = "context.pipelineTask.retries";

impl Matrix {
    /// Number of concrete instances this matrix expands into.
    ///
    /// With axes: the product of the axis lengths plus the combinations the
    /// include entries add. Within one include, each param that sets an axis
    /// to a value outside it adds one, until a param matches its axis. Without
    /// axes: one per include entry. Saturates instead of overflowing.
    pub fn count_combinations(&self) -> usize {
        if !self.has_params() {
            return self.include.len();
        }
        let generated = self
            .params
            .iter()
            .try_fold(1usize, |acc, p| acc.checked_mul(axis_len(&p.value)))
            .unwrap_or(usize::MAX);

        let axes: HashMap<&str, &ParamValue> = self
            .params
            .iter()
            .map(|p| (p.name.as_str(), &p.value))
            .collect();
        let mut added = 0usize;
        for inc in &self.include {
            for p in &inc.params {
                let Some(axis) = axes.get(p.name.as_str()) else {
                    continue;
                };
                if axis_contains(axis, p.value.as_str().unwrap_or_default()) {
                    break;
                }
                added += 1;
            }
        }

        generated.saturating_add(added)
    }
}

fn axis_len(value: &ParamValue) -> usize {
    match value {
        ParamValue::Array(items) => items.len(),
        ParamValue::String(_) => 1,
        ParamValue::Object(map) => map.len(),
    }
}

fn axis_contains(axis: &ParamValue, value: &str) -> bool {
    match axis {
        ParamValue::Array(items) => items.iter().any(|v| v == value),
        ParamValue::String(s) => s == value,
        ParamValue::Object(map) => map.values().any(|v| v == value),
    }
}

/// Matrix combinations of a task entry; zero when it has no matrix.
pub fn count_instances(task: &PipelineTask) -> usize {
    task.matrix.as_ref().map_or(0, Matrix::count_combinations)
}

/// Result name → values across a task entry's child runs, in run order.
pub type MatrixResults = BTreeMap<String, Vec<String>>;

/// Per-pass memo of matrixed results, keyed by task name.
#[derive(Debug, Default)]
pub struct ResultsCache {
    entries: HashMap<String, MatrixResults>,
}

impl ResultsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached results for `task`, gathering them on first access.
    pub fn get_or_build(&mut self, task: &ResolvedPipelineTask) -> &MatrixResults {
        self.entries
            .entry(task.name().to_string())
            .or_insert_with(|| {
                trace!("Building results cache for task '{}'", task.name());
                gather_results(task)
            })
    }

    pub fn get(&self, task_name: &str) -> Option<&MatrixResults> {
        self.entries.get(task_name)
    }

    pub fn contains(&self, task_name: &str) -> bool {
        self.entries.contains_key(task_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fan-out only carries string results; other shapes are not collected.
fn gather_results(task: &ResolvedPipelineTask) -> MatrixResults {
    let mut results = MatrixResults::new();
    for run in &task.task_runs {
        for result in &run.results {
            if let Some(value) = result.value.as_str() {
                results
                    .entry(result.name.clone())
                    .or_default()
                    .push(value.to_string());
            }
        }
    }
    results
}

/// One resolution pass over a run's state.
pub struct ResolutionPass<'a> {
    state: &'a RunState,
    cache: ResultsCache,
}

impl<'a> ResolutionPass<'a> {
    pub fn new(state: &'a RunState) -> Self {
        Self {
            state,
            cache: ResultsCache::new(),
        }
    }

    pub fn state(&self) -> &'a RunState {
        self.state
    }

    pub fn cache(&self) -> &ResultsCache {
        &self.cache
    }

    /// Cached matrixed results of a task entry, if the entry exists.
    pub fn matrix_results(&mut self, task_name: &str) -> Option<&MatrixResults> {
        let task = self.state.task(task_name)?;
        Some(self.cache.get_or_build(task))
    }

    /// Substitute per-task context into a copy of `task`.
    ///
    /// Sets the retry budget and, for params that reference matrix lengths,
    /// the combination count of the named task (looked up in the run's
    /// resolved spec) and the fan-out length of the named result (looked up
    /// through the results cache). Lengths that cannot be determined leave
    /// their reference untouched.
    pub fn apply_pipeline_task_contexts(
        &mut self,
        task: &PipelineTask,
        status: &PipelineRunStatus,
    ) -> PipelineTask {
        let mut strings = StringMap::from([(RETRIES_KEY.to_string(), task.retries.to_string())]);

        let expressions = task
            .params
            .iter()
            .flat_map(|p| p.references())
            .filter(|expr| is_matrix_length_reference(expr));
        for expr in expressions {
            let Some(reference) = MatrixLengthReference::parse(&expr) else {
                continue;
            };
            match &reference.result {
                None => {
                    let producer = status
                        .pipeline_spec
                        .as_ref()
                        .and_then(|spec| spec.task(&reference.task));
                    if let Some(producer) = producer {
                        strings.insert(
                            MatrixLengthReference::count_key(&reference.task),
                            count_instances(producer).to_string(),
                        );
                    }
                }
                Some(result) => {
                    let length = self
                        .matrix_results(&reference.task)
                        .and_then(|results| results.get(result))
                        .map(Vec::len);
                    if let Some(length) = length {
                        strings.insert(
                            MatrixLengthReference::result_key(&reference.task, result),
                            length.to_string(),
                        );
                    }
                }
            }
        }
        trace!(
            "Task '{}' context has {} replacements",
            task.name,
            strings.len()
        );

        let repl = Replacements::strings_only(strings);
        let mut out = task.clone();
        out.params = replace_params(&task.params, &repl);
        if task.is_matrixed() {
            out.matrix = task.matrix.as_ref().map(|m| m.replace_variables(&repl));
        }
        out.display_name = substitute(&task.display_name, &repl);
        out
    }

    /// Results of every successful, non-custom task entry by task name.
    ///
    /// A matrixed entry reports each cached result as an array of its
    /// per-combination values.
    pub fn task_runs_results(&mut self) -> HashMap<String, Vec<TaskRunResult>> {
        let state = self.state;
        let mut out = HashMap::new();
        for task in state.iter() {
            if task.is_custom() || !task.is_successful() {
                continue;
            }
            if task.pipeline_task.is_matrixed() {
                let results: Vec<TaskRunResult> = self
                    .cache
                    .get_or_build(task)
                    .iter()
                    .map(|(name, values)| TaskRunResult::new(name.clone(), values.clone()))
                    .collect();
                if !results.is_empty() {
                    out.insert(task.name().to_string(), results);
                }
            } else if let Some(run) = task.task_runs.first() {
                out.insert(task.name().to_string(), run.results.clone());
            }
        }
        debug!("Collected results from {} successful tasks", out.len());
        out
    }
}
