//! Run state: what has executed so far and what it produced.
//!
//! One [`ResolvedPipelineTask`] exists per task entry of the pipeline. A plain
//! task has at most one child run; a matrixed task has one child run per
//! combination, kept in execution order.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::aggregate::StatusConvention;
use crate::definition::{ParamType, ParamValue, PipelineTask, TaskSpec};
use crate::substitution::StringMap;

/// Lifecycle state of a child run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Skipped => "Skipped",
            RunStatus::Cancelled => "Cancelled",
        }
    }

    /// Finished, whatever the outcome.
    pub fn is_done(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed result emitted by a task run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskRunResult {
    pub name: String,

    /// Declared type. The value's own shape decides how it is substituted.
    #[serde(rename = "type", default)]
    pub result_type: ParamType,

    pub value: ParamValue,
}

impl TaskRunResult {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            result_type: value.param_type(),
            value,
        }
    }
}

/// A string result emitted by a custom (non-standard) run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CustomRunResult {
    pub name: String,
    pub value: String,
}

/// One child run of a task entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TaskRunRecord {
    pub name: String,

    #[serde(default)]
    pub status: RunStatus,

    #[serde(default)]
    pub results: Vec<TaskRunResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
}

/// The single run of a custom task entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CustomRunRecord {
    pub name: String,

    #[serde(default)]
    pub status: RunStatus,

    #[serde(default)]
    pub results: Vec<CustomRunResult>,
}

/// Artifacts a task run consumed and produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Artifacts {
    #[serde(default)]
    pub inputs: Vec<Artifact>,

    #[serde(default)]
    pub outputs: Vec<Artifact>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Artifact {
    pub name: String,

    #[serde(default)]
    pub values: Vec<ArtifactValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArtifactValue {
    #[serde(default)]
    pub uri: String,

    /// Algorithm → digest.
    #[serde(default)]
    pub digest: BTreeMap<String, String>,
}

/// A task entry together with its child runs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPipelineTask {
    pub pipeline_task: PipelineTask,

    #[serde(default)]
    pub task_runs: Vec<TaskRunRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_run: Option<CustomRunRecord>,

    /// The task body the entry will execute once referenced definitions are
    /// fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_task_spec: Option<TaskSpec>,
}

impl ResolvedPipelineTask {
    pub fn new(pipeline_task: PipelineTask) -> Self {
        Self {
            pipeline_task,
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.pipeline_task.name
    }

    pub fn is_custom(&self) -> bool {
        self.custom_run.is_some()
    }

    /// Every child run (or the custom run) finished successfully.
    pub fn is_successful(&self) -> bool {
        match &self.custom_run {
            Some(run) => run.status == RunStatus::Succeeded,
            None => {
                !self.task_runs.is_empty()
                    && self
                        .task_runs
                        .iter()
                        .all(|tr| tr.status == RunStatus::Succeeded)
            }
        }
    }

    /// Any child run (or the custom run) failed or was cancelled.
    pub fn is_failure(&self) -> bool {
        match &self.custom_run {
            Some(run) => run.status.is_failure(),
            None => self.task_runs.iter().any(|tr| tr.status.is_failure()),
        }
    }

    /// Skipped entries never started a child run.
    pub fn is_skipped(&self) -> bool {
        match &self.custom_run {
            Some(run) => run.status == RunStatus::Skipped,
            None => {
                !self.task_runs.is_empty()
                    && self
                        .task_runs
                        .iter()
                        .all(|tr| tr.status == RunStatus::Skipped)
            }
        }
    }

    /// Summary status of the entry, `None` while nothing has started.
    pub fn status(&self) -> Option<RunStatus> {
        if self.custom_run.is_none() && self.task_runs.is_empty() {
            return None;
        }
        if self.is_failure() {
            Some(RunStatus::Failed)
        } else if self.is_successful() {
            Some(RunStatus::Succeeded)
        } else if self.is_skipped() {
            Some(RunStatus::Skipped)
        } else {
            Some(RunStatus::Running)
        }
    }
}

/// All task entries of a run, main tasks and finally tasks alike.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RunState {
    pub tasks: Vec<ResolvedPipelineTask>,
}

impl From<Vec<ResolvedPipelineTask>> for RunState {
    fn from(tasks: Vec<ResolvedPipelineTask>) -> Self {
        Self { tasks }
    }
}

impl RunState {
    /// Seed one entry per task and finally task of a spec.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a PipelineTask>) -> Self {
        Self {
            tasks: tasks
                .into_iter()
                .cloned()
                .map(ResolvedPipelineTask::new)
                .collect(),
        }
    }

    pub fn task(&self, name: &str) -> Option<&ResolvedPipelineTask> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<&mut ResolvedPipelineTask> {
        self.tasks.iter_mut().find(|t| t.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedPipelineTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Results of successful custom runs, by task name.
    pub fn custom_runs_results(&self) -> HashMap<String, Vec<CustomRunResult>> {
        self.tasks
            .iter()
            .filter(|t| t.is_successful())
            .filter_map(|t| {
                let run = t.custom_run.as_ref()?;
                Some((t.name().to_string(), run.results.clone()))
            })
            .collect()
    }

    /// Artifacts of each task's first child run that recorded any.
    pub fn task_runs_artifacts(&self) -> HashMap<String, Artifacts> {
        self.tasks
            .iter()
            .filter(|t| !t.is_custom())
            .filter_map(|t| {
                let artifacts = t.task_runs.iter().find_map(|tr| tr.artifacts.clone())?;
                Some((t.name().to_string(), artifacts))
            })
            .collect()
    }

    /// Status keys as the result aggregator reads them.
    pub fn task_statuses(&self, convention: &StatusConvention) -> HashMap<String, String> {
        self.tasks
            .iter()
            .filter_map(|t| {
                let status = t.status()?;
                Some((convention.key(t.name()), status.as_str().to_string()))
            })
            .collect()
    }

    /// Execution-status context variables: `tasks.<name>.status` per entry and
    /// the aggregate `tasks.status`.
    ///
    /// Per entry: `Succeeded`, `Failed`, or `None` while unfinished or
    /// skipped. Aggregate: `Failed` if any entry failed, `Succeeded` if all
    /// succeeded, `Completed` if all finished with some skipped, else `None`.
    pub fn status_replacements(&self) -> StringMap {
        let convention = StatusConvention::default();
        let mut strings = StringMap::new();
        let mut any_failed = false;
        let mut all_succeeded = true;
        let mut all_done = true;

        for task in &self.tasks {
            let status = task.status();
            let value = match status {
                Some(RunStatus::Succeeded) => "Succeeded",
                Some(RunStatus::Failed) => "Failed",
                _ => "None",
            };
            any_failed |= status == Some(RunStatus::Failed);
            all_succeeded &= status == Some(RunStatus::Succeeded);
            all_done &= status.is_some_and(|s| s.is_done());
            strings.insert(convention.key(task.name()), value.to_string());
        }

        let aggregate = if any_failed {
            "Failed"
        } else if all_succeeded {
            "Succeeded"
        } else if all_done {
            "Completed"
        } else {
            "None"
        };
        strings.insert("tasks.status".to_string(), aggregate.to_string());
        strings
    }
}
