//! Feeding completed results into work that has not started yet.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::definition::{ParamValue, PipelineRun};
use crate::reference::{RESULTS_PART, ResultProducer};
use crate::state::{Artifacts, CustomRunResult, ResolvedPipelineTask, RunState, TaskRunResult};
use crate::substitution::{
    ArrayMap, ObjectMap, Replacements, StringMap, replace_params, replace_task_workspaces,
    replace_when, replace_workspace_bindings, substitute,
};

/// A result whose producer has finished, ready for substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResultRef {
    pub producer: ResultProducer,
    pub task: String,
    pub result: String,
    pub value: ParamValue,
}

impl ResolvedResultRef {
    pub fn new(
        task: impl Into<String>,
        result: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Self {
        Self {
            producer: ResultProducer::Task,
            task: task.into(),
            result: result.into(),
            value: value.into(),
        }
    }

    fn base(&self) -> String {
        format!("{}.{}.{}", self.producer.prefix(), self.task, RESULTS_PART)
    }

    /// `.r`, `["r"]`, `['r']`
    fn targets(&self) -> [String; 3] {
        let base = self.base();
        let r = &self.result;
        [
            format!("{base}.{r}"),
            format!("{base}[\"{r}\"]"),
            format!("{base}['{r}']"),
        ]
    }

    fn index_targets(&self, index: usize) -> [String; 3] {
        self.targets().map(|t| format!("{t}[{index}]"))
    }

    /// `.r.k`, `["r"]["k"]`, `['r']['k']`
    fn attribute_targets(&self, key: &str) -> [String; 3] {
        let base = self.base();
        let r = &self.result;
        [
            format!("{base}.{r}.{key}"),
            format!("{base}[\"{r}\"][\"{key}\"]"),
            format!("{base}['{r}']['{key}']"),
        ]
    }
}

/// A set of resolved result references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedResultRefs(pub Vec<ResolvedResultRef>);

impl ResolvedResultRefs {
    /// One reference per result of each task, in task-name order.
    pub fn from_task_results(results: &HashMap<String, Vec<TaskRunResult>>) -> Self {
        let mut names: Vec<&String> = results.keys().collect();
        names.sort();
        let refs = names
            .into_iter()
            .flat_map(|task| {
                results[task]
                    .iter()
                    .map(move |r| {
                        ResolvedResultRef::new(task.clone(), r.name.clone(), r.value.clone())
                    })
            })
            .collect();
        Self(refs)
    }

    /// Append custom-run results, which are always strings.
    pub fn with_custom_results(mut self, results: &HashMap<String, Vec<CustomRunResult>>) -> Self {
        let mut names: Vec<&String> = results.keys().collect();
        names.sort();
        for task in names {
            for r in &results[task] {
                self.0
                    .push(ResolvedResultRef::new(task.clone(), r.name.clone(), r.value.as_str()));
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scalar targets: whole strings, array elements and object attributes.
    pub fn string_replacements(&self) -> StringMap {
        let mut strings = StringMap::new();
        for r in &self.0 {
            match &r.value {
                ParamValue::String(s) => {
                    for target in r.targets() {
                        strings.insert(target, s.clone());
                    }
                }
                ParamValue::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        for target in r.index_targets(i) {
                            strings.insert(target, item.clone());
                        }
                    }
                }
                ParamValue::Object(map) => {
                    for (key, value) in map {
                        for target in r.attribute_targets(key) {
                            strings.insert(target, value.clone());
                        }
                    }
                }
            }
        }
        strings
    }

    pub fn array_replacements(&self) -> ArrayMap {
        let mut arrays = ArrayMap::new();
        for r in &self.0 {
            if let ParamValue::Array(items) = &r.value {
                for target in r.targets() {
                    arrays.insert(target, items.clone());
                }
            }
        }
        arrays
    }

    pub fn object_replacements(&self) -> ObjectMap {
        let mut objects = ObjectMap::new();
        for r in &self.0 {
            if let ParamValue::Object(map) = &r.value {
                for target in r.targets() {
                    objects.insert(target, map.clone());
                }
            }
        }
        objects
    }

    pub fn replacements(&self) -> Replacements {
        Replacements::full(
            self.string_replacements(),
            self.array_replacements(),
            self.object_replacements(),
        )
    }
}

/// Substitute resolved results into every task entry that has not started.
///
/// Entries with child runs keep the spec they were started with.
pub fn apply_task_results(state: &RunState, refs: &ResolvedResultRefs) -> RunState {
    let repl = refs.replacements();
    let strings = repl.only_strings();
    let mut out = state.clone();
    let mut applied = 0;

    for entry in out.tasks.iter_mut() {
        if !entry.task_runs.is_empty() || entry.custom_run.is_some() {
            continue;
        }
        let task = &entry.pipeline_task;
        let mut resolved = task.clone();
        resolved.params = replace_params(&task.params, &repl);
        if task.is_matrixed() {
            resolved.matrix = task.matrix.as_ref().map(|m| m.replace_variables(&repl));
        }
        resolved.when = replace_when(&task.when, &repl);
        resolved.task_ref = task.task_ref.as_ref().map(|r| r.replace_variables(&repl));
        resolved.display_name = substitute(&task.display_name, &strings);
        resolved.workspaces = replace_task_workspaces(&task.workspaces, &repl);
        entry.pipeline_task = resolved;
        applied += 1;
    }

    debug!(
        "Applied {} result references to {} pending tasks",
        refs.len(),
        applied
    );
    out
}

/// Substitute execution-status context (`tasks.<name>.status`,
/// `tasks.status`) into every task entry.
pub fn apply_pipeline_task_state_context(state: &RunState, strings: &StringMap) -> RunState {
    let repl = Replacements::strings_only(strings.clone());
    let mut out = state.clone();
    for entry in out.tasks.iter_mut() {
        let task = &entry.pipeline_task;
        let mut resolved = task.clone();
        resolved.params = replace_params(&task.params, &repl);
        resolved.when = replace_when(&task.when, &repl);
        resolved.task_ref = task.task_ref.as_ref().map(|r| r.replace_variables(&repl));
        resolved.display_name = substitute(&task.display_name, &repl);
        entry.pipeline_task = resolved;
    }
    out
}

/// Substitute string and object-attribute results into a copy of the run's
/// workspace bindings. Array results are not addressable there.
pub fn apply_results_to_workspace_bindings(
    results: &HashMap<String, Vec<TaskRunResult>>,
    run: &PipelineRun,
) -> PipelineRun {
    let scalar: HashMap<String, Vec<TaskRunResult>> = results
        .iter()
        .map(|(task, rs)| {
            let kept = rs
                .iter()
                .filter(|r| !matches!(r.value, ParamValue::Array(_)))
                .cloned()
                .collect();
            (task.clone(), kept)
        })
        .collect();
    let strings = ResolvedResultRefs::from_task_results(&scalar).string_replacements();

    let mut out = run.clone();
    out.spec.workspaces = replace_workspace_bindings(&run.spec.workspaces, &strings);
    out
}

/// Substitute completed results into a task's resolved body, for references
/// that were not wired through params.
pub fn propagate_results(
    task: &ResolvedPipelineTask,
    results: &HashMap<String, Vec<TaskRunResult>>,
) -> ResolvedPipelineTask {
    let mut out = task.clone();
    let Some(spec) = task.resolved_task_spec.as_ref() else {
        return out;
    };
    let refs = ResolvedResultRefs::from_task_results(results);
    let repl = Replacements::full(
        refs.string_replacements(),
        refs.array_replacements(),
        ObjectMap::new(),
    );
    out.resolved_task_spec = Some(spec.replace_variables(&repl));
    out
}

/// Substitute JSON-encoded artifact values into a task's resolved body.
///
/// `tasks.<name>.inputs.<artifact>` and `tasks.<name>.outputs.<artifact>`
/// address one artifact; `tasks.<name>.inputs` and `tasks.<name>.outputs`
/// address the first one.
pub fn propagate_artifacts(
    task: &ResolvedPipelineTask,
    artifacts: &HashMap<String, Artifacts>,
) -> crate::Result<ResolvedPipelineTask> {
    let mut out = task.clone();
    let Some(spec) = task.resolved_task_spec.as_ref() else {
        return Ok(out);
    };

    let mut strings = StringMap::new();
    for (task_name, recorded) in artifacts {
        for (kind, list) in [("inputs", &recorded.inputs), ("outputs", &recorded.outputs)] {
            for (i, artifact) in list.iter().enumerate() {
                let encoded = serde_json::to_string(&artifact.values)?;
                trace!("Artifact tasks.{task_name}.{kind}.{} encoded", artifact.name);
                if i == 0 {
                    strings.insert(format!("tasks.{task_name}.{kind}"), encoded.clone());
                }
                strings.insert(format!("tasks.{task_name}.{kind}.{}", artifact.name), encoded);
            }
        }
    }

    let mut repl = Replacements::empty();
    repl.strings = Some(strings);
    out.resolved_task_spec = Some(spec.replace_variables(&repl));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::definition::{
        ClaimSource, IncludeParams, Matrix, Param, PipelineTask, Step, TaskRef, TaskSpec,
        WhenExpression, WorkspaceBinding, WorkspacePipelineTaskBinding,
    };
    use crate::state::{Artifact, ArtifactValue, RunStatus, TaskRunRecord};

    fn object(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn refs() -> ResolvedResultRefs {
        ResolvedResultRefs(vec![
            ResolvedResultRef::new("build", "digest", "sha256:abc"),
            ResolvedResultRef::new(
                "build",
                "tags",
                vec!["v1".to_string(), "latest".to_string()],
            ),
            ResolvedResultRef::new("build", "image", object(&[("url", "registry/app")])),
        ])
    }

    #[test]
    fn test_string_replacement_targets() {
        let strings = refs().string_replacements();
        assert_eq!(strings["tasks.build.results.digest"], "sha256:abc");
        assert_eq!(strings[r#"tasks.build.results["digest"]"#], "sha256:abc");
        assert_eq!(strings["tasks.build.results['digest']"], "sha256:abc");
        assert_eq!(strings["tasks.build.results.tags[1]"], "latest");
        assert_eq!(strings["tasks.build.results['tags'][0]"], "v1");
        assert_eq!(strings["tasks.build.results.image.url"], "registry/app");
        assert_eq!(strings[r#"tasks.build.results["image"]["url"]"#], "registry/app");
        assert_eq!(strings["tasks.build.results['image']['url']"], "registry/app");
        assert!(!strings.contains_key("tasks.build.results.tags"));
    }

    #[test]
    fn test_array_and_object_targets() {
        let r = refs();
        assert_eq!(r.array_replacements()["tasks.build.results.tags"].len(), 2);
        assert!(r.object_replacements().contains_key("tasks.build.results['image']"));
    }

    fn pending(task: PipelineTask) -> ResolvedPipelineTask {
        ResolvedPipelineTask::new(task)
    }

    #[test]
    fn test_apply_task_results_to_pending_tasks() {
        let deploy = PipelineTask {
            name: "deploy".into(),
            display_name: "Deploy $(tasks.build.results.digest)".into(),
            params: vec![
                Param::new("digest", "$(tasks.build.results.digest)"),
                Param::new("tags", vec!["$(tasks.build.results.tags[*])".to_string()]),
                Param::new("image", "$(tasks.build.results.image[*])"),
            ],
            when: vec![WhenExpression {
                input: "$(tasks.build.results.tags[0])".into(),
                operator: "in".into(),
                values: vec!["$(tasks.build.results.tags[*])".into()],
            }],
            task_ref: Some(TaskRef {
                name: "deploy-$(tasks.build.results.image.url)".into(),
                params: vec![Param::new("ref", "$(tasks.build.results.digest)")],
                ..Default::default()
            }),
            workspaces: vec![WorkspacePipelineTaskBinding {
                name: "out".into(),
                workspace: "shared".into(),
                sub_path: "$(tasks.build.results.digest)".into(),
            }],
            ..Default::default()
        };
        let state = RunState::from(vec![pending(deploy)]);
        let out = apply_task_results(&state, &refs());
        let task = &out.tasks[0].pipeline_task;
        assert_eq!(task.display_name, "Deploy sha256:abc");
        assert_eq!(task.params[0].value, ParamValue::from("sha256:abc"));
        assert_eq!(
            task.params[1].value,
            ParamValue::Array(vec!["v1".into(), "latest".into()])
        );
        assert_eq!(
            task.params[2].value,
            ParamValue::Object(object(&[("url", "registry/app")]))
        );
        assert_eq!(task.when[0].input, "v1");
        assert_eq!(task.when[0].values, vec!["v1", "latest"]);
        let task_ref = task.task_ref.as_ref().unwrap();
        assert_eq!(task_ref.name, "deploy-registry/app");
        assert_eq!(task_ref.params[0].value, ParamValue::from("sha256:abc"));
        assert_eq!(task.workspaces[0].sub_path, "sha256:abc");
        // Input untouched.
        assert_eq!(
            state.tasks[0].pipeline_task.params[0].value,
            ParamValue::from("$(tasks.build.results.digest)")
        );
    }

    #[test]
    fn test_apply_task_results_matrix_includes_get_strings_only() {
        let fan = PipelineTask {
            name: "scan".into(),
            matrix: Some(Matrix {
                params: vec![Param::new(
                    "tag",
                    vec!["$(tasks.build.results.tags[*])".to_string()],
                )],
                include: vec![IncludeParams {
                    name: "pinned".into(),
                    params: vec![
                        Param::new("tag", "$(tasks.build.results.digest)"),
                        Param::new("all", "$(tasks.build.results.tags[*])"),
                    ],
                }],
            }),
            ..Default::default()
        };
        let out = apply_task_results(&RunState::from(vec![pending(fan)]), &refs());
        let matrix = out.tasks[0].pipeline_task.matrix.as_ref().unwrap();
        assert_eq!(
            matrix.params[0].value,
            ParamValue::Array(vec!["v1".into(), "latest".into()])
        );
        assert_eq!(matrix.include[0].params[0].value, ParamValue::from("sha256:abc"));
        assert_eq!(
            matrix.include[0].params[1].value,
            ParamValue::from("$(tasks.build.results.tags[*])")
        );
    }

    #[test]
    fn test_started_tasks_are_left_alone() {
        let mut started = pending(PipelineTask {
            name: "deploy".into(),
            params: vec![Param::new("digest", "$(tasks.build.results.digest)")],
            ..Default::default()
        });
        started.task_runs = vec![TaskRunRecord {
            name: "deploy-0".into(),
            status: RunStatus::Running,
            ..Default::default()
        }];
        let out = apply_task_results(&RunState::from(vec![started.clone()]), &refs());
        assert_eq!(out.tasks[0], started);
    }

    #[test]
    fn test_unresolved_results_stay_for_later() {
        let task = pending(PipelineTask {
            name: "notify".into(),
            params: vec![Param::new("msg", "$(tasks.test.results.summary)")],
            ..Default::default()
        });
        let out = apply_task_results(&RunState::from(vec![task]), &refs());
        assert_eq!(
            out.tasks[0].pipeline_task.params[0].value,
            ParamValue::from("$(tasks.test.results.summary)")
        );
    }

    #[test]
    fn test_state_context() {
        let task = pending(PipelineTask {
            name: "cleanup".into(),
            when: vec![WhenExpression {
                input: "$(tasks.build.status)".into(),
                operator: "in".into(),
                values: vec!["Failed".into()],
            }],
            params: vec![Param::new("overall", "$(tasks.status)")],
            ..Default::default()
        });
        let strings = StringMap::from([
            ("tasks.build.status".to_string(), "Failed".to_string()),
            ("tasks.status".to_string(), "Failed".to_string()),
        ]);
        let out = apply_pipeline_task_state_context(&RunState::from(vec![task]), &strings);
        let task = &out.tasks[0].pipeline_task;
        assert_eq!(task.when[0].input, "Failed");
        assert_eq!(task.params[0].value, ParamValue::from("Failed"));
    }

    fn build_results() -> HashMap<String, Vec<TaskRunResult>> {
        HashMap::from([(
            "build".to_string(),
            vec![
                TaskRunResult::new("digest", "sha256:abc"),
                TaskRunResult::new("tags", vec!["v1".to_string()]),
                TaskRunResult::new("volume", object(&[("claim", "pvc-7")])),
            ],
        )])
    }

    #[test]
    fn test_results_to_workspace_bindings() {
        let mut run = PipelineRun::default();
        run.spec.workspaces = vec![WorkspaceBinding {
            name: "cache".into(),
            sub_path: "$(tasks.build.results.digest)/$(tasks.build.results.tags[0])".into(),
            persistent_volume_claim: Some(ClaimSource {
                claim_name: "$(tasks.build.results.volume.claim)".into(),
            }),
            ..Default::default()
        }];
        let out = apply_results_to_workspace_bindings(&build_results(), &run);
        let binding = &out.spec.workspaces[0];
        assert_eq!(binding.sub_path, "sha256:abc/$(tasks.build.results.tags[0])");
        assert_eq!(
            binding.persistent_volume_claim.as_ref().unwrap().claim_name,
            "pvc-7"
        );
    }

    fn with_body(script: &str, args: Vec<String>) -> ResolvedPipelineTask {
        let mut task = pending(PipelineTask {
            name: "consume".into(),
            ..Default::default()
        });
        task.resolved_task_spec = Some(TaskSpec {
            steps: vec![Step {
                name: "run".into(),
                image: "alpine".into(),
                script: script.into(),
                args,
                ..Default::default()
            }],
            ..Default::default()
        });
        task
    }

    #[test]
    fn test_propagate_results_into_task_body() {
        let task = with_body(
            "echo $(tasks.build.results.digest) $(tasks.build.results.volume.claim)",
            vec!["$(tasks.build.results.tags[*])".into()],
        );
        let out = propagate_results(&task, &build_results());
        let step = &out.resolved_task_spec.as_ref().unwrap().steps[0];
        assert_eq!(step.script, "echo sha256:abc pvc-7");
        assert_eq!(step.args, vec!["v1"]);
    }

    #[test]
    fn test_propagate_results_without_body_is_noop() {
        let task = pending(PipelineTask {
            name: "plain".into(),
            ..Default::default()
        });
        assert_eq!(propagate_results(&task, &build_results()), task);
    }

    #[test]
    fn test_propagate_artifacts() {
        let artifacts = HashMap::from([(
            "build".to_string(),
            Artifacts {
                inputs: vec![],
                outputs: vec![
                    Artifact {
                        name: "image".into(),
                        values: vec![ArtifactValue {
                            uri: "oci://registry/app".into(),
                            digest: object(&[("sha256", "abc")]),
                        }],
                    },
                    Artifact {
                        name: "sbom".into(),
                        values: vec![],
                    },
                ],
            },
        )]);
        let task = with_body(
            "$(tasks.build.outputs) | $(tasks.build.outputs.sbom) | $(tasks.build.inputs)",
            vec![],
        );
        let out = propagate_artifacts(&task, &artifacts).unwrap();
        let step = &out.resolved_task_spec.as_ref().unwrap().steps[0];
        assert_eq!(
            step.script,
            r#"[{"uri":"oci://registry/app","digest":{"sha256":"abc"}}] | [] | $(tasks.build.inputs)"#
        );
    }
}
