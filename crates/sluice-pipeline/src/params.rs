//! Parameter resolution.
//!
//! Builds replacement maps from declared parameter defaults overlaid with
//! run-supplied values, and applies them across a pipeline spec.
//!
//! Every parameter is addressable under three equivalent forms:
//! `params.<name>`, `params["<name>"]` and `params['<name>']`. All three are
//! always populated together.

use tracing::{debug, trace};

use crate::definition::{
    ParamSpec, ParamValue, PipelineRun, PipelineSpec, PipelineTask, TaskSpec,
};
use crate::substitution::{
    Replacements, replace_params, replace_task_workspaces, replace_when,
    replace_workspace_bindings, substitute,
};

/// The three address forms of a parameter name.
pub fn param_keys(name: &str) -> [String; 3] {
    [
        format!("params.{name}"),
        format!("params[\"{name}\"]"),
        format!("params['{name}']"),
    ]
}

/// Key of a single object attribute. Only the dotted form is addressable.
fn attribute_key(name: &str, key: &str) -> String {
    format!("params.{name}.{key}")
}

/// Populate every key a parameter value is addressable under.
///
/// Arrays also seed one string entry per element (`<form>[i]`); objects seed
/// one string entry per attribute.
pub fn seed_param(repl: &mut Replacements, name: &str, value: &ParamValue) {
    match value {
        ParamValue::String(s) => {
            let strings = repl.strings_mut();
            for key in param_keys(name) {
                strings.insert(key, s.clone());
            }
        }
        ParamValue::Array(items) => {
            for key in param_keys(name) {
                let strings = repl.strings_mut();
                for (i, item) in items.iter().enumerate() {
                    strings.insert(format!("{key}[{i}]"), item.clone());
                }
                repl.arrays_mut().insert(key, items.clone());
            }
        }
        ParamValue::Object(map) => {
            for key in param_keys(name) {
                repl.objects_mut().insert(key, map.clone());
            }
            let strings = repl.strings_mut();
            for (k, v) in map {
                strings.insert(attribute_key(name, k), v.clone());
            }
        }
    }
}

/// Remove every key a parameter name could have populated.
fn clear_param(repl: &mut Replacements, name: &str) {
    let keys = param_keys(name);
    let attribute_prefix = format!("params.{name}.");
    if let Some(strings) = repl.strings.as_mut() {
        strings.retain(|k, _| {
            !keys.iter().any(|key| {
                k == key
                    || k.strip_prefix(key.as_str())
                        .is_some_and(|rest| rest.starts_with('[') && rest.ends_with(']'))
            }) && !k.starts_with(&attribute_prefix)
        });
    }
    for key in &keys {
        if let Some(arrays) = repl.arrays.as_mut() {
            arrays.remove(key);
        }
        if let Some(objects) = repl.objects.as_mut() {
            objects.remove(key);
        }
    }
}

/// Replace whatever a parameter name currently resolves to with `value`.
///
/// The whole value is overwritten, never merged: a shorter array or an object
/// with fewer keys leaves no stale element or attribute entries behind, and a
/// value of a different shape moves to the map of its own shape.
pub fn override_param(repl: &mut Replacements, name: &str, value: &ParamValue) {
    clear_param(repl, name);
    seed_param(repl, name, value);
}

/// Replacement maps seeded from declared defaults.
pub fn param_replacements(specs: &[ParamSpec]) -> Replacements {
    let mut repl = Replacements::empty();
    for spec in specs {
        if let Some(default) = &spec.default {
            seed_param(&mut repl, &spec.name, default);
        }
    }
    repl
}

/// Replacement maps holding only the values the run supplies.
pub fn run_param_replacements(run: &PipelineRun) -> Replacements {
    let mut repl = Replacements::empty();
    for param in &run.spec.params {
        seed_param(&mut repl, &param.name, &param.value);
    }
    repl
}

/// Defaults overlaid with run-supplied values. Run values always win,
/// whatever their shape.
pub fn resolve_param_replacements(specs: &[ParamSpec], run: &PipelineRun) -> Replacements {
    let mut repl = param_replacements(specs);
    for param in &run.spec.params {
        override_param(&mut repl, &param.name, &param.value);
    }
    repl
}

/// Substitute pipeline parameters into a copy of the spec.
pub fn apply_parameters(spec: &PipelineSpec, run: &PipelineRun) -> PipelineSpec {
    let repl = resolve_param_replacements(&spec.params, run);
    debug!(
        "Applying {} parameter replacements from run '{}'",
        repl.len(),
        run.name()
    );
    apply_replacements(spec, &repl)
}

/// Substitute replacements into every task and finally task of a copy of the
/// spec.
pub fn apply_replacements(spec: &PipelineSpec, repl: &Replacements) -> PipelineSpec {
    let mut spec = spec.clone();
    for task in spec.tasks.iter_mut().chain(spec.finally.iter_mut()) {
        *task = replace_in_task(task, repl);
    }
    spec
}

fn replace_in_task(task: &PipelineTask, repl: &Replacements) -> PipelineTask {
    let strings = repl.only_strings();
    let mut out = task.clone();

    out.params = replace_params(&task.params, repl);
    if task.is_matrixed() {
        out.matrix = task.matrix.as_ref().map(|m| m.replace_variables(repl));
    } else {
        // Matrixed display names may reference per-combination values.
        out.display_name = substitute(&task.display_name, &strings);
    }
    out.workspaces = replace_task_workspaces(&task.workspaces, repl);
    out.when = replace_when(&task.when, repl);
    out.task_ref = task.task_ref.as_ref().map(|r| r.replace_variables(repl));
    out.on_error = substitute(&task.on_error, &strings);
    out.task_spec = propagate_params(&out, repl);

    trace!("Substituted variables in task '{}'", task.name);
    out
}

/// Push replacements into an embedded task body.
///
/// A task-level param named like a pipeline param shadows it in every form.
/// Shadowing only applies to names the pipeline maps already know.
fn propagate_params(task: &PipelineTask, repl: &Replacements) -> Option<TaskSpec> {
    let spec = task.task_spec.as_ref()?;
    if task.params.is_empty() {
        return Some(spec.replace_variables(repl));
    }

    let mut scoped = repl.clone();
    for param in &task.params {
        let known = param_keys(&param.name).iter().any(|k| scoped.contains(k));
        if known {
            trace!(
                "Task '{}' param '{}' shadows pipeline param",
                task.name, param.name
            );
            override_param(&mut scoped, &param.name, &param.value);
        }
    }
    Some(spec.replace_variables(&scoped))
}

/// Substitute string run parameters into the run's own workspace bindings.
pub fn apply_parameters_to_workspace_bindings(run: &PipelineRun) -> PipelineRun {
    let repl = run_param_replacements(run);
    let mut out = run.clone();
    if let Some(strings) = repl.strings.as_ref() {
        out.spec.workspaces = replace_workspace_bindings(&run.spec.workspaces, strings);
    }
    out
}
