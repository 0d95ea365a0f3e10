//! Placeholder substitution.
//!
//! Replaces `$(expression)` occurrences with values from three parallel
//! replacement maps: strings, arrays and objects. Each map is independently
//! optional. A shape that was not supplied is skipped entirely. A supplied
//! but empty map takes part in substitution and simply matches nothing.
//!
//! Substitution is a single pass: replaced text is never rescanned, so a
//! value that itself looks like a reference is inserted verbatim.
//!
//! Two modes exist:
//! - [`SubstitutionMode::Deferred`] leaves unresolved references in place so a
//!   later pass (or the result aggregator) can bind them
//! - [`SubstitutionMode::Strict`] fails on the first reference it cannot
//!   resolve, and on array indices past the end of a known array

use std::collections::{BTreeMap, HashMap};

use crate::definition::{
    EnvVar, IncludeParams, Matrix, Param, ParamValue, Step, TaskRef, TaskSpec, WhenExpression,
    WorkspaceBinding, WorkspacePipelineTaskBinding,
};
use crate::error::{PipelineError, Result};
use crate::reference::{
    IndexSuffix, exact_reference, has_references, parse_result_name, reference_spans, strip_star,
};

/// Reference → string value.
pub type StringMap = HashMap<String, String>;
/// Reference → ordered sequence of strings.
pub type ArrayMap = HashMap<String, Vec<String>>;
/// Reference → keyed collection of strings.
pub type ObjectMap = HashMap<String, BTreeMap<String, String>>;

/// How unresolved references are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubstitutionMode {
    /// Leave unresolved references as literal template text.
    #[default]
    Deferred,
    /// Fail on unresolved references and out-of-bounds indices.
    Strict,
}

/// The three replacement maps used by one substitution call.
///
/// A key should appear in at most one map: each reference resolves to exactly
/// one shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replacements {
    pub strings: Option<StringMap>,
    pub arrays: Option<ArrayMap>,
    pub objects: Option<ObjectMap>,
}

impl Replacements {
    /// No shape supplied: substitution is a no-op.
    pub fn none() -> Self {
        Self::default()
    }

    /// Only string replacements.
    pub fn strings_only(strings: StringMap) -> Self {
        Self {
            strings: Some(strings),
            ..Self::default()
        }
    }

    /// All three shapes supplied.
    pub fn full(strings: StringMap, arrays: ArrayMap, objects: ObjectMap) -> Self {
        Self {
            strings: Some(strings),
            arrays: Some(arrays),
            objects: Some(objects),
        }
    }

    /// All three shapes supplied, all empty.
    pub fn empty() -> Self {
        Self::full(StringMap::new(), ArrayMap::new(), ObjectMap::new())
    }

    pub fn with_arrays(mut self, arrays: ArrayMap) -> Self {
        self.arrays = Some(arrays);
        self
    }

    pub fn with_objects(mut self, objects: ObjectMap) -> Self {
        self.objects = Some(objects);
        self
    }

    /// A copy restricted to the string shape.
    pub fn only_strings(&self) -> Self {
        Self {
            strings: self.strings.clone(),
            ..Self::default()
        }
    }

    /// A copy with the object shape suppressed.
    pub fn without_objects(&self) -> Self {
        Self {
            strings: self.strings.clone(),
            arrays: self.arrays.clone(),
            objects: None,
        }
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.strings.as_ref()?.get(key).map(String::as_str)
    }

    pub fn array(&self, key: &str) -> Option<&[String]> {
        self.arrays.as_ref()?.get(key).map(Vec::as_slice)
    }

    pub fn object(&self, key: &str) -> Option<&BTreeMap<String, String>> {
        self.objects.as_ref()?.get(key)
    }

    /// Whether `key` is known in any supplied shape.
    pub fn contains(&self, key: &str) -> bool {
        self.string(key).is_some() || self.array(key).is_some() || self.object(key).is_some()
    }

    pub fn strings_mut(&mut self) -> &mut StringMap {
        self.strings.get_or_insert_with(StringMap::new)
    }

    pub fn arrays_mut(&mut self) -> &mut ArrayMap {
        self.arrays.get_or_insert_with(ArrayMap::new)
    }

    pub fn objects_mut(&mut self) -> &mut ObjectMap {
        self.objects.get_or_insert_with(ObjectMap::new)
    }

    /// Total number of keys across all supplied shapes.
    pub fn len(&self) -> usize {
        self.strings.as_ref().map_or(0, HashMap::len)
            + self.arrays.as_ref().map_or(0, HashMap::len)
            + self.objects.as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlay `other` on top of `self`. Keys in `other` overwrite whole
    /// values; nothing is merged element-wise.
    pub fn overlay(&mut self, other: Replacements) {
        if let Some(strings) = other.strings {
            self.strings_mut().extend(strings);
        }
        if let Some(arrays) = other.arrays {
            self.arrays_mut().extend(arrays);
        }
        if let Some(objects) = other.objects {
            self.objects_mut().extend(objects);
        }
    }

    /// Resolve an expression in scalar context.
    fn lookup_scalar(&self, expr: &str, mode: SubstitutionMode) -> Result<Option<String>> {
        if let Some(value) = self.string(expr) {
            return Ok(Some(value.to_string()));
        }
        if let (base, Some(IndexSuffix::Index(i))) = parse_result_name(expr)
            && let Some(values) = self.array(base)
        {
            return match values.get(i) {
                Some(v) => Ok(Some(v.clone())),
                None if mode == SubstitutionMode::Strict => Err(PipelineError::OutOfBoundsIndex {
                    reference: base.to_string(),
                    index: i,
                    length: values.len(),
                }),
                None => Ok(None),
            };
        }
        // A splat only has meaning where the field is itself a sequence.
        if let (base, Some(IndexSuffix::Splat)) = parse_result_name(expr)
            && self.array(base).is_some()
        {
            return Ok(None);
        }
        match mode {
            SubstitutionMode::Strict => Err(PipelineError::UnresolvedReference(expr.to_string())),
            SubstitutionMode::Deferred => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Substitute references in a string, leaving unresolved ones in place.
pub fn substitute(text: &str, repl: &Replacements) -> String {
    // Deferred lookups never fail.
    substitute_with(text, repl, SubstitutionMode::Deferred).unwrap_or_else(|_| text.to_string())
}

/// Substitute references in a string, failing on anything unresolved.
pub fn try_substitute(text: &str, repl: &Replacements) -> Result<String> {
    substitute_with(text, repl, SubstitutionMode::Strict)
}

/// Substitute references in a string using the given mode.
pub fn substitute_with(text: &str, repl: &Replacements, mode: SubstitutionMode) -> Result<String> {
    if !has_references(text) {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (range, expr) in reference_spans(text) {
        out.push_str(&text[last..range.start]);
        match repl.lookup_scalar(expr, mode)? {
            Some(value) => out.push_str(&value),
            None => out.push_str(&text[range.clone()]),
        }
        last = range.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Shorthand for string-only substitution.
pub fn apply_replacements(text: &str, strings: &StringMap) -> String {
    if !has_references(text) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (range, expr) in reference_spans(text) {
        out.push_str(&text[last..range.start]);
        match strings.get(expr) {
            Some(value) => out.push_str(value),
            None => out.push_str(&text[range.clone()]),
        }
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Substitute one element of a sequence field.
///
/// An element that is exactly `$(key)` or `$(key[*])` for an array key expands
/// into the whole array. Any other element yields itself with scalar
/// substitution applied.
pub fn apply_array_replacements(text: &str, repl: &Replacements) -> Vec<String> {
    if let Some(expr) = exact_reference(text)
        && let Some(values) = repl.array(strip_star(expr))
    {
        return values.to_vec();
    }
    vec![substitute(text, repl)]
}

fn substitute_all(items: &[String], repl: &Replacements) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| apply_array_replacements(item, repl))
        .collect()
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

impl ParamValue {
    /// Return a copy of this value with references substituted.
    ///
    /// A string that is exactly one reference to an array or object key takes
    /// that shape. Array elements expand; object attributes only receive
    /// string substitution.
    pub fn apply_replacements(&self, repl: &Replacements) -> ParamValue {
        match self {
            ParamValue::String(s) => {
                if let Some(expr) = exact_reference(s) {
                    let base = strip_star(expr);
                    if let Some(values) = repl.array(base) {
                        return ParamValue::Array(values.to_vec());
                    }
                    if let Some(object) = repl.object(base) {
                        return ParamValue::Object(object.clone());
                    }
                }
                ParamValue::String(substitute(s, repl))
            }
            ParamValue::Array(items) => ParamValue::Array(substitute_all(items, repl)),
            ParamValue::Object(map) => {
                let strings = repl.only_strings();
                ParamValue::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), substitute(v, &strings)))
                        .collect(),
                )
            }
        }
    }

    /// Like [`ParamValue::apply_replacements`] but fails when a reference
    /// in the value cannot be resolved. Only the input is checked; text
    /// inserted by substitution is not rescanned.
    pub fn try_apply_replacements(&self, repl: &Replacements) -> Result<ParamValue> {
        // Exact references that change shape or expand into a sequence.
        let whole: Vec<&str> = match self {
            ParamValue::String(s) => exact_reference(s)
                .filter(|expr| {
                    let base = strip_star(expr);
                    repl.array(base).is_some() || repl.object(base).is_some()
                })
                .into_iter()
                .collect(),
            ParamValue::Array(items) => items
                .iter()
                .filter_map(|item| exact_reference(item))
                .filter(|expr| repl.array(strip_star(expr)).is_some())
                .collect(),
            ParamValue::Object(_) => Vec::new(),
        };
        let scalar = match self {
            ParamValue::Object(_) => repl.only_strings(),
            _ => repl.clone(),
        };
        for expr in self.references() {
            if whole.contains(&expr.as_str()) {
                continue;
            }
            scalar.lookup_scalar(&expr, SubstitutionMode::Strict)?;
        }
        Ok(self.apply_replacements(repl))
    }
}

impl Param {
    pub fn replace_variables(&self, repl: &Replacements) -> Param {
        Param {
            name: self.name.clone(),
            value: self.value.apply_replacements(repl),
        }
    }
}

/// Substitute every parameter in a list.
pub fn replace_params(params: &[Param], repl: &Replacements) -> Vec<Param> {
    params.iter().map(|p| p.replace_variables(repl)).collect()
}

impl WhenExpression {
    /// The input is scalar; values expand array references.
    pub fn replace_variables(&self, repl: &Replacements) -> WhenExpression {
        let scalar = repl.only_strings();
        WhenExpression {
            input: substitute(&self.input, &scalar),
            operator: self.operator.clone(),
            values: substitute_all(&self.values, &repl.without_objects()),
        }
    }
}

/// Substitute every when expression in a list.
pub fn replace_when(when: &[WhenExpression], repl: &Replacements) -> Vec<WhenExpression> {
    when.iter().map(|w| w.replace_variables(repl)).collect()
}

impl Matrix {
    /// Axis values accept string and array substitution. Include
    /// combinations only ever receive strings.
    pub fn replace_variables(&self, repl: &Replacements) -> Matrix {
        let axes = repl.without_objects();
        let strings = repl.only_strings();
        Matrix {
            params: replace_params(&self.params, &axes),
            include: self
                .include
                .iter()
                .map(|inc| IncludeParams {
                    name: inc.name.clone(),
                    params: replace_params(&inc.params, &strings),
                })
                .collect(),
        }
    }
}

impl TaskRef {
    /// Params and name are substituted independently; the name only sees
    /// string replacements.
    pub fn replace_variables(&self, repl: &Replacements) -> TaskRef {
        TaskRef {
            name: substitute(&self.name, &repl.only_strings()),
            kind: self.kind.clone(),
            params: replace_params(&self.params, repl),
        }
    }
}

/// Substitute string references in each task workspace binding's sub-path.
pub fn replace_task_workspaces(
    workspaces: &[WorkspacePipelineTaskBinding],
    repl: &Replacements,
) -> Vec<WorkspacePipelineTaskBinding> {
    let strings = repl.only_strings();
    workspaces
        .iter()
        .map(|ws| WorkspacePipelineTaskBinding {
            sub_path: substitute(&ws.sub_path, &strings),
            ..ws.clone()
        })
        .collect()
}

impl Step {
    pub fn replace_variables(&self, repl: &Replacements) -> Step {
        Step {
            name: substitute(&self.name, repl),
            image: substitute(&self.image, repl),
            command: substitute_all(&self.command, repl),
            args: substitute_all(&self.args, repl),
            script: substitute(&self.script, repl),
            working_dir: substitute(&self.working_dir, repl),
            env: self
                .env
                .iter()
                .map(|e| EnvVar {
                    name: e.name.clone(),
                    value: substitute(&e.value, repl),
                })
                .collect(),
        }
    }
}

impl TaskSpec {
    /// Return a copy of this task body with references substituted in its
    /// steps. Declared params and results are left as declared.
    pub fn replace_variables(&self, repl: &Replacements) -> TaskSpec {
        TaskSpec {
            params: self.params.clone(),
            steps: self
                .steps
                .iter()
                .map(|s| s.replace_variables(repl))
                .collect(),
            results: self.results.clone(),
        }
    }
}

impl WorkspaceBinding {
    /// Substitute string references in the volume-identifying fields.
    pub fn replace_variables(&self, strings: &StringMap) -> WorkspaceBinding {
        let mut binding = self.clone();
        binding.sub_path = apply_replacements(&self.sub_path, strings);
        if let Some(pvc) = binding.persistent_volume_claim.as_mut() {
            pvc.claim_name = apply_replacements(&pvc.claim_name, strings);
        }
        if let Some(cm) = binding.config_map.as_mut() {
            cm.name = apply_replacements(&cm.name, strings);
        }
        if let Some(secret) = binding.secret.as_mut() {
            secret.secret_name = apply_replacements(&secret.secret_name, strings);
        }
        binding
    }
}

/// Substitute every workspace binding in a list.
pub fn replace_workspace_bindings(
    bindings: &[WorkspaceBinding],
    strings: &StringMap,
) -> Vec<WorkspaceBinding> {
    bindings
        .iter()
        .map(|b| b.replace_variables(strings))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ClaimSource, SecretSource};

    fn strings(pairs: &[(&str, &str)]) -> StringMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn arrays(pairs: &[(&str, &[&str])]) -> ArrayMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn test_replacements() -> Replacements {
        let mut objects = ObjectMap::new();
        objects.insert(
            "params.image".into(),
            [("url".to_string(), "registry/app".to_string())]
                .into_iter()
                .collect(),
        );
        Replacements::full(
            strings(&[("params.greeting", "hello"), ("params.image.url", "registry/app")]),
            arrays(&[("params.platforms", &["linux", "darwin"])]),
            objects,
        )
    }

    #[test]
    fn test_string_substitution() {
        let repl = test_replacements();
        assert_eq!(substitute("$(params.greeting), world", &repl), "hello, world");
    }

    #[test]
    fn test_unresolved_left_in_place() {
        let repl = test_replacements();
        assert_eq!(
            substitute("$(params.missing) and $(params.greeting)", &repl),
            "$(params.missing) and hello"
        );
    }

    #[test]
    fn test_single_pass_does_not_rescan() {
        let repl = Replacements::strings_only(strings(&[
            ("params.a", "$(params.b)"),
            ("params.b", "final"),
        ]));
        assert_eq!(substitute("$(params.a)", &repl), "$(params.b)");
    }

    #[test]
    fn test_substitution_is_idempotent() {
        let repl = test_replacements();
        let once = substitute("x $(params.greeting) $(params.unknown) y", &repl);
        let twice = substitute(&once, &repl);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_array_index_via_array_map() {
        let repl = test_replacements();
        assert_eq!(substitute("$(params.platforms[1])", &repl), "darwin");
        assert_eq!(substitute("$(params.platforms[5])", &repl), "$(params.platforms[5])");
    }

    #[test]
    fn test_strict_out_of_bounds_errors() {
        let repl = test_replacements();
        let err = try_substitute("$(params.platforms[5])", &repl).unwrap_err();
        match err {
            PipelineError::OutOfBoundsIndex { index, length, .. } => {
                assert_eq!(index, 5);
                assert_eq!(length, 2);
            }
            other => panic!("Expected OutOfBoundsIndex, got: {other:?}"),
        }
    }

    #[test]
    fn test_strict_unresolved_errors() {
        let repl = test_replacements();
        let err = try_substitute("$(params.missing)", &repl).unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvedReference(ref r) if r == "params.missing"));
        assert_eq!(try_substitute("$(params.greeting)!", &repl).unwrap(), "hello!");
    }

    #[test]
    fn test_splat_in_scalar_context_passes_through() {
        let repl = test_replacements();
        assert_eq!(
            substitute("echo $(params.platforms[*])", &repl),
            "echo $(params.platforms[*])"
        );
        assert_eq!(
            try_substitute("echo $(params.platforms[*])", &repl).unwrap(),
            "echo $(params.platforms[*])"
        );
    }

    #[test]
    fn test_array_expansion_in_sequence() {
        let repl = test_replacements();
        assert_eq!(
            apply_array_replacements("$(params.platforms[*])", &repl),
            vec!["linux", "darwin"]
        );
        assert_eq!(
            apply_array_replacements("$(params.platforms)", &repl),
            vec!["linux", "darwin"]
        );
        assert_eq!(
            apply_array_replacements("--os=$(params.platforms[0])", &repl),
            vec!["--os=linux"]
        );
    }

    #[test]
    fn test_string_value_changes_shape() {
        let repl = test_replacements();
        let value = ParamValue::from("$(params.platforms[*])");
        assert_eq!(
            value.apply_replacements(&repl),
            ParamValue::Array(vec!["linux".into(), "darwin".into()])
        );
        let value = ParamValue::from("$(params.image)");
        let object = value.apply_replacements(&repl);
        assert_eq!(object.as_object().unwrap()["url"], "registry/app");
    }

    #[test]
    fn test_array_value_expands_elements() {
        let repl = test_replacements();
        let value = ParamValue::Array(vec!["first".into(), "$(params.platforms[*])".into()]);
        assert_eq!(
            value.apply_replacements(&repl),
            ParamValue::Array(vec!["first".into(), "linux".into(), "darwin".into()])
        );
    }

    #[test]
    fn test_object_value_gets_strings_only() {
        let repl = test_replacements();
        let value = ParamValue::Object(
            [
                ("greet".to_string(), "$(params.greeting)".to_string()),
                ("all".to_string(), "$(params.platforms[*])".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        let out = value.apply_replacements(&repl);
        let map = out.as_object().unwrap();
        assert_eq!(map["greet"], "hello");
        assert_eq!(map["all"], "$(params.platforms[*])");
    }

    #[test]
    fn test_unsupplied_shape_is_skipped() {
        let repl = test_replacements().only_strings();
        let value = ParamValue::from("$(params.platforms[*])");
        assert_eq!(value.apply_replacements(&repl), value);
        assert_eq!(substitute("$(params.platforms[0])", &repl), "$(params.platforms[0])");
    }

    #[test]
    fn test_try_apply_replacements() {
        let repl = test_replacements();
        let ok = ParamValue::from("$(params.greeting)")
            .try_apply_replacements(&repl)
            .unwrap();
        assert_eq!(ok, ParamValue::from("hello"));

        let err = ParamValue::from("$(params.platforms[3])")
            .try_apply_replacements(&repl)
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutOfBoundsIndex { .. }));

        let err = ParamValue::from("$(tasks.a.results.b)")
            .try_apply_replacements(&repl)
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvedReference(_)));

        let spread = ParamValue::Array(vec!["$(params.platforms[*])".into()])
            .try_apply_replacements(&repl)
            .unwrap();
        assert_eq!(spread.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_try_apply_does_not_rescan_inserted_text() {
        let repl = Replacements::strings_only(strings(&[("params.a", "literal $(not.a.ref)")]));
        let value = ParamValue::from("$(params.a)")
            .try_apply_replacements(&repl)
            .unwrap();
        assert_eq!(value, ParamValue::from("literal $(not.a.ref)"));
    }

    #[test]
    fn test_when_expression() {
        let repl = test_replacements();
        let when = WhenExpression {
            input: "$(params.greeting)".into(),
            operator: "in".into(),
            values: vec!["$(params.platforms[*])".into(), "$(params.greeting)".into()],
        };
        let out = when.replace_variables(&repl);
        assert_eq!(out.input, "hello");
        assert_eq!(out.values, vec!["linux", "darwin", "hello"]);
    }

    #[test]
    fn test_step_substitution() {
        let repl = test_replacements();
        let step = Step {
            name: "build".into(),
            image: "$(params.image.url)".into(),
            args: vec!["--platform".into(), "$(params.platforms[*])".into()],
            script: "echo $(params.greeting)".into(),
            env: vec![EnvVar {
                name: "GREETING".into(),
                value: "$(params.greeting)".into(),
            }],
            ..Default::default()
        };
        let out = step.replace_variables(&repl);
        assert_eq!(out.image, "registry/app");
        assert_eq!(out.args, vec!["--platform", "linux", "darwin"]);
        assert_eq!(out.script, "echo hello");
        assert_eq!(out.env[0].value, "hello");
    }

    #[test]
    fn test_workspace_binding_substitution() {
        let binding = WorkspaceBinding {
            name: "source".into(),
            sub_path: "$(params.dir)".into(),
            persistent_volume_claim: Some(ClaimSource {
                claim_name: "pvc-$(params.dir)".into(),
            }),
            secret: Some(SecretSource {
                secret_name: "$(params.secret)".into(),
            }),
            ..Default::default()
        };
        let out = binding.replace_variables(&strings(&[
            ("params.dir", "src"),
            ("params.secret", "creds"),
        ]));
        assert_eq!(out.sub_path, "src");
        assert_eq!(out.persistent_volume_claim.unwrap().claim_name, "pvc-src");
        assert_eq!(out.secret.unwrap().secret_name, "creds");
        // Input untouched.
        assert_eq!(binding.sub_path, "$(params.dir)");
    }

    #[test]
    fn test_overlay_overwrites_whole_values() {
        let mut base = Replacements::full(
            strings(&[("params.a", "default")]),
            arrays(&[("params.arr", &["x", "y", "z"])]),
            ObjectMap::new(),
        );
        base.overlay(Replacements::strings_only(strings(&[("params.a", "run")])).with_arrays(
            arrays(&[("params.arr", &["q"])]),
        ));
        assert_eq!(base.string("params.a"), Some("run"));
        assert_eq!(base.array("params.arr").unwrap(), ["q".to_string()]);
    }

    #[test]
    fn test_tri_state_accessors() {
        let none = Replacements::none();
        assert!(none.strings.is_none());
        assert!(none.is_empty());
        let empty = Replacements::empty();
        assert!(empty.strings.is_some());
        assert!(empty.is_empty());
        assert!(!empty.contains("params.a"));
    }

    #[test]
    fn test_matrix_and_task_ref() {
        let repl = test_replacements();
        let matrix = Matrix {
            params: vec![Param::new(
                "os",
                vec!["$(params.platforms[*])".to_string()],
            )],
            include: vec![IncludeParams {
                name: "special".into(),
                params: vec![Param::new("os", "$(params.greeting)")],
            }],
        };
        let out = matrix.replace_variables(&repl);
        assert_eq!(out.params[0].value.as_array().unwrap().len(), 2);
        assert_eq!(out.include[0].params[0].value, ParamValue::from("hello"));

        let task_ref = TaskRef {
            name: "$(params.greeting)".into(),
            kind: "Task".into(),
            params: vec![Param::new("img", "$(params.image)")],
        };
        let out = task_ref.replace_variables(&repl);
        assert_eq!(out.name, "hello");
        assert!(out.params[0].value.as_object().is_some());
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn prop_substitution_is_idempotent(
                values in proptest::collection::hash_map("[a-z]{1,6}", "[a-z0-9 ]{0,10}", 0..5),
                template in proptest::collection::vec(
                    prop_oneof!["[a-z ]{0,6}", "[a-z]{1,6}".prop_map(|k| format!("$(params.{k})"))],
                    0..6,
                ),
            ) {
                let strings: StringMap = values
                    .into_iter()
                    .map(|(k, v)| (format!("params.{k}"), v))
                    .collect();
                let repl = Replacements::strings_only(strings);
                let text = template.concat();
                let once = substitute(&text, &repl);
                prop_assert_eq!(substitute(&once, &repl), once);
            }
        }
    }
}
