//! Variable reference extraction and parsing.
//!
//! Templated fields embed references as `$(expression)`. This module finds
//! those expressions without evaluating them and parses the shapes the
//! resolvers care about.
//!
//! # Reference grammar
//!
//! - `params.<name>`, `params["<name>"]`, `params['<name>']`, with an optional
//!   `[<int>]` or `[*]` suffix, or `.<key>` for object attributes
//! - `context.pipelineRun.name`, `context.pipeline.name`,
//!   `context.pipelineRun.namespace`, `context.pipelineRun.uid`,
//!   `context.pipelineTask.retries`
//! - `tasks.<task>.results.<result>` (or `finally.<task>...`) with an optional
//!   `[<int>]`, `[*]` or `.<key>` suffix
//! - `tasks.<task>.matrix.length`, `tasks.<task>.matrix.<result>.length`
//! - `workspaces.<name>.bound`

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::definition::{Param, ParamValue};
use crate::error::PipelineError;

/// First segment of a reference to a main-graph task.
pub const TASK_PREFIX: &str = "tasks";
/// First segment of a reference to a finally task.
pub const FINALLY_PREFIX: &str = "finally";
/// Third segment of a result reference.
pub const RESULTS_PART: &str = "results";

static VARIABLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(([^()]+)\)").expect("Invalid regex pattern"));

static EXACT_VARIABLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$\(([^()]+)\)$").expect("Invalid regex pattern"));

/// Find every `$(...)` expression in a string.
///
/// Expressions are returned without the `$(`/`)` wrapper, de-duplicated, in
/// the order they first appear.
pub fn extract_references(text: &str) -> Vec<String> {
    if !has_references(text) {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    VARIABLE_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|expr| seen.insert(expr.clone()))
        .collect()
}

/// Cheap check for templated content.
pub fn has_references(text: &str) -> bool {
    text.contains("$(")
}

/// If the whole string is exactly one reference, return its expression.
pub fn exact_reference(text: &str) -> Option<&str> {
    EXACT_VARIABLE_REGEX
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// Iterate over every `$(...)` occurrence with its byte range.
pub(crate) fn reference_spans(text: &str) -> impl Iterator<Item = (std::ops::Range<usize>, &str)> {
    VARIABLE_REGEX.captures_iter(text).filter_map(|cap| {
        let full = cap.get(0)?;
        let inner = cap.get(1)?;
        Some((full.range(), inner.as_str()))
    })
}

/// Trailing `[n]` or `[*]` on a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSuffix {
    Index(usize),
    Splat,
}

/// Split a trailing index or splat off a name.
///
/// `"digest[1]"` → `("digest", Some(Index(1)))`, `"digest[*]"` →
/// `("digest", Some(Splat))`, `"digest"` → `("digest", None)`. A bracket
/// suffix that is neither leaves the name untouched.
pub fn parse_result_name(name: &str) -> (&str, Option<IndexSuffix>) {
    let Some(body) = name.strip_suffix(']') else {
        return (name, None);
    };
    let Some(open) = body.rfind('[') else {
        return (name, None);
    };
    let inner = &body[open + 1..];
    let suffix = if inner == "*" {
        IndexSuffix::Splat
    } else {
        match inner.parse::<usize>() {
            Ok(i) => IndexSuffix::Index(i),
            Err(_) => return (name, None),
        }
    };
    (&body[..open], Some(suffix))
}

/// Drop a trailing `[*]`.
pub fn strip_star(expr: &str) -> &str {
    expr.strip_suffix("[*]").unwrap_or(expr)
}

/// Drop a trailing `[n]` or `[*]`, yielding the base key.
pub fn strip_index(expr: &str) -> &str {
    parse_result_name(expr).0
}

// ---------------------------------------------------------------------------
// Result references
// ---------------------------------------------------------------------------

/// Which kind of task produces a referenced result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultProducer {
    Task,
    Finally,
}

impl ResultProducer {
    pub fn prefix(&self) -> &'static str {
        match self {
            ResultProducer::Task => TASK_PREFIX,
            ResultProducer::Finally => FINALLY_PREFIX,
        }
    }
}

/// What part of a result a reference selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSelector {
    Whole,
    Index(usize),
    Splat,
    Attribute(String),
}

/// A parsed `tasks.<task>.results.<result>[...]` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReference {
    pub producer: ResultProducer,
    pub task: String,
    pub result: String,
    pub selector: ResultSelector,
}

impl ResultReference {
    /// Parse a result reference expression.
    ///
    /// Accepts the 4-segment form `tasks.<t>.results.<r>` (with optional
    /// `[i]`/`[*]`) and the 5-segment attribute form
    /// `tasks.<t>.results.<r>.<key>`. Anything else is an invalid reference.
    pub fn parse(expr: &str) -> Result<Self, PipelineError> {
        let parts: Vec<&str> = expr.split('.').collect();
        if parts.len() < 3 {
            return Err(PipelineError::InvalidReference(expr.to_string()));
        }
        let producer = match parts[0] {
            TASK_PREFIX => ResultProducer::Task,
            FINALLY_PREFIX => ResultProducer::Finally,
            _ => return Err(PipelineError::InvalidReference(expr.to_string())),
        };
        if parts[2] != RESULTS_PART {
            return Err(PipelineError::InvalidReference(expr.to_string()));
        }

        match parts.len() {
            4 => {
                let (result, suffix) = parse_result_name(parts[3]);
                let selector = match suffix {
                    Some(IndexSuffix::Index(i)) => ResultSelector::Index(i),
                    Some(IndexSuffix::Splat) => ResultSelector::Splat,
                    None => ResultSelector::Whole,
                };
                Ok(Self {
                    producer,
                    task: parts[1].to_string(),
                    result: result.to_string(),
                    selector,
                })
            }
            5 => {
                let (result, _) = parse_result_name(parts[3]);
                Ok(Self {
                    producer,
                    task: parts[1].to_string(),
                    result: result.to_string(),
                    selector: ResultSelector::Attribute(parts[4].to_string()),
                })
            }
            _ => Err(PipelineError::InvalidReference(expr.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Matrix context references
// ---------------------------------------------------------------------------

/// A parsed `tasks.<task>.matrix[.<result>].length` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixLengthReference {
    pub task: String,
    /// `None` for the combination count, `Some(result)` for a result fan-out.
    pub result: Option<String>,
}

/// Whether an expression has the matrix-length shape.
pub fn is_matrix_length_reference(expr: &str) -> bool {
    let parts: Vec<&str> = expr.split('.').collect();
    parts.len() >= 4 && parts[2] == "matrix" && parts.last() == Some(&"length")
}

impl MatrixLengthReference {
    pub fn parse(expr: &str) -> Option<Self> {
        if !is_matrix_length_reference(expr) {
            return None;
        }
        let parts: Vec<&str> = expr.split('.').collect();
        match parts.len() {
            4 => Some(Self {
                task: parts[1].to_string(),
                result: None,
            }),
            5 => Some(Self {
                task: parts[1].to_string(),
                result: Some(parts[3].to_string()),
            }),
            _ => None,
        }
    }

    /// The replacement key for the combination count of `task`.
    pub fn count_key(task: &str) -> String {
        format!("{TASK_PREFIX}.{task}.matrix.length")
    }

    /// The replacement key for the fan-out length of `result` of `task`.
    pub fn result_key(task: &str, result: &str) -> String {
        format!("{TASK_PREFIX}.{task}.matrix.{result}.length")
    }
}

// ---------------------------------------------------------------------------
// Expressions carried by values
// ---------------------------------------------------------------------------

impl ParamValue {
    /// All expressions referenced by this value, in first-seen order.
    pub fn references(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let texts: Vec<&str> = match self {
            ParamValue::String(s) => vec![s.as_str()],
            ParamValue::Array(items) => items.iter().map(String::as_str).collect(),
            ParamValue::Object(map) => map.values().map(String::as_str).collect(),
        };
        for text in texts {
            for expr in extract_references(text) {
                if seen.insert(expr.clone()) {
                    out.push(expr);
                }
            }
        }
        out
    }
}

impl Param {
    pub fn references(&self) -> Vec<String> {
        self.value.references()
    }
}
