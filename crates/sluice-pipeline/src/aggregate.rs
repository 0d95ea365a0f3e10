//! Folding task results into the pipeline's declared results.
//!
//! Each declared result is classified on its own:
//!
//! - **valid**: every reference resolved; the value is substituted and emitted
//! - **skipped**: a reference points at a producer that finished without
//!   succeeding; the result is dropped without being reported
//! - **invalid**: a reference is malformed, out of bounds or points at a
//!   result that does not exist; the result is dropped and named in the error
//!
//! Results that did resolve are always returned, even when others are invalid.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::definition::{ParamValue, PipelineResult, PipelineRunResult};
use crate::error::PipelineError;
use crate::matrix::ResolutionPass;
use crate::reference::{ResultReference, ResultSelector, strip_star};
use crate::state::{CustomRunResult, RunState, TaskRunResult};
use crate::substitution::Replacements;

/// How completion statuses are keyed and which status means success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusConvention {
    pub prefix: String,
    pub suffix: String,
    pub succeeded: String,
}

impl Default for StatusConvention {
    fn default() -> Self {
        Self {
            prefix: "tasks.".to_string(),
            suffix: ".status".to_string(),
            succeeded: "Succeeded".to_string(),
        }
    }
}

impl StatusConvention {
    /// Status key of a task: `<prefix><task><suffix>`.
    pub fn key(&self, task: &str) -> String {
        format!("{}{}{}", self.prefix, task, self.suffix)
    }
}

/// Everything the aggregator reads about a finished run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// Task name → results of its run.
    #[serde(default)]
    pub task_results: HashMap<String, Vec<TaskRunResult>>,

    /// Task name → results of its custom run.
    #[serde(default)]
    pub custom_results: HashMap<String, Vec<CustomRunResult>>,

    /// Status key → status.
    #[serde(default)]
    pub statuses: HashMap<String, String>,
}

impl RunOutcome {
    /// Collect an outcome from run state.
    pub fn from_state(state: &RunState, convention: &StatusConvention) -> Self {
        let mut pass = ResolutionPass::new(state);
        Self {
            task_results: pass.task_runs_results(),
            custom_results: state.custom_runs_results(),
            statuses: state.task_statuses(convention),
        }
    }
}

/// Output of aggregation: the resolved results plus, when any declared result
/// was invalid, an error naming them.
#[derive(Debug, Default)]
pub struct AggregatedResults {
    pub results: Vec<PipelineRunResult>,
    pub error: Option<PipelineError>,
}

impl AggregatedResults {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Names of the invalid declared results.
    pub fn invalid(&self) -> &[String] {
        self.error
            .as_ref()
            .map(PipelineError::invalid_results)
            .unwrap_or_default()
    }
}

enum Resolution {
    Resolved,
    Skipped,
    Invalid(PipelineError),
}

/// Resolves declared results against a run outcome.
pub struct ResultAggregator<'a> {
    outcome: &'a RunOutcome,
    convention: &'a StatusConvention,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(outcome: &'a RunOutcome, convention: &'a StatusConvention) -> Self {
        Self {
            outcome,
            convention,
        }
    }

    /// Classify and resolve every declared result.
    ///
    /// Declared results without references are skipped. Resolved references
    /// are memoized across all declared results of the call.
    pub fn aggregate(&self, declared: &[PipelineResult]) -> AggregatedResults {
        let mut repl = Replacements::empty();
        let mut results = Vec::new();
        let mut invalid: Vec<String> = Vec::new();

        for result in declared {
            let variables = result.value.references();
            if variables.is_empty() {
                continue;
            }

            let mut valid = true;
            for variable in &variables {
                if repl.contains(variable) {
                    continue;
                }
                match self.resolve(variable, &mut repl) {
                    Resolution::Resolved => trace!("Resolved $({variable})"),
                    Resolution::Skipped => {
                        debug!(
                            "Dropping result '{}': producer of $({variable}) did not succeed",
                            result.name
                        );
                        valid = false;
                    }
                    Resolution::Invalid(reason) => {
                        warn!("Pipeline result '{}' is invalid: {reason}", result.name);
                        valid = false;
                        if !invalid.contains(&result.name) {
                            invalid.push(result.name.clone());
                        }
                    }
                }
            }

            if valid {
                results.push(PipelineRunResult {
                    name: result.name.clone(),
                    value: result.value.apply_replacements(&repl),
                });
            }
        }

        debug!(
            "Aggregated {} of {} declared results ({} invalid)",
            results.len(),
            declared.len(),
            invalid.len()
        );
        AggregatedResults {
            results,
            error: (!invalid.is_empty())
                .then_some(PipelineError::InvalidPipelineResults { names: invalid }),
        }
    }

    fn resolve(&self, variable: &str, repl: &mut Replacements) -> Resolution {
        let reference = match ResultReference::parse(variable) {
            Ok(reference) => reference,
            Err(e) => return Resolution::Invalid(e),
        };

        if let ResultSelector::Attribute(key) = &reference.selector {
            return match self.task_result(&reference) {
                Some(value) => match value.as_object().and_then(|o| o.get(key)) {
                    Some(attribute) => {
                        repl.strings_mut()
                            .insert(variable.to_string(), attribute.clone());
                        Resolution::Resolved
                    }
                    None => Resolution::Invalid(PipelineError::MissingResult {
                        task: reference.task.clone(),
                        result: format!("{}.{key}", reference.result),
                    }),
                },
                None => self.missing(&reference),
            };
        }

        if let Some(value) = self.task_result(&reference) {
            match value {
                ParamValue::String(s) => {
                    repl.strings_mut().insert(variable.to_string(), s.clone());
                }
                ParamValue::Array(items) => {
                    // Without a suffix an array result reads as its first element.
                    let index = match reference.selector {
                        ResultSelector::Splat => {
                            repl.arrays_mut()
                                .insert(strip_star(variable).to_string(), items.clone());
                            return Resolution::Resolved;
                        }
                        ResultSelector::Index(i) => i,
                        _ => 0,
                    };
                    match items.get(index) {
                        Some(item) => {
                            repl.strings_mut()
                                .insert(variable.to_string(), item.clone());
                        }
                        None => {
                            return Resolution::Invalid(PipelineError::OutOfBoundsIndex {
                                reference: strip_star(variable).to_string(),
                                index,
                                length: items.len(),
                            });
                        }
                    }
                }
                ParamValue::Object(map) => {
                    repl.objects_mut()
                        .insert(strip_star(variable).to_string(), map.clone());
                }
            }
            return Resolution::Resolved;
        }

        if let Some(value) = self.custom_result(&reference) {
            repl.strings_mut()
                .insert(variable.to_string(), value.to_string());
            return Resolution::Resolved;
        }

        self.missing(&reference)
    }

    /// A producer that finished without succeeding is skipped. Anything else,
    /// including an unknown status, is a missing result.
    fn missing(&self, reference: &ResultReference) -> Resolution {
        let key = self.convention.key(&reference.task);
        match self.outcome.statuses.get(&key) {
            Some(status) if *status != self.convention.succeeded => Resolution::Skipped,
            _ => Resolution::Invalid(PipelineError::MissingResult {
                task: reference.task.clone(),
                result: reference.result.clone(),
            }),
        }
    }

    fn task_result(&self, reference: &ResultReference) -> Option<&'a ParamValue> {
        self.outcome
            .task_results
            .get(&reference.task)?
            .iter()
            .find(|r| r.name == reference.result)
            .map(|r| &r.value)
    }

    fn custom_result(&self, reference: &ResultReference) -> Option<&'a str> {
        self.outcome
            .custom_results
            .get(&reference.task)?
            .iter()
            .find(|r| r.name == reference.result)
            .map(|r| r.value.as_str())
    }
}

/// Resolve declared pipeline results against a run outcome using the
/// default status convention.
pub fn apply_task_results_to_pipeline_results(
    declared: &[PipelineResult],
    outcome: &RunOutcome,
) -> AggregatedResults {
    ResultAggregator::new(outcome, &StatusConvention::default()).aggregate(declared)
}
