//! Results command - fold a finished run into the pipeline's declared results.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use sluice_config::OutputFormat;
use sluice_pipeline::{
    PipelineFile, PipelineResult, PipelineRunResult, ResultAggregator, RunOutcome,
    StatusConvention, load_document,
};

use super::{Context, render};

/// Arguments for the results command.
#[derive(Args, Debug)]
pub struct ResultsArgs {
    /// Pipeline document (TOML, YAML or JSON)
    #[arg(short, long)]
    pub pipeline: PathBuf,

    /// Outcome document: task results, custom run results and statuses
    #[arg(short, long)]
    pub outcome: PathBuf,

    /// Output format (yaml, json, toml)
    #[arg(short, long)]
    pub format: Option<OutputFormat>,
}

#[derive(Serialize)]
struct ResultsDocument<'a> {
    results: &'a [PipelineRunResult],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    invalid: &'a [String],
}

/// Run the results command.
pub fn run(args: ResultsArgs, ctx: &Context) -> Result<()> {
    let file = PipelineFile::from_file(&args.pipeline)
        .with_context(|| format!("loading pipeline {}", args.pipeline.display()))?;
    let outcome: RunOutcome = load_document(&args.outcome)
        .with_context(|| format!("loading outcome {}", args.outcome.display()))?;

    let resolver = ctx.config.resolver();
    let convention = StatusConvention {
        prefix: resolver.status_prefix,
        suffix: resolver.status_suffix,
        succeeded: resolver.succeeded_status,
    };

    let aggregated = ResultAggregator::new(&outcome, &convention).aggregate(&file.spec.results);
    info!(
        "Pipeline '{}': {} of {} declared results resolved",
        file.name,
        aggregated.results.len(),
        file.spec.results.len()
    );

    let results = with_literal_results(&file.spec.results, &aggregated.results);
    let document = ResultsDocument {
        results: &results,
        invalid: aggregated.invalid(),
    };
    let output = render(&document, ctx.output_format(args.format))?;
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }

    if ctx.verbose {
        let skipped = file
            .spec
            .results
            .len()
            .saturating_sub(results.len() + document.invalid.len());
        eprintln!("{skipped} result(s) dropped");
    }

    match aggregated.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Declared results in declaration order: literal values as written,
/// templated ones only when the aggregator resolved them.
fn with_literal_results(
    declared: &[PipelineResult],
    resolved: &[PipelineRunResult],
) -> Vec<PipelineRunResult> {
    declared
        .iter()
        .filter_map(|result| {
            if result.value.references().is_empty() {
                return Some(PipelineRunResult {
                    name: result.name.clone(),
                    value: result.value.clone(),
                });
            }
            resolved.iter().find(|r| r.name == result.name).cloned()
        })
        .collect()
}
