//! Error types for the resolution engine.

use thiserror::Error;

/// Result type for resolution operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while resolving or aggregating pipeline variables.
///
/// Substitution in deferred mode never produces these: an unresolved
/// reference is left in place as literal template text. Only strict
/// substitution, result aggregation and artifact propagation fail.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or unsupported reference shape.
    #[error("Invalid reference '{0}'")]
    InvalidReference(String),

    /// Array index beyond the length of the referenced value.
    #[error("Index {index} out of bounds for '{reference}' (length {length})")]
    OutOfBoundsIndex {
        reference: String,
        index: usize,
        length: usize,
    },

    /// Referenced task or result does not exist and no status was recorded.
    #[error("Result '{result}' of task '{task}' not found")]
    MissingResult { task: String, result: String },

    /// A reference that strict substitution could not resolve.
    #[error("Unresolved reference '$({0})'")]
    UnresolvedReference(String),

    /// One or more declared pipeline results could not be computed.
    #[error("invalid pipeline results {names:?}, the referenced results don't exist")]
    InvalidPipelineResults { names: Vec<String> },

    /// A value could not be encoded for substitution.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A pipeline, run or outcome document could not be parsed.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),
}

impl PipelineError {
    /// Names of the invalid declared results, if this is an aggregation error.
    pub fn invalid_results(&self) -> &[String] {
        match self {
            PipelineError::InvalidPipelineResults { names } => names,
            _ => &[],
        }
    }
}
