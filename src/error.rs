//! Error taxonomy for the model lifecycle core
//!
//! "No model yet" and "not enough data" are not errors; they are reported as
//! `PredictionResult::Unavailable` and `TrainOutcome::Skipped`. Everything in
//! here is either a caller input problem or a storage problem.

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Result alias used by the lifecycle core
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// What was wrong with a single input field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    NotNumeric,
    NotFinite,
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing => write!(f, "is required"),
            FieldProblem::NotNumeric => write!(f, "must be a number"),
            FieldProblem::NotFinite => write!(f, "must be a finite number"),
        }
    }
}

/// Malformed or missing input fields
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{}field '{field}' {problem}", record_prefix(.record))]
    Field {
        /// Position of the offending record inside a batch, if any
        record: Option<usize>,
        field: String,
        problem: FieldProblem,
    },
    #[error("{}expected a JSON object", record_prefix(.record))]
    NotAnObject { record: Option<usize> },
    #[error("expected a JSON array of records")]
    NotAnArray,
}

fn record_prefix(record: &Option<usize>) -> String {
    match record {
        Some(idx) => format!("record {}: ", idx),
        None => String::new(),
    }
}

impl ValidationError {
    pub fn field(record: Option<usize>, field: &str, problem: FieldProblem) -> Self {
        ValidationError::Field {
            record,
            field: field.to_string(),
            problem,
        }
    }

    /// Attach a batch position to an error raised for a single record
    pub fn at_record(self, idx: usize) -> Self {
        match self {
            ValidationError::Field { field, problem, .. } => ValidationError::Field {
                record: Some(idx),
                field,
                problem,
            },
            ValidationError::NotAnObject { .. } => ValidationError::NotAnObject { record: Some(idx) },
            other => other,
        }
    }
}

/// Errors raised by the buffer store, trainer, registry and prediction engine
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage failure while {context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("training buffer is corrupt at line {line}: {reason}")]
    CorruptBuffer { line: usize, reason: String },

    #[error("model artifact is corrupt: {0}")]
    CorruptArtifact(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LifecycleError {
    /// Wrap an I/O error with a short description of the operation and path
    pub fn io(action: &str, path: &Path, source: std::io::Error) -> Self {
        LifecycleError::Persistence {
            context: format!("{} {}", action, path.display()),
            source,
        }
    }

    /// True when the caller sent bad input and can fix it by retrying
    pub fn is_caller_error(&self) -> bool {
        matches!(self, LifecycleError::Validation(_))
    }
}
