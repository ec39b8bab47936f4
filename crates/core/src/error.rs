//! Error types for the bid-reconciliation system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bid-reconciliation system.
///
/// Values that cannot be computed (zero denominators, missing bids) are not
/// errors; they are carried as `None` through statistics and aggregates.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (missing fields, non-numeric amount, bad argument).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation would violate a uniqueness or reference constraint.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// One item of a batch failed; the whole batch was rolled back.
    #[error("Row {row} failed: {source}")]
    RowFailed {
        /// Zero-based index of the failing item in the submitted batch.
        row: usize,
        /// The item's own error.
        #[source]
        source: Box<Error>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence collaborator error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Wrap an error with the index of the batch item that produced it.
    pub fn at_row(row: usize, source: Error) -> Self {
        Error::RowFailed {
            row,
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through `RowFailed` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::RowFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the root cause is a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }

    /// Whether the root cause is a constraint conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), Error::Conflict(_))
    }

    /// Whether the root cause is malformed input.
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Error::Validation(_))
    }

    /// Index of the failing batch item, if this error came from a batch.
    pub fn failed_row(&self) -> Option<usize> {
        match self {
            Error::RowFailed { row, .. } => Some(*row),
            _ => None,
        }
    }
}
