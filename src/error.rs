//! Error taxonomy for report generation.
//!
//! Only construction-time misuse and output I/O are fatal. Data-quality
//! problems are recovered during coercion and never surface here, and a
//! failing analysis is downgraded to an error record by the dispatcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the report pipeline.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Neither a CSV source nor an in-memory table was supplied.
    #[error("either a CSV path or a table must be provided")]
    MissingInput,

    /// A column required by the schema (or requested by an analysis) is absent.
    #[error("missing column: '{column}'")]
    MissingColumn { column: String },

    /// A column exists but holds a different kind of data than requested.
    #[error("column '{column}' is not of kind {expected}")]
    ColumnKind {
        column: String,
        expected: &'static str,
    },

    /// The input source could not be opened or read as CSV.
    #[error("failed to read input {}: {source}", path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// An analysis operation failed; carried as an error record, never fatal.
    #[error("analysis '{id}' failed: {message}")]
    AnalysisFailure { id: String, message: String },

    /// The final document could not be persisted.
    #[error("failed to write report to {}: {source}", path.display())]
    OutputWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured module name does not match any domain.
    #[error("unknown analysis module: '{0}'")]
    UnknownDomain(String),
}

impl LedgerError {
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }
}
