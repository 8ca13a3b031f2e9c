//! Error types for tablesync-core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using tablesync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tablesync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Row not found
    #[error("Row not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Column metadata was requested for a batch with no rows
    #[error("Precondition failed: cannot resolve columns of an empty `{0}` batch")]
    EmptyBatch(&'static str),

    /// A store operation outlived its configured timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was running when the deadline passed
        operation: &'static str,
        /// The configured deadline
        after: Duration,
    },
}
