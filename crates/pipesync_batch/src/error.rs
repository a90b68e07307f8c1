//! Error types for batch operations.

use thiserror::Error;

/// Result type for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;

/// Errors that can occur when building or slicing batches.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A column was requested that the batch does not contain.
    #[error("column not found: {name}")]
    ColumnNotFound {
        /// The missing column name.
        name: String,
    },

    /// Columns in one batch have differing lengths.
    #[error("ragged batch: column {name} has {actual} rows, expected {expected}")]
    RaggedColumns {
        /// The offending column.
        name: String,
        /// Its length.
        actual: usize,
        /// The expected length.
        expected: usize,
    },

    /// A row had the wrong number of values for the batch's columns.
    #[error("row width mismatch: got {actual} values, batch has {expected} columns")]
    RowWidthMismatch {
        /// Values supplied.
        actual: usize,
        /// Columns in the batch.
        expected: usize,
    },

    /// Two batches being appended have different column sets.
    #[error("schema mismatch appending batches: {message}")]
    SchemaMismatch {
        /// Description of the mismatch.
        message: String,
    },
}

impl BatchError {
    /// Creates a column-not-found error.
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound { name: name.into() }
    }

    /// Creates a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }
}
