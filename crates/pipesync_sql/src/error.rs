//! Error types for query building.

use thiserror::Error;

/// Result type for query building.
pub type SqlBuildResult<T> = Result<T, SqlBuildError>;

/// Errors that can occur while rendering SQL.
///
/// These are structural problems with the request, not backend errors:
/// the builder never talks to a database.
#[derive(Debug, Error)]
pub enum SqlBuildError {
    /// The batch has no rows to render.
    #[error("cannot build statement from an empty batch")]
    EmptyBatch,

    /// No join columns were resolved for an operation that needs them.
    #[error("no join columns available for {operation}")]
    NoJoinColumns {
        /// The operation that needed a key.
        operation: String,
    },

    /// No non-key columns exist to update.
    #[error("no value columns to update on {table}")]
    NoValueColumns {
        /// The target table.
        table: String,
    },

    /// A column referenced by the operation is missing from the batch.
    #[error("column {column} not present in batch")]
    MissingColumn {
        /// The missing column.
        column: String,
    },
}

impl SqlBuildError {
    /// Creates a no-join-columns error.
    pub fn no_join_columns(operation: impl Into<String>) -> Self {
        Self::NoJoinColumns {
            operation: operation.into(),
        }
    }
}
