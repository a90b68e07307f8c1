//! Error types for connector operations.

use pipesync_batch::BatchError;
use pipesync_core::PipeError;
use pipesync_sql::SqlBuildError;
use thiserror::Error;

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors that can occur talking to an instance or source connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The connector does not implement this operation.
    ///
    /// Capability gaps surface as this variant rather than a silent
    /// no-op, so callers can distinguish "did nothing" from "cannot".
    #[error("{connector} does not support {operation}")]
    Unsupported {
        /// The unimplemented operation.
        operation: String,
        /// The connector that lacks it.
        connector: String,
    },

    /// No pipe is registered under the given keys.
    #[error("pipe {keys} is not registered")]
    PipeNotFound {
        /// The looked-up keys.
        keys: String,
    },

    /// A pipe is already registered under the given keys.
    #[error("pipe {keys} is already registered")]
    AlreadyRegistered {
        /// The conflicting keys.
        keys: String,
    },

    /// The backend rejected a statement or returned malformed data.
    #[error("backend error: {message}")]
    Backend {
        /// The backend's message.
        message: String,
        /// Whether retrying the operation could succeed.
        retryable: bool,
    },

    /// The pipe definition itself is invalid.
    #[error(transparent)]
    Pipe(#[from] PipeError),

    /// A batch operation failed.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// A statement could not be rendered.
    #[error(transparent)]
    Sql(#[from] SqlBuildError),

    /// The persisted parameter document could not be parsed.
    #[error("malformed parameter document: {0}")]
    Document(#[from] serde_json::Error),
}

impl ConnectorError {
    /// Creates an unsupported-operation error.
    pub fn unsupported(connector: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            connector: connector.into(),
        }
    }

    /// Creates a pipe-not-found error.
    pub fn pipe_not_found(keys: impl ToString) -> Self {
        Self::PipeNotFound {
            keys: keys.to_string(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>, retryable: bool) -> Self {
        Self::Backend {
            message: message.into(),
            retryable,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { retryable: true, .. })
    }
}
