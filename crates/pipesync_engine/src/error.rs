//! The engine's error taxonomy.
//!
//! Every failure a sync can hit is classified here, because the retry
//! policy keys off the class: configuration problems are terminal,
//! apply failures are retried, coercion problems on value columns are
//! recovered locally while coercion problems on join keys are terminal.

use pipesync_connector::ConnectorError;
use thiserror::Error;

/// Result type for engine internals. The public `sync` surface never
/// returns this; it folds errors into the outcome.
pub type EngineResult<T> = Result<T, EngineError>;

/// A classified sync failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pipe or options are invalid. Never retried.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
    },

    /// The backend could not be reached or rejected the connection.
    #[error("connection error: {message}")]
    Connection {
        /// The backend's message.
        message: String,
        /// Whether a retry could plausibly succeed.
        retryable: bool,
    },

    /// Incoming values could not be coerced to the declared dtypes.
    #[error("coercion error: {message}")]
    Coercion {
        /// What failed to coerce.
        message: String,
    },

    /// A static pipe received data its schema cannot hold.
    #[error("schema conflict on column {column}: {message}")]
    SchemaConflict {
        /// The offending column.
        column: String,
        /// Why it conflicts.
        message: String,
    },

    /// Applying the diff to the target failed. Retried per policy.
    #[error("apply error: {message}")]
    Apply {
        /// The backend's message.
        message: String,
    },

    /// The sync was cancelled from another thread.
    #[error("sync cancelled")]
    Cancelled,
}

impl EngineError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an apply error.
    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
        }
    }

    /// Whether the retry loop should take another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Apply { .. } | Self::Connection { retryable: true, .. }
        )
    }

    /// Classifies a connector failure by what phase it belongs to.
    pub fn from_apply(error: ConnectorError) -> Self {
        match error {
            ConnectorError::Pipe(e) => Self::configuration(e.to_string()),
            ConnectorError::Unsupported { .. } => Self::configuration(error.to_string()),
            ConnectorError::Backend { message, retryable } if !retryable => {
                Self::Connection { message, retryable: false }
            }
            other => Self::Apply {
                message: other.to_string(),
            },
        }
    }

    /// Classifies a connector failure during the fetch phase.
    pub fn from_fetch(error: ConnectorError) -> Self {
        match error {
            ConnectorError::Pipe(e) => Self::configuration(e.to_string()),
            ConnectorError::Unsupported { .. } => Self::configuration(error.to_string()),
            ConnectorError::Backend { message, retryable } => {
                Self::Connection { message, retryable }
            }
            other => Self::Connection {
                message: other.to_string(),
                retryable: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classes() {
        assert!(EngineError::apply("deadlock").is_retryable());
        assert!(EngineError::Connection {
            message: "timeout".into(),
            retryable: true
        }
        .is_retryable());
        assert!(!EngineError::configuration("bad keys").is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
        // Bad data does not get better on retry.
        assert!(!EngineError::Coercion {
            message: "join column id has uncoercible cells".into()
        }
        .is_retryable());
        assert!(!EngineError::SchemaConflict {
            column: "rogue".into(),
            message: "static pipe declares none of the batch's columns".into()
        }
        .is_retryable());
    }

    #[test]
    fn apply_classification() {
        let backend = ConnectorError::backend("duplicate key", true);
        assert!(EngineError::from_apply(backend).is_retryable());

        let unsupported = ConnectorError::unsupported("mem", "hypertables");
        assert!(!EngineError::from_apply(unsupported).is_retryable());
    }
}
