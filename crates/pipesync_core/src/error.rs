//! Error types for the pipe model.

use thiserror::Error;

/// Result type for pipe model operations.
pub type PipeResult<T> = Result<T, PipeError>;

/// Errors that can occur building or mutating pipes.
#[derive(Debug, Error)]
pub enum PipeError {
    /// A required column role is missing.
    #[error("missing required column role: {role}")]
    MissingColumn {
        /// The missing role name.
        role: String,
    },

    /// A role that must be unique was declared twice.
    #[error("duplicate column role: {role} already maps to {existing}")]
    DuplicateRole {
        /// The role name.
        role: String,
        /// The column it already maps to.
        existing: String,
    },

    /// A dtype change would narrow the stored type.
    #[error("refusing to narrow column {column} from {from} to {to}")]
    DtypeNarrowing {
        /// The column.
        column: String,
        /// The stored dtype.
        from: String,
        /// The rejected incoming dtype.
        to: String,
    },

    /// The identity keys are malformed.
    #[error("invalid pipe keys: {message}")]
    InvalidKeys {
        /// Description of the problem.
        message: String,
    },

    /// The parameter document failed to (de)serialize.
    #[error("parameter document error: {0}")]
    Document(#[from] serde_json::Error),
}

impl PipeError {
    /// Creates a missing-column error.
    pub fn missing_column(role: impl Into<String>) -> Self {
        Self::MissingColumn { role: role.into() }
    }

    /// Creates an invalid-keys error.
    pub fn invalid_keys(message: impl Into<String>) -> Self {
        Self::InvalidKeys {
            message: message.into(),
        }
    }
}
