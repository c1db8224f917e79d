//! Error types for model contracts.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by the data-contract layer.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A composite key could not be built or parsed.
    #[error("invalid composite key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },

    /// A table schema failed registration-time validation.
    #[error("invalid schema for table {table}: {message}")]
    InvalidSchema {
        /// The offending table.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// Stored bytes did not decode into a well-formed fragment.
    #[error("malformed fragment: {message}")]
    MalformedFragment {
        /// Description of the problem.
        message: String,
    },

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed fragment error.
    pub fn malformed_fragment(message: impl Into<String>) -> Self {
        Self::MalformedFragment {
            message: message.into(),
        }
    }
}
