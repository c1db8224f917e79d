//! Error types for the routing engine.

use tessera_ledger::LedgerError;
use tessera_model::ModelError;
use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Tessera engine operations.
///
/// Validation and authorization failures are raised before any write (fail
/// fast). Ledger conflict/not-found propagate unchanged, except for the
/// best-effort mirror and segregation deletes, which treat "already absent"
/// as success.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Create on a key that already exists.
    #[error("record already exists: table {table}, key {key}")]
    Conflict {
        /// The table written.
        table: String,
        /// The conflicting primary key.
        key: String,
    },

    /// Read/update/delete on an absent key.
    #[error("record not found: table {table}, key {key}")]
    NotFound {
        /// The table read.
        table: String,
        /// The missing primary key.
        key: String,
    },

    /// A collection resolver produced no name.
    #[error("no collection resolved for field {field} in table {table}")]
    InvalidCollection {
        /// The table being planned.
        table: String,
        /// The field whose resolver failed.
        field: String,
    },

    /// Org or role policy failure.
    #[error("authorization failure: {message}")]
    Authorization {
        /// Description of the policy violation.
        message: String,
    },

    /// Pre-write field validation failure.
    #[error("validation failure: {message}")]
    Validation {
        /// Description of the invalid input.
        message: String,
    },

    /// Unexpected failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },

    /// Host-ledger failure.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Data-contract failure.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a conflict error.
    pub fn conflict(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Conflict {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates an invalid-collection error.
    pub fn invalid_collection(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidCollection {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Creates an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
