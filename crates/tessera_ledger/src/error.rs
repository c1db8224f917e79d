//! Error types for ledger backends.

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur at the host-ledger boundary.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The selector could not be interpreted by this backend.
    #[error("malformed selector: {message}")]
    MalformedSelector {
        /// Description of what was wrong with the selector.
        message: String,
    },

    /// The backend does not support native paginated queries.
    #[error("paginated queries not supported by this backend")]
    PaginationUnsupported,

    /// A stored value could not be decoded as a JSON document.
    #[error("corrupt record in scope {scope} at key {key:?}")]
    CorruptRecord {
        /// The scope holding the record.
        scope: String,
        /// The record key.
        key: String,
    },

    /// The backend failed for a reason outside Tessera's control.
    #[error("backend failure: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl LedgerError {
    /// Creates a malformed selector error.
    pub fn malformed_selector(message: impl Into<String>) -> Self {
        Self::MalformedSelector {
            message: message.into(),
        }
    }

    /// Creates a corrupt record error.
    pub fn corrupt_record(scope: impl Into<String>, key: impl Into<String>) -> Self {
        Self::CorruptRecord {
            scope: scope.into(),
            key: key.into(),
        }
    }

    /// Creates a backend failure error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
