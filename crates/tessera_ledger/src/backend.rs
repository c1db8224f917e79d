//! Ledger backend trait definition.

use crate::error::LedgerResult;
use crate::scope::Scope;
use crate::selector::Selector;

/// Records returned by a paginated query, plus the resume cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedRecords {
    /// `(key, value)` pairs in ascending key order.
    pub records: Vec<(String, Vec<u8>)>,
    /// Opaque cursor resuming the query after the last returned record.
    ///
    /// `None` when the backend returned nothing for this page.
    pub next_bookmark: Option<String>,
}

/// A partitioned key/value host ledger.
///
/// Backends are **opaque byte stores** addressed by [`Scope`] and string
/// key. They provide simple put/get/delete/query operations. Tessera owns
/// all record interpretation - backends do not understand fragments,
/// composite keys, or segregation.
///
/// # Invariants
///
/// - `get_record` returns exactly the bytes previously written at that
///   `(scope, key)`, or `None` if absent
/// - Keys within a scope are ordered lexicographically for range and
///   paginated scans
/// - Within one logical invocation, a write followed by a read of the same
///   `(scope, key)` observes the write
/// - Backends must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::InMemoryLedger`] - For testing and ephemeral use
pub trait LedgerBackend: Send + Sync {
    /// Writes `value` under `key` in `scope`, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn put_record(&self, scope: &Scope, key: &str, value: Vec<u8>) -> LedgerResult<()>;

    /// Reads the value under `key` in `scope`.
    ///
    /// Returns `None` if the key is absent. Absence is not an error at this
    /// layer; the routing engine decides whether it is.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn get_record(&self, scope: &Scope, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    /// Deletes the value under `key` in `scope`.
    ///
    /// Returns `true` if a value was present and removed, `false` if the
    /// key was already absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn delete_record(&self, scope: &Scope, key: &str) -> LedgerResult<bool>;

    /// Returns every record in `scope` matching `selector`, in ascending
    /// key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector cannot be interpreted or the
    /// backend fails.
    fn query_records(
        &self,
        scope: &Scope,
        selector: &Selector,
    ) -> LedgerResult<Vec<(String, Vec<u8>)>>;

    /// Returns up to `page_size` records matching `selector`, resuming
    /// after `bookmark`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PaginationUnsupported`](crate::LedgerError)
    /// if the backend has no native cursor support, in which case callers
    /// fall back to emulated pagination.
    fn query_records_paged(
        &self,
        scope: &Scope,
        selector: &Selector,
        page_size: usize,
        bookmark: Option<&str>,
    ) -> LedgerResult<PagedRecords>;

    /// Whether this backend supports `query_records_paged`.
    fn supports_native_pagination(&self) -> bool {
        true
    }
}
