//! In-memory ledger for testing.

use crate::backend::{LedgerBackend, PagedRecords};
use crate::error::{LedgerError, LedgerResult};
use crate::scope::Scope;
use crate::selector::Selector;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// An in-memory partitioned ledger.
///
/// Each scope is an independent ordered key/value map. This backend is
/// suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral engines that don't need a real ledger
///
/// Values queried through a selector must be JSON documents; raw put/get
/// accepts arbitrary bytes.
///
/// # Thread Safety
///
/// The ledger is thread-safe and can be shared across threads behind an
/// `Arc`.
///
/// # Example
///
/// ```rust
/// use tessera_ledger::{InMemoryLedger, LedgerBackend, Scope};
///
/// let ledger = InMemoryLedger::new();
/// ledger.put_record(&Scope::WorldState, "k", b"v".to_vec()).unwrap();
/// assert_eq!(
///     ledger.get_record(&Scope::WorldState, "k").unwrap(),
///     Some(b"v".to_vec()),
/// );
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    scopes: RwLock<HashMap<Scope, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records in a scope.
    ///
    /// Useful for asserting fragment placement in tests.
    #[must_use]
    pub fn record_count(&self, scope: &Scope) -> usize {
        self.scopes
            .read()
            .get(scope)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Returns every key currently stored in a scope, in order.
    #[must_use]
    pub fn keys(&self, scope: &Scope) -> Vec<String> {
        self.scopes
            .read()
            .get(scope)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Clears all scopes.
    pub fn clear(&self) {
        self.scopes.write().clear();
    }

    fn decode(scope: &Scope, key: &str, value: &[u8]) -> LedgerResult<Value> {
        serde_json::from_slice(value)
            .map_err(|_| LedgerError::corrupt_record(scope.to_string(), key))
    }
}

impl LedgerBackend for InMemoryLedger {
    fn put_record(&self, scope: &Scope, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        let mut scopes = self.scopes.write();
        scopes
            .entry(scope.clone())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn get_record(&self, scope: &Scope, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self
            .scopes
            .read()
            .get(scope)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn delete_record(&self, scope: &Scope, key: &str) -> LedgerResult<bool> {
        let mut scopes = self.scopes.write();
        Ok(scopes
            .get_mut(scope)
            .and_then(|records| records.remove(key))
            .is_some())
    }

    fn query_records(
        &self,
        scope: &Scope,
        selector: &Selector,
    ) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        let scopes = self.scopes.read();
        let Some(records) = scopes.get(scope) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for (key, value) in records {
            let doc = Self::decode(scope, key, value)?;
            if selector.matches(&doc) {
                matched.push((key.clone(), value.clone()));
            }
        }
        Ok(matched)
    }

    fn query_records_paged(
        &self,
        scope: &Scope,
        selector: &Selector,
        page_size: usize,
        bookmark: Option<&str>,
    ) -> LedgerResult<PagedRecords> {
        let scopes = self.scopes.read();
        let Some(records) = scopes.get(scope) else {
            return Ok(PagedRecords {
                records: Vec::new(),
                next_bookmark: None,
            });
        };

        let mut page = Vec::new();
        for (key, value) in records {
            // Resume strictly after the bookmark key.
            if bookmark.is_some_and(|mark| key.as_str() <= mark) {
                continue;
            }
            if page.len() == page_size {
                break;
            }
            let doc = Self::decode(scope, key, value)?;
            if selector.matches(&doc) {
                page.push((key.clone(), value.clone()));
            }
        }

        let next_bookmark = page.last().map(|(key, _)| key.clone());
        Ok(PagedRecords {
            records: page,
            next_bookmark,
        })
    }
}
