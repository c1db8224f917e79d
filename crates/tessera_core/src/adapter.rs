//! Scope-bound ledger adapter.

use crate::context::InvocationContext;
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;
use tessera_ledger::{LedgerBackend, Scope, Selector};
use tessera_model::{CompositeKey, StoredFragment};
use tracing::trace;

/// Fragments returned by a native paginated query.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedFragments {
    /// Decoded fragments in ascending key order.
    pub docs: Vec<StoredFragment>,
    /// Cursor resuming after the last returned fragment.
    pub next_bookmark: Option<String>,
}

/// Uniform create/read/update/delete/query over one scope.
///
/// An adapter binds a shared ledger backend to a single [`Scope`] - world
/// state or one named collection. Composite keys are built identically
/// regardless of scope, so switching a field's scope never changes its key
/// shape. Every successful write or delete is appended to the invocation's
/// write log, which the sequence replicator and audit recorder consume.
#[derive(Clone)]
pub struct LedgerAdapter {
    ledger: Arc<dyn LedgerBackend>,
    scope: Scope,
}

impl std::fmt::Debug for LedgerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerAdapter")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl LedgerAdapter {
    /// Creates an adapter over world state.
    #[must_use]
    pub fn world(ledger: Arc<dyn LedgerBackend>) -> Self {
        Self {
            ledger,
            scope: Scope::WorldState,
        }
    }

    /// Creates an adapter over one named collection.
    pub fn collection(ledger: Arc<dyn LedgerBackend>, name: impl Into<String>) -> Self {
        Self {
            ledger,
            scope: Scope::collection(name),
        }
    }

    /// Returns the scope this adapter writes to.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    fn ledger_key(table: &str, key: &str) -> CoreResult<String> {
        Ok(CompositeKey::single(table, key)?.encode())
    }

    fn write(&self, ctx: &mut InvocationContext, fragment: &StoredFragment) -> CoreResult<()> {
        let ledger_key = Self::ledger_key(fragment.table(), fragment.key())?;
        self.ledger
            .put_record(&self.scope, &ledger_key, fragment.to_bytes()?)?;
        ctx.write_log_mut()
            .record(self.scope.clone(), fragment.table(), fragment.key());
        trace!(
            scope = %self.scope,
            table = fragment.table(),
            key = fragment.key(),
            "fragment written"
        );
        Ok(())
    }

    /// Stores a fragment under a fresh key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if the key already exists in this
    /// scope.
    pub fn create(&self, ctx: &mut InvocationContext, fragment: &StoredFragment) -> CoreResult<()> {
        let ledger_key = Self::ledger_key(fragment.table(), fragment.key())?;
        if self.ledger.get_record(&self.scope, &ledger_key)?.is_some() {
            return Err(CoreError::conflict(fragment.table(), fragment.key()));
        }
        self.write(ctx, fragment)
    }

    /// Replaces a fragment that must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the key is absent in this scope.
    pub fn update(&self, ctx: &mut InvocationContext, fragment: &StoredFragment) -> CoreResult<()> {
        let ledger_key = Self::ledger_key(fragment.table(), fragment.key())?;
        if self.ledger.get_record(&self.scope, &ledger_key)?.is_none() {
            return Err(CoreError::not_found(fragment.table(), fragment.key()));
        }
        self.write(ctx, fragment)
    }

    /// Stores a fragment unconditionally.
    ///
    /// Used for counter replication and mirror copies, where the previous
    /// presence of the key is irrelevant.
    pub fn put(&self, ctx: &mut InvocationContext, fragment: &StoredFragment) -> CoreResult<()> {
        self.write(ctx, fragment)
    }

    /// Reads a fragment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the key is absent in this scope.
    pub fn read(&self, table: &str, key: &str) -> CoreResult<StoredFragment> {
        self.try_read(table, key)?
            .ok_or_else(|| CoreError::not_found(table, key))
    }

    /// Reads a fragment, returning `None` if absent.
    pub fn try_read(&self, table: &str, key: &str) -> CoreResult<Option<StoredFragment>> {
        let ledger_key = Self::ledger_key(table, key)?;
        match self.ledger.get_record(&self.scope, &ledger_key)? {
            Some(bytes) => Ok(Some(StoredFragment::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Deletes a fragment that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the key is absent in this scope.
    pub fn delete(&self, ctx: &mut InvocationContext, table: &str, key: &str) -> CoreResult<()> {
        let ledger_key = Self::ledger_key(table, key)?;
        if !self.ledger.delete_record(&self.scope, &ledger_key)? {
            return Err(CoreError::not_found(table, key));
        }
        ctx.write_log_mut().record(self.scope.clone(), table, key);
        Ok(())
    }

    /// Deletes a fragment, treating "already absent" as success.
    ///
    /// Used for mirror copies and stale segregation fragments, where a 404
    /// only means the copy was never replicated here.
    pub fn delete_if_present(
        &self,
        ctx: &mut InvocationContext,
        table: &str,
        key: &str,
    ) -> CoreResult<()> {
        let ledger_key = Self::ledger_key(table, key)?;
        if self.ledger.delete_record(&self.scope, &ledger_key)? {
            ctx.write_log_mut().record(self.scope.clone(), table, key);
        } else {
            trace!(scope = %self.scope, table, key, "best-effort delete: already absent");
        }
        Ok(())
    }

    /// Runs a selector query, returning every matching fragment.
    pub fn raw_query(&self, selector: &Selector) -> CoreResult<Vec<StoredFragment>> {
        let records = self.ledger.query_records(&self.scope, selector)?;
        records
            .into_iter()
            .map(|(_, bytes)| StoredFragment::from_bytes(&bytes).map_err(CoreError::from))
            .collect()
    }

    /// Runs one page of a selector query through the backend's own cursor.
    pub fn query_page(
        &self,
        selector: &Selector,
        page_size: usize,
        bookmark: Option<&str>,
    ) -> CoreResult<PagedFragments> {
        let page = self
            .ledger
            .query_records_paged(&self.scope, selector, page_size, bookmark)?;
        let docs = page
            .records
            .into_iter()
            .map(|(_, bytes)| StoredFragment::from_bytes(&bytes).map_err(CoreError::from))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(PagedFragments {
            docs,
            next_bookmark: page.next_bookmark,
        })
    }

    /// Whether the underlying backend can serve `query_page` natively.
    #[must_use]
    pub fn supports_native_pagination(&self) -> bool {
        self.ledger.supports_native_pagination()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallerIdentity;
    use tessera_ledger::InMemoryLedger;
    use tessera_model::Record;

    fn setup() -> (LedgerAdapter, InvocationContext) {
        let ledger: Arc<dyn LedgerBackend> = Arc::new(InMemoryLedger::new());
        let adapter = LedgerAdapter::world(ledger);
        let ctx = InvocationContext::new(CallerIdentity::new("u", "OrgA"));
        (adapter, ctx)
    }

    fn fragment(key: &str) -> StoredFragment {
        StoredFragment::new("asset", key, Record::new().with("name", "x"))
    }

    #[test]
    fn create_then_read() {
        let (adapter, mut ctx) = setup();
        adapter.create(&mut ctx, &fragment("1")).unwrap();

        let read = adapter.read("asset", "1").unwrap();
        assert_eq!(read.fields().get_str("name"), Some("x"));
    }

    #[test]
    fn create_existing_conflicts() {
        let (adapter, mut ctx) = setup();
        adapter.create(&mut ctx, &fragment("1")).unwrap();

        let result = adapter.create(&mut ctx, &fragment("1"));
        assert!(matches!(result, Err(CoreError::Conflict { .. })));
    }

    #[test]
    fn read_absent_is_not_found() {
        let (adapter, _) = setup();
        let result = adapter.read("asset", "1");
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
        assert!(adapter.try_read("asset", "1").unwrap().is_none());
    }

    #[test]
    fn update_requires_existing() {
        let (adapter, mut ctx) = setup();
        let result = adapter.update(&mut ctx, &fragment("1"));
        assert!(matches!(result, Err(CoreError::NotFound { .. })));

        adapter.create(&mut ctx, &fragment("1")).unwrap();
        adapter.update(&mut ctx, &fragment("1")).unwrap();
    }

    #[test]
    fn delete_absent_is_not_found() {
        let (adapter, mut ctx) = setup();
        let result = adapter.delete(&mut ctx, "asset", "1");
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn delete_if_present_tolerates_absence() {
        let (adapter, mut ctx) = setup();
        adapter.delete_if_present(&mut ctx, "asset", "1").unwrap();
        assert!(ctx.write_log().is_empty());

        adapter.create(&mut ctx, &fragment("1")).unwrap();
        adapter.delete_if_present(&mut ctx, "asset", "1").unwrap();
        assert!(adapter.try_read("asset", "1").unwrap().is_none());
    }

    #[test]
    fn writes_feed_the_accumulator() {
        let (adapter, mut ctx) = setup();
        adapter.create(&mut ctx, &fragment("1")).unwrap();
        adapter.update(&mut ctx, &fragment("1")).unwrap();
        adapter.delete(&mut ctx, "asset", "1").unwrap();

        let entries = ctx.write_log().entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.scope == Scope::WorldState));
        assert!(entries.iter().all(|e| e.table == "asset" && e.key == "1"));
    }

    #[test]
    fn key_shape_is_scope_independent() {
        let ledger: Arc<dyn LedgerBackend> = Arc::new(InMemoryLedger::new());
        let world = LedgerAdapter::world(Arc::clone(&ledger));
        let collection = LedgerAdapter::collection(Arc::clone(&ledger), "colA");
        let mut ctx = InvocationContext::new(CallerIdentity::new("u", "OrgA"));

        world.create(&mut ctx, &fragment("1")).unwrap();
        collection.create(&mut ctx, &fragment("1")).unwrap();

        let expected = CompositeKey::single("asset", "1").unwrap().encode();
        assert!(ledger
            .get_record(&Scope::WorldState, &expected)
            .unwrap()
            .is_some());
        assert!(ledger
            .get_record(&Scope::collection("colA"), &expected)
            .unwrap()
            .is_some());
    }

    #[test]
    fn raw_query_decodes_fragments() {
        let (adapter, mut ctx) = setup();
        for key in ["1", "2", "3"] {
            adapter.create(&mut ctx, &fragment(key)).unwrap();
        }

        let docs = adapter
            .raw_query(&Selector::field("_table", "asset"))
            .unwrap();
        assert_eq!(docs.len(), 3);
        let keys: Vec<&str> = docs.iter().map(StoredFragment::key).collect();
        assert_eq!(keys, vec!["1", "2", "3"]);
    }
}
