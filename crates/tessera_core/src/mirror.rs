//! Mirror-collection routing.

use crate::adapter::LedgerAdapter;
use crate::context::InvocationContext;
use crate::error::CoreResult;
use std::sync::Arc;
use tessera_ledger::LedgerBackend;
use tessera_model::{MirrorMapping, StoredFragment};
use tracing::debug;

/// Routes reads and writes for mirrored records.
///
/// A mirror collection holds a full duplicate of selected records so a
/// matching audience can read without stitching fragments. Writes always
/// copy into the mirror in addition to the record's normal routing; the
/// predicate governs reads only.
#[derive(Clone)]
pub struct MirrorRouter {
    ledger: Arc<dyn LedgerBackend>,
}

impl std::fmt::Debug for MirrorRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorRouter").finish_non_exhaustive()
    }
}

impl MirrorRouter {
    /// Creates a router over a shared ledger.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerBackend>) -> Self {
        Self { ledger }
    }

    fn adapter(&self, mapping: &MirrorMapping) -> LedgerAdapter {
        LedgerAdapter::collection(Arc::clone(&self.ledger), mapping.collection())
    }

    /// Serves a read from the first mirror whose predicate matches the
    /// caller org.
    ///
    /// Returns `Ok(None)` when no mapping matches, in which case the caller
    /// falls back to the normal per-collection merge. When a mapping does
    /// match, the mirror is authoritative: an absent copy propagates as
    /// [`CoreError::NotFound`](crate::CoreError), not as a fallback.
    pub fn route_read(
        &self,
        mappings: &[MirrorMapping],
        table: &str,
        key: &str,
        caller_org: &str,
    ) -> CoreResult<Option<StoredFragment>> {
        for mapping in mappings {
            if mapping.applies_to(caller_org) {
                debug!(
                    table,
                    key,
                    collection = mapping.collection(),
                    "read served from mirror"
                );
                return self.adapter(mapping).read(table, key).map(Some);
            }
        }
        Ok(None)
    }

    /// Writes the full-model copy into every mirror collection.
    ///
    /// Failures propagate unchanged; a half-written mirror would poison
    /// predicate-routed reads, so the whole operation aborts with the
    /// error.
    pub fn write_copies(
        &self,
        ctx: &mut InvocationContext,
        mappings: &[MirrorMapping],
        full_copy: &StoredFragment,
    ) -> CoreResult<()> {
        for mapping in mappings {
            self.adapter(mapping).put(ctx, full_copy)?;
        }
        Ok(())
    }

    /// Removes mirror copies, best-effort: a copy already absent from its
    /// mirror is success, not failure.
    pub fn remove_copies(
        &self,
        ctx: &mut InvocationContext,
        mappings: &[MirrorMapping],
        table: &str,
        key: &str,
    ) -> CoreResult<()> {
        for mapping in mappings {
            self.adapter(mapping).delete_if_present(ctx, table, key)?;
        }
        Ok(())
    }
}
