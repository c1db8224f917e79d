//! Sequence counters and their replication.

use crate::adapter::LedgerAdapter;
use crate::context::InvocationContext;
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;
use tessera_ledger::{LedgerBackend, Scope};
use tessera_model::{Record, StoredFragment};
use tracing::debug;

/// Reserved table holding sequence counters.
pub const SEQUENCE_TABLE: &str = "_sequence";

const VALUE_FIELD: &str = "value";

/// Advances named counters and copies them into touched collections.
///
/// Counters generate auto-assigned primary keys. The increment itself runs
/// against world state; concurrency control beyond that single
/// read-increment-write is delegated to the host ledger's per-key locking
/// within the invocation. After [`replicate`](Self::replicate) returns,
/// reading the counter from any listed collection yields exactly the
/// replicated value.
#[derive(Clone)]
pub struct SequenceReplicator {
    ledger: Arc<dyn LedgerBackend>,
}

impl std::fmt::Debug for SequenceReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceReplicator").finish_non_exhaustive()
    }
}

impl SequenceReplicator {
    /// Creates a replicator over a shared ledger.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerBackend>) -> Self {
        Self { ledger }
    }

    /// The counter id generating primary keys for a table.
    #[must_use]
    pub fn sequence_id(table: &str) -> String {
        format!("{table}_pk")
    }

    fn counter_fragment(sequence_id: &str, value: u64) -> StoredFragment {
        StoredFragment::new(
            SEQUENCE_TABLE,
            sequence_id,
            Record::new().with(VALUE_FIELD, value),
        )
    }

    fn read_value(&self, scope: &Scope, sequence_id: &str) -> CoreResult<Option<u64>> {
        let adapter = match scope {
            Scope::WorldState => LedgerAdapter::world(Arc::clone(&self.ledger)),
            Scope::Collection(name) => {
                LedgerAdapter::collection(Arc::clone(&self.ledger), name.clone())
            }
        };
        match adapter.try_read(SEQUENCE_TABLE, sequence_id)? {
            None => Ok(None),
            Some(fragment) => {
                let value = fragment.fields().get_u64(VALUE_FIELD).ok_or_else(|| {
                    CoreError::internal(format!(
                        "sequence {sequence_id} holds a non-integer value"
                    ))
                })?;
                Ok(Some(value))
            }
        }
    }

    /// Atomically advances a counter in world state, returning the new
    /// value.
    ///
    /// The first advance of an unknown counter yields `1`.
    pub fn next_value(&self, ctx: &mut InvocationContext, sequence_id: &str) -> CoreResult<u64> {
        let current = self.read_value(&Scope::WorldState, sequence_id)?.unwrap_or(0);
        let next = current + 1;
        LedgerAdapter::world(Arc::clone(&self.ledger))
            .put(ctx, &Self::counter_fragment(sequence_id, next))?;
        debug!(sequence_id, value = next, "sequence advanced");
        Ok(next)
    }

    /// Reads a counter's world-state value without advancing it.
    ///
    /// An unknown counter reads as `0`.
    pub fn current_value(&self, sequence_id: &str) -> CoreResult<u64> {
        Ok(self.read_value(&Scope::WorldState, sequence_id)?.unwrap_or(0))
    }

    /// Reads a counter's value in one specific scope, if present.
    pub fn value_in(&self, scope: &Scope, sequence_id: &str) -> CoreResult<Option<u64>> {
        self.read_value(scope, sequence_id)
    }

    /// Copies `value` into every listed collection.
    pub fn replicate(
        &self,
        ctx: &mut InvocationContext,
        sequence_id: &str,
        value: u64,
        collections: &[String],
    ) -> CoreResult<()> {
        let fragment = Self::counter_fragment(sequence_id, value);
        for name in collections {
            LedgerAdapter::collection(Arc::clone(&self.ledger), name.clone())
                .put(ctx, &fragment)?;
        }
        if !collections.is_empty() {
            debug!(sequence_id, value, count = collections.len(), "sequence replicated");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallerIdentity;

    fn setup() -> (SequenceReplicator, InvocationContext) {
        let ledger: Arc<dyn LedgerBackend> = Arc::new(tessera_ledger::InMemoryLedger::new());
        let replicator = SequenceReplicator::new(ledger);
        let ctx = InvocationContext::new(CallerIdentity::new("u", "OrgA"));
        (replicator, ctx)
    }

    #[test]
    fn first_value_is_one() {
        let (replicator, mut ctx) = setup();
        assert_eq!(replicator.next_value(&mut ctx, "asset_pk").unwrap(), 1);
    }

    #[test]
    fn values_are_monotonic() {
        let (replicator, mut ctx) = setup();
        let first = replicator.next_value(&mut ctx, "asset_pk").unwrap();
        let second = replicator.next_value(&mut ctx, "asset_pk").unwrap();
        let third = replicator.next_value(&mut ctx, "asset_pk").unwrap();
        assert_eq!((first, second, third), (1, 2, 3));
    }

    #[test]
    fn counters_are_independent() {
        let (replicator, mut ctx) = setup();
        replicator.next_value(&mut ctx, "asset_pk").unwrap();
        replicator.next_value(&mut ctx, "asset_pk").unwrap();

        assert_eq!(replicator.next_value(&mut ctx, "order_pk").unwrap(), 1);
        assert_eq!(replicator.current_value("asset_pk").unwrap(), 2);
    }

    #[test]
    fn current_value_does_not_advance() {
        let (replicator, mut ctx) = setup();
        replicator.next_value(&mut ctx, "asset_pk").unwrap();

        assert_eq!(replicator.current_value("asset_pk").unwrap(), 1);
        assert_eq!(replicator.current_value("asset_pk").unwrap(), 1);
        assert_eq!(replicator.current_value("unknown_pk").unwrap(), 0);
    }

    #[test]
    fn replicate_copies_into_collections() {
        let (replicator, mut ctx) = setup();
        let value = replicator.next_value(&mut ctx, "asset_pk").unwrap();

        let collections = vec!["colA".to_string(), "colB".to_string()];
        replicator
            .replicate(&mut ctx, "asset_pk", value, &collections)
            .unwrap();

        for name in &collections {
            let replica = replicator
                .value_in(&Scope::collection(name.clone()), "asset_pk")
                .unwrap();
            assert_eq!(replica, Some(value));
        }
        assert_eq!(
            replicator
                .value_in(&Scope::collection("colC"), "asset_pk")
                .unwrap(),
            None
        );
    }

    #[test]
    fn replicated_value_matches_world_state() {
        let (replicator, mut ctx) = setup();
        for _ in 0..5 {
            let value = replicator.next_value(&mut ctx, "asset_pk").unwrap();
            replicator
                .replicate(&mut ctx, "asset_pk", value, &["colA".to_string()])
                .unwrap();
        }

        let world = replicator.current_value("asset_pk").unwrap();
        let replica = replicator
            .value_in(&Scope::collection("colA"), "asset_pk")
            .unwrap();
        assert_eq!(Some(world), replica);
        assert_eq!(world, 5);
    }

    #[test]
    fn sequence_id_format() {
        assert_eq!(SequenceReplicator::sequence_id("asset"), "asset_pk");
    }
}
