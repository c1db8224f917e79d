//! Per-table operation hooks.

use crate::context::CallerIdentity;
use crate::error::CoreResult;
use std::fmt;
use std::sync::Arc;
use tessera_model::Record;

/// The CRUD operation a hook observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Record creation.
    Create,
    /// Record read.
    Read,
    /// Record update.
    Update,
    /// Record deletion.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Read => write!(f, "read"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// What a hook sees: the operation, the caller, and the record states.
///
/// `before` is the stored state (absent on create), `after` the incoming
/// state (absent on delete).
#[derive(Debug, Clone, Copy)]
pub struct HookArgs<'a> {
    /// The running operation.
    pub operation: Operation,
    /// The invoking caller.
    pub identity: &'a CallerIdentity,
    /// The host transaction id.
    pub transaction_id: &'a str,
    /// Stored record state, if any.
    pub before: Option<&'a Record>,
    /// Incoming record state, if any.
    pub after: Option<&'a Record>,
}

/// A pure operation hook.
///
/// Hooks returning an error abort the operation; before-hooks do so before
/// any write has happened.
pub type OperationHook = Arc<dyn Fn(&HookArgs<'_>) -> CoreResult<()> + Send + Sync>;

/// Ordered hook lists for one table, invoked at fixed points.
///
/// This replaces decorator-composed interception: each CRUD method runs the
/// `before` list after validation and before the first write, and the
/// `after` list once every write of the operation (or of the whole batch,
/// for bulk calls) has completed.
#[derive(Clone, Default)]
pub struct TableHooks {
    before: Vec<OperationHook>,
    after: Vec<OperationHook>,
}

impl TableHooks {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a before-write hook, returning the extended set.
    #[must_use]
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookArgs<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.before.push(Arc::new(hook));
        self
    }

    /// Appends an after-write hook, returning the extended set.
    #[must_use]
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookArgs<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.after.push(Arc::new(hook));
        self
    }

    pub(crate) fn run_before(&self, args: &HookArgs<'_>) -> CoreResult<()> {
        for hook in &self.before {
            hook(args)?;
        }
        Ok(())
    }

    pub(crate) fn run_after(&self, args: &HookArgs<'_>) -> CoreResult<()> {
        for hook in &self.after {
            hook(args)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TableHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHooks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args<'a>(identity: &'a CallerIdentity, after: Option<&'a Record>) -> HookArgs<'a> {
        HookArgs {
            operation: Operation::Create,
            identity,
            transaction_id: "tx-1",
            before: None,
            after,
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&calls);
        let second = Arc::clone(&calls);

        let hooks = TableHooks::new()
            .before(move |_| {
                assert_eq!(first.fetch_add(1, Ordering::SeqCst), 0);
                Ok(())
            })
            .before(move |_| {
                assert_eq!(second.fetch_add(1, Ordering::SeqCst), 1);
                Ok(())
            });

        let identity = CallerIdentity::new("u", "OrgA");
        hooks.run_before(&args(&identity, None)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_before_hook_stops_the_chain() {
        let ran = Arc::new(AtomicUsize::new(0));
        let later = Arc::clone(&ran);

        let hooks = TableHooks::new()
            .before(|_| Err(CoreError::validation("rejected")))
            .before(move |_| {
                later.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let identity = CallerIdentity::new("u", "OrgA");
        assert!(hooks.run_before(&args(&identity, None)).is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hooks_see_the_record_states() {
        let record = Record::new().with("name", "x");
        let hooks = TableHooks::new().after(|args| {
            assert_eq!(args.after.and_then(|r| r.get_str("name")), Some("x"));
            assert!(args.before.is_none());
            assert_eq!(args.identity.org(), "OrgA");
            Ok(())
        });

        let identity = CallerIdentity::new("u", "OrgA");
        hooks.run_after(&args(&identity, Some(&record))).unwrap();
    }

    #[test]
    fn empty_hooks_are_noops() {
        let identity = CallerIdentity::new("u", "OrgA");
        let hooks = TableHooks::new();
        hooks.run_before(&args(&identity, None)).unwrap();
        hooks.run_after(&args(&identity, None)).unwrap();
    }
}
