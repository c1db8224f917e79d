//! Invocation context and the per-transaction write log.

use tessera_ledger::Scope;
use uuid::Uuid;

/// The caller of one logical invocation.
///
/// Supplied by the host's identity service (`callerId`/`callerOrgId`); the
/// engine never derives identity itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    id: String,
    org: String,
}

impl CallerIdentity {
    /// Creates an identity from a caller id and org id.
    pub fn new(id: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            org: org.into(),
        }
    }

    /// Returns the caller id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the caller's org id.
    #[must_use]
    pub fn org(&self) -> &str {
        &self.org
    }
}

/// One successful write, as seen by the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// The scope written to.
    pub scope: Scope,
    /// The table marker of the written fragment.
    pub table: String,
    /// The fragment's primary key.
    pub key: String,
}

/// Per-transaction accumulator of successful writes.
///
/// Consumed by the sequence replicator (which collections did this write
/// touch?) and available to audit hooks. Exclusively owned by one
/// invocation: created fresh, never shared, discarded at the end.
#[derive(Debug, Default)]
pub struct WriteLog {
    entries: Vec<WriteRecord>,
}

impl WriteLog {
    /// Appends a write.
    pub(crate) fn record(&mut self, scope: Scope, table: &str, key: &str) {
        self.entries.push(WriteRecord {
            scope,
            table: table.to_string(),
            key: key.to_string(),
        });
    }

    /// Returns all recorded writes in order.
    #[must_use]
    pub fn entries(&self) -> &[WriteRecord] {
        &self.entries
    }

    /// Number of recorded writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collection names touched by writes of `table`, deduplicated and
    /// sorted.
    #[must_use]
    pub fn collections_touched(&self, table: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.table == table)
            .filter_map(|entry| entry.scope.collection_name())
            .map(String::from)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Explicit context for one logical invocation.
///
/// Threaded as a parameter through every planner/router/replicator call; no
/// thread-local or global state. One invocation is cooperatively
/// single-threaded, so the context is `&mut` through the write path.
#[derive(Debug)]
pub struct InvocationContext {
    identity: CallerIdentity,
    transaction_id: String,
    write_log: WriteLog,
}

impl InvocationContext {
    /// Creates a context with a generated transaction id.
    #[must_use]
    pub fn new(identity: CallerIdentity) -> Self {
        Self::with_transaction(identity, Uuid::new_v4().to_string())
    }

    /// Creates a context with the host-supplied transaction id.
    pub fn with_transaction(identity: CallerIdentity, transaction_id: impl Into<String>) -> Self {
        Self {
            identity,
            transaction_id: transaction_id.into(),
            write_log: WriteLog::default(),
        }
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Returns the caller's org id.
    #[must_use]
    pub fn caller_org(&self) -> &str {
        self.identity.org()
    }

    /// Returns the caller id.
    #[must_use]
    pub fn caller_id(&self) -> &str {
        self.identity.id()
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Returns the write accumulator.
    #[must_use]
    pub fn write_log(&self) -> &WriteLog {
        &self.write_log
    }

    pub(crate) fn write_log_mut(&mut self) -> &mut WriteLog {
        &mut self.write_log
    }
}
