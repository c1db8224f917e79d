//! Immutable audit trail.

use crate::adapter::LedgerAdapter;
use crate::context::InvocationContext;
use crate::error::{CoreError, CoreResult};
use crate::planner::SegregationPlanner;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use tessera_ledger::LedgerBackend;
use tessera_model::{FieldSchema, Record, StoredFragment, TableSchema};
use tracing::debug;

/// Table name under which audit entries are persisted.
pub const AUDIT_TABLE: &str = "audit";

/// The operation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    /// A record was created.
    Create,
    /// A record was updated.
    Update,
    /// A record was deleted.
    Delete,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One field's change within an audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// The changed field.
    pub field: String,
    /// Value before the operation, absent on create.
    pub old: Option<Value>,
    /// Value after the operation, absent on delete.
    pub new: Option<Value>,
}

/// Structural field-level comparison of two record states.
///
/// Create compares against an empty instance, delete compares the removed
/// instance against empty. Diffs are sorted by field name so their
/// serialization - and therefore the audit entry id derived from it - is
/// deterministic.
#[must_use]
pub fn diff_records(old: Option<&Record>, new: Option<&Record>) -> Vec<FieldDiff> {
    let empty = Record::new();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);

    let names: BTreeSet<&str> = old.field_names().chain(new.field_names()).collect();
    names
        .into_iter()
        .filter_map(|field| {
            let before = old.get(field);
            let after = new.get(field);
            if before == after {
                return None;
            }
            Some(FieldDiff {
                field: field.to_string(),
                old: before.cloned(),
                new: after.cloned(),
            })
        })
        .collect()
}

/// An immutable audit entry.
///
/// The id is a pure function of the entry's content, so repeating an
/// identical audit attempt produces the same id (and a create conflict)
/// rather than a silent duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Deterministic entry id.
    pub id: String,
    /// Caller id at the time of the operation.
    pub user_id: String,
    /// Caller org at the time of the operation.
    pub user_org: String,
    /// The audited table.
    pub model: String,
    /// Host transaction id.
    pub transaction: String,
    /// The recorded operation.
    pub action: AuditAction,
    /// Field-level changes.
    pub diffs: Vec<FieldDiff>,
}

impl AuditEntry {
    fn to_record(&self) -> CoreResult<Record> {
        Ok(Record::new()
            .with("id", self.id.clone())
            .with("user_id", self.user_id.clone())
            .with("user_org", self.user_org.clone())
            .with("model", self.model.clone())
            .with("transaction", self.transaction.clone())
            .with("action", serde_json::to_value(self.action)?)
            .with("diffs", serde_json::to_value(&self.diffs)?))
    }
}

/// The audit table's own segregation plan: fully public, immutable.
///
/// Fully public keeps the trail replicated to every peer for traceability;
/// immutability rejects update/delete on entries at the schema level.
#[must_use]
pub fn audit_schema() -> TableSchema {
    TableSchema::new(AUDIT_TABLE, "id")
        .field(FieldSchema::public("id"))
        .field(FieldSchema::public("user_id"))
        .field(FieldSchema::public("user_org"))
        .field(FieldSchema::public("model"))
        .field(FieldSchema::public("transaction"))
        .field(FieldSchema::public("action"))
        .field(FieldSchema::public("diffs"))
        .immutable()
}

/// Computes diffs and appends audit entries for audited operations.
#[derive(Clone)]
pub struct AuditRecorder {
    ledger: Arc<dyn LedgerBackend>,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

impl AuditRecorder {
    /// Creates a recorder over a shared ledger.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerBackend>) -> Self {
        Self { ledger }
    }

    /// Derives the deterministic entry id from
    /// `{transaction}:{action}:{diffs}`.
    pub fn entry_id(
        transaction: &str,
        action: AuditAction,
        diffs: &[FieldDiff],
    ) -> CoreResult<String> {
        let diff_json = serde_json::to_string(diffs)?;
        let digest = Sha256::digest(format!("{transaction}:{action}:{diff_json}"));
        let mut id = String::with_capacity(digest.len() * 2);
        for byte in digest {
            write!(id, "{byte:02x}").map_err(|e| CoreError::internal(e.to_string()))?;
        }
        Ok(id)
    }

    /// Records one operation on `model`, persisting the entry through the
    /// ordinary planner/adapter path under the audit table's schema.
    ///
    /// Failures propagate: a silent audit gap is a correctness bug, so the
    /// caller aborts the logical operation on error.
    pub fn record(
        &self,
        ctx: &mut InvocationContext,
        model: &str,
        action: AuditAction,
        old: Option<&Record>,
        new: Option<&Record>,
    ) -> CoreResult<AuditEntry> {
        let diffs = diff_records(old, new);
        let entry = AuditEntry {
            id: Self::entry_id(ctx.transaction_id(), action, &diffs)?,
            user_id: ctx.caller_id().to_string(),
            user_org: ctx.caller_org().to_string(),
            model: model.to_string(),
            transaction: ctx.transaction_id().to_string(),
            action,
            diffs,
        };

        let schema = audit_schema();
        let record = entry.to_record()?;
        let plan = SegregationPlanner::plan(&schema, &record, ctx.caller_org())?;
        let payload = SegregationPlanner::segregate(&plan, &record);

        let fragment = StoredFragment::new(AUDIT_TABLE, entry.id.clone(), payload.model);
        LedgerAdapter::world(Arc::clone(&self.ledger)).create(ctx, &fragment)?;
        debug!(model, action = %action, id = entry.id, "audit entry appended");

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallerIdentity;
    use serde_json::json;

    fn setup() -> (AuditRecorder, InvocationContext) {
        let ledger: Arc<dyn LedgerBackend> = Arc::new(tessera_ledger::InMemoryLedger::new());
        let recorder = AuditRecorder::new(ledger);
        let ctx = InvocationContext::with_transaction(CallerIdentity::new("u1", "OrgA"), "tx-1");
        (recorder, ctx)
    }

    #[test]
    fn diff_create_compares_against_empty() {
        let new = Record::new().with("name", "x").with("count", 1);
        let diffs = diff_records(None, Some(&new));

        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].field, "count");
        assert_eq!(diffs[0].old, None);
        assert_eq!(diffs[0].new, Some(json!(1)));
    }

    #[test]
    fn diff_delete_compares_removed_against_empty() {
        let old = Record::new().with("name", "x");
        let diffs = diff_records(Some(&old), None);

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].old, Some(json!("x")));
        assert_eq!(diffs[0].new, None);
    }

    #[test]
    fn diff_update_reports_changed_fields_only() {
        let old = Record::new().with("name", "x").with("count", 1);
        let new = Record::new().with("name", "x").with("count", 2);
        let diffs = diff_records(Some(&old), Some(&new));

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "count");
        assert_eq!(diffs[0].old, Some(json!(1)));
        assert_eq!(diffs[0].new, Some(json!(2)));
    }

    #[test]
    fn diff_of_identical_records_is_empty() {
        let record = Record::new().with("a", 1);
        assert!(diff_records(Some(&record), Some(&record)).is_empty());
        assert!(diff_records(None, None).is_empty());
    }

    #[test]
    fn entry_id_is_deterministic() {
        let diffs = vec![FieldDiff {
            field: "name".to_string(),
            old: None,
            new: Some(json!("x")),
        }];

        let first = AuditRecorder::entry_id("tx-1", AuditAction::Create, &diffs).unwrap();
        let second = AuditRecorder::entry_id("tx-1", AuditAction::Create, &diffs).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn entry_id_varies_with_inputs() {
        let diffs = vec![FieldDiff {
            field: "name".to_string(),
            old: None,
            new: Some(json!("x")),
        }];

        let base = AuditRecorder::entry_id("tx-1", AuditAction::Create, &diffs).unwrap();
        let other_tx = AuditRecorder::entry_id("tx-2", AuditAction::Create, &diffs).unwrap();
        let other_action = AuditRecorder::entry_id("tx-1", AuditAction::Update, &diffs).unwrap();
        let other_diff = AuditRecorder::entry_id("tx-1", AuditAction::Create, &[]).unwrap();

        assert_ne!(base, other_tx);
        assert_ne!(base, other_action);
        assert_ne!(base, other_diff);
    }

    #[test]
    fn audit_schema_is_valid_public_and_immutable() {
        let schema = audit_schema();
        schema.validate().unwrap();
        assert!(schema.is_immutable());
        assert!(!schema.is_audited());
        assert_eq!(schema.mirror_mappings().count(), 0);
    }

    #[test]
    fn record_persists_a_readable_entry() {
        let (recorder, mut ctx) = setup();
        let new = Record::new().with("name", "x");

        let entry = recorder
            .record(&mut ctx, "asset", AuditAction::Create, None, Some(&new))
            .unwrap();

        let adapter = LedgerAdapter::world(Arc::clone(&recorder.ledger));
        let stored = adapter.read(AUDIT_TABLE, &entry.id).unwrap();
        assert_eq!(stored.fields().get_str("model"), Some("asset"));
        assert_eq!(stored.fields().get_str("transaction"), Some("tx-1"));
        assert_eq!(stored.fields().get_str("action"), Some("CREATE"));
        assert_eq!(stored.fields().get_str("user_org"), Some("OrgA"));
    }

    #[test]
    fn repeated_identical_attempt_conflicts() {
        let (recorder, mut ctx) = setup();
        let new = Record::new().with("name", "x");

        recorder
            .record(&mut ctx, "asset", AuditAction::Create, None, Some(&new))
            .unwrap();
        let result = recorder.record(&mut ctx, "asset", AuditAction::Create, None, Some(&new));
        assert!(matches!(result, Err(CoreError::Conflict { .. })));
    }
}
