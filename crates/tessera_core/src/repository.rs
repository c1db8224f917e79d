//! Repository facade: CRUD over segregated records.

use crate::adapter::LedgerAdapter;
use crate::audit::{AuditAction, AuditRecorder};
use crate::config::EngineConfig;
use crate::context::InvocationContext;
use crate::error::{CoreError, CoreResult};
use crate::hooks::{HookArgs, Operation, TableHooks};
use crate::mirror::MirrorRouter;
use crate::pagination::PaginationMode;
use crate::planner::{CollectionPlan, SegregationPlanner};
use crate::sequence::SequenceReplicator;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_ledger::{LedgerBackend, Selector};
use tessera_model::{MirrorMapping, Record, StoredFragment, TableSchema, RESERVED_PREFIX, TABLE_MARKER};
use tracing::debug;

/// One page of merged records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    /// Fully merged records.
    pub records: Vec<Record>,
    /// Cursor resuming after this page.
    pub next_bookmark: Option<String>,
    /// Whether the query is exhausted. The only end-of-results signal.
    pub done: bool,
}

/// CRUD facade for one table.
///
/// A repository orchestrates one logical operation end to end: validation
/// and before-hooks (fail fast), segregation, per-scope writes, mirror
/// copies, sequence replication, audit, after-hooks. Everything runs inside
/// the caller's invocation context; on a host with atomic commit an error
/// anywhere leaves no visible partial state.
#[derive(Clone)]
pub struct Repository {
    ledger: Arc<dyn LedgerBackend>,
    schema: Arc<TableSchema>,
    hooks: TableHooks,
    config: EngineConfig,
    mirror: MirrorRouter,
    sequences: SequenceReplicator,
    audit: AuditRecorder,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.table())
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Creates a repository for a validated schema.
    pub fn new(
        ledger: Arc<dyn LedgerBackend>,
        schema: Arc<TableSchema>,
        hooks: TableHooks,
        config: EngineConfig,
    ) -> Self {
        Self {
            mirror: MirrorRouter::new(Arc::clone(&ledger)),
            sequences: SequenceReplicator::new(Arc::clone(&ledger)),
            audit: AuditRecorder::new(Arc::clone(&ledger)),
            ledger,
            schema,
            hooks,
            config,
        }
    }

    /// Returns the table name this repository serves.
    #[must_use]
    pub fn table(&self) -> &str {
        self.schema.name()
    }

    /// Returns the table schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn world(&self) -> LedgerAdapter {
        LedgerAdapter::world(Arc::clone(&self.ledger))
    }

    fn collection_adapter(&self, name: &str) -> LedgerAdapter {
        LedgerAdapter::collection(Arc::clone(&self.ledger), name)
    }

    fn mirror_mappings(&self) -> Vec<MirrorMapping> {
        self.schema.mirror_mappings().cloned().collect()
    }

    // ---- validation ----------------------------------------------------

    fn validate_record(&self, record: &Record) -> CoreResult<()> {
        for name in record.field_names() {
            if name.starts_with(RESERVED_PREFIX) {
                return Err(CoreError::validation(format!(
                    "field name {name:?} uses the reserved '_' prefix"
                )));
            }
            if self.schema.field_schema(name).is_none() {
                return Err(CoreError::validation(format!(
                    "field {name:?} is not declared in table {:?}",
                    self.table()
                )));
            }
        }
        if record.contains(self.schema.primary_key()) && self.key_of(record)?.is_none() {
            return Err(CoreError::validation(format!(
                "primary key {:?} must be a non-empty string",
                self.schema.primary_key()
            )));
        }
        Ok(())
    }

    fn key_of(&self, record: &Record) -> CoreResult<Option<String>> {
        match record.get(self.schema.primary_key()) {
            None => Ok(None),
            Some(Value::String(key)) if !key.is_empty() => Ok(Some(key.clone())),
            Some(Value::String(_)) => Ok(None),
            Some(other) => Err(CoreError::validation(format!(
                "primary key {:?} must be a string, got {other}",
                self.schema.primary_key()
            ))),
        }
    }

    fn require_key(&self, record: &Record) -> CoreResult<String> {
        self.key_of(record)?.ok_or_else(|| {
            CoreError::validation(format!(
                "operation requires the primary key {:?}",
                self.schema.primary_key()
            ))
        })
    }

    fn reject_immutable(&self, operation: Operation) -> CoreResult<()> {
        if self.schema.is_immutable() {
            return Err(CoreError::validation(format!(
                "table {:?} is immutable: {operation} is rejected",
                self.table()
            )));
        }
        Ok(())
    }

    // ---- owners --------------------------------------------------------

    fn owners_subset(
        &self,
        owners: &BTreeMap<String, String>,
        fields: &[String],
    ) -> BTreeMap<String, String> {
        fields
            .iter()
            .filter_map(|name| owners.get(name).map(|org| (name.clone(), org.clone())))
            .collect()
    }

    fn initial_owners(&self, record: &Record, org: &str) -> BTreeMap<String, String> {
        self.schema
            .fields()
            .iter()
            .filter(|field| field.is_owned() && record.contains(field.name()))
            .map(|field| (field.name().to_string(), org.to_string()))
            .collect()
    }

    fn check_owned_fields(
        &self,
        owners: &BTreeMap<String, String>,
        old: &Record,
        new: &Record,
        caller_org: &str,
    ) -> CoreResult<()> {
        for field in self.schema.fields().iter().filter(|f| f.is_owned()) {
            if old.get(field.name()) == new.get(field.name()) {
                continue;
            }
            if let Some(owner) = owners.get(field.name()) {
                if owner != caller_org {
                    return Err(CoreError::authorization(format!(
                        "field {:?} is owned by {owner}; {caller_org} cannot modify it",
                        field.name()
                    )));
                }
            }
        }
        Ok(())
    }

    // ---- fragment assembly ---------------------------------------------

    fn stored_fragments(
        &self,
        key: &str,
        record: &Record,
        plan: &CollectionPlan,
        owners: &BTreeMap<String, String>,
    ) -> (StoredFragment, Vec<(String, StoredFragment)>) {
        let payload = SegregationPlanner::segregate(plan, record);

        let world_fragment = StoredFragment::new(self.table(), key, payload.model)
            .with_owners(self.owners_subset(owners, plan.public_fields()));

        let collection_fragments = payload
            .transient
            .into_iter()
            .map(|(name, fields)| {
                let route_fields = &plan.collections()[&name].fields;
                let fragment = StoredFragment::new(self.table(), key, fields)
                    .with_owners(self.owners_subset(owners, route_fields));
                (name, fragment)
            })
            .collect();

        (world_fragment, collection_fragments)
    }

    /// Reads the world fragment plus every reachable collection fragment.
    ///
    /// Collection fragments the backend does not yield (not replicated to
    /// this peer, or the caller's org is outside the collection) are
    /// skipped: a read returns the union of fields across the scopes the
    /// caller can actually reach.
    fn read_parts(
        &self,
        caller_org: &str,
        key: &str,
    ) -> CoreResult<(StoredFragment, BTreeMap<String, StoredFragment>, CollectionPlan)> {
        let world_fragment = self.world().read(self.table(), key)?;
        let plan = SegregationPlanner::plan(&self.schema, world_fragment.fields(), caller_org)?;

        let mut collection_fragments = BTreeMap::new();
        for name in plan.collection_names() {
            if let Some(fragment) = self.collection_adapter(name).try_read(self.table(), key)? {
                collection_fragments.insert(name.to_string(), fragment);
            }
        }
        Ok((world_fragment, collection_fragments, plan))
    }

    fn merge_parts(
        world_fragment: StoredFragment,
        collection_fragments: BTreeMap<String, StoredFragment>,
    ) -> Record {
        let fragments: BTreeMap<String, Record> = collection_fragments
            .into_iter()
            .map(|(name, fragment)| (name, fragment.into_fields()))
            .collect();
        SegregationPlanner::merge(world_fragment.into_fields(), &fragments)
    }

    fn collected_owners(
        world_fragment: &StoredFragment,
        collection_fragments: &BTreeMap<String, StoredFragment>,
    ) -> BTreeMap<String, String> {
        let mut owners = world_fragment.owners().clone();
        for fragment in collection_fragments.values() {
            owners.extend(
                fragment
                    .owners()
                    .iter()
                    .map(|(field, org)| (field.clone(), org.clone())),
            );
        }
        owners
    }

    // ---- create --------------------------------------------------------

    fn create_one(&self, ctx: &mut InvocationContext, mut record: Record) -> CoreResult<Record> {
        self.validate_record(&record)?;
        self.hooks.run_before(&HookArgs {
            operation: Operation::Create,
            identity: ctx.identity(),
            transaction_id: ctx.transaction_id(),
            before: None,
            after: Some(&record),
        })?;

        // The counter advances on every create; its value becomes the key
        // only when the caller did not supply one.
        let sequence_id = SequenceReplicator::sequence_id(self.table());
        let value = self.sequences.next_value(ctx, &sequence_id)?;
        let key = match self.key_of(&record)? {
            Some(key) => key,
            None => {
                let key = value.to_string();
                record.set(self.schema.primary_key().to_string(), key.clone());
                key
            }
        };

        let plan = SegregationPlanner::plan(&self.schema, &record, ctx.caller_org())?;
        let owners = self.initial_owners(&record, ctx.caller_org());
        let (world_fragment, collection_fragments) =
            self.stored_fragments(&key, &record, &plan, &owners);

        self.world().create(ctx, &world_fragment)?;
        for (name, fragment) in &collection_fragments {
            self.collection_adapter(name).create(ctx, fragment)?;
        }

        let full_copy = StoredFragment::new(self.table(), &key, record.clone());
        self.mirror.write_copies(ctx, plan.mirrors(), &full_copy)?;

        self.record_audit(ctx, AuditAction::Create, None, Some(&record))?;
        debug!(table = self.table(), key, "record created");
        Ok(record)
    }

    fn replicate_counter(&self, ctx: &mut InvocationContext) -> CoreResult<()> {
        let sequence_id = SequenceReplicator::sequence_id(self.table());
        let value = self.sequences.current_value(&sequence_id)?;
        let touched = ctx.write_log().collections_touched(self.table());
        self.sequences.replicate(ctx, &sequence_id, value, &touched)
    }

    /// Creates one record, assigning the next sequence value as its key if
    /// the caller supplied none.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Validation`] before any write on schema
    /// violations, and with [`CoreError::Conflict`] if the key exists.
    pub fn create(&self, ctx: &mut InvocationContext, record: Record) -> CoreResult<Record> {
        let record = self.create_one(ctx, record)?;
        self.replicate_counter(ctx)?;
        self.hooks.run_after(&HookArgs {
            operation: Operation::Create,
            identity: ctx.identity(),
            transaction_id: ctx.transaction_id(),
            before: None,
            after: Some(&record),
        })?;
        Ok(record)
    }

    /// Creates a batch of records.
    ///
    /// Items are written sequentially and the whole call aborts on the
    /// first per-item error. The counter is replicated once, after every
    /// item has been written, so each touched collection observes the final
    /// batch value; after-hooks likewise fire only once the batch is
    /// complete.
    pub fn create_all(
        &self,
        ctx: &mut InvocationContext,
        records: Vec<Record>,
    ) -> CoreResult<Vec<Record>> {
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            created.push(self.create_one(ctx, record)?);
        }
        self.replicate_counter(ctx)?;
        for record in &created {
            self.hooks.run_after(&HookArgs {
                operation: Operation::Create,
                identity: ctx.identity(),
                transaction_id: ctx.transaction_id(),
                before: None,
                after: Some(record),
            })?;
        }
        Ok(created)
    }

    // ---- read ----------------------------------------------------------

    /// Reads one logical record, merging every reachable fragment.
    ///
    /// When a mirror mapping's predicate matches the caller org the whole
    /// record is served from that mirror instead of stitched fragments.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the record is absent.
    pub fn read(&self, ctx: &InvocationContext, key: &str) -> CoreResult<Record> {
        let mappings = self.mirror_mappings();
        if let Some(fragment) =
            self.mirror
                .route_read(&mappings, self.table(), key, ctx.caller_org())?
        {
            return Ok(fragment.into_fields());
        }

        let (world_fragment, collection_fragments, _) =
            self.read_parts(ctx.caller_org(), key)?;
        Ok(Self::merge_parts(world_fragment, collection_fragments))
    }

    /// Reads every record of the table, in key order.
    pub fn read_all(&self, ctx: &InvocationContext) -> CoreResult<Vec<Record>> {
        self.find(ctx, &Selector::all(), None)
    }

    // ---- update --------------------------------------------------------

    fn update_one(
        &self,
        ctx: &mut InvocationContext,
        record: Record,
    ) -> CoreResult<(Record, Record)> {
        self.reject_immutable(Operation::Update)?;
        self.validate_record(&record)?;
        let key = self.require_key(&record)?;

        let (old_world, old_collections, old_plan) = self.read_parts(ctx.caller_org(), &key)?;
        let mut owners = Self::collected_owners(&old_world, &old_collections);
        let old_record = Self::merge_parts(old_world, old_collections);

        self.check_owned_fields(&owners, &old_record, &record, ctx.caller_org())?;
        self.hooks.run_before(&HookArgs {
            operation: Operation::Update,
            identity: ctx.identity(),
            transaction_id: ctx.transaction_id(),
            before: Some(&old_record),
            after: Some(&record),
        })?;

        // Owned fields keep their creator; fields owned but never written
        // before are claimed by the updating org.
        for (field, org) in self.initial_owners(&record, ctx.caller_org()) {
            owners.entry(field).or_insert(org);
        }

        let plan = SegregationPlanner::plan(&self.schema, &record, ctx.caller_org())?;
        let (world_fragment, collection_fragments) =
            self.stored_fragments(&key, &record, &plan, &owners);

        self.world().update(ctx, &world_fragment)?;
        for (name, fragment) in &collection_fragments {
            // `put`, not `update`: a resolver may have routed this record
            // into a collection it never touched before.
            self.collection_adapter(name).put(ctx, fragment)?;
        }

        // Fragments stranded in collections the new plan no longer names
        // are removed best-effort.
        for name in old_plan.collection_names() {
            if !plan.collections().contains_key(name) {
                self.collection_adapter(name)
                    .delete_if_present(ctx, self.table(), &key)?;
            }
        }

        let full_copy = StoredFragment::new(self.table(), &key, record.clone());
        self.mirror.write_copies(ctx, plan.mirrors(), &full_copy)?;

        self.record_audit(ctx, AuditAction::Update, Some(&old_record), Some(&record))?;
        debug!(table = self.table(), key, "record updated");
        Ok((old_record, record))
    }

    /// Updates one record, rewriting every fragment it maps to.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the record is absent,
    /// [`CoreError::Authorization`] if an owned field is modified by a
    /// non-owner org, and [`CoreError::Validation`] on schema violations or
    /// immutable tables - all before any write.
    pub fn update(&self, ctx: &mut InvocationContext, record: Record) -> CoreResult<Record> {
        let (old_record, new_record) = self.update_one(ctx, record)?;
        self.hooks.run_after(&HookArgs {
            operation: Operation::Update,
            identity: ctx.identity(),
            transaction_id: ctx.transaction_id(),
            before: Some(&old_record),
            after: Some(&new_record),
        })?;
        Ok(new_record)
    }

    /// Updates a batch of records; aborts on the first per-item error,
    /// after-hooks fire once the whole batch is written.
    pub fn update_all(
        &self,
        ctx: &mut InvocationContext,
        records: Vec<Record>,
    ) -> CoreResult<Vec<Record>> {
        let mut updated = Vec::with_capacity(records.len());
        for record in records {
            updated.push(self.update_one(ctx, record)?);
        }
        for (old_record, new_record) in &updated {
            self.hooks.run_after(&HookArgs {
                operation: Operation::Update,
                identity: ctx.identity(),
                transaction_id: ctx.transaction_id(),
                before: Some(old_record),
                after: Some(new_record),
            })?;
        }
        Ok(updated.into_iter().map(|(_, new)| new).collect())
    }

    // ---- delete --------------------------------------------------------

    fn delete_one(&self, ctx: &mut InvocationContext, key: &str) -> CoreResult<Record> {
        self.reject_immutable(Operation::Delete)?;

        let (old_world, old_collections, old_plan) = self.read_parts(ctx.caller_org(), key)?;
        let old_record = Self::merge_parts(old_world, old_collections);

        self.hooks.run_before(&HookArgs {
            operation: Operation::Delete,
            identity: ctx.identity(),
            transaction_id: ctx.transaction_id(),
            before: Some(&old_record),
            after: None,
        })?;

        self.world().delete(ctx, self.table(), key)?;
        for name in old_plan.collection_names() {
            self.collection_adapter(name)
                .delete_if_present(ctx, self.table(), key)?;
        }
        self.mirror
            .remove_copies(ctx, &self.mirror_mappings(), self.table(), key)?;

        self.record_audit(ctx, AuditAction::Delete, Some(&old_record), None)?;
        debug!(table = self.table(), key, "record deleted");
        Ok(old_record)
    }

    /// Deletes one record from every scope it touches.
    ///
    /// The world-state delete is strict ([`CoreError::NotFound`] if
    /// absent); collection and mirror deletes are best-effort, since an
    /// absent copy only means it was never replicated here.
    pub fn delete(&self, ctx: &mut InvocationContext, key: &str) -> CoreResult<()> {
        let old_record = self.delete_one(ctx, key)?;
        self.hooks.run_after(&HookArgs {
            operation: Operation::Delete,
            identity: ctx.identity(),
            transaction_id: ctx.transaction_id(),
            before: Some(&old_record),
            after: None,
        })?;
        Ok(())
    }

    /// Deletes a batch of records; aborts on the first per-item error,
    /// after-hooks fire once the whole batch is gone.
    pub fn delete_all(
        &self,
        ctx: &mut InvocationContext,
        keys: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> CoreResult<()> {
        let mut deleted = Vec::new();
        for key in keys {
            deleted.push(self.delete_one(ctx, key.as_ref())?);
        }
        for old_record in &deleted {
            self.hooks.run_after(&HookArgs {
                operation: Operation::Delete,
                identity: ctx.identity(),
                transaction_id: ctx.transaction_id(),
                before: Some(old_record),
                after: None,
            })?;
        }
        Ok(())
    }

    // ---- queries -------------------------------------------------------

    fn table_selector(&self, selector: &Selector) -> Selector {
        selector.clone().and(TABLE_MARKER, self.table())
    }

    /// Runs a selector query over world state and merges each hit into a
    /// full logical record.
    ///
    /// Selector queries stitch fragments; mirror routing is a by-key read
    /// shortcut and does not apply here.
    pub fn find(
        &self,
        ctx: &InvocationContext,
        selector: &Selector,
        order_by: Option<&str>,
    ) -> CoreResult<Vec<Record>> {
        let world_fragments = self.world().raw_query(&self.table_selector(selector))?;

        let mut records = Vec::with_capacity(world_fragments.len());
        for world_fragment in world_fragments {
            let key = world_fragment.key().to_string();
            let (_, collection_fragments, _) = self.read_parts(ctx.caller_org(), &key)?;
            records.push(Self::merge_parts(world_fragment, collection_fragments));
        }

        if let Some(field) = order_by {
            records.sort_by(|a, b| compare_values(a.get(field), b.get(field)));
        }
        Ok(records)
    }

    /// Returns one page of merged records for a selector.
    ///
    /// The page size is clamped to the engine's `max_page_size`. `done` on
    /// the returned page is the only end-of-results signal. A backend
    /// without native cursor support is paged with the emulated strategy
    /// regardless of configuration.
    pub fn page(
        &self,
        ctx: &InvocationContext,
        selector: &Selector,
        page_size: usize,
        bookmark: Option<&str>,
    ) -> CoreResult<RecordPage> {
        if page_size == 0 {
            return Err(CoreError::validation("page size must be positive"));
        }
        let page_size = page_size.min(self.config.max_page_size);

        let world = self.world();
        let mode = match self.config.pagination {
            PaginationMode::Native if !world.supports_native_pagination() => {
                PaginationMode::Emulated
            }
            mode => mode,
        };
        let page = mode.page(&world, &self.table_selector(selector), page_size, bookmark)?;

        let mut records = Vec::with_capacity(page.docs.len());
        for world_fragment in page.docs {
            let key = world_fragment.key().to_string();
            let (_, collection_fragments, _) = self.read_parts(ctx.caller_org(), &key)?;
            records.push(Self::merge_parts(world_fragment, collection_fragments));
        }

        Ok(RecordPage {
            records,
            next_bookmark: page.next_bookmark,
            done: page.done,
        })
    }

    // ---- audit ---------------------------------------------------------

    fn record_audit(
        &self,
        ctx: &mut InvocationContext,
        action: AuditAction,
        old: Option<&Record>,
        new: Option<&Record>,
    ) -> CoreResult<()> {
        if !self.config.audit_enabled || !self.schema.is_audited() {
            return Ok(());
        }
        self.audit.record(ctx, self.table(), action, old, new)?;
        Ok(())
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}
