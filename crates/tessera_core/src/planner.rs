//! Record segregation: split on write, merge on read.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use tessera_model::{CollectionKind, MirrorMapping, Record, TableSchema, Visibility};

/// One collection's share of a plan.
#[derive(Debug, Clone)]
pub struct CollectionRoute {
    /// Fields routed into this collection.
    pub fields: Vec<String>,
    /// Whether the collection is private to one audience or shared.
    pub kind: CollectionKind,
}

/// Concrete routing for one `(record, caller)` operation.
///
/// Resolvers run exactly once, when the plan is built; everything downstream
/// works from the resolved names.
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    table: String,
    public_fields: Vec<String>,
    collections: BTreeMap<String, CollectionRoute>,
    mirrors: Vec<MirrorMapping>,
}

impl CollectionPlan {
    /// Returns the planned table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields routed to world state (including mirrored fields' base
    /// routing).
    #[must_use]
    pub fn public_fields(&self) -> &[String] {
        &self.public_fields
    }

    /// Resolved collection routes, keyed by collection name.
    #[must_use]
    pub fn collections(&self) -> &BTreeMap<String, CollectionRoute> {
        &self.collections
    }

    /// Resolved collection names in lexicographic order.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Mirror mappings in effect for this table, deduplicated by
    /// collection.
    #[must_use]
    pub fn mirrors(&self) -> &[MirrorMapping] {
        &self.mirrors
    }
}

/// The ephemeral output of segregating one record.
///
/// Never persisted itself: `model` becomes the world-state fragment and
/// each `transient` entry becomes one collection fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegregatedPayload {
    /// Public-fields-only record.
    pub model: Record,
    /// Private-fields records, keyed by resolved collection name.
    pub transient: BTreeMap<String, Record>,
}

/// Splits records into per-scope fragments and merges them back.
///
/// The planner is pure: it performs no I/O and holds no state. Adapters
/// persist what it produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegregationPlanner;

impl SegregationPlanner {
    /// Resolves each field's concrete collection for one operation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCollection`] if a dynamic resolver
    /// produces no name for this `(record, caller_org)` pair.
    pub fn plan(
        schema: &TableSchema,
        record: &Record,
        caller_org: &str,
    ) -> CoreResult<CollectionPlan> {
        let mut public_fields = Vec::new();
        let mut collections: BTreeMap<String, CollectionRoute> = BTreeMap::new();
        let mut mirrors: Vec<MirrorMapping> = Vec::new();

        for field in schema.fields() {
            match field.visibility() {
                Visibility::Public => public_fields.push(field.name().to_string()),
                Visibility::Mirror(mapping) => {
                    // Base routing is public; the mirror copy is extra.
                    public_fields.push(field.name().to_string());
                    if !mirrors.iter().any(|m| m.collection() == mapping.collection()) {
                        mirrors.push(mapping.clone());
                    }
                }
                Visibility::Private(target) => {
                    let name = target.resolve(record, caller_org).ok_or_else(|| {
                        CoreError::invalid_collection(schema.name(), field.name())
                    })?;
                    collections
                        .entry(name)
                        .or_insert_with(|| CollectionRoute {
                            fields: Vec::new(),
                            kind: CollectionKind::Private,
                        })
                        .fields
                        .push(field.name().to_string());
                }
                Visibility::Shared(target) => {
                    let name = target.resolve(record, caller_org).ok_or_else(|| {
                        CoreError::invalid_collection(schema.name(), field.name())
                    })?;
                    collections
                        .entry(name)
                        .or_insert_with(|| CollectionRoute {
                            fields: Vec::new(),
                            kind: CollectionKind::Shared,
                        })
                        .fields
                        .push(field.name().to_string());
                }
            }
        }

        Ok(CollectionPlan {
            table: schema.name().to_string(),
            public_fields,
            collections,
            mirrors,
        })
    }

    /// Splits a record into its public fragment and per-collection private
    /// fragments.
    ///
    /// Fields absent from the record are simply not routed; a model with no
    /// private or shared fields yields an empty `transient` map, meaning no
    /// private writes are issued for it.
    #[must_use]
    pub fn segregate(plan: &CollectionPlan, record: &Record) -> SegregatedPayload {
        let mut model = Record::new();
        for name in &plan.public_fields {
            if let Some(value) = record.get(name) {
                model.set(name.clone(), value.clone());
            }
        }

        let mut transient = BTreeMap::new();
        for (collection, route) in &plan.collections {
            let mut fragment = Record::new();
            for name in &route.fields {
                if let Some(value) = record.get(name) {
                    fragment.set(name.clone(), value.clone());
                }
            }
            if !fragment.is_empty() {
                transient.insert(collection.clone(), fragment);
            }
        }

        SegregatedPayload { model, transient }
    }

    /// Reassembles a logical record from its fragments.
    ///
    /// Overlay order is fixed: the public fragment first, then collection
    /// fragments in lexicographic collection-name order. Fields are
    /// partitioned across fragments, so no key ever collides; the fixed
    /// order exists purely for deterministic iteration.
    #[must_use]
    pub fn merge(public: Record, fragments: &BTreeMap<String, Record>) -> Record {
        let mut merged = public;
        for fragment in fragments.values() {
            for (name, value) in fragment.iter() {
                merged.set(name.to_string(), value.clone());
            }
        }
        merged
    }
}
