//! Field visibility schemas.

use crate::error::{ModelError, ModelResult};
use crate::fragment::RESERVED_PREFIX;
use crate::record::Record;
use std::fmt;
use std::sync::Arc;

/// Resolver choosing a collection name for a `(record, caller org)` pair.
pub type CollectionResolverFn = dyn Fn(&Record, &str) -> Option<String> + Send + Sync;

/// Predicate deciding whether a caller org reads from a mirror collection.
pub type MirrorPredicateFn = dyn Fn(&str) -> bool + Send + Sync;

/// Where a private or shared field's fragment is stored.
///
/// A constant collection name is the trivial resolver; the dynamic form lets
/// the collection depend on record content and caller org, chosen once per
/// operation when the plan is built.
#[derive(Clone)]
pub enum CollectionTarget {
    /// A fixed collection name.
    Fixed(String),
    /// A per-record resolver.
    Resolver(Arc<CollectionResolverFn>),
}

impl CollectionTarget {
    /// Creates a resolver target from a closure.
    pub fn resolver<F>(resolve: F) -> Self
    where
        F: Fn(&Record, &str) -> Option<String> + Send + Sync + 'static,
    {
        Self::Resolver(Arc::new(resolve))
    }

    /// Resolves the concrete collection name for one operation.
    ///
    /// Returns `None` when a dynamic resolver produces no name (or an empty
    /// one); the engine turns that into an invalid-collection error.
    #[must_use]
    pub fn resolve(&self, record: &Record, caller_org: &str) -> Option<String> {
        match self {
            Self::Fixed(name) => Some(name.clone()),
            Self::Resolver(resolve) => {
                resolve(record, caller_org).filter(|name| !name.is_empty())
            }
        }
    }
}

impl fmt::Debug for CollectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<&str> for CollectionTarget {
    fn from(name: &str) -> Self {
        Self::Fixed(name.to_string())
    }
}

impl From<String> for CollectionTarget {
    fn from(name: String) -> Self {
        Self::Fixed(name)
    }
}

/// Read-routing rule attached to a mirrored field.
///
/// Governs reads only: when the predicate matches the caller org, the whole
/// record is served from the mirror collection instead of stitched
/// fragments. Writes always copy the full model into the mirror in addition
/// to the field's base routing.
#[derive(Clone)]
pub struct MirrorMapping {
    collection: String,
    predicate: Arc<MirrorPredicateFn>,
}

impl MirrorMapping {
    /// Creates a mapping from a collection name and an org predicate.
    pub fn new<F>(collection: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            collection: collection.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Returns the mirror collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether reads by this org are served from the mirror.
    #[must_use]
    pub fn applies_to(&self, caller_org: &str) -> bool {
        (self.predicate)(caller_org)
    }
}

impl fmt::Debug for MirrorMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorMapping")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// Where a field's value lives on the ledger. Exactly one per field.
#[derive(Debug, Clone)]
pub enum Visibility {
    /// World state, readable by all authorized peers.
    Public,
    /// One named private data collection.
    Private(CollectionTarget),
    /// A collection replicated among an org set. Routing is identical to
    /// `Private`; the kind is kept for planning metadata.
    Shared(CollectionTarget),
    /// World state, plus a full-model copy in a mirror collection whose
    /// predicate may redirect reads.
    Mirror(MirrorMapping),
}

/// The routing category a collection plays in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Private to a single audience.
    Private,
    /// Shared among an org set.
    Shared,
    /// Full-record mirror duplicate.
    Mirror,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Shared => write!(f, "shared"),
            Self::Mirror => write!(f, "mirror"),
        }
    }
}

/// One field's routing metadata.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    name: String,
    visibility: Visibility,
    owned: bool,
}

impl FieldSchema {
    /// A world-state field.
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            owned: false,
        }
    }

    /// A field private to one collection.
    pub fn private(name: impl Into<String>, target: impl Into<CollectionTarget>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Private(target.into()),
            owned: false,
        }
    }

    /// A field routed by a dynamic resolver into a private collection.
    pub fn private_resolved<F>(name: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&Record, &str) -> Option<String> + Send + Sync + 'static,
    {
        Self::private(name, CollectionTarget::resolver(resolve))
    }

    /// A field shared among an org set's collection.
    pub fn shared(name: impl Into<String>, target: impl Into<CollectionTarget>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Shared(target.into()),
            owned: false,
        }
    }

    /// A field routed by a dynamic resolver into a shared collection.
    pub fn shared_resolved<F>(name: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&Record, &str) -> Option<String> + Send + Sync + 'static,
    {
        Self::shared(name, CollectionTarget::resolver(resolve))
    }

    /// A public field whose record is additionally mirrored.
    pub fn mirrored<F>(name: impl Into<String>, collection: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            visibility: Visibility::Mirror(MirrorMapping::new(collection, predicate)),
            owned: false,
        }
    }

    /// Marks the field as owned: the creating org is recorded and later
    /// modification by any other org is rejected.
    #[must_use]
    pub fn owned(mut self) -> Self {
        self.owned = true;
        self
    }

    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field's visibility.
    #[must_use]
    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    /// Whether the field is owned.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

/// A table's full routing metadata, built once via static registration.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    primary_key: String,
    fields: Vec<FieldSchema>,
    audited: bool,
    immutable: bool,
}

impl TableSchema {
    /// Creates a schema for `name` with the given primary-key field.
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            fields: Vec::new(),
            audited: false,
            immutable: false,
        }
    }

    /// Adds a field, returning the extended schema.
    #[must_use]
    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Enables audit recording for this table's create/update/delete.
    #[must_use]
    pub const fn audited(mut self) -> Self {
        self.audited = true;
        self
    }

    /// Rejects update and delete at the schema level.
    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the primary-key field name.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Returns all field schemas in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Looks up one field's schema.
    #[must_use]
    pub fn field_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name() == name)
    }

    /// Whether create/update/delete are audited.
    #[must_use]
    pub const fn is_audited(&self) -> bool {
        self.audited
    }

    /// Whether update/delete are rejected.
    #[must_use]
    pub const fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Iterates over the mirror mappings attached to fields.
    pub fn mirror_mappings(&self) -> impl Iterator<Item = &MirrorMapping> {
        self.fields.iter().filter_map(|field| match field.visibility() {
            Visibility::Mirror(mapping) => Some(mapping),
            _ => None,
        })
    }

    /// Validates the schema for registration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidSchema`] if:
    /// - the table name or primary key is empty
    /// - any name uses the reserved `_` prefix
    /// - field names are duplicated
    /// - the primary-key field is declared with non-public visibility
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() {
            return Err(ModelError::invalid_schema(&self.name, "empty table name"));
        }
        if self.name.starts_with(RESERVED_PREFIX) {
            return Err(ModelError::invalid_schema(
                &self.name,
                "table names starting with '_' are reserved",
            ));
        }
        if self.primary_key.is_empty() {
            return Err(ModelError::invalid_schema(
                &self.name,
                "empty primary-key field name",
            ));
        }

        for (index, field) in self.fields.iter().enumerate() {
            if field.name().is_empty() {
                return Err(ModelError::invalid_schema(&self.name, "empty field name"));
            }
            if field.name().starts_with(RESERVED_PREFIX) {
                return Err(ModelError::invalid_schema(
                    &self.name,
                    format!("field name {:?} uses the reserved '_' prefix", field.name()),
                ));
            }
            if self.fields[..index].iter().any(|f| f.name() == field.name()) {
                return Err(ModelError::invalid_schema(
                    &self.name,
                    format!("duplicate field {:?}", field.name()),
                ));
            }
        }

        match self.field_schema(&self.primary_key) {
            None => Err(ModelError::invalid_schema(
                &self.name,
                format!("primary-key field {:?} is not declared", self.primary_key),
            )),
            Some(field) => match field.visibility() {
                Visibility::Public | Visibility::Mirror(_) => Ok(()),
                _ => Err(ModelError::invalid_schema(
                    &self.name,
                    format!(
                        "primary-key field {:?} must be publicly visible",
                        self.primary_key
                    ),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset_schema() -> TableSchema {
        TableSchema::new("asset", "id")
            .field(FieldSchema::public("id"))
            .field(FieldSchema::public("name"))
            .field(FieldSchema::private("secret", "colA"))
    }

    #[test]
    fn valid_schema_passes() {
        asset_schema().validate().unwrap();
    }

    #[test]
    fn fixed_target_resolves_to_itself() {
        let target = CollectionTarget::from("colA");
        assert_eq!(
            target.resolve(&Record::new(), "OrgA"),
            Some("colA".to_string())
        );
    }

    #[test]
    fn dynamic_resolver_sees_record_and_org() {
        let target = CollectionTarget::resolver(|record, org| {
            record
                .get_str("region")
                .map(|region| format!("{org}_{region}"))
        });

        let record = Record::new().with("region", "eu");
        assert_eq!(
            target.resolve(&record, "OrgA"),
            Some("OrgA_eu".to_string())
        );
        assert_eq!(target.resolve(&Record::new(), "OrgA"), None);
    }

    #[test]
    fn empty_resolver_result_is_none() {
        let target = CollectionTarget::resolver(|_, _| Some(String::new()));
        assert_eq!(target.resolve(&Record::new(), "OrgA"), None);
    }

    #[test]
    fn mirror_mapping_predicate() {
        let mapping = MirrorMapping::new("mirrorA", |org: &str| org == "OrgA");
        assert!(mapping.applies_to("OrgA"));
        assert!(!mapping.applies_to("OrgB"));
        assert_eq!(mapping.collection(), "mirrorA");
    }

    #[test]
    fn mirror_mappings_iterates_mirror_fields_only() {
        let schema = TableSchema::new("asset", "id")
            .field(FieldSchema::public("id"))
            .field(FieldSchema::mirrored("rating", "mirrorA", |org| org == "OrgA"))
            .field(FieldSchema::private("secret", "colA"));

        let collections: Vec<&str> = schema
            .mirror_mappings()
            .map(MirrorMapping::collection)
            .collect();
        assert_eq!(collections, vec!["mirrorA"]);
    }

    #[test]
    fn rejects_duplicate_fields() {
        let schema = TableSchema::new("asset", "id")
            .field(FieldSchema::public("id"))
            .field(FieldSchema::public("id"));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn rejects_reserved_names() {
        let schema = TableSchema::new("asset", "id")
            .field(FieldSchema::public("id"))
            .field(FieldSchema::public("_meta"));
        assert!(schema.validate().is_err());

        let table = TableSchema::new("_internal", "id").field(FieldSchema::public("id"));
        assert!(table.validate().is_err());
    }

    #[test]
    fn rejects_undeclared_primary_key() {
        let schema = TableSchema::new("asset", "id").field(FieldSchema::public("name"));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn rejects_private_primary_key() {
        let schema = TableSchema::new("asset", "id")
            .field(FieldSchema::private("id", "colA"))
            .field(FieldSchema::public("name"));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn owned_flag() {
        let field = FieldSchema::public("price").owned();
        assert!(field.is_owned());
        assert!(!FieldSchema::public("price").is_owned());
    }
}
