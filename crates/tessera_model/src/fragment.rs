//! Stored fragments.

use crate::error::{ModelError, ModelResult};
use crate::record::Record;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved top-level key carrying the table marker.
pub const TABLE_MARKER: &str = "_table";
/// Reserved top-level key carrying the primary key.
pub const KEY_MARKER: &str = "_key";
/// Reserved top-level key carrying per-field owner orgs.
pub const OWNERS_MARKER: &str = "_owners";
/// Prefix reserved for engine metadata; rejected in user field names.
pub const RESERVED_PREFIX: char = '_';

/// One scope's share of a logical record.
///
/// A fragment is a flat JSON document: the routed field values at top level
/// plus the `_table` and `_key` markers (and `_owners` when any field in
/// this fragment is owned). The markers make a fragment independently
/// identifiable, so a private collection can be queried without consulting
/// world state, and give selector queries a table partition marker to match
/// on.
///
/// Reserved keys cannot collide with field names because schema validation
/// rejects `_`-prefixed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFragment {
    table: String,
    key: String,
    fields: Record,
    owners: BTreeMap<String, String>,
}

impl StoredFragment {
    /// Creates a fragment for `(table, key)` holding `fields`.
    pub fn new(table: impl Into<String>, key: impl Into<String>, fields: Record) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields,
            owners: BTreeMap::new(),
        }
    }

    /// Attaches per-field owner orgs, returning the extended fragment.
    #[must_use]
    pub fn with_owners(mut self, owners: BTreeMap<String, String>) -> Self {
        self.owners = owners;
        self
    }

    /// Returns the table marker.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the primary key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the fragment's fields.
    #[must_use]
    pub fn fields(&self) -> &Record {
        &self.fields
    }

    /// Consumes the fragment, returning its fields.
    #[must_use]
    pub fn into_fields(self) -> Record {
        self.fields
    }

    /// Returns the owner org recorded for a field, if any.
    #[must_use]
    pub fn owner_of(&self, field: &str) -> Option<&str> {
        self.owners.get(field).map(String::as_str)
    }

    /// Returns all recorded owners.
    #[must_use]
    pub fn owners(&self) -> &BTreeMap<String, String> {
        &self.owners
    }

    /// Serializes the fragment into its flat JSON document form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        map.insert(TABLE_MARKER.to_string(), Value::String(self.table.clone()));
        map.insert(KEY_MARKER.to_string(), Value::String(self.key.clone()));
        if !self.owners.is_empty() {
            let owners: Map<String, Value> = self
                .owners
                .iter()
                .map(|(field, org)| (field.clone(), Value::String(org.clone())))
                .collect();
            map.insert(OWNERS_MARKER.to_string(), Value::Object(owners));
        }
        Value::Object(map)
    }

    /// Serializes the fragment into bytes for the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Json`] on serialization failure.
    pub fn to_bytes(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    /// Rebuilds a fragment from its flat JSON document form.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedFragment`] if the document is not an
    /// object or lacks the `_table`/`_key` markers.
    pub fn from_json(value: Value) -> ModelResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(ModelError::malformed_fragment("fragment is not an object"));
        };

        let table = match map.remove(TABLE_MARKER) {
            Some(Value::String(table)) if !table.is_empty() => table,
            _ => return Err(ModelError::malformed_fragment("missing _table marker")),
        };
        let key = match map.remove(KEY_MARKER) {
            Some(Value::String(key)) if !key.is_empty() => key,
            _ => return Err(ModelError::malformed_fragment("missing _key marker")),
        };

        let mut owners = BTreeMap::new();
        if let Some(value) = map.remove(OWNERS_MARKER) {
            let Value::Object(entries) = value else {
                return Err(ModelError::malformed_fragment("_owners is not an object"));
            };
            for (field, org) in entries {
                let Value::String(org) = org else {
                    return Err(ModelError::malformed_fragment("owner org is not a string"));
                };
                owners.insert(field, org);
            }
        }

        let fields = map.into_iter().collect();
        Ok(Self {
            table,
            key,
            fields,
            owners,
        })
    }

    /// Rebuilds a fragment from ledger bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Json`] on parse failure, or
    /// [`ModelError::MalformedFragment`] if markers are missing.
    pub fn from_bytes(bytes: &[u8]) -> ModelResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_json(value)
    }
}
