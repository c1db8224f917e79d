//! Opaque query selector.

use serde_json::{Map, Value};

/// A query selector passed through to the host ledger.
///
/// Tessera does not compile query conditions; callers hand the engine a
/// selector in whatever language their backend speaks and it is forwarded
/// verbatim. [`InMemoryLedger`](crate::InMemoryLedger) interprets the
/// top-level equality subset (`{"field": value, ...}` where every named
/// field must equal its value), which is the portion the engine itself
/// relies on for table-marker filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector(Value);

impl Selector {
    /// Wraps an arbitrary selector value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// A selector matching every record in the scope.
    #[must_use]
    pub fn all() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// A selector requiring one field to equal a value.
    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = Map::new();
        map.insert(name.into(), value.into());
        Self(Value::Object(map))
    }

    /// Adds an equality condition, returning the extended selector.
    ///
    /// Only meaningful for object-shaped selectors; other shapes are
    /// returned unchanged.
    #[must_use]
    pub fn and(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.0 {
            map.insert(name.into(), value.into());
        }
        self
    }

    /// Returns the raw selector value.
    #[must_use]
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Evaluates the equality subset of this selector against a document.
    ///
    /// Non-object selectors match nothing; an empty object matches
    /// everything.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        let Value::Object(conditions) = &self.0 else {
            return false;
        };
        let Value::Object(fields) = doc else {
            return false;
        };
        conditions
            .iter()
            .all(|(name, expected)| fields.get(name) == Some(expected))
    }
}

impl From<Value> for Selector {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
