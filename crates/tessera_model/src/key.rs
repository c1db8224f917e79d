//! Composite ledger keys.

use crate::error::{ModelError, ModelResult};
use std::fmt;

/// Separator between composite key parts.
///
/// `U+0000` sorts before every printable character, so a key prefix of
/// `NUL table NUL` ranges over exactly one table.
pub const KEY_SEPARATOR: char = '\u{0000}';

/// A structured ledger key: table name plus attribute values.
///
/// Encoded form is `NUL table NUL attr1 NUL attr2 NUL ...` - one leading
/// separator, then each part followed by a separator. The shape is identical
/// in every scope, so moving a field between world state and a collection
/// never changes where its record lives within the scope.
///
/// # Example
///
/// ```rust
/// use tessera_model::CompositeKey;
///
/// let key = CompositeKey::single("asset", "42").unwrap();
/// assert_eq!(key.encode(), "\u{0}asset\u{0}42\u{0}");
/// assert!(key.encode().starts_with(&CompositeKey::prefix("asset")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    table: String,
    attributes: Vec<String>,
}

impl CompositeKey {
    /// Builds a key from a table name and attribute values.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidKey`] if the table name is empty, or if
    /// any part contains the separator character.
    pub fn new(
        table: impl Into<String>,
        attributes: impl IntoIterator<Item = impl Into<String>>,
    ) -> ModelResult<Self> {
        let table = table.into();
        if table.is_empty() {
            return Err(ModelError::invalid_key("empty table name"));
        }
        if table.contains(KEY_SEPARATOR) {
            return Err(ModelError::invalid_key("table name contains separator"));
        }

        let attributes: Vec<String> = attributes.into_iter().map(Into::into).collect();
        for attr in &attributes {
            if attr.contains(KEY_SEPARATOR) {
                return Err(ModelError::invalid_key("attribute contains separator"));
            }
        }

        Ok(Self { table, attributes })
    }

    /// Builds a key from a table name and one attribute.
    pub fn single(table: impl Into<String>, attribute: impl Into<String>) -> ModelResult<Self> {
        Self::new(table, [attribute.into()])
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the attribute values.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Encodes the key into its ledger string form.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        encoded.push(KEY_SEPARATOR);
        encoded.push_str(&self.table);
        encoded.push(KEY_SEPARATOR);
        for attr in &self.attributes {
            encoded.push_str(attr);
            encoded.push(KEY_SEPARATOR);
        }
        encoded
    }

    /// Returns the range-scan prefix covering every key of a table.
    #[must_use]
    pub fn prefix(table: &str) -> String {
        format!("{KEY_SEPARATOR}{table}{KEY_SEPARATOR}")
    }

    /// Parses an encoded key back into its parts.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidKey`] if the string does not follow the
    /// composite format.
    pub fn decode(encoded: &str) -> ModelResult<Self> {
        let mut parts = encoded.split(KEY_SEPARATOR);
        if parts.next() != Some("") {
            return Err(ModelError::invalid_key("missing leading separator"));
        }
        let Some(table) = parts.next().filter(|t| !t.is_empty()) else {
            return Err(ModelError::invalid_key("missing table name"));
        };

        let mut attributes: Vec<String> = parts.map(String::from).collect();
        // A well-formed key ends with a separator, so the final split
        // produces one empty trailing part.
        match attributes.pop() {
            Some(last) if last.is_empty() => {}
            _ => return Err(ModelError::invalid_key("missing trailing separator")),
        }

        Self::new(table, attributes)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.attributes.join(":"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_format() {
        let key = CompositeKey::new("asset", ["42", "extra"]).unwrap();
        assert_eq!(key.encode(), "\u{0}asset\u{0}42\u{0}extra\u{0}");
    }

    #[test]
    fn encode_decode_roundtrip() {
        let key = CompositeKey::new("asset", ["42", "x"]).unwrap();
        let decoded = CompositeKey::decode(&key.encode()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn prefix_covers_table() {
        let key = CompositeKey::single("asset", "42").unwrap();
        assert!(key.encode().starts_with(&CompositeKey::prefix("asset")));

        let other = CompositeKey::single("assets", "42").unwrap();
        assert!(!other.encode().starts_with(&CompositeKey::prefix("asset")));
    }

    #[test]
    fn no_attributes_is_valid() {
        let key = CompositeKey::new("asset", Vec::<String>::new()).unwrap();
        assert_eq!(key.encode(), "\u{0}asset\u{0}");
        assert_eq!(CompositeKey::decode(&key.encode()).unwrap(), key);
    }

    #[test]
    fn rejects_empty_table() {
        assert!(CompositeKey::new("", ["a"]).is_err());
    }

    #[test]
    fn rejects_separator_in_parts() {
        assert!(CompositeKey::new("a\u{0}b", ["x"]).is_err());
        assert!(CompositeKey::new("table", ["x\u{0}y"]).is_err());
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(CompositeKey::decode("no-leading-separator").is_err());
        assert!(CompositeKey::decode("\u{0}\u{0}").is_err());
        assert!(CompositeKey::decode("\u{0}asset\u{0}42").is_err());
    }

    #[test]
    fn keys_of_same_table_sort_together() {
        let a1 = CompositeKey::single("a", "1").unwrap().encode();
        let a2 = CompositeKey::single("a", "2").unwrap().encode();
        let b1 = CompositeKey::single("b", "1").unwrap().encode();

        let mut keys = vec![b1.clone(), a2.clone(), a1.clone()];
        keys.sort();
        assert_eq!(keys, vec![a1, a2, b1]);
    }
}
