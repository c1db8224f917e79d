//! # Tessera Model
//!
//! Data contracts for the Tessera routing engine.
//!
//! This crate is I/O-free. It defines:
//! - [`Record`] - a logical record as an ordered JSON field map
//! - [`TableSchema`] / [`FieldSchema`] / [`Visibility`] - per-field routing
//!   metadata registered once per type
//! - [`CompositeKey`] - the `NUL`-separated key format shared by every scope
//! - [`StoredFragment`] - the JSON sub-record persisted under one key in one
//!   scope
//!
//! Field visibility replaces the decorator/reflection machinery of dynamic
//! languages with an explicit tagged-variant schema: each field carries
//! exactly one [`Visibility`], and dynamic collection choice is an injected
//! resolver function rather than runtime metadata.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod fragment;
mod key;
mod record;
mod schema;

pub use error::{ModelError, ModelResult};
pub use fragment::{StoredFragment, KEY_MARKER, OWNERS_MARKER, RESERVED_PREFIX, TABLE_MARKER};
pub use key::{CompositeKey, KEY_SEPARATOR};
pub use record::Record;
pub use schema::{
    CollectionKind, CollectionResolverFn, CollectionTarget, FieldSchema, MirrorMapping,
    MirrorPredicateFn, TableSchema, Visibility,
};
