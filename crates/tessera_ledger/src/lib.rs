//! # Tessera Ledger
//!
//! Host-ledger abstraction for Tessera.
//!
//! A Tessera ledger is a set of key/value partitions ("scopes"): one
//! globally-replicated world state plus any number of named, access-restricted
//! private data collections. This crate provides:
//! - The [`Scope`] addressing type
//! - The [`LedgerBackend`] trait consumed by the routing engine
//! - [`InMemoryLedger`] for tests and ephemeral use
//! - The opaque [`Selector`] query value
//!
//! Backends are deliberately dumb: they store and return bytes keyed by
//! strings within a scope. All record interpretation (fragments, composite
//! keys, segregation) happens above this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod scope;
mod selector;

pub use backend::{LedgerBackend, PagedRecords};
pub use error::{LedgerError, LedgerResult};
pub use memory::InMemoryLedger;
pub use scope::Scope;
pub use selector::Selector;
