//! # Tessera Core
//!
//! Segregated-data routing engine for partitioned ledgers.
//!
//! Tessera maps logical records whose fields carry per-field visibility
//! (public / private / shared / mirrored) onto a ledger that distinguishes
//! globally-replicated world state from named private data collections.
//! This crate provides:
//! - [`SegregationPlanner`] - splits records into per-scope fragments and
//!   merges them back losslessly
//! - [`LedgerAdapter`] - uniform create/read/delete/query over one scope
//! - [`MirrorRouter`] - full-copy mirror writes and predicate-routed reads
//! - [`SequenceReplicator`] - counters kept consistent across every
//!   collection a write touches
//! - [`NativePagination`] / [`EmulatedPagination`] - one paging contract
//!   over stores with and without cursor support
//! - [`AuditRecorder`] - an immutable, deterministically-identified audit
//!   trail
//! - [`Repository`] / [`Engine`] - the CRUD facade tying it all together
//!
//! One logical invocation is cooperatively single-threaded: planner,
//! per-collection writes, replication, mirror copies, and audit run
//! sequentially inside the caller's [`InvocationContext`], whose write log
//! is created fresh per invocation and never shared.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod audit;
mod config;
mod context;
mod engine;
mod error;
mod hooks;
mod mirror;
mod pagination;
mod planner;
mod repository;
mod sequence;

pub use adapter::{LedgerAdapter, PagedFragments};
pub use audit::{
    audit_schema, diff_records, AuditAction, AuditEntry, AuditRecorder, FieldDiff, AUDIT_TABLE,
};
pub use config::EngineConfig;
pub use context::{CallerIdentity, InvocationContext, WriteLog, WriteRecord};
pub use engine::{Engine, SchemaRegistry, TableRegistration};
pub use error::{CoreError, CoreResult};
pub use hooks::{HookArgs, Operation, OperationHook, TableHooks};
pub use mirror::MirrorRouter;
pub use pagination::{
    EmulatedPagination, NativePagination, Page, PaginationMode, PaginationStrategy,
};
pub use planner::{CollectionPlan, CollectionRoute, SegregatedPayload, SegregationPlanner};
pub use repository::{RecordPage, Repository};
pub use sequence::{SequenceReplicator, SEQUENCE_TABLE};

// Re-export the sibling crates' primary types so engine callers need a
// single dependency.
pub use tessera_ledger::{InMemoryLedger, LedgerBackend, LedgerError, Scope, Selector};
pub use tessera_model::{
    CollectionKind, CollectionTarget, CompositeKey, FieldSchema, MirrorMapping, ModelError,
    Record, StoredFragment, TableSchema, Visibility,
};
