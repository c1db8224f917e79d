//! Engine entry point and schema registry.

use crate::audit::audit_schema;
use crate::config::EngineConfig;
use crate::context::{CallerIdentity, InvocationContext};
use crate::error::{CoreError, CoreResult};
use crate::hooks::TableHooks;
use crate::repository::Repository;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_ledger::LedgerBackend;
use tessera_model::TableSchema;
use tracing::debug;

/// A registered table: its validated schema plus its hook lists.
#[derive(Debug, Clone)]
pub struct TableRegistration {
    /// The validated schema.
    pub schema: Arc<TableSchema>,
    /// Hooks invoked by CRUD operations.
    pub hooks: TableHooks,
}

/// Registry of table schemas, built once via static registration.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: RwLock<HashMap<String, TableRegistration>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema with its hooks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the schema fails validation or
    /// the table name is already registered.
    pub fn register(&self, schema: TableSchema, hooks: TableHooks) -> CoreResult<()> {
        schema.validate()?;
        let mut tables = self.tables.write();
        if tables.contains_key(schema.name()) {
            return Err(CoreError::validation(format!(
                "table {:?} is already registered",
                schema.name()
            )));
        }
        debug!(table = schema.name(), "schema registered");
        tables.insert(
            schema.name().to_string(),
            TableRegistration {
                schema: Arc::new(schema),
                hooks,
            },
        );
        Ok(())
    }

    /// Looks up a registration by table name.
    #[must_use]
    pub fn lookup(&self, table: &str) -> Option<TableRegistration> {
        self.tables.read().get(table).cloned()
    }

    /// Whether a table is registered.
    #[must_use]
    pub fn is_registered(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }
}

/// The main engine handle.
///
/// `Engine` owns the shared ledger backend, the schema registry, and the
/// configuration. It hands out per-table [`Repository`] facades and fresh
/// [`InvocationContext`]s; all actual routing happens in the repositories.
///
/// The audit table's schema is registered at construction so audit entries
/// flow through the same registration machinery as user tables.
///
/// # Example
///
/// ```rust,ignore
/// use tessera_core::{CallerIdentity, Engine};
/// use tessera_ledger::InMemoryLedger;
/// use tessera_model::{FieldSchema, Record, TableSchema};
/// use std::sync::Arc;
///
/// let engine = Engine::new(Arc::new(InMemoryLedger::new()));
/// engine.register(
///     TableSchema::new("asset", "id")
///         .field(FieldSchema::public("id"))
///         .field(FieldSchema::private("secret", "colA")),
/// )?;
///
/// let assets = engine.repository("asset")?;
/// let mut ctx = engine.context(CallerIdentity::new("user1", "OrgA"));
/// let created = assets.create(&mut ctx, Record::new().with("secret", "y"))?;
/// ```
pub struct Engine {
    ledger: Arc<dyn LedgerBackend>,
    config: EngineConfig,
    registry: SchemaRegistry,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine with default configuration.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerBackend>) -> Self {
        Self::with_config(ledger, EngineConfig::default())
    }

    /// Creates an engine with explicit configuration.
    #[must_use]
    pub fn with_config(ledger: Arc<dyn LedgerBackend>, config: EngineConfig) -> Self {
        let registry = SchemaRegistry::new();
        registry
            .register(audit_schema(), TableHooks::new())
            .unwrap_or_else(|_| unreachable!("audit schema is statically valid"));
        Self {
            ledger,
            config,
            registry,
        }
    }

    /// Registers a table schema without hooks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] on invalid or duplicate schemas.
    pub fn register(&self, schema: TableSchema) -> CoreResult<()> {
        self.registry.register(schema, TableHooks::new())
    }

    /// Registers a table schema with its operation hooks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] on invalid or duplicate schemas.
    pub fn register_with_hooks(&self, schema: TableSchema, hooks: TableHooks) -> CoreResult<()> {
        self.registry.register(schema, hooks)
    }

    /// Returns a repository for a registered table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the table is not registered.
    pub fn repository(&self, table: &str) -> CoreResult<Repository> {
        let registration = self.registry.lookup(table).ok_or_else(|| {
            CoreError::validation(format!("table {table:?} is not registered"))
        })?;
        Ok(Repository::new(
            Arc::clone(&self.ledger),
            registration.schema,
            registration.hooks,
            self.config.clone(),
        ))
    }

    /// Creates a fresh invocation context for one logical call.
    #[must_use]
    pub fn context(&self, identity: CallerIdentity) -> InvocationContext {
        InvocationContext::new(identity)
    }

    /// Returns the shared ledger backend.
    #[must_use]
    pub fn ledger(&self) -> Arc<dyn LedgerBackend> {
        Arc::clone(&self.ledger)
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the schema registry.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }
}
