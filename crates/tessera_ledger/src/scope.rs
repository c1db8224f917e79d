//! Ledger scope addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The partition a ledger call addresses.
///
/// Every read and write names a scope: either the globally-replicated world
/// state, or one named private data collection replicated only to a
/// configured org subset. Keys have the same shape in every scope, so moving
/// a record between scopes never changes its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Globally-replicated world state, readable by all authorized peers.
    WorldState,
    /// A named private data collection.
    Collection(String),
}

impl Scope {
    /// Creates a collection scope.
    pub fn collection(name: impl Into<String>) -> Self {
        Self::Collection(name.into())
    }

    /// Returns `true` for the world-state scope.
    #[must_use]
    pub const fn is_world_state(&self) -> bool {
        matches!(self, Self::WorldState)
    }

    /// Returns the collection name, or `None` for world state.
    #[must_use]
    pub fn collection_name(&self) -> Option<&str> {
        match self {
            Self::WorldState => None,
            Self::Collection(name) => Some(name),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorldState => write!(f, "world"),
            Self::Collection(name) => write!(f, "collection:{name}"),
        }
    }
}
