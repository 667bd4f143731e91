//! Named scopes: groups of table names used to filter listings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Mapping from scope name to the table/view names it covers.
///
/// Scope names are matched exactly; table names are compared against database
/// object names ignoring case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeRegistry {
    scopes: BTreeMap<String, Vec<String>>,
}

impl ScopeRegistry {
    /// Create a registry from an existing mapping.
    pub fn new(scopes: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        Self {
            scopes: scopes.into_iter().collect(),
        }
    }

    /// Parse a JSON object of the form `{"scope": ["table", ...]}`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Parse like [`from_json`](Self::from_json), but log and fall back to an
    /// empty registry on malformed input.
    pub fn from_json_lenient(json: &str, source: &str) -> Self {
        match Self::from_json(json) {
            Ok(registry) => {
                info!(
                    "Loaded {} scope(s) from {}: {:?}",
                    registry.len(),
                    source,
                    registry.scope_names()
                );
                registry
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Scope filtering disabled.", source, e);
                Self::default()
            }
        }
    }

    /// Table names for a scope, if it is defined.
    pub fn get(&self, scope: &str) -> Option<&[String]> {
        self.scopes.get(scope).map(Vec::as_slice)
    }

    /// Whether a scope is defined.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains_key(scope)
    }

    /// Defined scope names in sorted order.
    pub fn scope_names(&self) -> Vec<String> {
        self.scopes.keys().cloned().collect()
    }

    /// Number of defined scopes.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether no scopes are defined.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Whether `table` matches any entry of a scope's table list, ignoring case.
pub fn in_scope(table: &str, scope_tables: &[String]) -> bool {
    scope_tables
        .iter()
        .any(|candidate| fold_case(candidate).eq(fold_case(table)))
}

fn fold_case(name: &str) -> impl Iterator<Item = char> + '_ {
    name.chars().flat_map(char::to_lowercase)
}
