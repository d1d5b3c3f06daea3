//! Polymorphic type registry updates.

use super::error::SwapError;
use crate::catalog::EntityIdent;
use crate::store::{Store, Value};
use tracing::{info, warn};

/// Where the type registry lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistryConfig {
    /// Registry table.
    pub table: String,
    /// Column holding the lowercased namespace.
    pub namespace_column: String,
    /// Column holding the lowercased entity name.
    pub name_column: String,
}

impl Default for TypeRegistryConfig {
    fn default() -> Self {
        Self {
            table: "type_registry".to_string(),
            namespace_column: "namespace".to_string(),
            name_column: "name".to_string(),
        }
    }
}

impl TypeRegistryConfig {
    /// Set the registry table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the namespace and name columns.
    pub fn with_columns(
        mut self,
        namespace_column: impl Into<String>,
        name_column: impl Into<String>,
    ) -> Self {
        self.namespace_column = namespace_column.into();
        self.name_column = name_column.into();
        self
    }
}

/// Renames type tags in the registry.
pub struct TypeRegistry<S> {
    store: S,
    config: TypeRegistryConfig,
}

impl<S: Store> TypeRegistry<S> {
    /// Create a new registry updater.
    pub fn new(store: S, config: TypeRegistryConfig) -> Self {
        Self { store, config }
    }

    /// Re-tag rows of `from` as `to`; returns the number of rows changed.
    ///
    /// Tags are stored lowercased. A missing registry table changes nothing.
    pub fn rename(&self, from: &EntityIdent, to: &EntityIdent) -> Result<u64, SwapError> {
        let table = self.config.table.as_str();
        if !self.store.table_exists(table)? {
            warn!(table, from = %from, to = %to, "type registry table not found, skipping rename");
            return Ok(0);
        }

        let namespace = self.config.namespace_column.as_str();
        let name = self.config.name_column.as_str();
        let updated = self.store.update_where(
            table,
            &[
                (namespace, Value::from(to.namespace.to_lowercase())),
                (name, Value::from(to.name.to_lowercase())),
            ],
            &[
                (namespace, Value::from(from.namespace.to_lowercase())),
                (name, Value::from(from.name.to_lowercase())),
            ],
        )? as u64;

        info!(table, from = %from, to = %to, rows = updated, "renamed type tag");
        Ok(updated)
    }
}
