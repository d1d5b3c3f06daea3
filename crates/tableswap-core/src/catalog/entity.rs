//! Entity identifiers, definitions, and resolved descriptors.

use super::field::FieldDef;
use super::naming;
use rkyv::Archive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when an entity identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid entity identifier '{input}': expected 'namespace.name'")]
pub struct ParseIdentError {
    /// The rejected input.
    pub input: String,
}

/// Identifies a logical record type: `namespace.name`.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct EntityIdent {
    /// Namespace (application label).
    pub namespace: String,
    /// Entity name within the namespace.
    pub name: String,
}

impl EntityIdent {
    /// Create a new identifier.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Check whether two identifiers name the same entity.
    ///
    /// Namespaces and names are compared case-insensitively.
    pub fn refers_to(&self, other: &EntityIdent) -> bool {
        self.namespace.eq_ignore_ascii_case(&other.namespace)
            && self.name.eq_ignore_ascii_case(&other.name)
    }

    /// Lowercased entity name, the base for generated column names.
    pub fn base_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Table name derived from the identifier alone.
    pub fn default_table_name(&self) -> String {
        naming::default_table_name(&self.namespace, &self.name)
    }

    /// Identifier of the join entity for a many-to-many field on this entity.
    pub fn join(&self, field_name: &str) -> EntityIdent {
        EntityIdent::new(
            self.namespace.clone(),
            format!("{}_{}", self.name, field_name),
        )
    }
}

impl fmt::Display for EntityIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for EntityIdent {
    type Err = ParseIdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdentError {
            input: s.to_string(),
        };
        let (namespace, name) = s.split_once('.').ok_or_else(err)?;
        if namespace.is_empty() || name.is_empty() || name.contains('.') {
            return Err(err());
        }
        Ok(EntityIdent::new(namespace, name))
    }
}

impl TryFrom<String> for EntityIdent {
    type Error = ParseIdentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityIdent> for String {
    fn from(ident: EntityIdent) -> Self {
        ident.to_string()
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// An entity definition as registered in the catalog.
#[derive(
    Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize, Serialize, Deserialize,
)]
pub struct EntityDef {
    /// Namespace (application label).
    pub namespace: String,
    /// Entity name, unique within the namespace.
    pub name: String,
    /// Explicit storage table name, overriding the derived one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_table: Option<String>,
    /// Primary key column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Field definitions in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    /// Create a new entity definition with an `id` primary key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            db_table: None,
            primary_key: default_primary_key(),
            fields: Vec::new(),
        }
    }

    /// Override the storage table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.db_table = Some(table.into());
        self
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Identifier of this entity.
    pub fn ident(&self) -> EntityIdent {
        EntityIdent::new(self.namespace.clone(), self.name.clone())
    }

    /// Current physical table name.
    pub fn table_name(&self) -> String {
        match &self.db_table {
            Some(table) => table.clone(),
            None => naming::default_table_name(&self.namespace, &self.name),
        }
    }

    /// Get a field by name (case-insensitive).
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Storage columns in declaration order, primary key first if not declared.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.fields.iter().filter_map(FieldDef::column).collect();
        if !columns.iter().any(|c| *c == self.primary_key) {
            columns.insert(0, self.primary_key.clone());
        }
        columns
    }

    /// Many-to-many fields in declaration order.
    pub fn many_to_many_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_many_to_many())
    }

    /// Resolve this definition into a descriptor.
    pub fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor {
            ident: self.ident(),
            table_name: self.table_name(),
            primary_key: self.primary_key.clone(),
            columns: self.columns(),
            auto_created: false,
        }
    }

    /// Descriptor of the auto-created join entity behind a many-to-many field.
    ///
    /// Returns `None` if `field` is not a many-to-many field.
    pub fn join_descriptor(&self, field: &FieldDef) -> Option<EntityDescriptor> {
        let target = field.target().filter(|_| field.is_many_to_many())?;
        let owner = self.ident();
        let (owner_column, target_column) = naming::join_columns(&owner, target);
        Some(EntityDescriptor {
            ident: owner.join(&field.name),
            table_name: naming::join_table_name(&self.table_name(), &field.name),
            primary_key: default_primary_key(),
            columns: vec![default_primary_key(), owner_column, target_column],
            auto_created: true,
        })
    }

    /// Foreign-key fields of the auto-created join entity for a many-to-many field.
    pub fn join_fields(&self, field: &FieldDef) -> Option<Vec<FieldDef>> {
        let target = field.target().filter(|_| field.is_many_to_many())?;
        let owner = self.ident();
        let (owner_column, target_column) = naming::join_columns(&owner, target);
        Some(vec![
            FieldDef::scalar(default_primary_key()),
            FieldDef::foreign_key(naming::strip_id_suffix(&owner_column), owner),
            FieldDef::foreign_key(naming::strip_id_suffix(&target_column), target.clone()),
        ])
    }
}

/// A resolved entity: where it lives and what columns it has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescriptor {
    /// Entity identifier.
    pub ident: EntityIdent,
    /// Physical table name.
    pub table_name: String,
    /// Primary key column.
    pub primary_key: String,
    /// Storage columns in order.
    pub columns: Vec<String>,
    /// Whether this is an auto-created join entity.
    pub auto_created: bool,
}
