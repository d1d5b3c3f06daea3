//! Field definitions for entities.

use super::entity::EntityIdent;
use rkyv::Archive;
use serde::{Deserialize, Serialize};

/// What a field stores.
#[derive(
    Debug, Clone, PartialEq, Eq, Archive, rkyv::Serialize, rkyv::Deserialize, Serialize, Deserialize,
)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// A plain value column.
    Scalar,
    /// A foreign key column referencing another entity's primary key.
    ForeignKey {
        /// Referenced entity.
        target: EntityIdent,
    },
    /// A many-to-many relation realized by an auto-created join table.
    ManyToMany {
        /// Related entity.
        target: EntityIdent,
    },
}

/// A field definition within an entity.
#[derive(
    Debug, Clone, PartialEq, Eq, Archive, rkyv::Serialize, rkyv::Deserialize, Serialize, Deserialize,
)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Explicit storage column, overriding the derived one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_column: Option<String>,
    /// Field kind.
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDef {
    /// Create a scalar field.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_column: None,
            kind: FieldKind::Scalar,
        }
    }

    /// Create a foreign key field.
    pub fn foreign_key(name: impl Into<String>, target: EntityIdent) -> Self {
        Self {
            name: name.into(),
            db_column: None,
            kind: FieldKind::ForeignKey { target },
        }
    }

    /// Create a many-to-many field.
    pub fn many_to_many(name: impl Into<String>, target: EntityIdent) -> Self {
        Self {
            name: name.into(),
            db_column: None,
            kind: FieldKind::ManyToMany { target },
        }
    }

    /// Override the storage column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.db_column = Some(column.into());
        self
    }

    /// Storage column on the owning table, if any.
    pub fn column(&self) -> Option<String> {
        match (&self.kind, &self.db_column) {
            (FieldKind::ManyToMany { .. }, _) => None,
            (_, Some(column)) => Some(column.clone()),
            (FieldKind::ForeignKey { .. }, None) => Some(format!("{}_id", self.name)),
            (FieldKind::Scalar, None) => Some(self.name.clone()),
        }
    }

    /// Entity referenced by this field.
    pub fn target(&self) -> Option<&EntityIdent> {
        match &self.kind {
            FieldKind::ForeignKey { target } | FieldKind::ManyToMany { target } => Some(target),
            FieldKind::Scalar => None,
        }
    }

    /// Check if this field is a foreign key.
    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, FieldKind::ForeignKey { .. })
    }

    /// Check if this field is a many-to-many relation.
    pub fn is_many_to_many(&self) -> bool {
        matches!(self.kind, FieldKind::ManyToMany { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_columns() {
        let user = EntityIdent::new("auth", "User");

        assert_eq!(FieldDef::scalar("email").column().as_deref(), Some("email"));
        assert_eq!(
            FieldDef::foreign_key("owner", user.clone()).column().as_deref(),
            Some("owner_id")
        );
        assert_eq!(
            FieldDef::foreign_key("owner", user.clone())
                .with_column("owned_by")
                .column()
                .as_deref(),
            Some("owned_by")
        );
        assert!(FieldDef::many_to_many("owners", user).column().is_none());
    }

    #[test]
    fn test_field_json_shape() {
        let json = r#"{"name": "owner", "kind": "foreign_key", "target": "auth.User"}"#;
        let field: FieldDef = serde_json::from_str(json).unwrap();

        assert!(field.is_foreign_key());
        assert_eq!(field.target(), Some(&EntityIdent::new("auth", "User")));

        let scalar: FieldDef = serde_json::from_str(r#"{"name": "email", "kind": "scalar"}"#).unwrap();
        assert_eq!(scalar.kind, FieldKind::Scalar);
        assert!(scalar.target().is_none());
    }
}
