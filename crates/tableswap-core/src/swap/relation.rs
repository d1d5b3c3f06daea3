//! Relation discovery.
//!
//! Finds every foreign key column that points at an entity, whether declared
//! directly or realized through the join table of a many-to-many field.

use super::error::SwapError;
use crate::catalog::{naming, Catalog, EntityDef, EntityIdent, FieldDef};
use serde::{Deserialize, Serialize};

/// A foreign key column on some table referencing an entity's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Entity owning the column (a join entity for auto-created relations).
    pub owning_entity: EntityIdent,
    /// Table owning the column, as named at discovery time.
    pub owning_table: String,
    /// The foreign key column.
    pub column: String,
    /// Referenced entity.
    pub target: EntityIdent,
    /// Whether the column lives on an auto-created join table.
    pub auto_created: bool,
}

impl Relation {
    /// The same relation pointing at another entity.
    ///
    /// `column` renames the foreign key column when given.
    pub fn with_target(&self, target: EntityIdent, column: Option<String>) -> Relation {
        Relation {
            target,
            column: column.unwrap_or_else(|| self.column.clone()),
            ..self.clone()
        }
    }

    /// Check whether this relation references `entity`.
    pub fn references(&self, entity: &EntityIdent) -> bool {
        self.target.refers_to(entity)
    }
}

/// A pair of entities whose rows move together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPair {
    /// Entity rows are taken from.
    pub source: EntityIdent,
    /// Entity rows are written to.
    pub destination: EntityIdent,
}

impl ModelPair {
    /// Create a new pair.
    pub fn new(source: EntityIdent, destination: EntityIdent) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Check whether `entity` is either side of the pair.
    pub fn contains(&self, entity: &EntityIdent) -> bool {
        self.source.refers_to(entity) || self.destination.refers_to(entity)
    }
}

fn direct_relation(owner: &EntityDef, field: &FieldDef, target: &EntityIdent) -> Option<Relation> {
    Some(Relation {
        owning_entity: owner.ident(),
        owning_table: owner.table_name(),
        column: field.column()?,
        target: target.clone(),
        auto_created: false,
    })
}

fn join_relation(
    owner: &EntityDef,
    field: &FieldDef,
    column: String,
    target: &EntityIdent,
) -> Relation {
    Relation {
        owning_entity: owner.ident().join(&field.name),
        owning_table: naming::join_table_name(&owner.table_name(), &field.name),
        column,
        target: target.clone(),
        auto_created: true,
    }
}

/// Every relation referencing `entity`, plus both sides of its own join tables.
///
/// For `k` foreign key columns pointing at `entity` and `m` many-to-many
/// fields owned by it, this yields `k + 2m` relations. `entity` itself need
/// not be registered.
pub fn referencing_relations<C: Catalog + ?Sized>(
    catalog: &C,
    entity: &EntityIdent,
) -> Result<Vec<Relation>, SwapError> {
    let mut relations = Vec::new();

    for owner in catalog.entities()? {
        let owns = owner.ident().refers_to(entity);
        for field in &owner.fields {
            let Some(target) = field.target() else {
                continue;
            };

            if field.is_foreign_key() {
                if target.refers_to(entity) {
                    relations.extend(direct_relation(&owner, field, entity));
                }
            } else if owns {
                let (owner_column, target_column) = naming::join_columns(&owner.ident(), target);
                relations.push(join_relation(&owner, field, owner_column, entity));
                relations.push(join_relation(&owner, field, target_column, target));
            } else if target.refers_to(entity) {
                let (_, target_column) = naming::join_columns(&owner.ident(), target);
                relations.push(join_relation(&owner, field, target_column, entity));
            }
        }
    }

    Ok(relations)
}

/// Relations touching either side of a swap, sorted by table and column.
pub fn discover_relations<C: Catalog + ?Sized>(
    catalog: &C,
    source: &EntityIdent,
    destination: &EntityIdent,
) -> Result<Vec<Relation>, SwapError> {
    let mut relations = referencing_relations(catalog, source)?;
    relations.extend(referencing_relations(catalog, destination)?);

    relations.sort_by(|a, b| {
        (a.owning_table.as_str(), a.column.as_str())
            .cmp(&(b.owning_table.as_str(), b.column.as_str()))
    });
    relations.dedup_by(|a, b| a.owning_table == b.owning_table && a.column == b.column);
    Ok(relations)
}

/// Join entity pairs for the many-to-many fields of a swap, in declaration order.
///
/// Fields are taken from the source when it is registered, otherwise from the
/// destination, and must exist by name on the other side when that side is
/// registered too.
pub fn many_to_many_pairs<C: Catalog + ?Sized>(
    catalog: &C,
    source: &EntityIdent,
    destination: &EntityIdent,
) -> Result<Vec<ModelPair>, SwapError> {
    let source_def = catalog.get_entity(source)?;
    let destination_def = catalog.get_entity(destination)?;

    let (declaring, counterpart) = match (&source_def, &destination_def) {
        (Some(s), d) => (s, d.as_ref()),
        (None, Some(d)) => (d, None),
        (None, None) => {
            return Err(SwapError::EntityNotFound {
                entity: source.to_string(),
            })
        }
    };

    let mut pairs = Vec::new();
    for field in declaring.many_to_many_fields() {
        if let Some(other) = counterpart {
            let matched = other
                .get_field(&field.name)
                .is_some_and(FieldDef::is_many_to_many);
            if !matched {
                return Err(SwapError::mismatch(
                    other.table_name(),
                    field.name.clone(),
                    format!("{} has no many-to-many field '{}'", other.ident(), field.name),
                ));
            }
        }
        pairs.push(ModelPair::new(
            source.join(&field.name),
            destination.join(&field.name),
        ));
    }
    Ok(pairs)
}

/// Sorted namespaces owning a relation that references `entity`.
pub fn related_namespaces<C: Catalog + ?Sized>(
    catalog: &C,
    entity: &EntityIdent,
) -> Result<Vec<String>, SwapError> {
    let mut namespaces: Vec<String> = referencing_relations(catalog, entity)?
        .into_iter()
        .filter(|r| r.references(entity))
        .map(|r| r.owning_entity.namespace)
        .collect();
    namespaces.sort();
    namespaces.dedup();
    Ok(namespaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaBundle;

    fn user() -> EntityIdent {
        EntityIdent::new("auth", "User")
    }

    fn myuser() -> EntityIdent {
        EntityIdent::new("accounts", "MyUser")
    }

    fn group() -> EntityIdent {
        EntityIdent::new("auth", "Group")
    }

    fn schema() -> SchemaBundle {
        SchemaBundle::new(1)
            .with_entity(EntityDef::new("auth", "Group").with_field(FieldDef::scalar("name")))
            .with_entity(
                EntityDef::new("auth", "User")
                    .with_field(FieldDef::scalar("username"))
                    .with_field(FieldDef::many_to_many("groups", group())),
            )
            .with_entity(
                EntityDef::new("accounts", "MyUser")
                    .with_field(FieldDef::scalar("username"))
                    .with_field(FieldDef::many_to_many("groups", group())),
            )
            .with_entity(
                EntityDef::new("myapp", "MyModel").with_field(FieldDef::foreign_key("owner", user())),
            )
            .with_entity(
                EntityDef::new("myapp", "OtherModel")
                    .with_field(FieldDef::many_to_many("owners", user())),
            )
            .with_entity(
                EntityDef::new("admin", "LogEntry").with_field(FieldDef::foreign_key("user", user())),
            )
    }

    #[test]
    fn test_with_target_is_pure() {
        let relation = Relation {
            owning_entity: EntityIdent::new("myapp", "OtherModel_owners"),
            owning_table: "myapp_othermodel_owners".to_string(),
            column: "user_id".to_string(),
            target: user(),
            auto_created: true,
        };
        let moved = relation.with_target(myuser(), Some("myuser_id".to_string()));

        assert_eq!(relation.column, "user_id");
        assert_eq!(moved.column, "myuser_id");
        assert!(moved.references(&myuser()));
        assert_eq!(moved.owning_table, relation.owning_table);
    }

    #[test]
    fn test_referencing_relations_counts() {
        let schema = schema();
        let relations = referencing_relations(&schema, &user()).unwrap();

        // MyModel.owner, LogEntry.user, OtherModel_owners.user_id, plus both
        // sides of User_groups.
        assert_eq!(relations.len(), 5);
        let own: Vec<_> = relations
            .iter()
            .filter(|r| r.owning_table == "auth_user_groups")
            .map(|r| r.column.as_str())
            .collect();
        assert_eq!(own, vec!["user_id", "group_id"]);

        let owners = relations
            .iter()
            .find(|r| r.owning_table == "myapp_othermodel_owners")
            .unwrap();
        assert_eq!(owners.column, "user_id");
        assert!(owners.auto_created);
    }

    #[test]
    fn test_referencing_relations_unregistered_entity() {
        let schema = schema();
        let relations = referencing_relations(&schema, &EntityIdent::new("old", "Person")).unwrap();
        assert!(relations.is_empty());
    }

    #[test]
    fn test_discover_relations_sorted_and_deduplicated() {
        let schema = schema();
        let relations = discover_relations(&schema, &user(), &myuser()).unwrap();

        let keys: Vec<_> = relations
            .iter()
            .map(|r| format!("{}.{}", r.owning_table, r.column))
            .collect();
        assert_eq!(
            keys,
            vec![
                "accounts_myuser_groups.group_id",
                "accounts_myuser_groups.myuser_id",
                "admin_logentry.user_id",
                "auth_user_groups.group_id",
                "auth_user_groups.user_id",
                "myapp_mymodel.owner_id",
                "myapp_othermodel_owners.user_id",
            ]
        );
    }

    #[test]
    fn test_many_to_many_pairs() {
        let schema = schema();
        let pairs = many_to_many_pairs(&schema, &user(), &myuser()).unwrap();

        assert_eq!(
            pairs,
            vec![ModelPair::new(
                EntityIdent::new("auth", "User_groups"),
                EntityIdent::new("accounts", "MyUser_groups"),
            )]
        );
    }

    #[test]
    fn test_many_to_many_pairs_source_swapped_out() {
        let schema = SchemaBundle::new(1).with_entity(
            EntityDef::new("accounts", "MyUser").with_field(FieldDef::many_to_many("groups", group())),
        );
        let pairs = many_to_many_pairs(&schema, &user(), &myuser()).unwrap();
        assert_eq!(pairs[0].source, EntityIdent::new("auth", "User_groups"));
    }

    #[test]
    fn test_many_to_many_pairs_missing_counterpart() {
        let schema = schema().with_entity(EntityDef::new("accounts", "MyUser"));
        let err = many_to_many_pairs(&schema, &user(), &myuser()).unwrap_err();

        assert!(matches!(
            err,
            SwapError::SchemaMismatch { ref column, .. } if column == "groups"
        ));
    }

    #[test]
    fn test_related_namespaces() {
        let schema = schema();
        assert_eq!(
            related_namespaces(&schema, &user()).unwrap(),
            vec!["admin", "auth", "myapp"]
        );
        assert_eq!(related_namespaces(&schema, &group()).unwrap(), vec!["accounts", "auth"]);
    }
}
