//! Foreign key retargeting.

use super::error::SwapError;
use super::relation::Relation;
use crate::catalog::{naming, Catalog, EntityIdent};
use crate::store::{ColumnRetarget, Store};
use tracing::{debug, info};

/// Result of rewriting one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The relation references neither side of the swap.
    Skipped,
    /// The column already had the requested name and target.
    Unchanged,
    /// The column was altered.
    Retargeted,
}

/// Points foreign key columns at a new entity.
pub struct ForeignKeyRewriter<S, C> {
    store: S,
    catalog: C,
}

impl<S: Store, C: Catalog> ForeignKeyRewriter<S, C> {
    /// Create a new rewriter.
    pub fn new(store: S, catalog: C) -> Self {
        Self { store, catalog }
    }

    /// Current table of the relation's owner.
    ///
    /// Falls back to the table recorded at discovery when the owner is no
    /// longer registered.
    fn owning_table(&self, relation: &Relation) -> Result<String, SwapError> {
        match self.catalog.resolve(&relation.owning_entity) {
            Ok(descriptor) => Ok(descriptor.table_name),
            Err(SwapError::EntityNotFound { .. }) => Ok(relation.owning_table.clone()),
            Err(e) => Err(e),
        }
    }

    /// Join column names for `from` and `to`, derived from the relation column.
    fn join_column_names(
        relation: &Relation,
        from: &EntityIdent,
        to: &EntityIdent,
    ) -> Option<(String, String)> {
        let target_base = relation.target.base_name();
        let old = naming::rename_join_column(&relation.column, &target_base, &from.base_name())?;
        let new = naming::rename_join_column(&relation.column, &target_base, &to.base_name())?;
        Some((old, new))
    }

    /// Retarget `relation` from `from` to `to`.
    pub fn rewrite(
        &self,
        relation: &Relation,
        from: &EntityIdent,
        to: &EntityIdent,
    ) -> Result<RewriteOutcome, SwapError> {
        if !relation.references(from) && !relation.references(to) {
            debug!(
                table = %relation.owning_table,
                column = %relation.column,
                target = %relation.target,
                "relation references neither entity"
            );
            return Ok(RewriteOutcome::Skipped);
        }

        let table = self.owning_table(relation)?;
        if !self.store.table_exists(&table)? {
            return Err(SwapError::mismatch(
                &table,
                &relation.column,
                "owning table does not exist",
            ));
        }
        let live = self.store.columns(&table)?;

        let (column, final_name) = if relation.auto_created {
            let (old, new) = Self::join_column_names(relation, from, to).ok_or_else(|| {
                SwapError::mismatch(
                    &table,
                    &relation.column,
                    format!("column is not derived from {}", relation.target),
                )
            })?;
            if live.contains(&old) {
                (old, new)
            } else if live.contains(&new) {
                (new.clone(), new)
            } else {
                return Err(SwapError::mismatch(
                    &table,
                    &relation.column,
                    format!("neither {} nor {} exists", old, new),
                ));
            }
        } else {
            if !live.contains(&relation.column) {
                return Err(SwapError::mismatch(
                    &table,
                    &relation.column,
                    "column does not exist",
                ));
            }
            (relation.column.clone(), relation.column.clone())
        };

        let retargeted = relation.with_target(to.clone(), Some(final_name));
        let change = ColumnRetarget {
            new_name: (retargeted.column != column).then(|| retargeted.column.clone()),
            target_table: self.catalog.table_name(&retargeted.target)?,
            target_column: self.catalog.primary_key(&retargeted.target)?,
            table,
            column,
        };

        if self.store.alter_column_target(&change)? {
            info!(
                table = %change.table,
                column = %change.final_name(),
                target = %change.target_table,
                "retargeted foreign key"
            );
            Ok(RewriteOutcome::Retargeted)
        } else {
            debug!(table = %change.table, column = %change.column, "foreign key already retargeted");
            Ok(RewriteOutcome::Unchanged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, SchemaBundle};
    use crate::store::SqliteStore;

    fn user() -> EntityIdent {
        EntityIdent::new("auth", "User")
    }

    fn myuser() -> EntityIdent {
        EntityIdent::new("accounts", "MyUser")
    }

    fn schema() -> SchemaBundle {
        SchemaBundle::new(1)
            .with_entity(EntityDef::new("auth", "User"))
            .with_entity(EntityDef::new("accounts", "MyUser"))
            .with_entity(
                EntityDef::new("myapp", "MyModel").with_field(FieldDef::foreign_key("owner", user())),
            )
            .with_entity(
                EntityDef::new("myapp", "OtherModel")
                    .with_field(FieldDef::many_to_many("owners", user())),
            )
    }

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch(
                r#"
            CREATE TABLE auth_user (id integer PRIMARY KEY);
            CREATE TABLE accounts_myuser (id integer PRIMARY KEY);
            CREATE TABLE myapp_othermodel (id integer PRIMARY KEY);
            CREATE TABLE myapp_mymodel (
                id integer PRIMARY KEY,
                owner_id integer REFERENCES auth_user (id)
            );
            CREATE TABLE myapp_othermodel_owners (
                id integer PRIMARY KEY,
                othermodel_id integer REFERENCES myapp_othermodel (id),
                user_id integer REFERENCES auth_user (id)
            );
            "#,
            )
            .unwrap();
        store
    }

    fn owner_relation() -> Relation {
        Relation {
            owning_entity: EntityIdent::new("myapp", "MyModel"),
            owning_table: "myapp_mymodel".to_string(),
            column: "owner_id".to_string(),
            target: user(),
            auto_created: false,
        }
    }

    fn owners_relation() -> Relation {
        Relation {
            owning_entity: EntityIdent::new("myapp", "OtherModel_owners"),
            owning_table: "myapp_othermodel_owners".to_string(),
            column: "user_id".to_string(),
            target: user(),
            auto_created: true,
        }
    }

    #[test]
    fn test_direct_relation_retargeted() {
        let store = store();
        let schema = schema();
        let rewriter = ForeignKeyRewriter::new(&store, &schema);

        let outcome = rewriter.rewrite(&owner_relation(), &user(), &myuser()).unwrap();

        assert_eq!(outcome, RewriteOutcome::Retargeted);
        assert_eq!(
            store.foreign_key_target("myapp_mymodel", "owner_id").unwrap().as_deref(),
            Some("accounts_myuser")
        );

        let again = rewriter.rewrite(&owner_relation(), &user(), &myuser()).unwrap();
        assert_eq!(again, RewriteOutcome::Unchanged);
    }

    #[test]
    fn test_join_relation_renamed_and_back() {
        let store = store();
        let schema = schema();
        let rewriter = ForeignKeyRewriter::new(&store, &schema);

        let outcome = rewriter.rewrite(&owners_relation(), &user(), &myuser()).unwrap();
        assert_eq!(outcome, RewriteOutcome::Retargeted);
        assert_eq!(
            store.columns("myapp_othermodel_owners").unwrap(),
            vec!["id", "othermodel_id", "myuser_id"]
        );

        // Same relation, opposite direction.
        let outcome = rewriter.rewrite(&owners_relation(), &myuser(), &user()).unwrap();
        assert_eq!(outcome, RewriteOutcome::Retargeted);
        assert_eq!(
            store.columns("myapp_othermodel_owners").unwrap(),
            vec!["id", "othermodel_id", "user_id"]
        );
        assert_eq!(
            store
                .foreign_key_target("myapp_othermodel_owners", "user_id")
                .unwrap()
                .as_deref(),
            Some("auth_user")
        );
    }

    #[test]
    fn test_join_relation_already_moved() {
        let store = store();
        let schema = schema();
        let rewriter = ForeignKeyRewriter::new(&store, &schema);

        rewriter.rewrite(&owners_relation(), &user(), &myuser()).unwrap();
        let again = rewriter.rewrite(&owners_relation(), &user(), &myuser()).unwrap();

        assert_eq!(again, RewriteOutcome::Unchanged);
        assert_eq!(
            store
                .foreign_key_target("myapp_othermodel_owners", "myuser_id")
                .unwrap()
                .as_deref(),
            Some("accounts_myuser")
        );
    }

    #[test]
    fn test_unrelated_relation_skipped() {
        let store = store();
        let schema = schema();
        let rewriter = ForeignKeyRewriter::new(&store, &schema);
        let relation = owners_relation().with_target(
            EntityIdent::new("myapp", "OtherModel"),
            Some("othermodel_id".to_string()),
        );

        let outcome = rewriter.rewrite(&relation, &user(), &myuser()).unwrap();
        assert_eq!(outcome, RewriteOutcome::Skipped);
    }

    #[test]
    fn test_missing_column_is_mismatch() {
        let store = store();
        let schema = schema();
        let rewriter = ForeignKeyRewriter::new(&store, &schema);

        let direct = owner_relation().with_target(user(), Some("creator_id".to_string()));
        assert!(matches!(
            rewriter.rewrite(&direct, &user(), &myuser()),
            Err(SwapError::SchemaMismatch { .. })
        ));

        let join = Relation {
            column: "member_id".to_string(),
            target: EntityIdent::new("auth", "Member"),
            ..owners_relation()
        };
        assert!(matches!(
            rewriter.rewrite(&join, &EntityIdent::new("auth", "Member"), &myuser()),
            Err(SwapError::SchemaMismatch { .. })
        ));
    }
}
