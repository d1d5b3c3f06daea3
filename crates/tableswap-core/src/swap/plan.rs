//! Migration plans and the plan builder.
//!
//! A plan is a pair of operation lists. The backward list undoes the forward
//! list step by step, in reverse order.

use super::copy::ColumnRemap;
use super::error::SwapError;
use super::relation::{self, ModelPair, Relation};
use crate::catalog::{Catalog, EntityIdent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Kind of a plan operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Batched row copy.
    Copy,
    /// Unconditional delete.
    Empty,
    /// Foreign key retarget.
    RewriteForeignKey,
    /// Type registry rename.
    RenameTypeTag,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Copy => "copy",
            OperationKind::Empty => "empty",
            OperationKind::RewriteForeignKey => "rewrite_foreign_key",
            OperationKind::RenameTypeTag => "rename_type_tag",
        };
        f.write_str(name)
    }
}

/// One step of a migration plan.
///
/// Operations name entities rather than tables; tables are looked up when
/// the operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Copy all rows of `from` into `to`.
    Copy {
        /// Entity rows are read from.
        from: EntityIdent,
        /// Entity rows are written to.
        to: EntityIdent,
        /// Join column renaming, for join entities.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remap: Option<ColumnRemap>,
    },
    /// Delete all rows of an entity.
    Empty {
        /// Entity to empty.
        entity: EntityIdent,
    },
    /// Point a foreign key column at another entity.
    RewriteForeignKey {
        /// The relation to rewrite.
        relation: Relation,
        /// Entity currently referenced.
        from: EntityIdent,
        /// Entity to reference.
        to: EntityIdent,
    },
    /// Re-tag type registry rows.
    RenameTypeTag {
        /// Current tag.
        from: EntityIdent,
        /// New tag.
        to: EntityIdent,
    },
}

impl Operation {
    /// Kind of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Copy { .. } => OperationKind::Copy,
            Operation::Empty { .. } => OperationKind::Empty,
            Operation::RewriteForeignKey { .. } => OperationKind::RewriteForeignKey,
            Operation::RenameTypeTag { .. } => OperationKind::RenameTypeTag,
        }
    }

    /// Short human-readable description.
    pub fn describe(&self) -> String {
        match self {
            Operation::Copy { from, to, .. } => format!("copy {} -> {}", from, to),
            Operation::Empty { entity } => format!("empty {}", entity),
            Operation::RewriteForeignKey { relation, from, to } => format!(
                "rewrite {}.{} {} -> {}",
                relation.owning_table, relation.column, from, to
            ),
            Operation::RenameTypeTag { from, to } => format!("rename type tag {} -> {}", from, to),
        }
    }
}

/// Which part of a swap a plan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanScope {
    /// Copy, rewrite and rename.
    Full,
    /// Copy rows into the destination.
    Populate,
    /// Retarget foreign keys.
    ForeignKeys,
    /// Rename type registry tags.
    TypeTags,
    /// Empty the destination; backward repopulates it.
    Depopulate,
}

impl fmt::Display for PlanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanScope::Full => "full",
            PlanScope::Populate => "populate",
            PlanScope::ForeignKeys => "foreign-keys",
            PlanScope::TypeTags => "type-tags",
            PlanScope::Depopulate => "depopulate",
        };
        f.write_str(name)
    }
}

impl FromStr for PlanScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(PlanScope::Full),
            "populate" => Ok(PlanScope::Populate),
            "foreign-keys" | "foreign_keys" => Ok(PlanScope::ForeignKeys),
            "type-tags" | "type_tags" => Ok(PlanScope::TypeTags),
            "depopulate" => Ok(PlanScope::Depopulate),
            other => Err(format!("unknown plan scope: {}", other)),
        }
    }
}

/// Which operation list to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Apply the swap.
    Forward,
    /// Undo the swap.
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Backward => f.write_str("backward"),
        }
    }
}

/// A reversible entity swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Entity being replaced.
    pub source: EntityIdent,
    /// Replacement entity.
    pub destination: EntityIdent,
    /// Part of the swap covered.
    pub scope: PlanScope,
    /// Operations applying the swap.
    pub forward: Vec<Operation>,
    /// Operations undoing the swap.
    pub backward: Vec<Operation>,
    /// Namespaces owning relations to either entity.
    #[serde(default)]
    pub related_namespaces: Vec<String>,
}

impl MigrationPlan {
    /// Operations for a direction.
    pub fn operations(&self, direction: Direction) -> &[Operation] {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    /// Check if the plan does nothing.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.backward.is_empty()
    }

    /// Parse a plan from JSON.
    pub fn from_json(json: &str) -> Result<Self, crate::error::Error> {
        serde_json::from_str(json).map_err(|e| crate::error::Error::Deserialization(e.to_string()))
    }

    /// Render the plan as pretty JSON.
    pub fn to_json(&self) -> Result<String, crate::error::Error> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::Error::Serialization(e.to_string()))
    }
}

/// Forward and backward halves of one plan section.
#[derive(Debug, Default)]
struct Section {
    forward: Vec<Operation>,
    backward: Vec<Operation>,
}

/// Builds migration plans from catalog metadata.
pub struct PlanBuilder<C> {
    catalog: C,
}

impl<C: Catalog> PlanBuilder<C> {
    /// Create a new plan builder.
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    /// Build a plan replacing `source` with `destination`.
    ///
    /// Either side may be missing from the catalog (swapped out, or never
    /// registered), in which case its tables are named by the fallback rule;
    /// at least one side must be registered.
    pub fn build(
        &self,
        source: &EntityIdent,
        destination: &EntityIdent,
        scope: PlanScope,
    ) -> Result<MigrationPlan, SwapError> {
        if source.refers_to(destination) {
            return Err(SwapError::InvalidConfig {
                message: format!("cannot swap {} with itself", source),
            });
        }
        if self.catalog.get_entity(source)?.is_none() {
            self.catalog.resolve(destination)?;
        }

        let joins = relation::many_to_many_pairs(&self.catalog, source, destination)?;

        let (forward, backward) = match scope {
            PlanScope::Full => {
                let populate = self.populate(source, destination, &joins);
                let rewrite = self.rewrite(source, destination, &joins)?;
                let tags = Self::type_tags(source, destination);

                let forward = [populate.forward, rewrite.forward, tags.forward].concat();
                let backward = [tags.backward, rewrite.backward, populate.backward].concat();
                (forward, backward)
            }
            PlanScope::Populate => {
                let populate = self.populate(source, destination, &joins);
                (populate.forward, populate.backward)
            }
            PlanScope::ForeignKeys => {
                let rewrite = self.rewrite(source, destination, &joins)?;
                (rewrite.forward, rewrite.backward)
            }
            PlanScope::TypeTags => {
                let tags = Self::type_tags(source, destination);
                (tags.forward, tags.backward)
            }
            PlanScope::Depopulate => {
                let populate = self.populate(source, destination, &joins);
                (populate.backward, populate.forward)
            }
        };

        let mut related_namespaces = relation::related_namespaces(&self.catalog, source)?;
        related_namespaces.extend(relation::related_namespaces(&self.catalog, destination)?);
        related_namespaces.sort();
        related_namespaces.dedup();

        Ok(MigrationPlan {
            source: source.clone(),
            destination: destination.clone(),
            scope,
            forward,
            backward,
            related_namespaces,
        })
    }

    /// Copy the parent then each join entity; undo children first.
    fn populate(
        &self,
        source: &EntityIdent,
        destination: &EntityIdent,
        joins: &[ModelPair],
    ) -> Section {
        let remap = ColumnRemap::between(source, destination);
        let mut section = Section::default();

        section.forward.push(Operation::Copy {
            from: source.clone(),
            to: destination.clone(),
            remap: None,
        });
        for join in joins {
            section.forward.push(Operation::Copy {
                from: join.source.clone(),
                to: join.destination.clone(),
                remap: Some(remap.clone()),
            });
        }

        for join in joins.iter().rev() {
            section.backward.push(Operation::Empty {
                entity: join.destination.clone(),
            });
        }
        section.backward.push(Operation::Empty {
            entity: destination.clone(),
        });
        section
    }

    /// Retarget every discovered relation outside the swapped join tables.
    fn rewrite(
        &self,
        source: &EntityIdent,
        destination: &EntityIdent,
        joins: &[ModelPair],
    ) -> Result<Section, SwapError> {
        let mut join_tables = Vec::with_capacity(joins.len() * 2);
        for join in joins {
            join_tables.push(self.catalog.table_name(&join.source)?);
            join_tables.push(self.catalog.table_name(&join.destination)?);
        }

        let mut section = Section::default();
        for relation in relation::discover_relations(&self.catalog, source, destination)? {
            let copied = joins.iter().any(|j| j.contains(&relation.owning_entity))
                || join_tables.contains(&relation.owning_table);
            if copied {
                debug!(
                    table = %relation.owning_table,
                    column = %relation.column,
                    "skipping relation on a copied join table"
                );
                continue;
            }

            section.forward.push(Operation::RewriteForeignKey {
                relation,
                from: source.clone(),
                to: destination.clone(),
            });
        }

        section.backward = section
            .forward
            .iter()
            .rev()
            .map(|op| match op {
                Operation::RewriteForeignKey { relation, from, to } => {
                    Operation::RewriteForeignKey {
                        relation: relation.clone(),
                        from: to.clone(),
                        to: from.clone(),
                    }
                }
                other => other.clone(),
            })
            .collect();
        Ok(section)
    }

    fn type_tags(source: &EntityIdent, destination: &EntityIdent) -> Section {
        Section {
            forward: vec![Operation::RenameTypeTag {
                from: source.clone(),
                to: destination.clone(),
            }],
            backward: vec![Operation::RenameTypeTag {
                from: destination.clone(),
                to: source.clone(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, SchemaBundle};

    fn user() -> EntityIdent {
        EntityIdent::new("auth", "User")
    }

    fn myuser() -> EntityIdent {
        EntityIdent::new("accounts", "MyUser")
    }

    fn schema() -> SchemaBundle {
        let group = EntityIdent::new("auth", "Group");
        SchemaBundle::new(1)
            .with_entity(EntityDef::new("auth", "Group"))
            .with_entity(
                EntityDef::new("auth", "User")
                    .with_field(FieldDef::scalar("username"))
                    .with_field(FieldDef::many_to_many("groups", group.clone())),
            )
            .with_entity(
                EntityDef::new("accounts", "MyUser")
                    .with_field(FieldDef::scalar("username"))
                    .with_field(FieldDef::many_to_many("groups", group)),
            )
            .with_entity(
                EntityDef::new("myapp", "MyModel").with_field(FieldDef::foreign_key("owner", user())),
            )
            .with_entity(
                EntityDef::new("myapp", "OtherModel")
                    .with_field(FieldDef::many_to_many("owners", user())),
            )
    }

    fn kinds(ops: &[Operation]) -> Vec<OperationKind> {
        ops.iter().map(Operation::kind).collect()
    }

    #[test]
    fn test_full_plan_order() {
        let schema = schema();
        let plan = PlanBuilder::new(&schema)
            .build(&user(), &myuser(), PlanScope::Full)
            .unwrap();

        assert_eq!(
            kinds(&plan.forward),
            vec![
                OperationKind::Copy,
                OperationKind::Copy,
                OperationKind::RewriteForeignKey,
                OperationKind::RewriteForeignKey,
                OperationKind::RenameTypeTag,
            ]
        );
        assert_eq!(
            kinds(&plan.backward),
            vec![
                OperationKind::RenameTypeTag,
                OperationKind::RewriteForeignKey,
                OperationKind::RewriteForeignKey,
                OperationKind::Empty,
                OperationKind::Empty,
            ]
        );
        assert_eq!(plan.related_namespaces, vec!["accounts", "auth", "myapp"]);
    }

    #[test]
    fn test_backward_mirrors_forward() {
        let schema = schema();
        let plan = PlanBuilder::new(&schema)
            .build(&user(), &myuser(), PlanScope::ForeignKeys)
            .unwrap();

        assert_eq!(plan.forward.len(), plan.backward.len());
        for (f, b) in plan.forward.iter().zip(plan.backward.iter().rev()) {
            match (f, b) {
                (
                    Operation::RewriteForeignKey { relation: r1, from: f1, to: t1 },
                    Operation::RewriteForeignKey { relation: r2, from: f2, to: t2 },
                ) => {
                    assert_eq!(r1, r2);
                    assert_eq!(f1, t2);
                    assert_eq!(t1, f2);
                }
                _ => panic!("unexpected operations"),
            }
        }

        let tables: Vec<_> = plan
            .forward
            .iter()
            .map(|op| match op {
                Operation::RewriteForeignKey { relation, .. } => relation.owning_table.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(tables, vec!["myapp_mymodel", "myapp_othermodel_owners"]);
    }

    #[test]
    fn test_populate_plan() {
        let schema = schema();
        let plan = PlanBuilder::new(&schema)
            .build(&user(), &myuser(), PlanScope::Populate)
            .unwrap();

        assert_eq!(
            plan.forward,
            vec![
                Operation::Copy {
                    from: user(),
                    to: myuser(),
                    remap: None
                },
                Operation::Copy {
                    from: EntityIdent::new("auth", "User_groups"),
                    to: EntityIdent::new("accounts", "MyUser_groups"),
                    remap: Some(ColumnRemap::between(&user(), &myuser())),
                },
            ]
        );
        assert_eq!(
            plan.backward,
            vec![
                Operation::Empty {
                    entity: EntityIdent::new("accounts", "MyUser_groups")
                },
                Operation::Empty { entity: myuser() },
            ]
        );
    }

    #[test]
    fn test_depopulate_exchanges_directions() {
        let schema = schema();
        let builder = PlanBuilder::new(&schema);
        let populate = builder.build(&user(), &myuser(), PlanScope::Populate).unwrap();
        let depopulate = builder.build(&user(), &myuser(), PlanScope::Depopulate).unwrap();

        assert_eq!(depopulate.forward, populate.backward);
        assert_eq!(depopulate.backward, populate.forward);
    }

    #[test]
    fn test_depopulate_unregistered_destination() {
        let schema = SchemaBundle::new(1).with_entity(
            EntityDef::new("accounts", "MyUser")
                .with_field(FieldDef::many_to_many("groups", EntityIdent::new("auth", "Group"))),
        );
        let plan = PlanBuilder::new(&schema)
            .build(&myuser(), &user(), PlanScope::Depopulate)
            .unwrap();

        assert_eq!(
            plan.forward,
            vec![
                Operation::Empty {
                    entity: EntityIdent::new("auth", "User_groups")
                },
                Operation::Empty { entity: user() },
            ]
        );
        assert_eq!(kinds(&plan.backward), vec![OperationKind::Copy, OperationKind::Copy]);
    }

    #[test]
    fn test_type_tags_plan() {
        let schema = schema();
        let plan = PlanBuilder::new(&schema)
            .build(&user(), &myuser(), PlanScope::TypeTags)
            .unwrap();

        assert_eq!(
            plan.forward,
            vec![Operation::RenameTypeTag {
                from: user(),
                to: myuser()
            }]
        );
        assert_eq!(
            plan.backward,
            vec![Operation::RenameTypeTag {
                from: myuser(),
                to: user()
            }]
        );
    }

    #[test]
    fn test_build_errors() {
        let schema = schema();
        let builder = PlanBuilder::new(&schema);

        assert!(matches!(
            builder.build(
                &EntityIdent::new("old", "Person"),
                &EntityIdent::new("accounts", "Nobody"),
                PlanScope::Full
            ),
            Err(SwapError::EntityNotFound { ref entity }) if entity == "accounts.Nobody"
        ));
        assert!(matches!(
            builder.build(&user(), &EntityIdent::new("auth", "user"), PlanScope::Full),
            Err(SwapError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_plan_json() {
        let schema = schema();
        let plan = PlanBuilder::new(&schema)
            .build(&user(), &myuser(), PlanScope::Full)
            .unwrap();

        let json = plan.to_json().unwrap();
        assert!(json.contains("\"kind\": \"rewrite_foreign_key\""));
        assert!(json.contains("\"scope\": \"full\""));
        assert_eq!(MigrationPlan::from_json(&json).unwrap(), plan);
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("foreign-keys".parse::<PlanScope>().unwrap(), PlanScope::ForeignKeys);
        assert_eq!(PlanScope::TypeTags.to_string(), "type-tags");
        assert!("everything".parse::<PlanScope>().is_err());
    }
}
