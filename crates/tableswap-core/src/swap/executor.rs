//! Plan executor - runs one direction of a plan against a store.

use super::copy::{CopyConfig, TableCopier};
use super::error::SwapError;
use super::plan::{Direction, MigrationPlan, Operation};
use super::registry::{TypeRegistry, TypeRegistryConfig};
use super::rewrite::{ForeignKeyRewriter, RewriteOutcome};
use crate::catalog::Catalog;
use crate::store::Store;
use serde::Serialize;
use tracing::{info, instrument};

/// Executor configuration.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Copy configuration.
    pub copy: CopyConfig,
    /// Type registry location.
    pub registry: TypeRegistryConfig,
    /// Whether to log operations without touching the store.
    pub dry_run: bool,
}

impl ExecutorConfig {
    /// Set the copy batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.copy.batch_size = batch_size;
        self
    }

    /// Set the type registry location.
    pub fn with_registry(mut self, registry: TypeRegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Result of executing one direction of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// Direction that ran.
    pub direction: Direction,
    /// Operations completed.
    pub operations_executed: usize,
    /// Operations in the direction.
    pub total_operations: usize,
    /// Rows inserted by copies.
    pub rows_copied: u64,
    /// Rows removed by empties.
    pub rows_deleted: u64,
    /// Foreign key columns altered.
    pub foreign_keys_rewritten: usize,
    /// Type registry rows re-tagged.
    pub type_tags_renamed: u64,
}

impl ExecutionReport {
    fn new(direction: Direction, total_operations: usize) -> Self {
        Self {
            direction,
            operations_executed: 0,
            total_operations,
            rows_copied: 0,
            rows_deleted: 0,
            foreign_keys_rewritten: 0,
            type_tags_renamed: 0,
        }
    }
}

/// Runs migration plans.
pub struct PlanExecutor<S, C> {
    store: S,
    catalog: C,
    config: ExecutorConfig,
}

impl<S: Store, C: Catalog> PlanExecutor<S, C> {
    /// Create a new executor.
    pub fn new(store: S, catalog: C, config: ExecutorConfig) -> Result<Self, SwapError> {
        config.copy.validate()?;
        Ok(Self {
            store,
            catalog,
            config,
        })
    }

    /// Execute the operations of `plan` for `direction`, in order.
    ///
    /// Stops at the first failure; operations before it stay applied.
    #[instrument(skip(self, plan), fields(source = %plan.source, destination = %plan.destination, scope = %plan.scope))]
    pub fn execute(
        &self,
        plan: &MigrationPlan,
        direction: Direction,
    ) -> Result<ExecutionReport, SwapError> {
        let operations = plan.operations(direction);
        let mut report = ExecutionReport::new(direction, operations.len());

        for (index, operation) in operations.iter().enumerate() {
            info!(
                index,
                total = operations.len(),
                dry_run = self.config.dry_run,
                "{}",
                operation.describe()
            );
            if self.config.dry_run {
                continue;
            }

            self.execute_operation(operation, &mut report)
                .map_err(|e| SwapError::Aborted {
                    index,
                    kind: operation.kind(),
                    source: Box::new(e),
                })?;
            report.operations_executed += 1;
        }

        info!(
            executed = report.operations_executed,
            rows_copied = report.rows_copied,
            rows_deleted = report.rows_deleted,
            foreign_keys = report.foreign_keys_rewritten,
            type_tags = report.type_tags_renamed,
            "plan {} complete",
            direction
        );
        Ok(report)
    }

    fn execute_operation(
        &self,
        operation: &Operation,
        report: &mut ExecutionReport,
    ) -> Result<(), SwapError> {
        match operation {
            Operation::Copy { from, to, remap } => {
                let copier = TableCopier::new(&self.store, self.config.copy.clone())?;
                let progress = copier.copy(
                    &self.catalog.table_name(from)?,
                    &self.catalog.table_name(to)?,
                    &self.catalog.primary_key(from)?,
                    remap.as_ref(),
                )?;
                report.rows_copied += progress.rows_copied;
            }
            Operation::Empty { entity } => {
                let copier = TableCopier::new(&self.store, self.config.copy.clone())?;
                report.rows_deleted += copier.empty(&self.catalog.table_name(entity)?)?;
            }
            Operation::RewriteForeignKey { relation, from, to } => {
                let rewriter = ForeignKeyRewriter::new(&self.store, &self.catalog);
                if rewriter.rewrite(relation, from, to)? == RewriteOutcome::Retargeted {
                    report.foreign_keys_rewritten += 1;
                }
            }
            Operation::RenameTypeTag { from, to } => {
                let registry = TypeRegistry::new(&self.store, self.config.registry.clone());
                report.type_tags_renamed += registry.rename(from, to)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, EntityIdent, FieldDef, SchemaBundle};
    use crate::store::{SqliteStore, Value};
    use crate::swap::{PlanBuilder, PlanScope};

    fn schema() -> SchemaBundle {
        SchemaBundle::new(1)
            .with_entity(EntityDef::new("auth", "User").with_field(FieldDef::scalar("username")))
            .with_entity(
                EntityDef::new("accounts", "MyUser").with_field(FieldDef::scalar("username")),
            )
    }

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch(
                r#"
            CREATE TABLE auth_user (id integer PRIMARY KEY, username text);
            CREATE TABLE accounts_myuser (id integer PRIMARY KEY, username text);
            INSERT INTO auth_user VALUES (1, 'a'), (2, 'b');
            "#,
            )
            .unwrap();
        store
    }

    fn plan(schema: &SchemaBundle) -> MigrationPlan {
        PlanBuilder::new(schema)
            .build(
                &EntityIdent::new("auth", "User"),
                &EntityIdent::new("accounts", "MyUser"),
                PlanScope::Populate,
            )
            .unwrap()
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let store = store();
        let schema = schema();
        let result = PlanExecutor::new(&store, &schema, ExecutorConfig::default().with_batch_size(0));
        assert!(matches!(result, Err(SwapError::InvalidConfig { .. })));
    }

    #[test]
    fn test_execute_forward_and_backward() {
        let store = store();
        let schema = schema();
        let plan = plan(&schema);
        let executor = PlanExecutor::new(&store, &schema, ExecutorConfig::default()).unwrap();

        let report = executor.execute(&plan, Direction::Forward).unwrap();
        assert_eq!(report.operations_executed, 1);
        assert_eq!(report.rows_copied, 2);
        assert_eq!(store.max_key("accounts_myuser", "id").unwrap(), Value::Integer(2));

        let report = executor.execute(&plan, Direction::Backward).unwrap();
        assert_eq!(report.direction, Direction::Backward);
        assert_eq!(report.rows_deleted, 2);
        assert_eq!(store.max_key("accounts_myuser", "id").unwrap(), Value::Null);
    }

    #[test]
    fn test_dry_run_leaves_store_untouched() {
        let store = store();
        let schema = schema();
        let plan = plan(&schema);
        let executor = PlanExecutor::new(
            &store,
            &schema,
            ExecutorConfig::default().with_dry_run(true),
        )
        .unwrap();

        let report = executor.execute(&plan, Direction::Forward).unwrap();
        assert_eq!(report.operations_executed, 0);
        assert_eq!(report.total_operations, 1);
        assert_eq!(store.max_key("accounts_myuser", "id").unwrap(), Value::Null);
    }

    #[test]
    fn test_failure_names_operation() {
        let store = store();
        store
            .execute_batch("INSERT INTO accounts_myuser VALUES (2, 'taken')")
            .unwrap();
        let schema = schema();
        let plan = plan(&schema);
        let executor = PlanExecutor::new(&store, &schema, ExecutorConfig::default()).unwrap();

        let err = executor.execute(&plan, Direction::Forward).unwrap_err();
        match err {
            SwapError::Aborted { index, kind, source } => {
                assert_eq!(index, 0);
                assert_eq!(kind, crate::swap::OperationKind::Copy);
                assert!(matches!(*source, SwapError::ReferentialViolation { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
