//! tableswap core - catalog, relational store, and entity swap engine.
//!
//! This crate plans and executes reversible migrations that move an entity
//! onto a new table without breaking the relations that point at it.

pub mod catalog;
pub mod error;
pub mod store;
pub mod swap;

pub use catalog::{
    Catalog, CatalogStore, EntityDef, EntityDescriptor, EntityIdent, FieldDef, FieldKind,
    SchemaBundle,
};
pub use error::Error;
pub use store::{SqliteStore, Store, Value};
pub use swap::{
    Direction, ExecutionReport, ExecutorConfig, MigrationPlan, Operation, PlanBuilder,
    PlanExecutor, PlanScope, Relation, SwapError, TypeRegistryConfig,
};
