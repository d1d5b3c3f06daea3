//! Entity swap engine.
//!
//! Replaces the table behind one entity with another while keeping every
//! relation pointing at it intact:
//! - Relation discovery over the catalog
//! - Batched, primary-key ordered row copies
//! - Foreign key retargeting, including join table column renames
//! - Type registry re-tagging
//!
//! Every plan carries a backward operation list that undoes its forward list.
//!
//! # Example
//!
//! ```ignore
//! use tableswap_core::swap::{Direction, ExecutorConfig, PlanBuilder, PlanExecutor, PlanScope};
//!
//! let plan = PlanBuilder::new(&catalog).build(&source, &destination, PlanScope::Full)?;
//! let executor = PlanExecutor::new(&store, &catalog, ExecutorConfig::default())?;
//! let report = executor.execute(&plan, Direction::Forward)?;
//! ```

pub mod copy;
pub mod error;
pub mod executor;
pub mod plan;
pub mod registry;
pub mod relation;
pub mod rewrite;

pub use copy::{ColumnRemap, CopyConfig, CopyProgress, TableCopier};
pub use error::SwapError;
pub use executor::{ExecutionReport, ExecutorConfig, PlanExecutor};
pub use plan::{Direction, MigrationPlan, Operation, OperationKind, PlanBuilder, PlanScope};
pub use registry::{TypeRegistry, TypeRegistryConfig};
pub use relation::{
    discover_relations, many_to_many_pairs, referencing_relations, related_namespaces, ModelPair,
    Relation,
};
pub use rewrite::{ForeignKeyRewriter, RewriteOutcome};
