//! Swap-specific error types.

use super::plan::OperationKind;
use crate::catalog::ParseIdentError;
use crate::error::Error;
use thiserror::Error;

/// Errors raised while planning or executing an entity swap.
#[derive(Debug, Error)]
pub enum SwapError {
    /// An entity identifier does not resolve in the catalog.
    #[error("entity not found: {entity}")]
    EntityNotFound {
        /// The identifier that failed to resolve.
        entity: String,
    },

    /// Catalog metadata disagrees with the live schema.
    #[error("schema mismatch on {table}.{column}: {reason}")]
    SchemaMismatch {
        /// Table being inspected.
        table: String,
        /// Offending column.
        column: String,
        /// What disagreed.
        reason: String,
    },

    /// A statement was rejected by an integrity constraint.
    #[error("referential violation on {table}: {message}")]
    ReferentialViolation {
        /// Table the statement targeted.
        table: String,
        /// Message reported by the store.
        message: String,
    },

    /// Any other store or catalog failure.
    #[error("store error: {0}")]
    StoreIo(#[source] Error),

    /// An entity identifier could not be parsed.
    #[error(transparent)]
    InvalidIdentifier(#[from] ParseIdentError),

    /// A configuration value is out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A plan operation failed; earlier operations remain applied.
    #[error("operation {index} ({kind}) failed: {source}")]
    Aborted {
        /// Position of the failing operation in the executed list.
        index: usize,
        /// Kind of the failing operation.
        kind: OperationKind,
        /// The underlying failure.
        source: Box<SwapError>,
    },
}

impl SwapError {
    /// Build a schema mismatch error.
    pub fn mismatch(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SwapError::SchemaMismatch {
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// The innermost error, looking through `Aborted` wrappers.
    pub fn root_cause(&self) -> &SwapError {
        match self {
            SwapError::Aborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<Error> for SwapError {
    fn from(err: Error) -> Self {
        match err {
            Error::Constraint { table, message } => {
                SwapError::ReferentialViolation { table, message }
            }
            Error::UnsupportedDefinition {
                table,
                column,
                message,
            } => SwapError::SchemaMismatch {
                table,
                column,
                reason: message,
            },
            other => SwapError::StoreIo(other),
        }
    }
}
