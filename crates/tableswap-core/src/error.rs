//! Core error types.

use thiserror::Error;

/// Store and catalog errors.
#[derive(Debug, Error)]
pub enum Error {
    /// SQLite backend error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Catalog storage error.
    #[error("catalog storage error: {0}")]
    Catalog(#[from] sled::Error),

    /// A statement was rejected by an integrity constraint.
    #[error("constraint violation on {table}: {message}")]
    Constraint {
        /// Table the statement targeted.
        table: String,
        /// Message reported by the store.
        message: String,
    },

    /// The referenced table does not exist.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The referenced column does not exist.
    #[error("unknown column {table}.{column}")]
    UnknownColumn {
        /// Table that was inspected.
        table: String,
        /// Column that was missing.
        column: String,
    },

    /// A table definition cannot be rewritten without losing part of it.
    #[error("cannot rewrite {table}.{column}: {message}")]
    UnsupportedDefinition {
        /// Table whose definition was parsed.
        table: String,
        /// Column being altered.
        column: String,
        /// What could not be handled.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Check whether this error is an integrity constraint failure.
    pub fn is_constraint(&self) -> bool {
        match self {
            Error::Constraint { .. } => true,
            Error::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
