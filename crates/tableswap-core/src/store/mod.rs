//! Relational store interface.
//!
//! The swap engine talks to the database only through [`Store`]: raw-row DML
//! for copying and emptying tables, a parameterized update for the type
//! registry, and one DDL operation for retargeting foreign keys.

mod ddl;
mod sqlite;
mod value;

pub use sqlite::SqliteStore;
pub use value::Value;

use crate::error::Error;

/// A batch of raw rows read from a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    /// Column names, in row order.
    pub columns: Vec<String>,
    /// Row values.
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A schema alteration pointing a foreign key column at a new table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRetarget {
    /// Table owning the column.
    pub table: String,
    /// Current column name.
    pub column: String,
    /// Table the column should reference.
    pub target_table: String,
    /// Referenced column on the target table.
    pub target_column: String,
    /// New column name, if the column is renamed as part of the alteration.
    pub new_name: Option<String>,
}

impl ColumnRetarget {
    /// Column name after the alteration.
    pub fn final_name(&self) -> &str {
        self.new_name.as_deref().unwrap_or(&self.column)
    }
}

/// DDL/DML and introspection operations used by the swap engine.
pub trait Store {
    /// Check whether a table exists.
    fn table_exists(&self, table: &str) -> Result<bool, Error>;

    /// Column names of a table in storage order.
    fn columns(&self, table: &str) -> Result<Vec<String>, Error>;

    /// Largest value of `key` in `table`, `Value::Null` when empty.
    fn max_key(&self, table: &str, key: &str) -> Result<Value, Error>;

    /// Rows with `start <= key < stop`, ordered by `key`.
    fn select_range(&self, table: &str, key: &str, start: i64, stop: i64)
        -> Result<RowBatch, Error>;

    /// Insert rows verbatim; all rows land or none do.
    fn insert_rows(&self, table: &str, columns: &[String], rows: &[Vec<Value>])
        -> Result<usize, Error>;

    /// Delete every row of a table.
    fn delete_all(&self, table: &str) -> Result<usize, Error>;

    /// Set `assignments` on rows matching every `filter` equality.
    fn update_where(
        &self,
        table: &str,
        assignments: &[(&str, Value)],
        filter: &[(&str, Value)],
    ) -> Result<usize, Error>;

    /// Table referenced by a foreign key column, if it has one.
    fn foreign_key_target(&self, table: &str, column: &str) -> Result<Option<String>, Error>;

    /// Retarget (and optionally rename) a foreign key column.
    ///
    /// A column that references nothing gains a foreign key to the target.
    /// Returns `false` when the column already had the requested name and
    /// target, in which case nothing was altered.
    fn alter_column_target(&self, change: &ColumnRetarget) -> Result<bool, Error>;
}

impl<S: Store + ?Sized> Store for &S {
    fn table_exists(&self, table: &str) -> Result<bool, Error> {
        (**self).table_exists(table)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, Error> {
        (**self).columns(table)
    }

    fn max_key(&self, table: &str, key: &str) -> Result<Value, Error> {
        (**self).max_key(table, key)
    }

    fn select_range(
        &self,
        table: &str,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<RowBatch, Error> {
        (**self).select_range(table, key, start, stop)
    }

    fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<usize, Error> {
        (**self).insert_rows(table, columns, rows)
    }

    fn delete_all(&self, table: &str) -> Result<usize, Error> {
        (**self).delete_all(table)
    }

    fn update_where(
        &self,
        table: &str,
        assignments: &[(&str, Value)],
        filter: &[(&str, Value)],
    ) -> Result<usize, Error> {
        (**self).update_where(table, assignments, filter)
    }

    fn foreign_key_target(&self, table: &str, column: &str) -> Result<Option<String>, Error> {
        (**self).foreign_key_target(table, column)
    }

    fn alter_column_target(&self, change: &ColumnRetarget) -> Result<bool, Error> {
        (**self).alter_column_target(change)
    }
}
