//! SQLite store backend.

use super::ddl::{self, quote};
use super::{ColumnRetarget, RowBatch, Store, Value};
use crate::error::Error;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// Suffix for the scratch table used while rebuilding a table.
const REBUILD_SUFFIX: &str = "__tableswap_new";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(r) => ValueRef::Real(*r),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

fn value_from_ref(table: &str, value: ValueRef<'_>) -> Result<Value, Error> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(
            std::str::from_utf8(t)
                .map_err(|e| Error::Deserialization(format!("{}: {}", table, e)))?
                .to_string(),
        ),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

fn quote_list<'a>(idents: impl IntoIterator<Item = &'a String>) -> String {
    idents
        .into_iter()
        .map(|i| quote(i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Attach the table name to constraint failures.
fn store_err(table: &str, err: rusqlite::Error) -> Error {
    let err = Error::Sqlite(err);
    if err.is_constraint() {
        Error::Constraint {
            table: table.to_string(),
            message: err.to_string(),
        }
    } else {
        err
    }
}

/// SQLite-backed [`Store`].
///
/// Foreign key enforcement is switched on when the store is opened, so
/// integrity failures surface as constraint errors.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Result<Self, Error> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Execute one or more SQL statements.
    pub fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn table_sql(&self, table: &str) -> Result<String, Error> {
        self.conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| Error::UnknownTable(table.to_string()))
    }

    /// Explicit index and trigger statements attached to a table, indexes
    /// first.
    fn dependent_sql(&self, table: &str) -> Result<Vec<String>, Error> {
        let mut stmt = self.conn.prepare(
            "SELECT sql FROM sqlite_master \
             WHERE tbl_name = ?1 AND type IN ('index', 'trigger') AND sql IS NOT NULL \
             ORDER BY type, name",
        )?;
        let statements = stmt
            .query_map(params![table], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(statements)
    }

    /// Rebuild a table with one foreign key column retargeted.
    ///
    /// SQLite cannot alter a column's REFERENCES clause in place, so the table
    /// is recreated under a scratch name from its own definition, refilled,
    /// and renamed back; indexes and triggers are then recreated and the
    /// column renamed. Must run with foreign key enforcement off.
    fn rebuild_table(&self, change: &ColumnRetarget) -> Result<(), Error> {
        let table = change.table.as_str();
        let scratch = format!("{}{}", table, REBUILD_SUFFIX);
        let create = ddl::retarget_table_sql(&self.table_sql(table)?, &scratch, change)?;
        let dependents = self.dependent_sql(table)?;
        let columns = quote_list(&self.columns(table)?);

        debug!(table, sql = %create, "rebuilding table");

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| store_err(table, e))?;
        tx.execute(&create, []).map_err(|e| store_err(table, e))?;
        tx.execute(
            &format!(
                "INSERT INTO {} ({cols}) SELECT {cols} FROM {}",
                quote(&scratch),
                quote(table),
                cols = columns
            ),
            [],
        )
        .map_err(|e| store_err(table, e))?;
        tx.execute(&format!("DROP TABLE {}", quote(table)), [])
            .map_err(|e| store_err(table, e))?;
        tx.execute(
            &format!("ALTER TABLE {} RENAME TO {}", quote(&scratch), quote(table)),
            [],
        )
        .map_err(|e| store_err(table, e))?;
        for sql in &dependents {
            tx.execute(sql, []).map_err(|e| store_err(table, e))?;
        }
        if change.final_name() != change.column {
            tx.execute(
                &format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    quote(table),
                    quote(&change.column),
                    quote(change.final_name())
                ),
                [],
            )
            .map_err(|e| store_err(table, e))?;
        }

        let violations: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM pragma_foreign_key_check(?1)",
                params![table],
                |row| row.get(0),
            )
            .map_err(|e| store_err(table, e))?;
        if violations > 0 {
            return Err(Error::Constraint {
                table: table.to_string(),
                message: format!(
                    "{} rows would violate the foreign key on {} referencing {}",
                    violations,
                    change.final_name(),
                    change.target_table
                ),
            });
        }

        tx.commit().map_err(|e| store_err(table, e))?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn table_exists(&self, table: &str) -> Result<bool, Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map(params![table], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        if columns.is_empty() {
            return Err(Error::UnknownTable(table.to_string()));
        }
        Ok(columns)
    }

    fn max_key(&self, table: &str, key: &str) -> Result<Value, Error> {
        let sql = format!("SELECT MAX({}) FROM {}", quote(key), quote(table));
        let mut stmt = self.conn.prepare(&sql).map_err(|e| store_err(table, e))?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => value_from_ref(table, row.get_ref(0)?),
            None => Ok(Value::Null),
        }
    }

    fn select_range(
        &self,
        table: &str,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<RowBatch, Error> {
        let sql = format!(
            "SELECT * FROM {t} WHERE {k} >= ?1 AND {k} < ?2 ORDER BY {k}",
            t = quote(table),
            k = quote(key)
        );
        let mut stmt = self.conn.prepare(&sql).map_err(|e| store_err(table, e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut batch = RowBatch {
            columns,
            rows: Vec::new(),
        };
        let width = batch.columns.len();
        let mut rows = stmt.query(params![start, stop])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(value_from_ref(table, row.get_ref(i)?)?);
            }
            batch.rows.push(values);
        }
        Ok(batch)
    }

    fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<usize, Error> {
        if rows.is_empty() {
            return Ok(0);
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            quote_list(columns),
            placeholders.join(", ")
        );

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| store_err(table, e))?;
        {
            let mut stmt = tx.prepare(&sql).map_err(|e| store_err(table, e))?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(|e| store_err(table, e))?;
            }
        }
        tx.commit().map_err(|e| store_err(table, e))?;
        Ok(rows.len())
    }

    fn delete_all(&self, table: &str) -> Result<usize, Error> {
        self.conn
            .execute(&format!("DELETE FROM {}", quote(table)), [])
            .map_err(|e| store_err(table, e))
    }

    fn update_where(
        &self,
        table: &str,
        assignments: &[(&str, Value)],
        filter: &[(&str, Value)],
    ) -> Result<usize, Error> {
        let set: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", quote(column), i + 1))
            .collect();
        let offset = assignments.len();
        let mut sql = format!("UPDATE {} SET {}", quote(table), set.join(", "));
        if !filter.is_empty() {
            let conditions: Vec<String> = filter
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{} = ?{}", quote(column), offset + i + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let values = assignments.iter().chain(filter).map(|(_, value)| value);
        self.conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| store_err(table, e))
    }

    fn foreign_key_target(&self, table: &str, column: &str) -> Result<Option<String>, Error> {
        let target = self
            .conn
            .query_row(
                "SELECT \"table\" FROM pragma_foreign_key_list(?1) WHERE \"from\" = ?2",
                params![table, column],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(target)
    }

    fn alter_column_target(&self, change: &ColumnRetarget) -> Result<bool, Error> {
        let table = change.table.as_str();
        let columns = self.columns(table)?;
        if !columns.contains(&change.column) {
            return Err(Error::UnknownColumn {
                table: table.to_string(),
                column: change.column.clone(),
            });
        }

        let renamed = change.final_name() != change.column;
        let current = self.foreign_key_target(table, &change.column)?;
        let retargeted = !current
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(&change.target_table));
        if !renamed && !retargeted {
            return Ok(false);
        }

        let enforced: bool = self
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
        self.conn.pragma_update(None, "foreign_keys", false)?;
        let result = self.rebuild_table(change);
        self.conn.pragma_update(None, "foreign_keys", enforced)?;
        result?;

        Ok(true)
    }
}
