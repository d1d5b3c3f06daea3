//! Batched table copy.
//!
//! Rows move in primary-key ranges so memory stays bounded by the batch size
//! regardless of table size.

use super::error::SwapError;
use crate::catalog::{naming, EntityIdent};
use crate::store::{Store, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Configuration for table copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyConfig {
    /// Width of each primary key range.
    pub batch_size: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

impl CopyConfig {
    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), SwapError> {
        if self.batch_size == 0 {
            return Err(SwapError::InvalidConfig {
                message: "batch size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Renaming of join table columns derived from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRemap {
    /// Base name the source columns are derived from.
    pub from_base: String,
    /// Base name the destination columns are derived from.
    pub to_base: String,
}

impl ColumnRemap {
    /// Remap between the base names of two entities.
    pub fn between(from: &EntityIdent, to: &EntityIdent) -> Self {
        Self {
            from_base: from.base_name(),
            to_base: to.base_name(),
        }
    }

    /// The remap in the other direction.
    pub fn reversed(&self) -> Self {
        Self {
            from_base: self.to_base.clone(),
            to_base: self.from_base.clone(),
        }
    }

    /// Destination name for a source column, if it is a derived join column.
    pub fn apply(&self, column: &str) -> Option<String> {
        naming::rename_join_column(column, &self.from_base, &self.to_base)
    }
}

/// Progress of a finished copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyProgress {
    /// Rows inserted into the destination.
    pub rows_copied: u64,
    /// Key ranges visited.
    pub batches: u64,
}

/// Copies and empties tables through a [`Store`].
pub struct TableCopier<S> {
    store: S,
    config: CopyConfig,
}

impl<S: Store> TableCopier<S> {
    /// Create a new copier.
    pub fn new(store: S, config: CopyConfig) -> Result<Self, SwapError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Destination column for every source column, in source order.
    fn column_mapping(
        &self,
        source: &str,
        destination: &str,
        remap: Option<&ColumnRemap>,
    ) -> Result<Vec<String>, SwapError> {
        let source_columns = self.store.columns(source)?;
        let destination_columns = self.store.columns(destination)?;

        source_columns
            .iter()
            .map(|column| {
                if destination_columns.contains(column) {
                    return Ok(column.clone());
                }
                remap
                    .and_then(|r| r.apply(column))
                    .filter(|renamed| destination_columns.contains(renamed))
                    .ok_or_else(|| {
                        SwapError::mismatch(
                            destination,
                            column.clone(),
                            format!("no destination column for {}.{}", source, column),
                        )
                    })
            })
            .collect()
    }

    /// Copy every row of `source` into `destination`, keeping primary keys.
    ///
    /// Ranges `[start, start + batch_size)` cover `1..=MAX(primary_key)`; an
    /// empty source counts as a maximum of 1. Rows keyed below 1 stay behind
    /// and are reported with a warning.
    pub fn copy(
        &self,
        source: &str,
        destination: &str,
        primary_key: &str,
        remap: Option<&ColumnRemap>,
    ) -> Result<CopyProgress, SwapError> {
        let columns = self.column_mapping(source, destination, remap)?;

        let max_id = match self.store.max_key(source, primary_key)? {
            Value::Null => 1,
            Value::Integer(max) => max,
            other => {
                return Err(SwapError::mismatch(
                    source,
                    primary_key,
                    format!("primary key maximum {} is not an integer", other),
                ))
            }
        };

        let skipped = self.store.select_range(source, primary_key, i64::MIN, 1)?.len();
        if skipped > 0 {
            warn!(
                source,
                primary_key,
                rows = skipped,
                "rows with keys below 1 are not copied"
            );
        }

        let step = i64::try_from(self.config.batch_size).unwrap_or(i64::MAX);
        let mut progress = CopyProgress::default();
        let mut start: i64 = 1;

        while start <= max_id {
            let stop = start.saturating_add(step);
            let batch = self.store.select_range(source, primary_key, start, stop)?;
            if !batch.is_empty() {
                let inserted = self.store.insert_rows(destination, &columns, &batch.rows)?;
                progress.rows_copied += inserted as u64;
            }
            progress.batches += 1;
            debug!(source, destination, start, stop, rows = batch.len(), "copied batch");

            if stop == i64::MAX {
                break;
            }
            start = stop;
        }

        info!(
            source,
            destination,
            rows = progress.rows_copied,
            batches = progress.batches,
            "copied table"
        );
        Ok(progress)
    }

    /// Delete every row of `table`.
    pub fn empty(&self, table: &str) -> Result<u64, SwapError> {
        let deleted = self.store.delete_all(table)? as u64;
        info!(table, rows = deleted, "emptied table");
        Ok(deleted)
    }
}
