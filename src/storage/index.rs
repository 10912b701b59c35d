// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Secondary index contract.
//!
//! Real index structures live outside this crate. The transactional core
//! only needs to append entries on the write path and remove them in bulk
//! during cleanup and rollback.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::error::StorageError;
use super::{Row, RowBatch, RowId, Value};

/// A secondary index over a table.
pub trait Index: Send + Sync {
    /// Returns the index name.
    fn name(&self) -> &str;

    /// Adds entries for the given tuples.
    fn append(&self, batch: &RowBatch, row_ids: &[RowId]) -> Result<(), StorageError>;

    /// Removes the entries the given tuples produced.
    fn remove(&self, batch: &RowBatch, row_ids: &[RowId]) -> Result<(), StorageError>;
}

/// Index maintenance contract a table exposes to the cleanup pass.
pub trait TableIndexes {
    /// Number of secondary indexes. Cleanup skips tables without any.
    fn index_count(&self) -> usize;

    /// Materializes buffered tuple payloads into a columnar batch.
    fn retrieve_versioned_data(&self, tuples: &[Row]) -> RowBatch;

    /// Removes the entries produced by `batch` from every index.
    fn remove_from_indexes_batch(
        &self,
        batch: &RowBatch,
        row_ids: &[RowId],
    ) -> Result<(), StorageError>;

    /// Removes the entries of the given rows from every index, reading the
    /// row images back from storage.
    fn remove_from_indexes(&self, row_ids: &[RowId]) -> Result<(), StorageError>;
}

/// In-memory hash index over a single column.
///
/// Entries are reference counted per `(key, row)` so an update that rewrites
/// a key to the same value keeps one entry after the old version is cleaned
/// up.
pub struct HashIndex {
    name: String,
    column: usize,
    entries: RwLock<HashMap<Value, HashMap<RowId, u32>>>,
}

impl HashIndex {
    /// Creates an empty index over `column`.
    pub fn new(name: impl Into<String>, column: usize) -> Self {
        Self {
            name: name.into(),
            column,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the rows indexed under `key`, in ascending order.
    pub fn lookup(&self, key: &Value) -> Vec<RowId> {
        let entries = self.entries.read();
        let mut rows: Vec<RowId> = entries
            .get(key)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default();
        rows.sort();
        rows
    }

    /// Returns the number of `(key, row)` entries.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keys<'a>(&self, batch: &'a RowBatch) -> Result<&'a [Value], StorageError> {
        batch.column(self.column).ok_or_else(|| StorageError::Index {
            index: self.name.clone(),
            message: format!(
                "batch has {} columns, index column is {}",
                batch.column_count(),
                self.column
            ),
        })
    }
}

impl Index for HashIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn append(&self, batch: &RowBatch, row_ids: &[RowId]) -> Result<(), StorageError> {
        let keys = self.keys(batch)?;
        let mut entries = self.entries.write();
        for (key, row_id) in keys.iter().zip(row_ids) {
            *entries
                .entry(key.clone())
                .or_default()
                .entry(*row_id)
                .or_insert(0) += 1;
        }
        Ok(())
    }

    fn remove(&self, batch: &RowBatch, row_ids: &[RowId]) -> Result<(), StorageError> {
        let keys = self.keys(batch)?;
        let mut entries = self.entries.write();
        for (key, row_id) in keys.iter().zip(row_ids) {
            let Some(rows) = entries.get_mut(key) else {
                continue;
            };
            if let Some(count) = rows.get_mut(row_id) {
                *count -= 1;
                if *count == 0 {
                    rows.remove(row_id);
                }
            }
            if rows.is_empty() {
                entries.remove(key);
            }
        }
        Ok(())
    }
}
