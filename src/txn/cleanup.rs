// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Batched reclamation of committed undo records.
//!
//! Once every live snapshot has moved past a commit, the versions that
//! commit superseded can be unlinked. Row versions of indexed tables also
//! own index entries. Those are not removed one row at a time: consecutive
//! records of the same table and kind are buffered and handed to the index
//! layer as one batch.

use std::sync::Arc;

use tracing::{debug, error};

use crate::catalog::Catalog;
use crate::storage::{DataTable, Row, RowId, RowImage, TableIndexes};

use super::config::STANDARD_VECTOR_SIZE;
use super::error::TxnError;
use super::undo::UndoRecord;

/// Counters reported by a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Undo records consumed, markers included.
    pub records: usize,
    /// Row version nodes unlinked.
    pub versions_reclaimed: usize,
    /// Catalog entries unlinked.
    pub catalog_entries_reclaimed: usize,
    /// Batched index removals issued.
    pub flushes: usize,
    /// Rows handed to index removal across all flushes.
    pub index_rows_removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchMode {
    None,
    Update,
    Delete,
}

/// Consumes committed undo records and reclaims what they superseded.
///
/// Callers must only feed records whose commit is older than every active
/// snapshot. A residual batch is flushed by [`finish`](Self::finish) or, if
/// the state is dropped early, on drop.
pub struct CleanupState<'a> {
    catalog: &'a Catalog,
    capacity: usize,
    current_table: Option<Arc<DataTable>>,
    mode: BatchMode,
    row_ids: Vec<RowId>,
    tuples: Vec<Row>,
    stats: CleanupStats,
    finished: bool,
}

impl<'a> CleanupState<'a> {
    /// Creates a cleanup state with the default batch capacity.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_capacity(catalog, STANDARD_VECTOR_SIZE)
    }

    /// Creates a cleanup state that flushes every `capacity` rows.
    pub fn with_capacity(catalog: &'a Catalog, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            catalog,
            capacity,
            current_table: None,
            mode: BatchMode::None,
            row_ids: Vec::with_capacity(capacity),
            tuples: Vec::new(),
            stats: CleanupStats::default(),
            finished: false,
        }
    }

    /// Returns the counters gathered so far.
    #[inline]
    pub fn stats(&self) -> CleanupStats {
        self.stats
    }

    /// Reclaims the version superseded by one record.
    pub fn consume(&mut self, record: UndoRecord) -> Result<(), TxnError> {
        self.stats.records += 1;
        match record {
            UndoRecord::CatalogChange { old_entry } => {
                if self.catalog.cleanup_change(old_entry)? {
                    self.stats.catalog_entries_reclaimed += 1;
                }
            }
            UndoRecord::TupleInsert { version } => {
                version.table.cleanup_version(version.node)?;
                self.stats.versions_reclaimed += 1;
            }
            UndoRecord::TupleUpdate { version } => {
                let removed = version.table.cleanup_version(version.node)?;
                self.stats.versions_reclaimed += 1;
                if version.table.index_count() == 0 {
                    return Ok(());
                }
                // Only the replaced values own index entries
                if let RowImage::Values(old) = removed.image {
                    self.switch_batch(&version.table, BatchMode::Update)?;
                    self.row_ids.push(removed.row_id);
                    self.tuples.push(old);
                    self.flush_if_full()?;
                }
            }
            UndoRecord::TupleDelete { delete_info } => {
                delete_info.table.cleanup_version(delete_info.node)?;
                self.stats.versions_reclaimed += 1;
                if delete_info.table.index_count() == 0 {
                    return Ok(());
                }
                self.switch_batch(&delete_info.table, BatchMode::Delete)?;
                self.row_ids.push(delete_info.row_id);
                self.flush_if_full()?;
            }
            UndoRecord::QueryMarker => {}
        }
        Ok(())
    }

    fn switch_batch(&mut self, table: &Arc<DataTable>, mode: BatchMode) -> Result<(), TxnError> {
        let same_table = self
            .current_table
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, table));
        if same_table && self.mode == mode {
            return Ok(());
        }
        self.flush()?;
        self.current_table = Some(Arc::clone(table));
        self.mode = mode;
        Ok(())
    }

    fn flush_if_full(&mut self) -> Result<(), TxnError> {
        if self.row_ids.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Issues the buffered index removal, if any.
    pub fn flush(&mut self) -> Result<(), TxnError> {
        if self.row_ids.is_empty() {
            return Ok(());
        }
        let row_ids = std::mem::take(&mut self.row_ids);
        let tuples = std::mem::take(&mut self.tuples);
        let Some(table) = self.current_table.as_ref() else {
            return Ok(());
        };

        match self.mode {
            BatchMode::Update => {
                let batch = table.retrieve_versioned_data(&tuples);
                table.remove_from_indexes_batch(&batch, &row_ids)?;
            }
            BatchMode::Delete => table.remove_from_indexes(&row_ids)?,
            BatchMode::None => return Ok(()),
        }

        debug!(
            table = table.name(),
            mode = ?self.mode,
            rows = row_ids.len(),
            "flushed index removal batch"
        );
        self.stats.flushes += 1;
        self.stats.index_rows_removed += row_ids.len();

        self.row_ids = row_ids;
        self.row_ids.clear();
        Ok(())
    }

    /// Flushes the residual batch and returns the pass counters.
    pub fn finish(mut self) -> Result<CleanupStats, TxnError> {
        self.flush()?;
        self.finished = true;
        Ok(self.stats)
    }
}

impl Drop for CleanupState<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.flush() {
            error!(error = %e, "failed to flush cleanup batch on drop");
        }
    }
}
