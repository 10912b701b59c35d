// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Reverting an uncommitted transaction.

use tracing::trace;

use crate::catalog::Catalog;

use super::error::TxnError;
use super::undo::UndoRecord;

/// Reverts undo records, newest first.
///
/// Each reverted change must head its chain. That holds as long as records
/// are fed in reverse append order, because no other transaction can stack
/// a version on top of an uncommitted one.
pub(crate) struct RollbackState<'a> {
    catalog: &'a Catalog,
    reverted: usize,
}

impl<'a> RollbackState<'a> {
    pub(crate) fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            reverted: 0,
        }
    }

    /// Returns the number of changes reverted so far.
    pub(crate) fn reverted(&self) -> usize {
        self.reverted
    }

    pub(crate) fn rollback(&mut self, record: &UndoRecord) -> Result<(), TxnError> {
        trace!(kind = record.kind(), "reverting undo record");
        match record {
            UndoRecord::CatalogChange { old_entry } => {
                self.catalog.rollback_change(*old_entry)?;
            }
            UndoRecord::TupleInsert { version } | UndoRecord::TupleUpdate { version } => {
                version.table.rollback_version(version.node)?;
            }
            UndoRecord::TupleDelete { delete_info } => {
                delete_info.table.rollback_version(delete_info.node)?;
            }
            UndoRecord::QueryMarker => return Ok(()),
        }
        self.reverted += 1;
        Ok(())
    }
}
