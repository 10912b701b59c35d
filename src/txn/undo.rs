// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Undo records produced by the write path.

use std::fmt;
use std::sync::Arc;

use crate::catalog::EntryId;
use crate::storage::{DataTable, NodeId, RowId};

/// Handle to a row version node inside a table.
#[derive(Clone)]
pub struct VersionRef {
    pub table: Arc<DataTable>,
    pub node: NodeId,
}

impl fmt::Debug for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionRef")
            .field("table", &self.table.name())
            .field("node", &self.node)
            .finish()
    }
}

/// Location of a deleted row and the node preserving its live image.
#[derive(Clone)]
pub struct DeleteInfo {
    pub table: Arc<DataTable>,
    pub row_id: RowId,
    pub node: NodeId,
}

impl fmt::Debug for DeleteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteInfo")
            .field("table", &self.table.name())
            .field("row_id", &self.row_id)
            .field("node", &self.node)
            .finish()
    }
}

/// One change made by a transaction.
#[derive(Debug, Clone)]
pub enum UndoRecord {
    /// A catalog entry was superseded; `old_entry` is the replaced version.
    CatalogChange { old_entry: EntryId },
    /// A row was inserted.
    TupleInsert { version: VersionRef },
    /// A row was updated; the node holds the replaced values.
    TupleUpdate { version: VersionRef },
    /// A row was deleted.
    TupleDelete { delete_info: DeleteInfo },
    /// Statement boundary.
    QueryMarker,
}

impl UndoRecord {
    /// Returns the record's tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            UndoRecord::CatalogChange { .. } => "catalog_change",
            UndoRecord::TupleInsert { .. } => "tuple_insert",
            UndoRecord::TupleUpdate { .. } => "tuple_update",
            UndoRecord::TupleDelete { .. } => "tuple_delete",
            UndoRecord::QueryMarker => "query_marker",
        }
    }
}

/// Append-only, per-transaction sequence of undo records.
#[derive(Debug, Default)]
pub struct UndoLog {
    records: Vec<UndoRecord>,
}

impl UndoLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn push(&mut self, record: UndoRecord) {
        self.records.push(record);
    }

    /// Returns the number of records, markers included.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no record was appended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if any record describes an actual change.
    pub fn has_changes(&self) -> bool {
        self.records
            .iter()
            .any(|r| !matches!(r, UndoRecord::QueryMarker))
    }

    /// Iterates records in append order.
    pub fn iter(&self) -> std::slice::Iter<'_, UndoRecord> {
        self.records.iter()
    }

    /// Consumes the log, yielding records in append order.
    pub fn into_records(self) -> Vec<UndoRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a UndoLog {
    type Item = &'a UndoRecord;
    type IntoIter = std::slice::Iter<'a, UndoRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_not_changes() {
        let mut log = UndoLog::new();
        assert!(log.is_empty());

        log.push(UndoRecord::QueryMarker);
        log.push(UndoRecord::QueryMarker);
        assert_eq!(log.len(), 2);
        assert!(!log.has_changes());
        assert_eq!(log.iter().next().unwrap().kind(), "query_marker");
    }

    #[test]
    fn test_records_keep_append_order() {
        use crate::storage::{ChangeKind, RowImage, VersionArena, VersionNode};

        let table = Arc::new(DataTable::new("t", 1));
        let mut arena = VersionArena::new();
        let node = arena.insert(VersionNode::new(
            RowId(4),
            1,
            ChangeKind::Delete,
            RowImage::Live,
        ));
        let mut log = UndoLog::new();
        log.push(UndoRecord::QueryMarker);
        log.push(UndoRecord::TupleDelete {
            delete_info: DeleteInfo {
                table,
                row_id: RowId(4),
                node,
            },
        });

        let kinds: Vec<&str> = log.iter().map(UndoRecord::kind).collect();
        assert_eq!(kinds, vec!["query_marker", "tuple_delete"]);
        assert!(log.has_changes());
    }
}
