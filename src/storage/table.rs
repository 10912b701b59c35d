// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-memory table storage with per-row version chains.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::txn::{DeleteInfo, Snapshot, Transaction, UndoRecord, VersionRef};

use super::chain::{ChainError, NodeId, VersionArena};
use super::error::StorageError;
use super::index::{Index, TableIndexes};
use super::version::{find_visible, resolve, ChangeKind, RowImage, VersionNode};
use super::{Row, RowBatch, RowId};

/// Base storage slot of one row: the newest values and the chain head.
#[derive(Debug)]
struct RowSlot {
    data: Row,
    /// Set by a delete. The values stay so index entries can be rebuilt.
    deleted: bool,
    head: Option<NodeId>,
}

#[derive(Default)]
struct RowStore {
    slots: Vec<RowSlot>,
    arena: VersionArena<VersionNode>,
}

impl RowStore {
    fn slot(&self, table: &str, row_id: RowId) -> Result<&RowSlot, StorageError> {
        self.slots
            .get(row_id.0 as usize)
            .ok_or_else(|| StorageError::RowNotFound {
                table: table.to_string(),
                row_id,
            })
    }

    fn slot_mut(&mut self, table: &str, row_id: RowId) -> Result<&mut RowSlot, StorageError> {
        self.slots
            .get_mut(row_id.0 as usize)
            .ok_or_else(|| StorageError::RowNotFound {
                table: table.to_string(),
                row_id,
            })
    }

    /// Checks that `snapshot` may write the row and that the row is live.
    fn check_writable(
        &self,
        table: &str,
        row_id: RowId,
        snapshot: &Snapshot,
    ) -> Result<(), StorageError> {
        let slot = self.slot(table, row_id)?;
        if let Some(head) = slot.head {
            if !snapshot.sees(self.arena.node(head)?.stamp) {
                warn!(table = %table, row_id = %row_id, "write-write conflict");
                return Err(StorageError::WriteConflict {
                    table: table.to_string(),
                    row_id,
                });
            }
        }
        if slot.deleted {
            return Err(StorageError::RowNotFound {
                table: table.to_string(),
                row_id,
            });
        }
        Ok(())
    }

    /// Pushes a new head node onto a row's chain.
    fn push_version(
        &mut self,
        row_id: RowId,
        stamp: u64,
        kind: ChangeKind,
        image: RowImage,
    ) -> Result<NodeId, ChainError> {
        let head = self.slots[row_id.0 as usize].head;
        let node = self.arena.insert(VersionNode::new(row_id, stamp, kind, image));
        self.arena.link(node, head)?;
        self.slots[row_id.0 as usize].head = Some(node);
        Ok(node)
    }

    /// Unlinks the head node of a row, restoring the older node as head.
    fn pop_head(&mut self, node: NodeId) -> Result<(RowId, VersionNode), ChainError> {
        let row_id = self.arena.node(node)?.row_id;
        let slot = self
            .slots
            .get(row_id.0 as usize)
            .ok_or(ChainError::DanglingNode(node))?;
        if slot.head != Some(node) {
            return Err(ChainError::NotHead(node));
        }
        let removed = self.arena.unlink(node)?;
        self.slots[row_id.0 as usize].head = removed.links.older;
        Ok((row_id, removed))
    }
}

/// A table: row slots, their version chains and the table's indexes.
///
/// Readers take the row lock shared and never block each other. The write
/// path holds it exclusively only while it links a new version.
pub struct DataTable {
    name: String,
    column_count: usize,
    rows: RwLock<RowStore>,
    indexes: RwLock<Vec<Arc<dyn Index>>>,
}

impl std::fmt::Debug for DataTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTable")
            .field("name", &self.name)
            .field("column_count", &self.column_count)
            .finish_non_exhaustive()
    }
}

impl DataTable {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>, column_count: usize) -> Self {
        Self {
            name: name.into(),
            column_count,
            rows: RwLock::new(RowStore::default()),
            indexes: RwLock::new(Vec::new()),
        }
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Registers an index and populates it from the newest live rows.
    pub fn add_index(&self, index: Arc<dyn Index>) -> Result<(), StorageError> {
        let rows = self.rows.read();
        let mut indexes = self.indexes.write();
        let (ids, live): (Vec<RowId>, Vec<&Row>) = rows
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.deleted)
            .map(|(i, slot)| (RowId(i as u64), &slot.data))
            .unzip();
        if !ids.is_empty() {
            let batch = RowBatch::from_rows(self.column_count, live);
            index.append(&batch, &ids)?;
        }
        debug!(table = %self.name, index = index.name(), rows = ids.len(), "index added");
        indexes.push(index);
        Ok(())
    }

    fn check_write(&self, txn: &Transaction, row: &Row) -> Result<(), StorageError> {
        if !txn.is_active() {
            return Err(StorageError::InactiveTransaction(txn.id()));
        }
        if row.len() != self.column_count {
            return Err(StorageError::ColumnCountMismatch {
                table: self.name.clone(),
                expected: self.column_count,
                actual: row.len(),
            });
        }
        Ok(())
    }

    fn append_to_indexes(&self, row: &Row, row_id: RowId) -> Result<(), StorageError> {
        let indexes = self.indexes.read();
        if indexes.is_empty() {
            return Ok(());
        }
        let batch = RowBatch::from_rows(self.column_count, [row]);
        for index in indexes.iter() {
            index.append(&batch, &[row_id])?;
        }
        Ok(())
    }

    /// Inserts a row and returns its id.
    pub fn append(self: &Arc<Self>, txn: &mut Transaction, row: Row) -> Result<RowId, StorageError> {
        self.check_write(txn, &row)?;
        let (row_id, node) = {
            let mut rows = self.rows.write();
            let row_id = RowId(rows.slots.len() as u64);
            let node = rows
                .arena
                .insert(VersionNode::new(row_id, txn.id().0, ChangeKind::Insert, RowImage::Absent));
            rows.arena.link(node, None)?;
            rows.slots.push(RowSlot {
                data: row.clone(),
                deleted: false,
                head: Some(node),
            });
            (row_id, node)
        };
        txn.push_undo(UndoRecord::TupleInsert {
            version: VersionRef {
                table: Arc::clone(self),
                node,
            },
        });
        self.append_to_indexes(&row, row_id)?;
        Ok(row_id)
    }

    /// Replaces the values of a row.
    ///
    /// Fails with [`StorageError::WriteConflict`] if the row's newest change
    /// is not visible to `txn`.
    pub fn update(
        self: &Arc<Self>,
        txn: &mut Transaction,
        row_id: RowId,
        row: Row,
    ) -> Result<(), StorageError> {
        self.check_write(txn, &row)?;
        let node = {
            let mut rows = self.rows.write();
            rows.check_writable(&self.name, row_id, txn.snapshot())?;
            let old = std::mem::replace(&mut rows.slot_mut(&self.name, row_id)?.data, row.clone());
            rows.push_version(row_id, txn.id().0, ChangeKind::Update, RowImage::Values(old))?
        };
        txn.push_undo(UndoRecord::TupleUpdate {
            version: VersionRef {
                table: Arc::clone(self),
                node,
            },
        });
        self.append_to_indexes(&row, row_id)
    }

    /// Deletes a row. Its index entries remain until cleanup.
    pub fn delete(self: &Arc<Self>, txn: &mut Transaction, row_id: RowId) -> Result<(), StorageError> {
        if !txn.is_active() {
            return Err(StorageError::InactiveTransaction(txn.id()));
        }
        let node = {
            let mut rows = self.rows.write();
            rows.check_writable(&self.name, row_id, txn.snapshot())?;
            let node = rows.push_version(row_id, txn.id().0, ChangeKind::Delete, RowImage::Live)?;
            rows.slot_mut(&self.name, row_id)?.deleted = true;
            node
        };
        txn.push_undo(UndoRecord::TupleDelete {
            delete_info: DeleteInfo {
                table: Arc::clone(self),
                row_id,
                node,
            },
        });
        Ok(())
    }

    /// Returns the version of a row visible to `snapshot`.
    pub fn fetch(&self, snapshot: &Snapshot, row_id: RowId) -> Result<Option<Row>, StorageError> {
        let rows = self.rows.read();
        let Some(slot) = rows.slots.get(row_id.0 as usize) else {
            return Ok(None);
        };
        let visible = find_visible(&rows.arena, slot.head, snapshot)?;
        Ok(resolve(&rows.arena, visible, &slot.data, slot.deleted)?.cloned())
    }

    /// Returns every row visible to `snapshot`, in row id order.
    pub fn scan(&self, snapshot: &Snapshot) -> Result<Vec<(RowId, Row)>, StorageError> {
        let rows = self.rows.read();
        let mut out = Vec::new();
        for (i, slot) in rows.slots.iter().enumerate() {
            let visible = find_visible(&rows.arena, slot.head, snapshot)?;
            if let Some(row) = resolve(&rows.arena, visible, &slot.data, slot.deleted)? {
                out.push((RowId(i as u64), row.clone()));
            }
        }
        Ok(out)
    }

    /// Returns the number of version nodes not yet reclaimed.
    pub fn version_count(&self) -> usize {
        self.rows.read().arena.len()
    }

    /// Returns the length of one row's version chain.
    pub fn chain_len(&self, row_id: RowId) -> usize {
        let rows = self.rows.read();
        rows.slots
            .get(row_id.0 as usize)
            .map(|slot| rows.arena.chain_len(slot.head))
            .unwrap_or(0)
    }

    /// Stamps a version with its commit sequence.
    pub(crate) fn commit_version(&self, node: NodeId, commit_seq: u64) -> Result<(), ChainError> {
        self.rows.write().arena.node_mut(node)?.stamp = commit_seq;
        Ok(())
    }

    /// Reverts the change recorded by `node`, which must head its chain.
    pub(crate) fn rollback_version(&self, node: NodeId) -> Result<(), StorageError> {
        let undone = {
            let mut rows = self.rows.write();
            let (row_id, removed) = rows.pop_head(node)?;
            let slot = rows.slot_mut(&self.name, row_id)?;
            match (removed.kind, removed.image) {
                (ChangeKind::Insert, _) => {
                    slot.deleted = true;
                    Some((row_id, slot.data.clone()))
                }
                (ChangeKind::Update, RowImage::Values(old)) => {
                    Some((row_id, std::mem::replace(&mut slot.data, old)))
                }
                (ChangeKind::Update, _) => None,
                (ChangeKind::Delete, _) => {
                    slot.deleted = false;
                    None
                }
            }
        };
        // Entries written by the reverted change
        if let Some((row_id, values)) = undone {
            let indexes = self.indexes.read();
            if !indexes.is_empty() {
                let batch = RowBatch::from_rows(self.column_count, [&values]);
                for index in indexes.iter() {
                    index.remove(&batch, &[row_id])?;
                }
            }
        }
        Ok(())
    }

    /// Unlinks a version no snapshot can observe any more and returns it.
    pub(crate) fn cleanup_version(&self, node: NodeId) -> Result<VersionNode, ChainError> {
        let mut rows = self.rows.write();
        let removed = rows.arena.unlink(node)?;
        if removed.links.newer.is_none() {
            let row_id = removed.row_id;
            if let Some(slot) = rows.slots.get_mut(row_id.0 as usize) {
                slot.head = removed.links.older;
            }
        }
        Ok(removed)
    }
}

impl TableIndexes for DataTable {
    fn index_count(&self) -> usize {
        self.indexes.read().len()
    }

    fn retrieve_versioned_data(&self, tuples: &[Row]) -> RowBatch {
        RowBatch::from_rows(self.column_count, tuples)
    }

    fn remove_from_indexes_batch(
        &self,
        batch: &RowBatch,
        row_ids: &[RowId],
    ) -> Result<(), StorageError> {
        for index in self.indexes.read().iter() {
            index.remove(batch, row_ids)?;
        }
        Ok(())
    }

    fn remove_from_indexes(&self, row_ids: &[RowId]) -> Result<(), StorageError> {
        let batch = {
            let rows = self.rows.read();
            let mut tuples = Vec::with_capacity(row_ids.len());
            for row_id in row_ids {
                tuples.push(&rows.slot(&self.name, *row_id)?.data);
            }
            RowBatch::from_rows(self.column_count, tuples)
        };
        self.remove_from_indexes_batch(&batch, row_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{HashIndex, Value};
    use crate::txn::{TransactionManager, TxnConfig};

    fn manager() -> TransactionManager {
        TransactionManager::new(TxnConfig::default().with_cleanup_on_commit(false))
    }

    fn row(a: i64, b: &str) -> Row {
        Row::new(vec![Value::from(a), Value::from(b)])
    }

    #[test]
    fn test_append_and_fetch() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));

        let mut txn = manager.begin();
        let id = table.append(&mut txn, row(1, "a")).unwrap();
        assert_eq!(table.fetch(txn.snapshot(), id).unwrap(), Some(row(1, "a")));

        let other = manager.begin();
        assert_eq!(table.fetch(other.snapshot(), id).unwrap(), None);

        manager.commit(&mut txn).unwrap();
        let later = manager.begin();
        assert_eq!(table.fetch(later.snapshot(), id).unwrap(), Some(row(1, "a")));
        // Snapshot taken before the commit still sees nothing
        assert_eq!(table.fetch(other.snapshot(), id).unwrap(), None);
    }

    #[test]
    fn test_column_count_checked() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));
        let mut txn = manager.begin();

        let result = table.append(&mut txn, Row::new(vec![Value::from(1)]));
        assert!(matches!(
            result,
            Err(StorageError::ColumnCountMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(txn.undo_log().is_empty());
    }

    #[test]
    fn test_first_updater_wins() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));
        let mut setup = manager.begin();
        let id = table.append(&mut setup, row(1, "a")).unwrap();
        manager.commit(&mut setup).unwrap();

        let mut first = manager.begin();
        let mut second = manager.begin();
        table.update(&mut first, id, row(2, "b")).unwrap();

        let result = table.update(&mut second, id, row(3, "c"));
        assert!(matches!(result, Err(StorageError::WriteConflict { .. })));
        let result = table.delete(&mut second, id);
        assert!(matches!(result, Err(StorageError::WriteConflict { .. })));

        manager.commit(&mut first).unwrap();
        // Committed after `second` started: still a conflict
        let result = table.update(&mut second, id, row(3, "c"));
        assert!(matches!(result, Err(StorageError::WriteConflict { .. })));
        manager.rollback(&mut second).unwrap();
    }

    #[test]
    fn test_delete_hides_row() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));
        let mut setup = manager.begin();
        let id = table.append(&mut setup, row(1, "a")).unwrap();
        manager.commit(&mut setup).unwrap();

        let mut txn = manager.begin();
        table.delete(&mut txn, id).unwrap();
        assert_eq!(table.fetch(txn.snapshot(), id).unwrap(), None);
        assert!(matches!(
            table.delete(&mut txn, id),
            Err(StorageError::RowNotFound { .. })
        ));
        manager.commit(&mut txn).unwrap();
    }

    #[test]
    fn test_scan_sees_snapshot() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));
        let mut setup = manager.begin();
        for i in 0..4 {
            table.append(&mut setup, row(i, "x")).unwrap();
        }
        manager.commit(&mut setup).unwrap();

        let reader = manager.begin();
        let mut writer = manager.begin();
        table.delete(&mut writer, RowId(1)).unwrap();
        table.update(&mut writer, RowId(2), row(20, "y")).unwrap();
        manager.commit(&mut writer).unwrap();

        let old: Vec<i64> = table
            .scan(reader.snapshot())
            .unwrap()
            .iter()
            .map(|(_, r)| match r.get(0) {
                Some(Value::Integer(v)) => *v,
                _ => -1,
            })
            .collect();
        assert_eq!(old, vec![0, 1, 2, 3]);

        let fresh = manager.begin();
        let ids: Vec<RowId> = table
            .scan(fresh.snapshot())
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![RowId(0), RowId(2), RowId(3)]);
        assert_eq!(table.fetch(fresh.snapshot(), RowId(2)).unwrap(), Some(row(20, "y")));
    }

    #[test]
    fn test_indexes_populated_on_write() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));
        let mut setup = manager.begin();
        table.append(&mut setup, row(1, "a")).unwrap();

        let index = Arc::new(HashIndex::new("by_a", 0));
        table.add_index(index.clone()).unwrap();
        assert_eq!(index.lookup(&Value::from(1)), vec![RowId(0)]);

        let id = table.append(&mut setup, row(2, "b")).unwrap();
        table.update(&mut setup, id, row(3, "b")).unwrap();
        // The replaced key stays until cleanup
        assert_eq!(index.lookup(&Value::from(2)), vec![id]);
        assert_eq!(index.lookup(&Value::from(3)), vec![id]);
        assert_eq!(table.index_count(), 1);
        manager.commit(&mut setup).unwrap();
    }

    #[test]
    fn test_remove_from_indexes_reads_deleted_rows() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));
        let index = Arc::new(HashIndex::new("by_a", 0));
        table.add_index(index.clone()).unwrap();

        let mut txn = manager.begin();
        let id = table.append(&mut txn, row(5, "a")).unwrap();
        table.delete(&mut txn, id).unwrap();
        assert_eq!(index.lookup(&Value::from(5)), vec![id]);

        table.remove_from_indexes(&[id]).unwrap();
        assert!(index.is_empty());
        manager.rollback(&mut txn).unwrap();
    }

    #[test]
    fn test_chain_grows_per_change() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));
        let mut txn = manager.begin();
        let id = table.append(&mut txn, row(1, "a")).unwrap();
        table.update(&mut txn, id, row(2, "a")).unwrap();
        table.update(&mut txn, id, row(3, "a")).unwrap();

        assert_eq!(table.chain_len(id), 3);
        assert_eq!(table.version_count(), 3);
        assert_eq!(table.chain_len(RowId(99)), 0);
        manager.commit(&mut txn).unwrap();
    }

    #[test]
    fn test_inactive_transaction_rejected() {
        let manager = manager();
        let table = Arc::new(DataTable::new("t", 2));
        let mut txn = manager.begin();
        manager.commit(&mut txn).unwrap();

        let result = table.append(&mut txn, row(1, "a"));
        assert!(matches!(result, Err(StorageError::InactiveTransaction(_))));
    }
}
