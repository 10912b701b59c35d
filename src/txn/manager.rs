// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction lifecycle and garbage collection.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::catalog::Catalog;

use super::cleanup::{CleanupState, CleanupStats};
use super::config::TxnConfig;
use super::error::TxnError;
use super::rollback::RollbackState;
use super::transaction::{Transaction, TxnId, TxnState, TXN_ID_START};
use super::undo::{UndoLog, UndoRecord};

/// Undo log of a committed transaction awaiting cleanup.
struct CommittedLog {
    commit_seq: u64,
    undo: UndoLog,
}

struct ManagerState {
    /// Next sequence number. Start and commit sequences share it.
    next_seq: u64,
    /// Active transactions keyed by start sequence.
    active: BTreeSet<(u64, TxnId)>,
    /// Committed logs in commit order.
    recently_committed: VecDeque<CommittedLog>,
}

impl ManagerState {
    fn lowest_active_start(&self) -> u64 {
        self.active
            .first()
            .map(|(start_seq, _)| *start_seq)
            .unwrap_or(self.next_seq)
    }
}

/// Hands out snapshots, commits and rolls back transactions, and reclaims
/// versions no snapshot can observe any more.
///
/// Commit stamps every version the transaction produced while holding the
/// manager lock, so a transaction that begins afterwards sees all of them
/// and one that began before sees none.
pub struct TransactionManager {
    config: TxnConfig,
    catalog: Arc<Catalog>,
    next_txn_id: AtomicU64,
    state: Mutex<ManagerState>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(TxnConfig::default())
    }
}

impl TransactionManager {
    /// Creates a manager with an empty catalog.
    pub fn new(config: TxnConfig) -> Self {
        Self::with_catalog(config, Arc::new(Catalog::new()))
    }

    /// Creates a manager over an existing catalog.
    pub fn with_catalog(config: TxnConfig, catalog: Arc<Catalog>) -> Self {
        Self {
            config,
            catalog,
            next_txn_id: AtomicU64::new(TXN_ID_START),
            state: Mutex::new(ManagerState {
                next_seq: 1,
                active: BTreeSet::new(),
                recently_committed: VecDeque::new(),
            }),
        }
    }

    /// Returns the catalog whose changes this manager commits.
    #[inline]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &TxnConfig {
        &self.config
    }

    /// Begins a new transaction.
    pub fn begin(&self) -> Transaction {
        let mut state = self.state.lock();
        let id = TxnId(self.next_txn_id.fetch_add(1, Ordering::Relaxed));
        let start_seq = state.next_seq;
        state.active.insert((start_seq, id));
        debug!(txn = %id, start_seq, "transaction started");
        Transaction::new(id, start_seq)
    }

    fn check_active(txn: &Transaction) -> Result<(), TxnError> {
        match txn.state {
            TxnState::Active => Ok(()),
            TxnState::Committed => Err(TxnError::AlreadyCommitted),
            TxnState::Aborted => Err(TxnError::AlreadyAborted),
        }
    }

    /// Commits a transaction and returns its commit sequence.
    ///
    /// When [`TxnConfig::cleanup_on_commit`] is set, garbage collection runs
    /// before returning.
    #[instrument(skip(self, txn), fields(txn = %txn.id()))]
    pub fn commit(&self, txn: &mut Transaction) -> Result<u64, TxnError> {
        Self::check_active(txn)?;

        let commit_seq = {
            let mut state = self.state.lock();
            let commit_seq = state.next_seq;
            state.next_seq += 1;

            for record in txn.undo.iter() {
                match record {
                    UndoRecord::CatalogChange { old_entry } => {
                        self.catalog.commit_change(*old_entry, commit_seq)?;
                    }
                    UndoRecord::TupleInsert { version } | UndoRecord::TupleUpdate { version } => {
                        version.table.commit_version(version.node, commit_seq)?;
                    }
                    UndoRecord::TupleDelete { delete_info } => {
                        delete_info.table.commit_version(delete_info.node, commit_seq)?;
                    }
                    UndoRecord::QueryMarker => {}
                }
            }

            state.active.remove(&(txn.start_seq(), txn.id()));
            txn.commit_seq = Some(commit_seq);
            txn.state = TxnState::Committed;

            let undo = std::mem::take(&mut txn.undo);
            if undo.has_changes() {
                state
                    .recently_committed
                    .push_back(CommittedLog { commit_seq, undo });
            }
            commit_seq
        };

        info!(commit_seq, "transaction committed");

        if self.config.cleanup_on_commit {
            self.collect_garbage()?;
        }
        Ok(commit_seq)
    }

    /// Reverts every change of a transaction, newest first.
    #[instrument(skip(self, txn), fields(txn = %txn.id()))]
    pub fn rollback(&self, txn: &mut Transaction) -> Result<(), TxnError> {
        Self::check_active(txn)?;

        let mut rollback = RollbackState::new(&self.catalog);
        for record in txn.undo.iter().rev() {
            rollback.rollback(record)?;
        }

        self.state
            .lock()
            .active
            .remove(&(txn.start_seq(), txn.id()));
        txn.state = TxnState::Aborted;
        txn.undo = UndoLog::new();

        info!(reverted = rollback.reverted(), "transaction rolled back");
        Ok(())
    }

    /// Returns the start sequence of the oldest active transaction, or the
    /// next sequence number when none is active.
    pub fn lowest_active_start(&self) -> u64 {
        self.state.lock().lowest_active_start()
    }

    /// Returns the number of active transactions.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Returns the number of committed logs still awaiting cleanup.
    pub fn pending_cleanup(&self) -> usize {
        self.state.lock().recently_committed.len()
    }

    /// Reclaims the versions superseded by every commit older than the
    /// oldest active snapshot, in commit order.
    #[instrument(skip(self))]
    pub fn collect_garbage(&self) -> Result<CleanupStats, TxnError> {
        let mut state = self.state.lock();
        let watermark = state.lowest_active_start();

        let mut cleanup = CleanupState::with_capacity(&self.catalog, self.config.batch_size());
        while state
            .recently_committed
            .front()
            .is_some_and(|log| log.commit_seq < watermark)
        {
            let Some(log) = state.recently_committed.pop_front() else {
                break;
            };
            for record in log.undo.into_records() {
                cleanup.consume(record)?;
            }
        }
        let stats = cleanup.finish()?;

        if stats.records > 0 {
            debug!(
                watermark,
                records = stats.records,
                versions = stats.versions_reclaimed,
                catalog_entries = stats.catalog_entries_reclaimed,
                flushes = stats.flushes,
                pending = state.recently_committed.len(),
                "garbage collected"
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DataTable, HashIndex, Row, RowId, Value};

    fn manual() -> TransactionManager {
        TransactionManager::new(TxnConfig::default().with_cleanup_on_commit(false))
    }

    fn row(v: i64) -> Row {
        Row::new(vec![Value::from(v), Value::from(v * 10)])
    }

    #[test]
    fn test_begin_commit_rollback_states() {
        let manager = manual();
        let mut a = manager.begin();
        let mut b = manager.begin();
        assert_eq!(manager.active_count(), 2);

        let seq = manager.commit(&mut a).unwrap();
        assert!(a.is_committed());
        assert_eq!(a.commit_seq(), Some(seq));
        assert!(matches!(manager.commit(&mut a), Err(TxnError::AlreadyCommitted)));
        assert!(matches!(manager.rollback(&mut a), Err(TxnError::AlreadyCommitted)));

        manager.rollback(&mut b).unwrap();
        assert!(b.is_aborted());
        assert!(matches!(manager.commit(&mut b), Err(TxnError::AlreadyAborted)));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_watermark_tracks_oldest_snapshot() {
        let manager = manual();
        assert_eq!(manager.lowest_active_start(), 1);

        let mut first = manager.begin();
        let mut writer = manager.begin();
        manager.commit(&mut writer).unwrap();
        let mut second = manager.begin();

        assert_eq!(manager.lowest_active_start(), first.start_seq());
        manager.commit(&mut first).unwrap();
        assert_eq!(manager.lowest_active_start(), second.start_seq());
        manager.commit(&mut second).unwrap();
        assert_eq!(manager.lowest_active_start(), 4);
    }

    #[test]
    fn test_read_only_commit_not_queued() {
        let manager = manual();
        let mut txn = manager.begin();
        txn.mark_query();
        manager.commit(&mut txn).unwrap();
        assert_eq!(manager.pending_cleanup(), 0);
    }

    #[test]
    fn test_bulk_delete_flushes_in_vector_sized_batches() {
        let manager = manual();
        let table = Arc::new(DataTable::new("t", 2));
        let by_a = Arc::new(HashIndex::new("by_a", 0));
        let by_b = Arc::new(HashIndex::new("by_b", 1));
        table.add_index(by_a.clone()).unwrap();
        table.add_index(by_b.clone()).unwrap();

        let mut loader = manager.begin();
        for i in 0..5000 {
            table.append(&mut loader, row(i)).unwrap();
        }
        manager.commit(&mut loader).unwrap();
        let stats = manager.collect_garbage().unwrap();
        assert_eq!(stats.versions_reclaimed, 5000);
        assert_eq!(stats.flushes, 0);
        assert_eq!(by_a.len(), 5000);

        let mut deleter = manager.begin();
        for i in 0..5000 {
            table.delete(&mut deleter, RowId(i)).unwrap();
        }
        manager.commit(&mut deleter).unwrap();
        let stats = manager.collect_garbage().unwrap();

        assert_eq!(stats.flushes, 5);
        assert_eq!(stats.index_rows_removed, 5000);
        assert!(by_a.is_empty());
        assert!(by_b.is_empty());
        assert_eq!(table.version_count(), 0);
    }

    #[test]
    fn test_cleanup_waits_for_older_snapshot() {
        let manager = manual();
        let table = Arc::new(DataTable::new("t", 2));
        let mut setup = manager.begin();
        let r = table.append(&mut setup, row(7)).unwrap();
        manager.commit(&mut setup).unwrap();
        manager.collect_garbage().unwrap();

        let mut x = manager.begin();
        let mut y = manager.begin();
        table.delete(&mut y, r).unwrap();
        manager.commit(&mut y).unwrap();

        let stats = manager.collect_garbage().unwrap();
        assert_eq!(stats.versions_reclaimed, 0);
        assert_eq!(manager.pending_cleanup(), 1);
        assert_eq!(table.fetch(x.snapshot(), r).unwrap(), Some(row(7)));

        manager.commit(&mut x).unwrap();
        let stats = manager.collect_garbage().unwrap();
        assert_eq!(stats.versions_reclaimed, 1);
        assert_eq!(table.version_count(), 0);

        let fresh = manager.begin();
        assert_eq!(table.fetch(fresh.snapshot(), r).unwrap(), None);
    }

    #[test]
    fn test_cleanup_on_commit() {
        let manager = TransactionManager::default();
        let table = Arc::new(DataTable::new("t", 2));
        let mut txn = manager.begin();
        let id = table.append(&mut txn, row(1)).unwrap();
        table.update(&mut txn, id, row(2)).unwrap();
        manager.commit(&mut txn).unwrap();

        assert_eq!(manager.pending_cleanup(), 0);
        assert_eq!(table.version_count(), 0);
    }

    #[test]
    fn test_rollback_restores_rows_and_indexes() {
        let manager = manual();
        let table = Arc::new(DataTable::new("t", 2));
        let index = Arc::new(HashIndex::new("by_a", 0));
        table.add_index(index.clone()).unwrap();

        let mut setup = manager.begin();
        let kept = table.append(&mut setup, row(1)).unwrap();
        let doomed = table.append(&mut setup, row(2)).unwrap();
        manager.commit(&mut setup).unwrap();
        manager.collect_garbage().unwrap();

        let mut txn = manager.begin();
        table.update(&mut txn, kept, row(10)).unwrap();
        table.update(&mut txn, kept, row(11)).unwrap();
        table.delete(&mut txn, doomed).unwrap();
        let added = table.append(&mut txn, row(3)).unwrap();
        manager.rollback(&mut txn).unwrap();

        let reader = manager.begin();
        assert_eq!(table.fetch(reader.snapshot(), kept).unwrap(), Some(row(1)));
        assert_eq!(table.fetch(reader.snapshot(), doomed).unwrap(), Some(row(2)));
        assert_eq!(table.fetch(reader.snapshot(), added).unwrap(), None);
        assert_eq!(index.lookup(&Value::from(1)), vec![kept]);
        assert_eq!(index.lookup(&Value::from(2)), vec![doomed]);
        assert!(index.lookup(&Value::from(10)).is_empty());
        assert!(index.lookup(&Value::from(11)).is_empty());
        assert!(index.lookup(&Value::from(3)).is_empty());
        assert_eq!(table.version_count(), 0);

        // The reverted writes no longer block other writers
        let mut next = manager.begin();
        table.update(&mut next, kept, row(5)).unwrap();
        manager.commit(&mut next).unwrap();
    }
}
