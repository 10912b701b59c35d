// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction types and state management.

use std::fmt;

use tracing::warn;

use super::undo::{UndoLog, UndoRecord};

/// First transaction id. Transaction ids live above every commit sequence,
/// so an uncommitted stamp is never visible to another snapshot.
pub const TXN_ID_START: u64 = 1 << 62;

/// Unique transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0.saturating_sub(TXN_ID_START))
    }
}

/// Visibility horizon of a transaction.
///
/// A stamp is visible if it was committed before the snapshot was taken or
/// was written by the snapshot's own transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    start_seq: u64,
    txn_id: TxnId,
}

impl Snapshot {
    pub(crate) fn new(start_seq: u64, txn_id: TxnId) -> Self {
        Self { start_seq, txn_id }
    }

    /// Returns the sequence number the snapshot was taken at.
    #[inline]
    pub fn start_seq(&self) -> u64 {
        self.start_seq
    }

    /// Returns the owning transaction.
    #[inline]
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Returns true if a version stamped with `stamp` is visible.
    #[inline]
    pub fn sees(&self, stamp: u64) -> bool {
        stamp < self.start_seq || stamp == self.txn_id.0
    }
}

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// A transaction handle.
///
/// The transaction owns its undo log; nothing else appends to it while the
/// transaction is open. Every transaction must end in
/// [`commit`](super::TransactionManager::commit) or
/// [`rollback`](super::TransactionManager::rollback).
#[derive(Debug)]
pub struct Transaction {
    /// Snapshot taken at begin.
    pub(crate) snapshot: Snapshot,
    /// Commit sequence (set after commit).
    pub(crate) commit_seq: Option<u64>,
    /// Current state of the transaction.
    pub(crate) state: TxnState,
    /// Changes made by this transaction, in append order.
    pub(crate) undo: UndoLog,
}

impl Transaction {
    /// Creates a new transaction.
    pub(crate) fn new(id: TxnId, start_seq: u64) -> Self {
        Self {
            snapshot: Snapshot::new(start_seq, id),
            commit_seq: None,
            state: TxnState::Active,
            undo: UndoLog::new(),
        }
    }

    /// Returns the transaction ID.
    #[inline]
    pub fn id(&self) -> TxnId {
        self.snapshot.txn_id
    }

    /// Returns the snapshot used for visibility decisions.
    #[inline]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Returns the start sequence.
    #[inline]
    pub fn start_seq(&self) -> u64 {
        self.snapshot.start_seq
    }

    /// Returns the commit sequence (if committed).
    #[inline]
    pub fn commit_seq(&self) -> Option<u64> {
        self.commit_seq
    }

    /// Returns the current state.
    #[inline]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Returns true if the transaction is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// Returns true if the transaction is committed.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.state == TxnState::Committed
    }

    /// Returns true if the transaction is aborted.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state == TxnState::Aborted
    }

    /// Returns the undo log.
    #[inline]
    pub fn undo_log(&self) -> &UndoLog {
        &self.undo
    }

    /// Records a statement boundary in the undo log.
    pub fn mark_query(&mut self) {
        self.undo.push(UndoRecord::QueryMarker);
    }

    pub(crate) fn push_undo(&mut self, record: UndoRecord) {
        self.undo.push(record);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() && self.undo.has_changes() {
            warn!(
                txn = %self.id(),
                records = self.undo.len(),
                "transaction dropped without commit or rollback"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_new() {
        let txn = Transaction::new(TxnId(TXN_ID_START + 1), 100);

        assert_eq!(txn.id(), TxnId(TXN_ID_START + 1));
        assert_eq!(txn.start_seq(), 100);
        assert!(txn.commit_seq().is_none());
        assert_eq!(txn.state(), TxnState::Active);
        assert!(txn.is_active());
        assert!(!txn.is_committed());
        assert!(!txn.is_aborted());
        assert!(txn.undo_log().is_empty());
    }

    #[test]
    fn test_snapshot_visibility() {
        let me = TxnId(TXN_ID_START + 3);
        let snapshot = Snapshot::new(10, me);

        assert!(snapshot.sees(0));
        assert!(snapshot.sees(9));
        assert!(!snapshot.sees(10));
        assert!(!snapshot.sees(11));
        assert!(snapshot.sees(me.0));
        assert!(!snapshot.sees(TXN_ID_START + 4));
    }

    #[test]
    fn test_mark_query() {
        let mut txn = Transaction::new(TxnId(TXN_ID_START), 1);
        txn.mark_query();
        assert_eq!(txn.undo_log().len(), 1);
        assert!(!txn.undo_log().has_changes());
    }

    #[test]
    fn test_txn_id_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(TxnId(1));
        set.insert(TxnId(2));
        assert!(set.contains(&TxnId(1)));
        assert!(!set.contains(&TxnId(3)));
    }
}
