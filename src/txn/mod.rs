// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction lifecycle: snapshots, undo logs, commit, rollback and cleanup.
//!
//! # Key Concepts
//!
//! ## Stamps and Snapshots
//!
//! One counter hands out start and commit sequences. Uncommitted versions
//! are stamped with the writer's [`TxnId`], which lives above
//! [`TXN_ID_START`] and therefore above every sequence. A [`Snapshot`] sees a
//! stamp if it is below the snapshot's start sequence or equals its own id.
//!
//! ## Undo Log
//!
//! Every write appends an [`UndoRecord`] to its transaction. Commit walks the
//! log to stamp the new versions; rollback walks it backwards to revert them.
//!
//! ## Cleanup
//!
//! Committed logs are queued. Once no active snapshot is older than a
//! commit, a [`CleanupState`] consumes its records, unlinking the versions
//! they superseded and removing stale index entries in batches of at most
//! [`TxnConfig::cleanup_batch_size`] rows.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tantalumdb::storage::{DataTable, HashIndex, Row, RowId, Value};
//! use tantalumdb::txn::{TransactionManager, TxnConfig};
//!
//! let manager = TransactionManager::new(TxnConfig::new().with_cleanup_on_commit(false));
//! let table = Arc::new(DataTable::new("t", 1));
//! table.add_index(Arc::new(HashIndex::new("t_idx", 0))).unwrap();
//!
//! let mut txn = manager.begin();
//! let id = table.append(&mut txn, Row::new(vec![Value::Integer(1)])).unwrap();
//! manager.commit(&mut txn).unwrap();
//!
//! let mut txn = manager.begin();
//! table.delete(&mut txn, id).unwrap();
//! manager.commit(&mut txn).unwrap();
//!
//! let stats = manager.collect_garbage().unwrap();
//! assert_eq!(stats.versions_reclaimed, 2);
//! assert_eq!(stats.flushes, 1);
//! ```

mod cleanup;
mod config;
mod error;
mod manager;
mod rollback;
mod transaction;
mod undo;

pub use cleanup::{CleanupState, CleanupStats};
pub use config::{TxnConfig, STANDARD_VECTOR_SIZE};
pub use error::TxnError;
pub use manager::TransactionManager;
pub use transaction::{Snapshot, Transaction, TxnId, TxnState, TXN_ID_START};
pub use undo::{DeleteInfo, UndoLog, UndoRecord, VersionRef};
