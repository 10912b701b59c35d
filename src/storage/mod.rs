// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Multi-version row storage.
//!
//! Every table keeps the newest values of each row in a base slot and a
//! chain of undo images behind it, newest first. A reader resolves the
//! version valid for its [`Snapshot`](crate::txn::Snapshot) by walking the
//! chain with [`find_visible`].
//!
//! # Key Concepts
//!
//! - **Stamp**: the writer's transaction id while a change is uncommitted,
//!   its commit sequence afterwards.
//! - **Lifetime**: a version node's image is valid from its older
//!   neighbour's stamp up to its own stamp.
//! - **Index contract**: tables expose [`TableIndexes`] so the cleanup pass
//!   can remove stale index entries in batches.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tantalumdb::storage::{DataTable, Row, Value};
//! use tantalumdb::txn::TransactionManager;
//!
//! let manager = TransactionManager::default();
//! let table = Arc::new(DataTable::new("orders", 1));
//!
//! let mut txn = manager.begin();
//! let id = table.append(&mut txn, Row::new(vec![Value::from(42)])).unwrap();
//! manager.commit(&mut txn).unwrap();
//!
//! let reader = manager.begin();
//! assert!(table.fetch(reader.snapshot(), id).unwrap().is_some());
//! # let mut reader = reader;
//! # manager.commit(&mut reader).unwrap();
//! ```

mod chain;
mod error;
mod index;
mod table;
mod value;
mod version;

pub use chain::{ChainError, ChainIter, ChainLinks, ChainNode, NodeId, VersionArena};
pub use error::StorageError;
pub use index::{HashIndex, Index, TableIndexes};
pub use table::DataTable;
pub use value::{Row, RowBatch, RowId, Value};
pub use version::{find_visible, resolve, ChangeKind, RowImage, VersionNode, VisibleVersion};
