// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! TantalumDB: the transactional core of an embedded analytical database
//!
//! This crate provides multi-version row storage, undo-log driven commit,
//! rollback and garbage collection, and a versioned catalog that tracks
//! dependencies between schema objects.

pub mod catalog;
pub mod storage;
pub mod txn;

pub use catalog::{
    Catalog, CatalogEntry, CatalogError, CatalogType, CreateInfo, DependencyKind, MangledName,
    QualifiedName,
};
pub use storage::{DataTable, HashIndex, Row, RowId, StorageError, Value};
pub use txn::{
    CleanupStats, Snapshot, Transaction, TransactionManager, TxnConfig, TxnError, TxnId, TxnState,
};
