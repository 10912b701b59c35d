// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transactional catalog with a dependency graph.
//!
//! # Key Concepts
//!
//! ## Entry Chains
//!
//! Every object key owns a chain of [`CatalogEntry`] versions. CREATE, DROP
//! and ALTER push a new version onto the chain and record the superseded one
//! in the writer's undo log, so commit, rollback and cleanup treat catalog
//! changes the same way as row changes.
//!
//! ## Mangled Names
//!
//! Objects are keyed by a [`MangledName`], an injective string encoding of
//! type, schema and name. [`unmangle_name`] recovers the parts.
//!
//! ## Dependencies
//!
//! The [`DependencyManager`] records which objects use which. A Regular
//! edge blocks a DROP unless it cascades. An Ownership edge makes the owned
//! object disappear with its owner. Edges are not versioned; a transaction
//! sees an edge only if both endpoints resolve to live entries under its
//! snapshot.
//!
//! # Example
//!
//! ```
//! use tantalumdb::catalog::{CatalogError, CatalogType, CreateInfo, QualifiedName};
//! use tantalumdb::txn::TransactionManager;
//!
//! let manager = TransactionManager::default();
//! let catalog = manager.catalog();
//!
//! let mut txn = manager.begin();
//! catalog.create_entry(&mut txn, CreateInfo::new(CatalogType::Table, "main", "t")).unwrap();
//! let view = CreateInfo::new(CatalogType::View, "main", "v")
//!     .with_dependency(QualifiedName::new(CatalogType::Table, "main", "t"));
//! catalog.create_entry(&mut txn, view).unwrap();
//! manager.commit(&mut txn).unwrap();
//!
//! let mut txn = manager.begin();
//! let err = catalog
//!     .drop_entry(&mut txn, CatalogType::Table, "main", "t", false)
//!     .unwrap_err();
//! assert!(matches!(err, CatalogError::RestrictedDrop { .. }));
//!
//! let dropped = catalog
//!     .drop_entry(&mut txn, CatalogType::Table, "main", "t", true)
//!     .unwrap();
//! assert_eq!(dropped.len(), 2);
//! manager.commit(&mut txn).unwrap();
//! ```

mod dependency;
mod entry;
mod error;
mod mangle;
mod set;
mod store;

pub use dependency::{
    DependencyFlags, DependencyKind, DependencyManager, DependencySet, DependencyTracker,
};
pub use entry::{AlterInfo, CatalogEntry, CreateInfo, EntryId};
pub use error::CatalogError;
pub use mangle::{mangle_name, unmangle_name, CatalogType, MangledName, QualifiedName};
pub use set::{CatalogLookup, CatalogSet};
pub use store::Catalog;
