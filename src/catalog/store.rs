// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transactional catalog.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, instrument};

use crate::storage::{ChainNode, DataTable};
use crate::txn::{Snapshot, Transaction, UndoRecord};

use super::dependency::{DependencyKind, DependencyManager, DependencyTracker};
use super::entry::{AlterInfo, CatalogEntry, CreateInfo, EntryId};
use super::error::CatalogError;
use super::mangle::{mangle_name, CatalogType, MangledName, QualifiedName};
use super::set::{CatalogLookup, CatalogSet};

struct CatalogState {
    set: CatalogSet,
    dependencies: DependencyManager,
}

/// Catalog of schema objects and the dependencies between them.
///
/// One lock guards both the entry chains and the dependency graph. DDL
/// holds it exclusively for the whole validate-then-install sequence;
/// lookups and dependency scans share it, so a scan observes the graph
/// either entirely before or entirely after a concurrent ALTER.
pub struct Catalog {
    inner: RwLock<CatalogState>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read();
        f.debug_struct("Catalog")
            .field("objects", &state.set.len())
            .field("edges", &state.dependencies.edge_count())
            .finish()
    }
}

fn check_active(txn: &Transaction) -> Result<(), CatalogError> {
    if txn.is_active() {
        Ok(())
    } else {
        Err(CatalogError::InactiveTransaction(txn.id()))
    }
}

/// Resolves the entry a writer is about to replace.
///
/// The newest version must be visible to the writer (first writer wins) and
/// must not be a tombstone.
fn writable_entry<'a>(
    set: &'a CatalogSet,
    snapshot: &Snapshot,
    name: &QualifiedName,
    key: &MangledName,
) -> Result<&'a CatalogEntry, CatalogError> {
    let Some(head) = set.head_entry(key) else {
        return Err(CatalogError::EntryNotFound(name.clone()));
    };
    if !snapshot.sees(head.stamp()) {
        return Err(CatalogError::WriteConflict(name.clone()));
    }
    if head.is_deleted() {
        return Err(CatalogError::EntryNotFound(name.clone()));
    }
    Ok(head)
}

/// Checks that a name is free for a writer.
///
/// Returns true if the name carries a dropped object whose stale edges must
/// be set aside before the name is reused.
fn check_name_free(
    set: &CatalogSet,
    snapshot: &Snapshot,
    name: &QualifiedName,
    key: &MangledName,
) -> Result<bool, CatalogError> {
    match set.head_entry(key) {
        None => Ok(false),
        Some(head) if !snapshot.sees(head.stamp()) => Err(CatalogError::WriteConflict(name.clone())),
        Some(head) if !head.is_deleted() => Err(CatalogError::EntryExists(name.clone())),
        Some(_) => Ok(true),
    }
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CatalogState {
                set: CatalogSet::new(),
                dependencies: DependencyManager::new(),
            }),
        }
    }

    /// Creates an object.
    #[instrument(skip(self, txn, info), fields(txn = %txn.id(), object = %info.qualified_name()))]
    pub fn create_entry(&self, txn: &mut Transaction, info: CreateInfo) -> Result<(), CatalogError> {
        check_active(txn)?;
        let name = info.qualified_name();
        let key = name.mangle();
        let dependency_keys: Vec<MangledName> =
            info.dependencies.iter().map(QualifiedName::mangle).collect();

        let mut state = self.inner.write();
        let CatalogState { set, dependencies } = &mut *state;
        let snapshot = *txn.snapshot();

        let reused = check_name_free(set, &snapshot, &name, &key)?;
        let mut entry = CatalogEntry::from_create(&info, txn.id().0);
        // Stale edges of a dropped object of the same name are set aside
        // while the new object is validated, and put back if it is rejected.
        let displaced = if reused { dependencies.take_object(&key) } else { None };
        if let Err(err) = dependencies.add_object(&*set, &snapshot, &entry, &dependency_keys) {
            if let Some(stale) = displaced {
                dependencies.restore_object(&key, stale);
            }
            return Err(err);
        }
        entry.displaced = displaced;

        let old_entry = set.install(entry)?;
        txn.push_undo(UndoRecord::CatalogChange { old_entry });
        info!("catalog entry created");
        Ok(())
    }

    /// Creates a table entry backed by fresh storage.
    pub fn create_table(
        &self,
        txn: &mut Transaction,
        schema: &str,
        name: &str,
        column_count: usize,
    ) -> Result<Arc<DataTable>, CatalogError> {
        let storage = Arc::new(DataTable::new(name, column_count));
        let info = CreateInfo::new(CatalogType::Table, schema, name).with_storage(Arc::clone(&storage));
        self.create_entry(txn, info)?;
        Ok(storage)
    }

    /// Drops an object and returns every object removed with it, dependents
    /// first.
    #[instrument(skip(self, txn), fields(txn = %txn.id()))]
    pub fn drop_entry(
        &self,
        txn: &mut Transaction,
        catalog_type: CatalogType,
        schema: &str,
        name: &str,
        cascade: bool,
    ) -> Result<Vec<QualifiedName>, CatalogError> {
        check_active(txn)?;
        let target = QualifiedName::new(catalog_type, schema, name);
        let key = target.mangle();

        let mut state = self.inner.write();
        let CatalogState { set, dependencies } = &mut *state;
        let snapshot = *txn.snapshot();

        let head = writable_entry(set, &snapshot, &target, &key)?;
        if head.is_system() {
            return Err(CatalogError::SystemEntry(target));
        }
        let order = dependencies.drop_object(&*set, &snapshot, &key, cascade)?;

        let mut markers = Vec::with_capacity(order.len());
        for object in &order {
            let Some(live) = set.lookup_entry(Some(&snapshot), object) else {
                continue;
            };
            markers.push(live.drop_marker(txn.id().0));
        }

        let mut dropped = Vec::with_capacity(markers.len());
        for marker in markers {
            dropped.push(marker.qualified_name());
            let old_entry = set.install(marker)?;
            txn.push_undo(UndoRecord::CatalogChange { old_entry });
        }
        info!(dropped = dropped.len(), cascade, "catalog entry dropped");
        Ok(dropped)
    }

    /// Alters an object: replaces its definition, renames it, or both.
    #[instrument(skip(self, txn, alter), fields(txn = %txn.id()))]
    pub fn alter_entry(
        &self,
        txn: &mut Transaction,
        catalog_type: CatalogType,
        schema: &str,
        name: &str,
        alter: AlterInfo,
    ) -> Result<(), CatalogError> {
        check_active(txn)?;
        let target = QualifiedName::new(catalog_type, schema, name);
        let key = target.mangle();

        let mut state = self.inner.write();
        let CatalogState { set, dependencies } = &mut *state;
        let snapshot = *txn.snapshot();
        let stamp = txn.id().0;

        let head = writable_entry(set, &snapshot, &target, &key)?;
        if head.is_system() {
            return Err(CatalogError::SystemEntry(target));
        }
        let mut successor = head.successor(stamp);
        if let Some(definition) = alter.definition {
            successor.definition = definition;
        }

        match alter.new_name.filter(|new_name| new_name != name) {
            None => {
                let old_entry = set.install(successor)?;
                txn.push_undo(UndoRecord::CatalogChange { old_entry });
                dependencies.alter_object(&key, &key);
            }
            Some(new_name) => {
                let renamed = QualifiedName::new(catalog_type, schema, new_name.clone());
                let new_key = renamed.mangle();
                let reused = check_name_free(set, &snapshot, &renamed, &new_key)?;

                let mut marker = head.drop_marker(stamp);
                marker.renamed_to = Some(new_key.clone());
                if reused {
                    marker.displaced = dependencies.take_object(&new_key);
                }
                successor.name = new_name;

                let old_entry = set.install(marker)?;
                txn.push_undo(UndoRecord::CatalogChange { old_entry });
                let old_entry = set.install(successor)?;
                txn.push_undo(UndoRecord::CatalogChange { old_entry });

                dependencies.alter_object(&key, &new_key);
            }
        }
        info!(object = %target, "catalog entry altered");
        Ok(())
    }

    /// Makes `owner` the owner of `entry`. The owned entry is dropped
    /// together with its owner and cannot be dropped on its own.
    #[instrument(skip(self, txn), fields(txn = %txn.id(), owner = %owner, entry = %entry))]
    pub fn set_owner(
        &self,
        txn: &mut Transaction,
        owner: &QualifiedName,
        entry: &QualifiedName,
    ) -> Result<(), CatalogError> {
        check_active(txn)?;
        let owner_key = owner.mangle();
        let entry_key = entry.mangle();

        let mut state = self.inner.write();
        let CatalogState { set, dependencies } = &mut *state;
        let snapshot = *txn.snapshot();

        let owner_head = writable_entry(set, &snapshot, owner, &owner_key)?;
        let entry_head = writable_entry(set, &snapshot, entry, &entry_key)?;
        for head in [owner_head, entry_head] {
            if head.is_system() {
                return Err(CatalogError::SystemEntry(head.qualified_name()));
            }
        }
        let mut successor = entry_head.successor(txn.id().0);

        if !dependencies.add_ownership(&*set, &snapshot, &owner_key, &entry_key)? {
            return Ok(());
        }
        successor.owner = Some(owner_key);
        let old_entry = set.install(successor)?;
        txn.push_undo(UndoRecord::CatalogChange { old_entry });
        info!("ownership set");
        Ok(())
    }

    /// Returns the version of an object visible to `txn`, if it exists.
    pub fn lookup(
        &self,
        txn: &Transaction,
        catalog_type: CatalogType,
        schema: &str,
        name: &str,
    ) -> Option<CatalogEntry> {
        let key = mangle_name(catalog_type, schema, name);
        self.inner
            .read()
            .set
            .lookup_entry(Some(txn.snapshot()), &key)
            .filter(|entry| !entry.is_deleted())
            .cloned()
    }

    /// Returns the newest version of an object, committed or not.
    pub fn lookup_latest(
        &self,
        catalog_type: CatalogType,
        schema: &str,
        name: &str,
    ) -> Option<CatalogEntry> {
        let key = mangle_name(catalog_type, schema, name);
        self.inner
            .read()
            .set
            .lookup_entry(None, &key)
            .filter(|entry| !entry.is_deleted())
            .cloned()
    }

    /// Returns the storage of a table visible to `txn`.
    pub fn get_table(
        &self,
        txn: &Transaction,
        schema: &str,
        name: &str,
    ) -> Result<Arc<DataTable>, CatalogError> {
        self.lookup(txn, CatalogType::Table, schema, name)
            .and_then(|entry| entry.storage)
            .ok_or_else(|| CatalogError::EntryNotFound(QualifiedName::new(CatalogType::Table, schema, name)))
    }

    /// Calls `callback(object, dependent, kind)` for every dependency edge
    /// visible to `txn`.
    pub fn scan_dependencies<F>(&self, txn: &Transaction, callback: F)
    where
        F: FnMut(&CatalogEntry, &CatalogEntry, DependencyKind),
    {
        let state = self.inner.read();
        state.dependencies.scan(&state.set, txn.snapshot(), callback);
    }

    /// Returns every edge of the graph as `(object, dependent, kind)`,
    /// regardless of visibility.
    pub fn dependency_edges(&self) -> Vec<(MangledName, MangledName, DependencyKind)> {
        self.inner.read().dependencies.edges()
    }

    /// Returns the number of object keys with a version chain.
    pub fn object_count(&self) -> usize {
        self.inner.read().set.len()
    }

    /// Returns the number of entry versions held, tombstones included.
    pub fn entry_count(&self) -> usize {
        self.inner.read().set.entry_count()
    }

    pub(crate) fn commit_change(&self, old_entry: EntryId, commit_seq: u64) -> Result<(), CatalogError> {
        self.inner.write().set.commit_entry(old_entry, commit_seq)?;
        Ok(())
    }

    pub(crate) fn rollback_change(&self, old_entry: EntryId) -> Result<(), CatalogError> {
        let mut state = self.inner.write();
        let CatalogState { set, dependencies } = &mut *state;
        set.rollback_entry(old_entry, dependencies)?;
        Ok(())
    }

    pub(crate) fn cleanup_change(&self, old_entry: EntryId) -> Result<bool, CatalogError> {
        let mut state = self.inner.write();
        let CatalogState { set, dependencies } = &mut *state;
        Ok(set.cleanup_entry(old_entry, dependencies)?)
    }
}
