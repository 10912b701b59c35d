// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Versioned name-to-entry map.

use std::collections::BTreeMap;

use tracing::trace;

use crate::storage::{ChainError, ChainNode, VersionArena};
use crate::txn::{Snapshot, TXN_ID_START};

use super::dependency::{DependencySet, DependencyTracker};
use super::entry::{CatalogEntry, EntryId};
use super::mangle::MangledName;

/// Read access the dependency graph needs from the catalog.
pub trait CatalogLookup {
    /// Resolves a key to the version visible to `snapshot`, or to the chain
    /// head when no snapshot is given. Tombstones are returned as-is.
    fn lookup_entry(&self, snapshot: Option<&Snapshot>, key: &MangledName) -> Option<&CatalogEntry>;

    /// Returns the newest version of a key, visible or not.
    fn head_entry(&self, key: &MangledName) -> Option<&CatalogEntry>;
}

/// Catalog entries of every object, one version chain per key.
///
/// A chain for a key that never existed starts with a stamp-zero tombstone,
/// so snapshots older than the first CREATE resolve to "does not exist".
#[derive(Default)]
pub struct CatalogSet {
    arena: VersionArena<CatalogEntry>,
    heads: BTreeMap<MangledName, EntryId>,
}

impl CatalogSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys with a version chain.
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    /// Returns true if no key has a version chain.
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Returns the number of entry versions held, tombstones included.
    pub fn entry_count(&self) -> usize {
        self.arena.len()
    }

    /// Returns the length of a key's version chain.
    pub fn chain_len(&self, key: &MangledName) -> usize {
        self.arena.chain_len(self.heads.get(key).copied())
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &MangledName> {
        self.heads.keys()
    }

    /// Returns the entry version behind a handle.
    pub fn entry(&self, id: EntryId) -> Result<&CatalogEntry, ChainError> {
        self.arena.node(id)
    }

    /// Pushes `entry` onto its key's chain and returns the version it
    /// supersedes.
    pub(crate) fn install(&mut self, entry: CatalogEntry) -> Result<EntryId, ChainError> {
        let key = entry.key();
        let old = match self.heads.get(&key) {
            Some(head) => *head,
            None => {
                let base = self.arena.insert(CatalogEntry::tombstone(
                    entry.catalog_type,
                    entry.schema.clone(),
                    entry.name.clone(),
                    0,
                ));
                self.arena.link(base, None)?;
                self.heads.insert(key.clone(), base);
                base
            }
        };
        let id = self.arena.insert(entry);
        self.arena.link(id, Some(old))?;
        self.heads.insert(key, id);
        Ok(old)
    }

    /// Stamps the version that superseded `old` with a commit sequence.
    pub(crate) fn commit_entry(&mut self, old: EntryId, commit_seq: u64) -> Result<(), ChainError> {
        let new = self
            .arena
            .node(old)?
            .links
            .newer
            .ok_or(ChainError::NoNewerVersion(old))?;
        let entry = self.arena.node_mut(new)?;
        entry.stamp = commit_seq;
        entry.displaced = None;
        Ok(())
    }

    /// Removes the uncommitted version that superseded `old`, restoring
    /// `old` as the head, and reverts the graph changes it implied.
    pub(crate) fn rollback_entry<D: DependencyTracker + ?Sized>(
        &mut self,
        old: EntryId,
        dependencies: &mut D,
    ) -> Result<(), ChainError> {
        let new = self
            .arena
            .node(old)?
            .links
            .newer
            .ok_or(ChainError::NoNewerVersion(old))?;
        let key = self.arena.node(new)?.key();
        if self.heads.get(&key) != Some(&new) {
            return Err(ChainError::NotHead(new));
        }
        let mut removed = self.arena.unlink(new)?;
        self.heads.insert(key.clone(), old);

        let previous = self.arena.node(old)?;
        let mut restore_at = None;
        if removed.deleted {
            // A rename moved the edges to the new name
            if let Some(renamed_to) = &removed.renamed_to {
                dependencies.move_object(renamed_to, &key);
                restore_at = Some(renamed_to.clone());
            }
        } else if !removed.altered {
            dependencies.erase_object(&key);
            restore_at = Some(key.clone());
        } else if !previous.deleted && removed.owner != previous.owner {
            if let Some(owner) = &removed.owner {
                dependencies.remove_ownership(owner, &key);
            }
        }
        trace!(key = %key, "catalog change reverted");

        self.prune(&key)?;
        if let (Some(target), Some(displaced)) = (restore_at, removed.displaced.take()) {
            self.restore_displaced(&target, displaced, dependencies);
        }
        Ok(())
    }

    /// Reinstalls the edges a reused name displaced, as long as the dropped
    /// object they belong to still has a chain. Edges to objects whose
    /// chains are gone are left out.
    fn restore_displaced<D: DependencyTracker + ?Sized>(
        &self,
        key: &MangledName,
        mut displaced: DependencySet,
        dependencies: &mut D,
    ) {
        if !self.heads.contains_key(key) {
            return;
        }
        displaced.retain_neighbours(|neighbour| self.heads.contains_key(neighbour));
        dependencies.restore_object(key, displaced);
    }

    /// Returns true if any version newer than `id`, committed or not, is
    /// live.
    fn has_live_successor(&self, id: EntryId) -> Result<bool, ChainError> {
        let mut next = self.arena.node(id)?.links.newer;
        while let Some(current) = next {
            let entry = self.arena.node(current)?;
            if !entry.deleted {
                return Ok(true);
            }
            next = entry.links.newer;
        }
        Ok(false)
    }

    /// Reclaims `old`, a version no snapshot can observe any more.
    ///
    /// The identity's graph node is erased when `old` was the last live
    /// version: its successor is a plain drop (not an alteration) and no
    /// newer version of the key is live. Returns true if `old` was freed.
    pub(crate) fn cleanup_entry<D: DependencyTracker + ?Sized>(
        &mut self,
        old: EntryId,
        dependencies: &mut D,
    ) -> Result<bool, ChainError> {
        let old_entry = self.arena.node(old)?;
        let newer = old_entry.links.newer.ok_or(ChainError::NoNewerVersion(old))?;
        let key = old_entry.key();
        let old_deleted = old_entry.deleted;
        let newer_altered = self.arena.node(newer)?.altered;

        if !newer_altered && !old_deleted && !self.has_live_successor(old)? {
            dependencies.erase_object(&key);
        }

        self.arena.unlink(old)?;
        self.prune(&key)?;
        Ok(true)
    }

    /// Drops a chain that holds nothing but a committed tombstone.
    fn prune(&mut self, key: &MangledName) -> Result<(), ChainError> {
        let Some(head) = self.heads.get(key).copied() else {
            return Ok(());
        };
        let entry = self.arena.node(head)?;
        if entry.deleted && entry.links.older.is_none() && entry.stamp() < TXN_ID_START {
            self.arena.unlink(head)?;
            self.heads.remove(key);
            trace!(key = %key, "catalog chain removed");
        }
        Ok(())
    }
}

impl CatalogLookup for CatalogSet {
    fn lookup_entry(&self, snapshot: Option<&Snapshot>, key: &MangledName) -> Option<&CatalogEntry> {
        let head = self.heads.get(key).copied();
        match snapshot {
            None => head.and_then(|id| self.arena.get(id)),
            Some(snapshot) => self
                .arena
                .walk(head)
                .map(|(_, entry)| entry)
                .find(|entry| snapshot.sees(entry.stamp())),
        }
    }

    fn head_entry(&self, key: &MangledName) -> Option<&CatalogEntry> {
        self.heads.get(key).and_then(|id| self.arena.get(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogType, CreateInfo, DependencyManager};
    use crate::txn::TxnId;

    fn create(name: &str, stamp: u64) -> CatalogEntry {
        CatalogEntry::from_create(&CreateInfo::new(CatalogType::Table, "main", name), stamp)
    }

    fn key(name: &str) -> MangledName {
        crate::catalog::mangle_name(CatalogType::Table, "main", name)
    }

    #[test]
    fn test_first_install_adds_base_tombstone() {
        let mut set = CatalogSet::new();
        let old = set.install(create("t", 7)).unwrap();

        let base = set.entry(old).unwrap();
        assert!(base.is_deleted());
        assert_eq!(base.stamp(), 0);
        assert_eq!(set.chain_len(&key("t")), 2);
    }

    #[test]
    fn test_lookup_by_snapshot() {
        let mut set = CatalogSet::new();
        let old = set.install(create("t", 0)).unwrap();
        set.commit_entry(old, 5).unwrap();

        let before = Snapshot::new(5, TxnId(TXN_ID_START));
        let after = Snapshot::new(6, TxnId(TXN_ID_START));

        assert!(set.lookup_entry(Some(&before), &key("t")).unwrap().is_deleted());
        assert!(!set.lookup_entry(Some(&after), &key("t")).unwrap().is_deleted());
        assert!(!set.lookup_entry(None, &key("t")).unwrap().is_deleted());
        assert!(set.lookup_entry(None, &key("u")).is_none());
    }

    #[test]
    fn test_rollback_of_first_create_removes_chain() {
        let mut set = CatalogSet::new();
        let mut deps = DependencyManager::new();
        let old = set.install(create("t", TXN_ID_START + 1)).unwrap();

        set.rollback_entry(old, &mut deps).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.entry_count(), 0);
    }

    #[test]
    fn test_rollback_requires_head() {
        let mut set = CatalogSet::new();
        let mut deps = DependencyManager::new();
        let first = set.install(create("t", 3)).unwrap();
        let live = set.entry(first).unwrap().links().newer.unwrap();
        set.install(set.entry(live).unwrap().drop_marker(TXN_ID_START + 1))
            .unwrap();

        assert_eq!(
            set.rollback_entry(first, &mut deps),
            Err(ChainError::NotHead(live))
        );
    }

    #[test]
    fn test_cleanup_of_drop_removes_chain() {
        let mut set = CatalogSet::new();
        let mut deps = DependencyManager::new();
        let base = set.install(create("t", 3)).unwrap();
        let live = set.entry(base).unwrap().links().newer.unwrap();
        let dropped = set.install(set.entry(live).unwrap().drop_marker(4)).unwrap();
        assert_eq!(dropped, live);

        assert!(set.cleanup_entry(base, &mut deps).unwrap());
        assert_eq!(set.chain_len(&key("t")), 2);
        assert!(set.cleanup_entry(live, &mut deps).unwrap());
        assert!(set.is_empty());
        assert_eq!(set.entry_count(), 0);
    }
}
