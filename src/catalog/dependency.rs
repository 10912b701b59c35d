// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Dependency graph between catalog objects.
//!
//! Edges are keyed by [`MangledName`] and stored in both directions: every
//! object has a [`DependencySet`] listing what it depends on and what
//! depends on it. One pair of objects may be linked by both kinds at once,
//! so each direction keeps [`DependencyFlags`] per neighbour. Edges are not
//! versioned themselves. Whether an edge is observable by a transaction is
//! decided by resolving both endpoints in the catalog through
//! [`CatalogLookup`].

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::txn::Snapshot;

use super::entry::CatalogEntry;
use super::error::CatalogError;
use super::mangle::{MangledName, QualifiedName};
use super::set::CatalogLookup;

/// Kind of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKind {
    /// The dependent needs the dependency. Blocks a drop without cascade.
    Regular,
    /// The dependent is owned by the dependency and is dropped with it.
    Ownership,
}

impl DependencyKind {
    const ALL: [DependencyKind; 2] = [DependencyKind::Regular, DependencyKind::Ownership];
}

/// Set of edge kinds held between one pair of objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyFlags {
    regular: bool,
    ownership: bool,
}

impl DependencyFlags {
    /// Returns true if an edge of `kind` is present.
    #[inline]
    pub fn contains(self, kind: DependencyKind) -> bool {
        match kind {
            DependencyKind::Regular => self.regular,
            DependencyKind::Ownership => self.ownership,
        }
    }

    /// Returns true if no edge is present.
    #[inline]
    pub fn is_empty(self) -> bool {
        !self.regular && !self.ownership
    }

    /// Iterates the kinds present, Regular first.
    pub fn kinds(self) -> impl Iterator<Item = DependencyKind> {
        DependencyKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }

    fn insert(&mut self, kind: DependencyKind) {
        match kind {
            DependencyKind::Regular => self.regular = true,
            DependencyKind::Ownership => self.ownership = true,
        }
    }

    fn remove(&mut self, kind: DependencyKind) {
        match kind {
            DependencyKind::Regular => self.regular = false,
            DependencyKind::Ownership => self.ownership = false,
        }
    }

    fn union(self, other: Self) -> Self {
        Self {
            regular: self.regular || other.regular,
            ownership: self.ownership || other.ownership,
        }
    }
}

fn merge_flags(map: &mut BTreeMap<MangledName, DependencyFlags>, key: &MangledName, flags: DependencyFlags) {
    let slot = map.entry(key.clone()).or_default();
    *slot = slot.union(flags);
}

/// Both directions of one object's edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    dependencies: BTreeMap<MangledName, DependencyFlags>,
    dependents: BTreeMap<MangledName, DependencyFlags>,
}

impl DependencySet {
    /// Objects this object depends on, one item per edge kind.
    pub fn dependencies(&self) -> impl Iterator<Item = (&MangledName, DependencyKind)> {
        self.dependencies
            .iter()
            .flat_map(|(key, flags)| flags.kinds().map(move |kind| (key, kind)))
    }

    /// Objects that depend on this object, one item per edge kind.
    pub fn dependents(&self) -> impl Iterator<Item = (&MangledName, DependencyKind)> {
        self.dependents
            .iter()
            .flat_map(|(key, flags)| flags.kinds().map(move |kind| (key, kind)))
    }

    /// Returns true if the object has no edges.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.dependents.is_empty()
    }

    /// Keeps only the edges whose other endpoint satisfies `keep`.
    pub(crate) fn retain_neighbours<F>(&mut self, mut keep: F)
    where
        F: FnMut(&MangledName) -> bool,
    {
        self.dependencies.retain(|key, _| keep(key));
        self.dependents.retain(|key, _| keep(key));
    }
}

/// Graph mutations the catalog set may perform during rollback and cleanup.
pub trait DependencyTracker {
    /// Removes every edge that references `key`.
    fn erase_object(&mut self, key: &MangledName);

    /// Removes every edge that references `key` and returns them.
    fn take_object(&mut self, key: &MangledName) -> Option<DependencySet>;

    /// Reinstalls edges previously returned by [`take_object`], merging
    /// them with any edges `key` holds now.
    ///
    /// [`take_object`]: DependencyTracker::take_object
    fn restore_object(&mut self, key: &MangledName, set: DependencySet);

    /// Returns the edge set of `key`, creating an empty one if needed.
    fn get_or_create_dependency_set(&mut self, key: &MangledName) -> &mut DependencySet;

    /// Re-keys every edge of `from` to `to`.
    fn move_object(&mut self, from: &MangledName, to: &MangledName);

    /// Removes the ownership edge between `owner` and `entry`, leaving any
    /// Regular edge between them in place.
    fn remove_ownership(&mut self, owner: &MangledName, entry: &MangledName);
}

/// The dependency graph.
#[derive(Debug, Default)]
pub struct DependencyManager {
    sets: BTreeMap<MangledName, DependencySet>,
}

fn qualified(key: &MangledName) -> Result<QualifiedName, CatalogError> {
    QualifiedName::try_from(key)
}

/// Returns the version of `key` visible to `snapshot` if it is live.
fn live_entry<'a, C: CatalogLookup + ?Sized>(
    catalog: &'a C,
    snapshot: &Snapshot,
    key: &MangledName,
) -> Option<&'a CatalogEntry> {
    catalog
        .lookup_entry(Some(snapshot), key)
        .filter(|entry| !entry.is_deleted())
}

/// Returns true if the newest version of `key` is visible to `snapshot`.
fn head_visible<C: CatalogLookup + ?Sized>(
    catalog: &C,
    snapshot: &Snapshot,
    key: &MangledName,
) -> bool {
    catalog
        .head_entry(key)
        .map_or(true, |head| snapshot.sees(head.stamp))
}

impl DependencyManager {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the edge set of `key`, if it has any edges.
    pub fn dependency_set(&self, key: &MangledName) -> Option<&DependencySet> {
        self.sets.get(key)
    }

    /// Returns the number of edges, counting each kind separately.
    pub fn edge_count(&self) -> usize {
        self.sets.values().map(|set| set.dependencies().count()).sum()
    }

    /// Returns every edge as `(object, dependent, kind)`, in key order.
    pub fn edges(&self) -> Vec<(MangledName, MangledName, DependencyKind)> {
        self.sets
            .iter()
            .flat_map(|(object, set)| {
                set.dependents()
                    .map(move |(dependent, kind)| (object.clone(), dependent.clone(), kind))
            })
            .collect()
    }

    /// Returns the owner of `key`, if it is owned.
    pub fn owner_of(&self, key: &MangledName) -> Option<&MangledName> {
        self.sets.get(key).and_then(|set| {
            set.dependencies
                .iter()
                .find(|(_, flags)| flags.contains(DependencyKind::Ownership))
                .map(|(owner, _)| owner)
        })
    }

    /// Returns true if `from` reaches `to` following edges of `kind` from
    /// dependent to dependency.
    fn reaches(&self, from: &MangledName, to: &MangledName, kind: DependencyKind) -> bool {
        let mut stack = vec![from];
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(set) = self.sets.get(current) {
                stack.extend(
                    set.dependencies
                        .iter()
                        .filter(|(_, flags)| flags.contains(kind))
                        .map(|(dependency, _)| dependency),
                );
            }
        }
        false
    }

    fn insert_edge(&mut self, dependent: &MangledName, dependency: &MangledName, kind: DependencyKind) {
        self.get_or_create_dependency_set(dependent)
            .dependencies
            .entry(dependency.clone())
            .or_default()
            .insert(kind);
        self.get_or_create_dependency_set(dependency)
            .dependents
            .entry(dependent.clone())
            .or_default()
            .insert(kind);
    }

    fn remove_edge(&mut self, dependent: &MangledName, dependency: &MangledName, kind: DependencyKind) {
        if let Some(set) = self.sets.get_mut(dependent) {
            remove_kind(&mut set.dependencies, dependency, kind);
        }
        if let Some(set) = self.sets.get_mut(dependency) {
            remove_kind(&mut set.dependents, dependent, kind);
        }
        self.prune(dependent);
        self.prune(dependency);
    }

    fn prune(&mut self, key: &MangledName) {
        if self.sets.get(key).is_some_and(DependencySet::is_empty) {
            self.sets.remove(key);
        }
    }

    /// Registers the Regular edges of a new object.
    ///
    /// Every dependency must resolve to a live entry visible to `snapshot`.
    /// All dependencies are validated before any edge is installed. System
    /// entries, on either side, never get edges.
    pub fn add_object<C: CatalogLookup + ?Sized>(
        &mut self,
        catalog: &C,
        snapshot: &Snapshot,
        object: &CatalogEntry,
        dependencies: &[MangledName],
    ) -> Result<(), CatalogError> {
        let object_key = object.key();
        let mut edges = Vec::with_capacity(dependencies.len());

        for dependency in dependencies {
            if *dependency == object_key {
                return Err(CatalogError::DependencyCycle {
                    object: object.qualified_name(),
                    dependency: object.qualified_name(),
                });
            }
            let Some(entry) = live_entry(catalog, snapshot, dependency) else {
                return Err(CatalogError::MissingDependency {
                    object: object.qualified_name(),
                    dependency: qualified(dependency)?,
                });
            };
            if !head_visible(catalog, snapshot, dependency) {
                warn!(object = %object_key, dependency = %dependency, "dependency changed concurrently");
                return Err(CatalogError::WriteConflict(entry.qualified_name()));
            }
            if entry.is_system() {
                continue;
            }
            if self.reaches(dependency, &object_key, DependencyKind::Regular) {
                return Err(CatalogError::DependencyCycle {
                    object: object.qualified_name(),
                    dependency: entry.qualified_name(),
                });
            }
            edges.push(dependency);
        }

        if object.is_system() {
            return Ok(());
        }
        for dependency in edges {
            self.insert_edge(&object_key, dependency, DependencyKind::Regular);
        }
        debug!(object = %object_key, dependencies = dependencies.len(), "object registered");
        Ok(())
    }

    /// Makes `owner` the owner of `entry`.
    ///
    /// Returns false if `owner` already owns `entry`. A Regular edge between
    /// the two is kept alongside the ownership.
    pub fn add_ownership<C: CatalogLookup + ?Sized>(
        &mut self,
        catalog: &C,
        snapshot: &Snapshot,
        owner: &MangledName,
        entry: &MangledName,
    ) -> Result<bool, CatalogError> {
        let owner_name = match live_entry(catalog, snapshot, owner) {
            Some(found) => found.qualified_name(),
            None => return Err(CatalogError::EntryNotFound(qualified(owner)?)),
        };
        let entry_name = match live_entry(catalog, snapshot, entry) {
            Some(found) => found.qualified_name(),
            None => return Err(CatalogError::EntryNotFound(qualified(entry)?)),
        };

        if owner == entry {
            return Err(CatalogError::DependencyCycle {
                object: entry_name,
                dependency: owner_name,
            });
        }
        match self.owner_of(entry) {
            Some(existing) if existing == owner => return Ok(false),
            Some(existing) => {
                return Err(CatalogError::OwnershipConflict {
                    entry: entry_name,
                    owner: owner_name,
                    existing: qualified(existing)?,
                })
            }
            None => {}
        }
        if self.reaches(owner, entry, DependencyKind::Ownership) {
            return Err(CatalogError::DependencyCycle {
                object: entry_name,
                dependency: owner_name,
            });
        }

        self.insert_edge(entry, owner, DependencyKind::Ownership);
        debug!(owner = %owner, entry = %entry, "ownership added");
        Ok(true)
    }

    /// Computes the objects a drop of `object` removes, dependents first.
    ///
    /// Does not modify the graph. Fails if the object is owned, if a live
    /// dependent that is not owned by it exists and `cascade` is not set, or
    /// if a dependent is being changed by another transaction.
    pub fn drop_object<C: CatalogLookup + ?Sized>(
        &self,
        catalog: &C,
        snapshot: &Snapshot,
        object: &MangledName,
        cascade: bool,
    ) -> Result<Vec<MangledName>, CatalogError> {
        if let Some(owner) = self.owner_of(object) {
            if let Some(owner_entry) = live_entry(catalog, snapshot, owner) {
                return Err(CatalogError::OwnedEntry {
                    entry: qualified(object)?,
                    owner: owner_entry.qualified_name(),
                });
            }
        }

        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        self.collect_drop(catalog, snapshot, object, cascade, &mut visited, &mut order)?;
        Ok(order)
    }

    fn collect_drop<C: CatalogLookup + ?Sized>(
        &self,
        catalog: &C,
        snapshot: &Snapshot,
        object: &MangledName,
        cascade: bool,
        visited: &mut BTreeSet<MangledName>,
        order: &mut Vec<MangledName>,
    ) -> Result<(), CatalogError> {
        visited.insert(object.clone());
        if let Some(set) = self.sets.get(object) {
            for (dependent, flags) in &set.dependents {
                if visited.contains(dependent) {
                    continue;
                }
                if !head_visible(catalog, snapshot, dependent) {
                    warn!(object = %object, dependent = %dependent, "dependent changed concurrently");
                    return Err(CatalogError::WriteConflict(qualified(dependent)?));
                }
                if live_entry(catalog, snapshot, dependent).is_none() {
                    continue;
                }
                // Owned objects go with their owner whatever else links them
                if !flags.contains(DependencyKind::Ownership) && !cascade {
                    warn!(object = %object, dependent = %dependent, "drop restricted");
                    return Err(CatalogError::RestrictedDrop {
                        object: qualified(object)?,
                        dependent: qualified(dependent)?,
                    });
                }
                self.collect_drop(catalog, snapshot, dependent, cascade, visited, order)?;
            }
        }
        order.push(object.clone());
        Ok(())
    }

    /// Re-points the edges of an altered object. A no-op when the identity
    /// is unchanged.
    pub fn alter_object(&mut self, old: &MangledName, new: &MangledName) {
        if old != new {
            self.move_object(old, new);
        }
    }

    /// Calls `callback(object, dependent, kind)` for every edge whose
    /// endpoints both resolve to live entries visible to `snapshot`.
    pub fn scan<C, F>(&self, catalog: &C, snapshot: &Snapshot, mut callback: F)
    where
        C: CatalogLookup + ?Sized,
        F: FnMut(&CatalogEntry, &CatalogEntry, DependencyKind),
    {
        for (key, set) in &self.sets {
            let Some(object) = live_entry(catalog, snapshot, key) else {
                continue;
            };
            for (dependent, flags) in &set.dependents {
                if let Some(dependent) = live_entry(catalog, snapshot, dependent) {
                    for kind in flags.kinds() {
                        callback(object, dependent, kind);
                    }
                }
            }
        }
    }

    /// Removes every edge of an object whose last live version was reclaimed.
    pub fn cleanup_dependencies(&mut self, key: &MangledName) {
        self.erase_object(key);
    }
}

fn remove_kind(map: &mut BTreeMap<MangledName, DependencyFlags>, key: &MangledName, kind: DependencyKind) {
    if let Some(flags) = map.get_mut(key) {
        flags.remove(kind);
        if flags.is_empty() {
            map.remove(key);
        }
    }
}

impl DependencyTracker for DependencyManager {
    fn erase_object(&mut self, key: &MangledName) {
        self.take_object(key);
    }

    fn take_object(&mut self, key: &MangledName) -> Option<DependencySet> {
        let set = self.sets.remove(key)?;
        for dependency in set.dependencies.keys() {
            if let Some(other) = self.sets.get_mut(dependency) {
                other.dependents.remove(key);
            }
            self.prune(dependency);
        }
        for dependent in set.dependents.keys() {
            if let Some(other) = self.sets.get_mut(dependent) {
                other.dependencies.remove(key);
            }
            self.prune(dependent);
        }
        debug!(key = %key, "dependencies erased");
        Some(set)
    }

    fn restore_object(&mut self, key: &MangledName, set: DependencySet) {
        if set.is_empty() {
            return;
        }
        for (dependency, flags) in &set.dependencies {
            merge_flags(&mut self.get_or_create_dependency_set(dependency).dependents, key, *flags);
        }
        for (dependent, flags) in &set.dependents {
            merge_flags(&mut self.get_or_create_dependency_set(dependent).dependencies, key, *flags);
        }
        let target = self.get_or_create_dependency_set(key);
        for (dependency, flags) in &set.dependencies {
            merge_flags(&mut target.dependencies, dependency, *flags);
        }
        for (dependent, flags) in &set.dependents {
            merge_flags(&mut target.dependents, dependent, *flags);
        }
        debug!(key = %key, "dependencies restored");
    }

    fn get_or_create_dependency_set(&mut self, key: &MangledName) -> &mut DependencySet {
        self.sets.entry(key.clone()).or_default()
    }

    fn move_object(&mut self, from: &MangledName, to: &MangledName) {
        let Some(set) = self.sets.remove(from) else {
            return;
        };
        // Stale edges of a dropped object that used the same name
        self.erase_object(to);
        for (dependency, flags) in &set.dependencies {
            if let Some(other) = self.sets.get_mut(dependency) {
                other.dependents.remove(from);
                other.dependents.insert(to.clone(), *flags);
            }
        }
        for (dependent, flags) in &set.dependents {
            if let Some(other) = self.sets.get_mut(dependent) {
                other.dependencies.remove(from);
                other.dependencies.insert(to.clone(), *flags);
            }
        }
        self.sets.insert(to.clone(), set);
        debug!(from = %from, to = %to, "dependencies moved");
    }

    fn remove_ownership(&mut self, owner: &MangledName, entry: &MangledName) {
        let owned = self
            .sets
            .get(entry)
            .and_then(|set| set.dependencies.get(owner))
            .is_some_and(|flags| flags.contains(DependencyKind::Ownership));
        if owned {
            self.remove_edge(entry, owner, DependencyKind::Ownership);
        }
    }
}
