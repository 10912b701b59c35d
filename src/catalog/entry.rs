// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Catalog entry versions.
//!
//! Each object name owns a chain of [`CatalogEntry`] versions, newest first.
//! Unlike row versions, a catalog entry is a full version: it is valid from
//! its own stamp until the stamp of its newer neighbour.

use std::sync::Arc;

use crate::storage::{ChainLinks, ChainNode, DataTable, NodeId};

use super::dependency::DependencySet;
use super::mangle::{mangle_name, CatalogType, MangledName, QualifiedName};

/// Handle to a catalog entry version.
pub type EntryId = NodeId;

/// One version of a catalog object.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub(crate) catalog_type: CatalogType,
    pub(crate) schema: String,
    pub(crate) name: String,
    pub(crate) definition: String,
    pub(crate) storage: Option<Arc<DataTable>>,
    pub(crate) deleted: bool,
    pub(crate) system: bool,
    /// Produced by ALTER: continues the identity of its older version.
    pub(crate) altered: bool,
    pub(crate) owner: Option<MangledName>,
    /// Set on the tombstone a rename leaves under the old name.
    pub(crate) renamed_to: Option<MangledName>,
    /// Edges of a dropped object whose name this uncommitted version
    /// reuses. Reinstalled if the version is rolled back.
    pub(crate) displaced: Option<DependencySet>,
    pub(crate) stamp: u64,
    pub(crate) links: ChainLinks,
}

impl CatalogEntry {
    /// A tombstone: the object does not exist in this version.
    pub(crate) fn tombstone(
        catalog_type: CatalogType,
        schema: impl Into<String>,
        name: impl Into<String>,
        stamp: u64,
    ) -> Self {
        Self {
            catalog_type,
            schema: schema.into(),
            name: name.into(),
            definition: String::new(),
            storage: None,
            deleted: true,
            system: false,
            altered: false,
            owner: None,
            renamed_to: None,
            displaced: None,
            stamp,
            links: ChainLinks::default(),
        }
    }

    pub(crate) fn from_create(info: &CreateInfo, stamp: u64) -> Self {
        Self {
            catalog_type: info.catalog_type,
            schema: info.schema.clone(),
            name: info.name.clone(),
            definition: info.definition.clone(),
            storage: info.storage.clone(),
            deleted: false,
            system: info.system,
            altered: false,
            owner: None,
            renamed_to: None,
            displaced: None,
            stamp,
            links: ChainLinks::default(),
        }
    }

    /// A new, unlinked version continuing this entry's identity.
    pub(crate) fn successor(&self, stamp: u64) -> Self {
        Self {
            altered: true,
            renamed_to: None,
            displaced: None,
            stamp,
            links: ChainLinks::default(),
            ..self.clone()
        }
    }

    /// The tombstone that drops this entry.
    pub(crate) fn drop_marker(&self, stamp: u64) -> Self {
        Self::tombstone(self.catalog_type, self.schema.clone(), self.name.clone(), stamp)
    }

    #[inline]
    pub fn catalog_type(&self) -> CatalogType {
        self.catalog_type
    }

    #[inline]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Returns the table storage, for table entries.
    #[inline]
    pub fn storage(&self) -> Option<&Arc<DataTable>> {
        self.storage.as_ref()
    }

    /// Returns true for tombstones.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns true for built-in entries, which never take part in the
    /// dependency graph.
    #[inline]
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Returns true if this version was produced by ALTER.
    #[inline]
    pub fn is_altered(&self) -> bool {
        self.altered
    }

    /// Returns the key of the owning object, if any.
    #[inline]
    pub fn owner(&self) -> Option<&MangledName> {
        self.owner.as_ref()
    }

    /// Returns the new key, for the tombstone a rename leaves behind.
    #[inline]
    pub fn renamed_to(&self) -> Option<&MangledName> {
        self.renamed_to.as_ref()
    }

    /// Returns the canonical key of this entry.
    pub fn key(&self) -> MangledName {
        mangle_name(self.catalog_type, &self.schema, &self.name)
    }

    /// Returns the type, schema and name of this entry.
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.catalog_type, self.schema.clone(), self.name.clone())
    }
}

impl ChainNode for CatalogEntry {
    #[inline]
    fn stamp(&self) -> u64 {
        self.stamp
    }

    #[inline]
    fn links(&self) -> &ChainLinks {
        &self.links
    }

    #[inline]
    fn links_mut(&mut self) -> &mut ChainLinks {
        &mut self.links
    }
}

/// Parameters of a CREATE.
#[derive(Debug, Clone)]
pub struct CreateInfo {
    pub catalog_type: CatalogType,
    pub schema: String,
    pub name: String,
    pub definition: String,
    /// Objects the new object depends on.
    pub dependencies: Vec<QualifiedName>,
    pub system: bool,
    pub storage: Option<Arc<DataTable>>,
}

impl CreateInfo {
    /// Creates parameters for an object with no dependencies.
    pub fn new(catalog_type: CatalogType, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            catalog_type,
            schema: schema.into(),
            name: name.into(),
            definition: String::new(),
            dependencies: Vec::new(),
            system: false,
            storage: None,
        }
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = definition.into();
        self
    }

    /// Adds a dependency.
    pub fn with_dependency(mut self, dependency: QualifiedName) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Marks the object as a built-in.
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn with_storage(mut self, storage: Arc<DataTable>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.catalog_type, self.schema.clone(), self.name.clone())
    }
}

/// Parameters of an ALTER.
#[derive(Debug, Clone, Default)]
pub struct AlterInfo {
    /// New name, for a rename.
    pub new_name: Option<String>,
    /// Replacement definition.
    pub definition: Option<String>,
}

impl AlterInfo {
    /// Renames the object.
    pub fn rename(new_name: impl Into<String>) -> Self {
        Self {
            new_name: Some(new_name.into()),
            definition: None,
        }
    }

    /// Replaces the object's definition.
    pub fn set_definition(definition: impl Into<String>) -> Self {
        Self {
            new_name: None,
            definition: Some(definition.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_continues_identity() {
        let info = CreateInfo::new(CatalogType::View, "main", "v").with_definition("select 1");
        let mut entry = CatalogEntry::from_create(&info, 5);
        entry.renamed_to = Some(mangle_name(CatalogType::View, "main", "w"));

        let next = entry.successor(9);
        assert!(next.is_altered());
        assert_eq!(next.stamp(), 9);
        assert_eq!(next.definition(), "select 1");
        assert!(next.renamed_to().is_none());
        assert_eq!(next.links(), &ChainLinks::default());
        assert_eq!(next.key(), entry.key());
    }

    #[test]
    fn test_drop_marker_is_tombstone() {
        let info = CreateInfo::new(CatalogType::Table, "main", "t").system();
        let entry = CatalogEntry::from_create(&info, 1);
        let marker = entry.drop_marker(2);

        assert!(marker.is_deleted());
        assert!(!marker.is_system());
        assert_eq!(marker.qualified_name(), info.qualified_name());
    }
}
