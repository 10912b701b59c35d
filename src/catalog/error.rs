// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Catalog error types.

use crate::storage::ChainError;
use crate::txn::TxnId;

use super::mangle::QualifiedName;

/// Errors that can occur in catalog operations.
///
/// DDL validates before it mutates, so any error other than
/// [`CatalogError::Chain`] leaves the catalog and the dependency graph
/// untouched.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{object} depends on {dependency}, which does not exist")]
    MissingDependency {
        object: QualifiedName,
        dependency: QualifiedName,
    },

    #[error("cannot drop {object}: {dependent} depends on it (use cascade)")]
    RestrictedDrop {
        object: QualifiedName,
        dependent: QualifiedName,
    },

    #[error("{entry} is already owned by {existing}, cannot transfer to {owner}")]
    OwnershipConflict {
        entry: QualifiedName,
        owner: QualifiedName,
        existing: QualifiedName,
    },

    #[error("cannot drop {entry}: it is owned by {owner}")]
    OwnedEntry {
        entry: QualifiedName,
        owner: QualifiedName,
    },

    #[error("dependency of {object} on {dependency} would create a cycle")]
    DependencyCycle {
        object: QualifiedName,
        dependency: QualifiedName,
    },

    #[error("{0} does not exist")]
    EntryNotFound(QualifiedName),

    #[error("{0} already exists")]
    EntryExists(QualifiedName),

    #[error("{0} is a system entry")]
    SystemEntry(QualifiedName),

    #[error("write conflict on {0}")]
    WriteConflict(QualifiedName),

    #[error("invalid mangled name {key:?}: {reason}")]
    InvalidMangledName { key: String, reason: String },

    #[error("transaction {0} is not active")]
    InactiveTransaction(TxnId),

    #[error("catalog chain corrupted: {0}")]
    Chain(#[from] ChainError),
}

impl CatalogError {
    /// Returns true if the error indicates corrupted catalog state rather
    /// than a rejected request.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, CatalogError::Chain(_))
    }
}
