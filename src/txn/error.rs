// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction error types.

use crate::catalog::CatalogError;
use crate::storage::{ChainError, StorageError};

/// Errors that can occur in transaction operations.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("transaction already committed")]
    AlreadyCommitted,

    #[error("transaction already aborted")]
    AlreadyAborted,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invariant violation: {0}")]
    Invariant(#[from] ChainError),
}

impl TxnError {
    /// Returns true if the error indicates corrupted version chains rather
    /// than a user-facing failure.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            TxnError::Invariant(_) | TxnError::Storage(StorageError::Chain(_)) => true,
            TxnError::Catalog(e) => e.is_invariant_violation(),
            _ => false,
        }
    }
}
