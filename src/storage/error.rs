// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Storage error types.

use crate::txn::TxnId;

use super::chain::ChainError;
use super::RowId;

/// Errors that can occur in table storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("row {row_id} not found in table {table}")]
    RowNotFound { table: String, row_id: RowId },

    #[error("write conflict on row {row_id} of table {table}")]
    WriteConflict { table: String, row_id: RowId },

    #[error("table {table} expects {expected} columns, got {actual}")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("transaction {0} is not active")]
    InactiveTransaction(TxnId),

    #[error("index {index}: {message}")]
    Index { index: String, message: String },

    #[error("version chain corrupted: {0}")]
    Chain(#[from] ChainError),
}
